// =============================================================================
// Spoof Detector
// =============================================================================
//
// Stateless: evaluated directly against a registry cancel outcome. A large
// passive order cancelled quickly and never traded against is treated as
// evidence of manipulative intent — a penalty input to scoring, never a
// trade signal on its own.
// =============================================================================

use crate::registry::CancelOutcome;
use crate::types::TimestampNs;

use super::DetectionEvent;

pub struct SpoofDetector {
    max_age_ns: TimestampNs,
    min_size: i64,
}

impl SpoofDetector {
    pub fn new(max_age_ms: u64, min_size: i64) -> Self {
        Self {
            max_age_ns: max_age_ms as i64 * 1_000_000,
            min_size,
        }
    }

    pub fn on_cancel(&self, outcome: &CancelOutcome) -> Option<DetectionEvent> {
        if outcome.ever_traded_against {
            return None;
        }
        if outcome.lifetime_ns >= self.max_age_ns {
            return None;
        }
        if outcome.size_at_cancel < self.min_size {
            return None;
        }
        Some(DetectionEvent::Spoof {
            side: outcome.side,
            price: outcome.price,
            size: outcome.size_at_cancel,
            lifetime_ns: outcome.lifetime_ns,
        })
    }
}
