// =============================================================================
// Pattern Detectors
// =============================================================================
//
// Modeled as a tagged-variant sum over {Iceberg, Spoof, Absorption} rather
// than dynamic dispatch on a trait object — the router iterates detectors in
// a fixed order with a uniform interface, which keeps the hot path
// branch-predictable (see the design note on dynamic dispatch).

pub mod absorption;
pub mod iceberg;
pub mod spoof;

use serde::{Deserialize, Serialize};

use crate::types::{Side, Ticks, TimestampNs};

/// A typed detection emitted by one of the three pattern detectors. Carries
/// everything the confluence scorer needs from that detection alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DetectionEvent {
    Iceberg {
        side: Side,
        price: Ticks,
        count: u32,
        size: i64,
    },
    Spoof {
        side: Side,
        price: Ticks,
        size: i64,
        lifetime_ns: TimestampNs,
    },
    Absorption {
        side: Side,
        price: Ticks,
        traded_size: i64,
        passive_size: i64,
    },
}

impl DetectionEvent {
    pub fn side(&self) -> Side {
        match self {
            DetectionEvent::Iceberg { side, .. } => *side,
            DetectionEvent::Spoof { side, .. } => *side,
            DetectionEvent::Absorption { side, .. } => *side,
        }
    }

    pub fn price(&self) -> Ticks {
        match self {
            DetectionEvent::Iceberg { price, .. } => *price,
            DetectionEvent::Spoof { price, .. } => *price,
            DetectionEvent::Absorption { price, .. } => *price,
        }
    }
}

pub use absorption::AbsorptionDetector;
pub use iceberg::IcebergDetector;
pub use spoof::SpoofDetector;
