// =============================================================================
// Iceberg Detector
// =============================================================================
//
// Genuine hidden orders manifest as repeated small inserts at the same price
// replenishing consumed size; adaptive thresholds ensure the definition of
// "large" tracks the instrument's current regime rather than a fixed
// constant that drifts stale as volatility changes.
// =============================================================================

use std::collections::HashMap;

use crate::types::{Side, Ticks, TimestampNs};

use super::DetectionEvent;

type LevelKey = (Side, Ticks);

pub struct IcebergDetector {
    min_orders_base: u32,
    size_base: i64,
    threshold_multiplier: f64,
    cooldown_ns: TimestampNs,
    last_emit: HashMap<LevelKey, TimestampNs>,
}

impl IcebergDetector {
    pub fn new(min_orders_base: u32, size_base: i64, threshold_multiplier: f64, cooldown_ms: u64) -> Self {
        Self {
            min_orders_base,
            size_base,
            threshold_multiplier,
            cooldown_ns: cooldown_ms as i64 * 1_000_000,
            last_emit: HashMap::new(),
        }
    }

    /// Evaluate a level growth event (insert, or a replace with delta > 0).
    /// `window_mean_count`/`window_mean_size` come from the MBO registry's
    /// adaptive-threshold window for this level.
    #[allow(clippy::too_many_arguments)]
    pub fn on_level_growth(
        &mut self,
        side: Side,
        price: Ticks,
        level_inserts_since_first: u32,
        level_total_size: i64,
        window_mean_count: f64,
        window_mean_size: f64,
        ts: TimestampNs,
    ) -> Option<DetectionEvent> {
        let orders_threshold =
            (self.min_orders_base as f64).max(window_mean_count * self.threshold_multiplier);
        let size_threshold =
            (self.size_base as f64).max(window_mean_size * self.threshold_multiplier);

        if (level_inserts_since_first as f64) < orders_threshold {
            return None;
        }
        if (level_total_size as f64) < size_threshold {
            return None;
        }

        let key = (side, price);
        if let Some(&last) = self.last_emit.get(&key) {
            if ts - last < self.cooldown_ns {
                return None;
            }
        }
        self.last_emit.insert(key, ts);

        Some(DetectionEvent::Iceberg {
            side,
            price,
            count: level_inserts_since_first,
            size: level_total_size,
        })
    }
}
