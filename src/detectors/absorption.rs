// =============================================================================
// Absorption Detector
// =============================================================================
//
// Aggressive prints arrive at a price, but the passive side on the opposing
// book is replenished at least as fast as it is consumed — evidence of
// conviction on the passive side rather than a level about to break.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use crate::types::{Side, Ticks, TimestampNs};

use super::DetectionEvent;

type LevelKey = (Side, Ticks);

const ROLLING_WINDOW_NS: TimestampNs = 2_000_000_000; // 2 seconds

struct RollingSequence {
    trades: VecDeque<(TimestampNs, i64)>,
    sum: i64,
    baseline_passive_size: Option<i64>,
}

pub struct AbsorptionDetector {
    min_size: i64,
    min_ratio: f64,
    sequences: HashMap<LevelKey, RollingSequence>,
}

impl AbsorptionDetector {
    pub fn new(min_size: i64) -> Self {
        Self {
            min_size,
            min_ratio: 0.5,
            sequences: HashMap::new(),
        }
    }

    fn evict_stale(seq: &mut RollingSequence, now: TimestampNs) {
        while let Some(&(ts, size)) = seq.trades.front() {
            if now - ts > ROLLING_WINDOW_NS {
                seq.trades.pop_front();
                seq.sum -= size;
            } else {
                break;
            }
        }
        if seq.trades.is_empty() {
            seq.baseline_passive_size = None;
        }
    }

    /// `aggressor` is the side that initiated the trade; the passive level
    /// being tested for absorption sits on the opposite side at `price`.
    /// `passive_level_size_now` is the opposing level's current aggregate
    /// size, as tracked by the MBO registry (0 if the level does not exist).
    pub fn on_trade(
        &mut self,
        aggressor: Side,
        price: Ticks,
        trade_size: i64,
        ts: TimestampNs,
        passive_level_size_now: i64,
    ) -> Option<DetectionEvent> {
        let passive_side = aggressor.opposite();
        let key = (passive_side, price);

        let seq = self.sequences.entry(key).or_insert_with(|| RollingSequence {
            trades: VecDeque::new(),
            sum: 0,
            baseline_passive_size: None,
        });

        Self::evict_stale(seq, ts);

        if seq.baseline_passive_size.is_none() {
            seq.baseline_passive_size = Some(passive_level_size_now);
        }

        seq.trades.push_back((ts, trade_size));
        seq.sum += trade_size;

        if seq.sum < self.min_size {
            return None;
        }

        let before = seq.baseline_passive_size.unwrap_or(0);
        if before <= 0 {
            return None;
        }
        let ratio = passive_level_size_now as f64 / before as f64;
        if ratio < self.min_ratio {
            return None;
        }

        Some(DetectionEvent::Absorption {
            side: passive_side,
            price,
            traded_size: seq.sum,
            passive_size: passive_level_size_now,
        })
    }
}
