// =============================================================================
// VWAP — Volume-Weighted Average Price
// =============================================================================
//
// Accumulates sum(price*size) and sum(size) over the current session. Prices
// are tick-integers; the running sums are kept in f64 since size*price over a
// full session can exceed i64 precision needs but not f64's.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Ticks;

/// ±0.1% of VWAP counts as "near" per the confluence scorer's VWAP factor.
const NEAR_FRACTION: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VwapClassification {
    Above,
    Near,
    Below,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VwapSnapshot {
    pub value: Option<f64>,
    pub classification: Option<VwapClassification>,
    pub distance_ticks: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Vwap {
    sum_pv: f64,
    sum_v: f64,
}

impl Vwap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_trade(&mut self, price: Ticks, size: i64) {
        self.sum_pv += price as f64 * size as f64;
        self.sum_v += size as f64;
    }

    pub fn reset(&mut self) {
        self.sum_pv = 0.0;
        self.sum_v = 0.0;
    }

    pub fn value(&self) -> Option<f64> {
        if self.sum_v > 0.0 {
            Some(self.sum_pv / self.sum_v)
        } else {
            None
        }
    }

    /// Classify `current_price` relative to VWAP; `None` until the first
    /// trade (indicator warm-up per the error-handling design).
    pub fn snapshot(&self, current_price: Ticks) -> VwapSnapshot {
        let vwap = match self.value() {
            Some(v) => v,
            None => {
                return VwapSnapshot {
                    value: None,
                    classification: None,
                    distance_ticks: None,
                }
            }
        };
        let distance = current_price as f64 - vwap;
        let classification = if vwap.abs() > 0.0 && (distance / vwap).abs() <= NEAR_FRACTION {
            VwapClassification::Near
        } else if distance > 0.0 {
            VwapClassification::Above
        } else {
            VwapClassification::Below
        };
        VwapSnapshot {
            value: Some(vwap),
            classification: Some(classification),
            distance_ticks: Some(distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_before_first_trade() {
        let vwap = Vwap::new();
        assert!(vwap.value().is_none());
        assert!(vwap.snapshot(100).classification.is_none());
    }

    #[test]
    fn computes_volume_weighted_average() {
        let mut vwap = Vwap::new();
        vwap.on_trade(100, 10);
        vwap.on_trade(200, 10);
        assert!((vwap.value().unwrap() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn classifies_above_below_near() {
        let mut vwap = Vwap::new();
        vwap.on_trade(100, 100);
        assert_eq!(
            vwap.snapshot(200).classification.unwrap(),
            VwapClassification::Above
        );
        assert_eq!(
            vwap.snapshot(50).classification.unwrap(),
            VwapClassification::Below
        );
        assert_eq!(
            vwap.snapshot(100).classification.unwrap(),
            VwapClassification::Near
        );
    }

    #[test]
    fn reset_clears_accumulators() {
        let mut vwap = Vwap::new();
        vwap.on_trade(100, 10);
        vwap.reset();
        assert!(vwap.value().is_none());
    }

    #[test]
    fn matches_rational_arithmetic_within_one_ulp() {
        let mut vwap = Vwap::new();
        let trades = [(101, 3), (99, 5), (105, 2)];
        let mut sum_pv = 0.0f64;
        let mut sum_v = 0.0f64;
        for (p, s) in trades {
            vwap.on_trade(p, s);
            sum_pv += p as f64 * s as f64;
            sum_v += s as f64;
        }
        let expected = sum_pv / sum_v;
        assert!((vwap.value().unwrap() - expected).abs() <= f64::EPSILON * expected.abs().max(1.0));
    }
}
