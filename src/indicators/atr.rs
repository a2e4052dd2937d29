// =============================================================================
// Average True Range (ATR) — incremental, Wilder's smoothing
// =============================================================================
//
// True range here is |price - prev_price| since the core only observes a
// trade price stream, not OHLC bars. A ring of the last `period` true ranges
// seeds the first ATR value as their mean; subsequent ATRs apply Wilder's
// smoothing:
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtrSnapshot {
    pub value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    ring: VecDeque<f64>,
    prev_price: Option<f64>,
    atr: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            ring: VecDeque::with_capacity(period),
            prev_price: None,
            atr: None,
        }
    }

    pub fn on_price(&mut self, price: f64) {
        let prev = match self.prev_price.replace(price) {
            Some(p) => p,
            None => return, // first trade has no true range yet
        };
        let tr = (price - prev).abs();

        if self.atr.is_none() {
            self.ring.push_back(tr);
            if self.ring.len() == self.period {
                let sum: f64 = self.ring.iter().sum();
                self.atr = Some(sum / self.period as f64);
            }
        } else {
            let prev_atr = self.atr.unwrap();
            let period_f = self.period as f64;
            self.atr = Some((prev_atr * (period_f - 1.0) + tr) / period_f);
        }
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.prev_price = None;
        self.atr = None;
    }

    pub fn snapshot(&self) -> AtrSnapshot {
        AtrSnapshot { value: self.atr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_before_period_true_ranges_seen() {
        let mut atr = Atr::new(14);
        for i in 0..13 {
            atr.on_price(100.0 + i as f64);
        }
        assert!(atr.snapshot().value.is_none());
    }

    #[test]
    fn seeds_with_mean_of_first_period_true_ranges() {
        let mut atr = Atr::new(3);
        // prices: 100, 101, 103, 106 -> TRs: 1, 2, 3
        for p in [100.0, 101.0, 103.0, 106.0] {
            atr.on_price(p);
        }
        let val = atr.snapshot().value.unwrap();
        assert!((val - 2.0).abs() < 1e-9);
    }

    #[test]
    fn applies_wilders_smoothing_after_seed() {
        let mut atr = Atr::new(3);
        for p in [100.0, 101.0, 103.0, 106.0] {
            atr.on_price(p);
        }
        let seeded = atr.snapshot().value.unwrap();
        atr.on_price(110.0); // TR = 4
        let smoothed = atr.snapshot().value.unwrap();
        let expected = (seeded * 2.0 + 4.0) / 3.0;
        assert!((smoothed - expected).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_state() {
        let mut atr = Atr::new(3);
        for p in [100.0, 101.0, 103.0, 106.0] {
            atr.on_price(p);
        }
        atr.reset();
        assert!(atr.snapshot().value.is_none());
    }

    #[test]
    fn constant_range_converges() {
        let mut atr = Atr::new(14);
        let mut price = 100.0;
        for i in 0..40 {
            price += if i % 2 == 0 { 5.0 } else { -5.0 };
            atr.on_price(price);
        }
        let val = atr.snapshot().value.unwrap();
        assert!((val - 5.0).abs() < 1.0, "expected ATR near 5.0, got {val}");
    }
}
