// =============================================================================
// Exponential Moving Average — incremental, event-driven
// =============================================================================
//
// value = alpha * price + (1 - alpha) * prev, alpha = 2 / (period + 1).
//
// Unlike the other session-scoped indicators, EMA never resets at a session
// boundary: its warm-up is simply "first trade price seen", and it carries
// forward across PreMarket transitions the way a human reading a chart would
// expect the trend line not to snap back to zero every morning.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaSnapshot {
    pub period: u32,
    pub value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Ema {
    period: u32,
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: u32) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        }
    }

    pub fn on_price(&mut self, price: f64) {
        self.value = Some(match self.value {
            None => price,
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
        });
    }

    pub fn snapshot(&self) -> EmaSnapshot {
        EmaSnapshot {
            period: self.period,
            value: self.value,
        }
    }
}

/// A fixed battery of EMAs sharing one price stream, in ascending period order.
#[derive(Debug, Clone)]
pub struct EmaBattery {
    emas: Vec<Ema>,
}

impl EmaBattery {
    pub fn new(periods: &[u32]) -> Self {
        Self {
            emas: periods.iter().map(|p| Ema::new(*p)).collect(),
        }
    }

    pub fn on_price(&mut self, price: f64) {
        for ema in &mut self.emas {
            ema.on_price(price);
        }
    }

    pub fn snapshots(&self) -> Vec<EmaSnapshot> {
        self.emas.iter().map(|e| e.snapshot()).collect()
    }

    /// Count of leading, strictly-monotonic steps across
    /// `[price, ema_shortest, ema_middle, ema_longest, ...]` in `direction`'s
    /// favor — used by the confluence scorer's EMA alignment/divergence
    /// factors. Stops at the first non-monotonic step.
    pub fn monotonic_count(&self, price: f64, ascending: bool) -> usize {
        let mut values: Vec<f64> = vec![price];
        values.extend(self.emas.iter().filter_map(|e| e.snapshot().value));
        if values.len() < self.emas.len() + 1 {
            return 0;
        }
        let mut count = 0;
        for w in values.windows(2) {
            let ok = if ascending { w[0] > w[1] } else { w[0] < w[1] };
            if ok {
                count += 1;
            } else {
                break;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warms_up_on_first_price() {
        let mut ema = Ema::new(9);
        ema.on_price(100.0);
        assert_eq!(ema.snapshot().value, Some(100.0));
    }

    #[test]
    fn smooths_subsequent_prices() {
        let mut ema = Ema::new(9);
        ema.on_price(100.0);
        ema.on_price(110.0);
        let alpha = 2.0 / 10.0;
        let expected = alpha * 110.0 + (1.0 - alpha) * 100.0;
        assert!((ema.snapshot().value.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn never_resets() {
        let mut ema = Ema::new(9);
        ema.on_price(100.0);
        let before = ema.snapshot().value;
        // No `reset()` method exists at all — EMA state simply persists.
        assert_eq!(ema.snapshot().value, before);
    }

    #[test]
    fn battery_tracks_three_periods_in_order() {
        let mut battery = EmaBattery::new(&[9, 21, 50]);
        battery.on_price(100.0);
        battery.on_price(105.0);
        let snaps = battery.snapshots();
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0].period, 9);
        assert_eq!(snaps[2].period, 50);
    }

    #[test]
    fn monotonic_count_bounded_by_ema_count() {
        let mut battery = EmaBattery::new(&[9, 21, 50]);
        for p in [90.0, 95.0, 100.0, 105.0, 110.0] {
            battery.on_price(p);
        }
        let count = battery.monotonic_count(115.0, true);
        assert!(count <= 3);
    }
}
