// =============================================================================
// CVD — Cumulative Volume Delta
// =============================================================================
//
// Signed running sum of trade sizes (+ for bid-side aggressor, − for ask-side
// aggressor), plus a short rolling history used to classify trend.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Side;

const TREND_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CvdTrend {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CvdSnapshot {
    pub value: i64,
    pub trend: CvdTrend,
}

#[derive(Debug, Clone)]
pub struct Cvd {
    running: i64,
    recent: VecDeque<i64>,
}

impl Cvd {
    pub fn new() -> Self {
        Self {
            running: 0,
            recent: VecDeque::with_capacity(TREND_WINDOW),
        }
    }

    /// Sign a trade by its aggressor: a bid-side aggressor lifts the offer
    /// (buying pressure, +size); an ask-side aggressor hits the bid (selling
    /// pressure, −size).
    pub fn on_trade(&mut self, size: i64, aggressor: Side) {
        let signed = match aggressor {
            Side::Bid => size,
            Side::Ask => -size,
        };
        self.running += signed;
        if self.recent.len() == TREND_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(signed);
    }

    pub fn reset(&mut self) {
        self.running = 0;
        self.recent.clear();
    }

    pub fn snapshot(&self) -> CvdSnapshot {
        let slope: i64 = self.recent.iter().sum();
        let trend = if slope > 0 {
            CvdTrend::Bullish
        } else if slope < 0 {
            CvdTrend::Bearish
        } else {
            CvdTrend::Neutral
        };
        CvdSnapshot {
            value: self.running,
            trend,
        }
    }
}

impl Default for Cvd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_by_aggressor() {
        let mut cvd = Cvd::new();
        cvd.on_trade(10, Side::Bid);
        cvd.on_trade(4, Side::Ask);
        assert_eq!(cvd.snapshot().value, 6);
    }

    #[test]
    fn equals_sum_of_signed_trades() {
        let mut cvd = Cvd::new();
        let trades = [(5, Side::Bid), (3, Side::Ask), (7, Side::Bid), (2, Side::Ask)];
        let mut expected = 0i64;
        for (size, side) in trades {
            cvd.on_trade(size, side);
            expected += match side {
                Side::Bid => size,
                Side::Ask => -size,
            };
        }
        assert_eq!(cvd.snapshot().value, expected);
    }

    #[test]
    fn trend_bullish_when_recent_buying_dominates() {
        let mut cvd = Cvd::new();
        for _ in 0..10 {
            cvd.on_trade(5, Side::Bid);
        }
        assert_eq!(cvd.snapshot().trend, CvdTrend::Bullish);
    }

    #[test]
    fn trend_bearish_when_recent_selling_dominates() {
        let mut cvd = Cvd::new();
        for _ in 0..10 {
            cvd.on_trade(5, Side::Ask);
        }
        assert_eq!(cvd.snapshot().trend, CvdTrend::Bearish);
    }

    #[test]
    fn reset_zeroes_state() {
        let mut cvd = Cvd::new();
        cvd.on_trade(10, Side::Bid);
        cvd.reset();
        assert_eq!(cvd.snapshot().value, 0);
        assert_eq!(cvd.snapshot().trend, CvdTrend::Neutral);
    }

    #[test]
    fn trend_window_is_bounded() {
        let mut cvd = Cvd::new();
        for _ in 0..30 {
            cvd.on_trade(1, Side::Bid);
        }
        assert_eq!(cvd.recent.len(), TREND_WINDOW);
    }
}
