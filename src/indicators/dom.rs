// =============================================================================
// DOM Analyzer — depth-derived support/resistance and imbalance
// =============================================================================
//
// Maintains the last known aggregated size at each (side, price) from depth
// snapshots, plus the current BBO. Support/resistance and imbalance are
// computed over a band of `dom_band_ticks` around the best bid/ask. This
// indicator never resets at a session boundary — depth state is always
// "current," unlike the trade-derived session-scoped indicators.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Side, Ticks};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub support: Option<Ticks>,
    pub resistance: Option<Ticks>,
    /// sum(bid size) / sum(ask size) within the band; `None` if the ask side
    /// of the band is empty.
    pub imbalance: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DomAnalyzer {
    bids: BTreeMap<Ticks, i64>,
    asks: BTreeMap<Ticks, i64>,
    best_bid: Option<Ticks>,
    best_ask: Option<Ticks>,
}

impl DomAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_depth(&mut self, side: Side, price: Ticks, aggregated_size: i64) {
        let book = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if aggregated_size <= 0 {
            book.remove(&price);
        } else {
            book.insert(price, aggregated_size);
        }
    }

    pub fn on_bbo(&mut self, best_bid: Ticks, best_ask: Ticks) {
        self.best_bid = Some(best_bid);
        self.best_ask = Some(best_ask);
    }

    pub fn snapshot(&self, band_ticks: Ticks) -> DomSnapshot {
        let (support, band_bid_sum) = match self.best_bid {
            Some(bb) => {
                let lo = bb - band_ticks;
                let band: Vec<(&Ticks, &i64)> =
                    self.bids.range(lo..=bb).collect();
                let support = band
                    .iter()
                    .max_by_key(|(_, size)| **size)
                    .map(|(price, _)| **price);
                let sum: i64 = band.iter().map(|(_, s)| **s).sum();
                (support, sum)
            }
            None => (None, 0),
        };

        let (resistance, band_ask_sum) = match self.best_ask {
            Some(ba) => {
                let hi = ba + band_ticks;
                let band: Vec<(&Ticks, &i64)> =
                    self.asks.range(ba..=hi).collect();
                let resistance = band
                    .iter()
                    .max_by_key(|(_, size)| **size)
                    .map(|(price, _)| **price);
                let sum: i64 = band.iter().map(|(_, s)| **s).sum();
                (resistance, sum)
            }
            None => (None, 0),
        };

        let imbalance = if band_ask_sum > 0 {
            Some(band_bid_sum as f64 / band_ask_sum as f64)
        } else {
            None
        };

        DomSnapshot {
            support,
            resistance,
            imbalance,
        }
    }
}
