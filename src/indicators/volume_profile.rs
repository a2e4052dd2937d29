// =============================================================================
// Volume Profile — price -> (total, buy, sell), POC, and value area
// =============================================================================
//
// POC (point of control) is the price with the greatest traded volume.
// Value area is the smallest contiguous price band containing at least
// `value_area_fraction` of total session volume, grown outward from POC
// alternately to whichever neighbor has more volume; ties break to the
// lower price (the source doesn't specify a tie-break — this crate picks
// one canonically and documents it).
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Side, Ticks};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceVolume {
    pub total: i64,
    pub buy: i64,
    pub sell: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeProfileSnapshot {
    pub poc: Option<Ticks>,
    pub value_area_low: Option<Ticks>,
    pub value_area_high: Option<Ticks>,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeProfile {
    by_price: BTreeMap<Ticks, PriceVolume>,
}

impl VolumeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_trade(&mut self, price: Ticks, size: i64, aggressor: Side) {
        let entry = self.by_price.entry(price).or_default();
        entry.total += size;
        match aggressor {
            Side::Bid => entry.buy += size,
            Side::Ask => entry.sell += size,
        }
    }

    pub fn reset(&mut self) {
        self.by_price.clear();
    }

    pub fn at(&self, price: Ticks) -> Option<PriceVolume> {
        self.by_price.get(&price).copied()
    }

    fn poc(&self) -> Option<Ticks> {
        // BTreeMap iterates in ascending price order; keep the first (lowest
        // price) entry seen at the running-max volume so ties favor it.
        let mut best: Option<(Ticks, i64)> = None;
        for (price, pv) in &self.by_price {
            match best {
                Some((_, total)) if pv.total <= total => {}
                _ => best = Some((*price, pv.total)),
            }
        }
        best.map(|(price, _)| price)
    }

    pub fn snapshot(&self, value_area_fraction: f64) -> VolumeProfileSnapshot {
        let poc = match self.poc() {
            Some(p) => p,
            None => {
                return VolumeProfileSnapshot {
                    poc: None,
                    value_area_low: None,
                    value_area_high: None,
                }
            }
        };

        let total_volume: i64 = self.by_price.values().map(|v| v.total).sum();
        let target = (total_volume as f64 * value_area_fraction).ceil() as i64;

        let prices: Vec<Ticks> = self.by_price.keys().copied().collect();
        let poc_idx = prices.iter().position(|p| *p == poc).unwrap();

        let mut lo = poc_idx;
        let mut hi = poc_idx;
        let mut covered = self.by_price[&poc].total;

        while covered < target && (lo > 0 || hi + 1 < prices.len()) {
            let below = if lo > 0 {
                Some(self.by_price[&prices[lo - 1]].total)
            } else {
                None
            };
            let above = if hi + 1 < prices.len() {
                Some(self.by_price[&prices[hi + 1]].total)
            } else {
                None
            };

            match (below, above) {
                (Some(b), Some(a)) => {
                    if b >= a {
                        // tie -> lower price side grows first
                        lo -= 1;
                        covered += b;
                    } else {
                        hi += 1;
                        covered += a;
                    }
                }
                (Some(b), None) => {
                    lo -= 1;
                    covered += b;
                }
                (None, Some(a)) => {
                    hi += 1;
                    covered += a;
                }
                (None, None) => break,
            }
        }

        VolumeProfileSnapshot {
            poc: Some(poc),
            value_area_low: Some(prices[lo]),
            value_area_high: Some(prices[hi]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_has_no_poc() {
        let vp = VolumeProfile::new();
        let snap = vp.snapshot(0.7);
        assert!(snap.poc.is_none());
    }

    #[test]
    fn poc_is_price_with_greatest_volume() {
        let mut vp = VolumeProfile::new();
        vp.on_trade(100, 5, Side::Bid);
        vp.on_trade(101, 20, Side::Bid);
        vp.on_trade(102, 3, Side::Ask);
        assert_eq!(vp.snapshot(0.7).poc, Some(101));
    }

    #[test]
    fn poc_tie_breaks_to_lower_price() {
        let mut vp = VolumeProfile::new();
        vp.on_trade(100, 10, Side::Bid);
        vp.on_trade(105, 10, Side::Bid);
        assert_eq!(vp.snapshot(0.7).poc, Some(100));
    }

    #[test]
    fn value_area_grows_outward_from_poc() {
        let mut vp = VolumeProfile::new();
        vp.on_trade(100, 5, Side::Bid);
        vp.on_trade(101, 50, Side::Bid);
        vp.on_trade(102, 5, Side::Bid);
        let snap = vp.snapshot(0.7);
        assert_eq!(snap.poc, Some(101));
        assert!(snap.value_area_low.unwrap() <= 101);
        assert!(snap.value_area_high.unwrap() >= 101);
    }

    #[test]
    fn buy_and_sell_volume_tracked_separately() {
        let mut vp = VolumeProfile::new();
        vp.on_trade(100, 5, Side::Bid);
        vp.on_trade(100, 3, Side::Ask);
        let pv = vp.at(100).unwrap();
        assert_eq!(pv.total, 8);
        assert_eq!(pv.buy, 5);
        assert_eq!(pv.sell, 3);
    }

    #[test]
    fn reset_clears_map() {
        let mut vp = VolumeProfile::new();
        vp.on_trade(100, 5, Side::Bid);
        vp.reset();
        assert!(vp.at(100).is_none());
        assert!(vp.snapshot(0.7).poc.is_none());
    }
}
