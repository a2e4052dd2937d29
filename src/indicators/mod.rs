// =============================================================================
// Indicators Module
// =============================================================================
//
// Incremental, event-driven implementations of the battery of indicators that
// share one trade/depth/BBO stream: CVD, VWAP, a battery of EMAs, Volume
// Profile, ATR, and the DOM analyzer. Every indicator exposes a read-only
// snapshot and never calls another indicator directly — `IndicatorSuite`
// alone knows the fixed leaf order they are driven in.

pub mod atr;
pub mod cvd;
pub mod dom;
pub mod ema;
pub mod vwap;
pub mod volume_profile;

use serde::{Deserialize, Serialize};

use crate::types::{Side, Ticks};

use atr::{Atr, AtrSnapshot};
use cvd::{Cvd, CvdSnapshot};
use dom::{DomAnalyzer, DomSnapshot};
use ema::{EmaBattery, EmaSnapshot};
use volume_profile::{VolumeProfile, VolumeProfileSnapshot};
use vwap::{Vwap, VwapSnapshot};

/// A point-in-time read of every indicator, taken after the triggering event
/// was fully absorbed. Taken by copy, not by streaming, so it can outlive the
/// event loop without entangling lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorContext {
    pub cvd: CvdSnapshot,
    pub vwap: VwapSnapshot,
    pub emas: Vec<EmaSnapshot>,
    pub volume_profile: VolumeProfileSnapshot,
    pub atr: AtrSnapshot,
    pub dom: DomSnapshot,
}

/// Owns every indicator and drives them in the fixed leaf order required by
/// the router: CVD -> VWAP -> EMAs -> VolumeProfile -> ATR -> DOMAnalyzer.
pub struct IndicatorSuite {
    cvd: Cvd,
    vwap: Vwap,
    emas: EmaBattery,
    volume_profile: VolumeProfile,
    atr: Atr,
    dom: DomAnalyzer,
    value_area_fraction: f64,
    dom_band_ticks: Ticks,
}

impl IndicatorSuite {
    pub fn new(ema_periods: &[u32], atr_period: usize, value_area_fraction: f64, dom_band_ticks: Ticks) -> Self {
        Self {
            cvd: Cvd::new(),
            vwap: Vwap::new(),
            emas: EmaBattery::new(ema_periods),
            volume_profile: VolumeProfile::new(),
            atr: Atr::new(atr_period),
            dom: DomAnalyzer::new(),
            value_area_fraction,
            dom_band_ticks,
        }
    }

    /// Feed a trade through the leaf-ordered chain: CVD, VWAP, EMAs, Volume
    /// Profile, ATR. DOM is depth/BBO-driven only and is untouched here.
    pub fn on_trade(&mut self, price: Ticks, size: i64, aggressor: Side) {
        self.cvd.on_trade(size, aggressor);
        self.vwap.on_trade(price, size);
        self.emas.on_price(price as f64);
        self.volume_profile.on_trade(price, size, aggressor);
        self.atr.on_price(price as f64);
    }

    pub fn on_depth(&mut self, side: Side, price: Ticks, aggregated_size: i64) {
        self.dom.on_depth(side, price, aggregated_size);
    }

    pub fn on_bbo(&mut self, best_bid: Ticks, best_ask: Ticks) {
        self.dom.on_bbo(best_bid, best_ask);
    }

    /// Reset every session-scoped indicator. EMA is deliberately excluded —
    /// it never resets (see `ema::Ema`); DOM is deliberately excluded — it is
    /// continuous, driven only by the latest depth/BBO state.
    pub fn reset_session(&mut self) {
        self.cvd.reset();
        self.vwap.reset();
        self.volume_profile.reset();
        self.atr.reset();
    }

    pub fn context(&self, current_price: Ticks) -> IndicatorContext {
        IndicatorContext {
            cvd: self.cvd.snapshot(),
            vwap: self.vwap.snapshot(current_price),
            emas: self.emas.snapshots(),
            volume_profile: self.volume_profile.snapshot(self.value_area_fraction),
            atr: self.atr.snapshot(),
            dom: self.dom.snapshot(self.dom_band_ticks),
        }
    }

    pub fn emas(&self) -> &EmaBattery {
        &self.emas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_reset_zeroes_cvd_vwap_profile_atr_but_not_ema() {
        let mut suite = IndicatorSuite::new(&[9, 21, 50], 14, 0.7, 5);
        for i in 0..20 {
            suite.on_trade(100 + i, 10, Side::Bid);
        }
        let before_ema = suite.context(110).emas.clone();

        suite.reset_session();
        let ctx = suite.context(110);

        assert_eq!(ctx.cvd.value, 0);
        assert!(ctx.vwap.value.is_none());
        assert!(ctx.volume_profile.poc.is_none());
        assert_eq!(ctx.emas, before_ema);
    }

    #[test]
    fn fixed_leaf_order_all_update_from_one_trade() {
        let mut suite = IndicatorSuite::new(&[9], 3, 0.7, 5);
        suite.on_trade(100, 5, Side::Bid);
        let ctx = suite.context(100);
        assert_eq!(ctx.cvd.value, 5);
        assert!(ctx.vwap.value.is_some());
        assert!(ctx.emas[0].value.is_some());
        assert!(ctx.volume_profile.poc.is_some());
    }
}
