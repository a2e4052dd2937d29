// =============================================================================
// Instrument Context
// =============================================================================
//
// An immutable description of the instrument a single EventRouter tracks.
// All price fields elsewhere in the engine are integer tick counts relative
// to this scale; nothing downstream ever sees a raw decimal price.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Immutable per-instrument scale. Constructed once and shared by reference
/// (or by copy — it is small and `Copy`-friendly) across the router,
/// indicators, and detectors for the lifetime of that instrument's loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentContext {
    pub symbol: String,
    /// Minimum price increment, e.g. 0.25 for CME ES-style futures.
    pub tick_size: f64,
    /// Contract multiplier (dollar value per tick per contract is
    /// `tick_size * contract_multiplier`).
    pub contract_multiplier: f64,
}

impl InstrumentContext {
    pub fn new(symbol: impl Into<String>, tick_size: f64, contract_multiplier: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            contract_multiplier,
        }
    }

    /// Convert a tick-integer price to its decimal representation.
    pub fn ticks_to_price(&self, ticks: i64) -> f64 {
        ticks as f64 * self.tick_size
    }

    /// Convert a decimal price to the nearest tick-integer, rounding to the
    /// instrument's grid.
    pub fn price_to_ticks(&self, price: f64) -> i64 {
        (price / self.tick_size).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_on_grid() {
        let ctx = InstrumentContext::new("ES", 0.25, 50.0);
        assert_eq!(ctx.price_to_ticks(4320.00), 17280);
        assert!((ctx.ticks_to_price(17280) - 4320.00).abs() < 1e-9);
    }

    #[test]
    fn rounds_off_grid_prices() {
        let ctx = InstrumentContext::new("ES", 0.25, 50.0);
        assert_eq!(ctx.price_to_ticks(4320.10), 17280);
        assert_eq!(ctx.price_to_ticks(4320.20), 17281);
    }
}
