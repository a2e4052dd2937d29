// =============================================================================
// Engine Configuration — tunable thresholds with atomic save
// =============================================================================
//
// Every tunable named in the external interface lives here so the engine can
// be reconfigured without a rebuild.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_iceberg_min_orders() -> u32 {
    15
}
fn default_iceberg_size_base() -> i64 {
    20
}
fn default_spoof_max_age_ms() -> u64 {
    500
}
fn default_spoof_min_size() -> i64 {
    5
}
fn default_absorption_min_size() -> i64 {
    20
}
fn default_adaptive_window() -> usize {
    100
}
fn default_threshold_multiplier() -> f64 {
    3.0
}
fn default_confluence_threshold() -> i32 {
    40
}
fn default_per_price_cooldown_ms() -> u64 {
    2000
}
fn default_global_spacing_ms() -> u64 {
    200
}
fn default_ema_periods() -> Vec<u32> {
    vec![9, 21, 50]
}
fn default_atr_period() -> usize {
    14
}
fn default_value_area_fraction() -> f64 {
    0.70
}
fn default_dom_band_ticks() -> i64 {
    5
}
fn default_absorption_fill_window_ms() -> u64 {
    50
}

// =============================================================================
// ScoreWeights
// =============================================================================

/// Points awarded per confluence factor (see the weighted scorer table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "w_iceberg_base")]
    pub iceberg_base: i32,
    #[serde(default = "w_iceberg_size_mult_max")]
    pub iceberg_size_mult_max: i32,
    #[serde(default = "w_cvd_alignment")]
    pub cvd_alignment: i32,
    #[serde(default = "w_cvd_divergence")]
    pub cvd_divergence: i32,
    #[serde(default = "w_volume_profile")]
    pub volume_profile: i32,
    #[serde(default = "w_volume_imbalance")]
    pub volume_imbalance: i32,
    #[serde(default = "w_ema_alignment_3")]
    pub ema_alignment_3: i32,
    #[serde(default = "w_ema_alignment_2")]
    pub ema_alignment_2: i32,
    #[serde(default = "w_ema_alignment_1")]
    pub ema_alignment_1: i32,
    #[serde(default = "w_ema_divergence_0")]
    pub ema_divergence_0: i32,
    #[serde(default = "w_ema_divergence_1")]
    pub ema_divergence_1: i32,
    #[serde(default = "w_vwap_aligned")]
    pub vwap_aligned: i32,
    #[serde(default = "w_vwap_opposed")]
    pub vwap_opposed: i32,
    #[serde(default = "w_time_of_day_strong")]
    pub time_of_day_strong: i32,
    #[serde(default = "w_time_of_day_weak")]
    pub time_of_day_weak: i32,
    #[serde(default = "w_dom_support")]
    pub dom_support: i32,
    #[serde(default = "w_spoof_opposing")]
    pub spoof_opposing: i32,
}

fn w_iceberg_base() -> i32 {
    40
}
fn w_iceberg_size_mult_max() -> i32 {
    8
}
fn w_cvd_alignment() -> i32 {
    25
}
fn w_cvd_divergence() -> i32 {
    -30
}
fn w_volume_profile() -> i32 {
    20
}
fn w_volume_imbalance() -> i32 {
    10
}
fn w_ema_alignment_3() -> i32 {
    15
}
fn w_ema_alignment_2() -> i32 {
    10
}
fn w_ema_alignment_1() -> i32 {
    5
}
fn w_ema_divergence_0() -> i32 {
    -15
}
fn w_ema_divergence_1() -> i32 {
    -5
}
fn w_vwap_aligned() -> i32 {
    10
}
fn w_vwap_opposed() -> i32 {
    -10
}
fn w_time_of_day_strong() -> i32 {
    10
}
fn w_time_of_day_weak() -> i32 {
    5
}
fn w_dom_support() -> i32 {
    10
}
fn w_spoof_opposing() -> i32 {
    5
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            iceberg_base: w_iceberg_base(),
            iceberg_size_mult_max: w_iceberg_size_mult_max(),
            cvd_alignment: w_cvd_alignment(),
            cvd_divergence: w_cvd_divergence(),
            volume_profile: w_volume_profile(),
            volume_imbalance: w_volume_imbalance(),
            ema_alignment_3: w_ema_alignment_3(),
            ema_alignment_2: w_ema_alignment_2(),
            ema_alignment_1: w_ema_alignment_1(),
            ema_divergence_0: w_ema_divergence_0(),
            ema_divergence_1: w_ema_divergence_1(),
            vwap_aligned: w_vwap_aligned(),
            vwap_opposed: w_vwap_opposed(),
            time_of_day_strong: w_time_of_day_strong(),
            time_of_day_weak: w_time_of_day_weak(),
            dom_support: w_dom_support(),
            spoof_opposing: w_spoof_opposing(),
        }
    }
}

// =============================================================================
// PhaseSchedule
// =============================================================================

/// Wall-clock boundaries (minutes since local midnight) for the session/phase
/// state machine. Pluggable per §9's open question: an equities-style six-phase
/// day is the default, but near-24-hour futures venues supply their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSchedule {
    /// UTC offset in minutes of the instrument's reference timezone.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "p_pre_market_end")]
    pub pre_market_end_minute: u32,
    #[serde(default = "p_opening_range_end")]
    pub opening_range_end_minute: u32,
    #[serde(default = "p_lunch_start")]
    pub lunch_start_minute: u32,
    #[serde(default = "p_lunch_end")]
    pub lunch_end_minute: u32,
    #[serde(default = "p_close_start")]
    pub close_start_minute: u32,
    #[serde(default = "p_post_market_start")]
    pub post_market_start_minute: u32,
}

fn p_pre_market_end() -> u32 {
    9 * 60 + 30
} // 09:30
fn p_opening_range_end() -> u32 {
    10 * 60
} // 10:00 (09:30 + 30min)
fn p_lunch_start() -> u32 {
    12 * 60
} // 12:00
fn p_lunch_end() -> u32 {
    13 * 60
} // 13:00
fn p_close_start() -> u32 {
    15 * 60
} // 15:00 (last 60 min of a 16:00 close)
fn p_post_market_start() -> u32 {
    16 * 60
} // 16:00

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            pre_market_end_minute: p_pre_market_end(),
            opening_range_end_minute: p_opening_range_end(),
            lunch_start_minute: p_lunch_start(),
            lunch_end_minute: p_lunch_end(),
            close_start_minute: p_close_start(),
            post_market_start_minute: p_post_market_start(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level engine configuration.
///
/// Every field has a serde default so that older JSON config files missing
/// new fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_iceberg_min_orders")]
    pub iceberg_min_orders: u32,
    #[serde(default = "default_iceberg_size_base")]
    pub iceberg_size_base: i64,
    #[serde(default = "default_spoof_max_age_ms")]
    pub spoof_max_age_ms: u64,
    #[serde(default = "default_spoof_min_size")]
    pub spoof_min_size: i64,
    #[serde(default = "default_absorption_min_size")]
    pub absorption_min_size: i64,
    #[serde(default = "default_adaptive_window")]
    pub adaptive_window: usize,
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f64,
    #[serde(default = "default_confluence_threshold")]
    pub confluence_threshold: i32,
    #[serde(default = "default_per_price_cooldown_ms")]
    pub per_price_cooldown_ms: u64,
    #[serde(default = "default_global_spacing_ms")]
    pub global_spacing_ms: u64,
    #[serde(default = "default_ema_periods")]
    pub ema_periods: Vec<u32>,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_value_area_fraction")]
    pub value_area_fraction: f64,
    #[serde(default = "default_dom_band_ticks")]
    pub dom_band_ticks: i64,
    #[serde(default = "default_absorption_fill_window_ms")]
    pub absorption_fill_window_ms: u64,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub phase_schedule: PhaseSchedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iceberg_min_orders: default_iceberg_min_orders(),
            iceberg_size_base: default_iceberg_size_base(),
            spoof_max_age_ms: default_spoof_max_age_ms(),
            spoof_min_size: default_spoof_min_size(),
            absorption_min_size: default_absorption_min_size(),
            adaptive_window: default_adaptive_window(),
            threshold_multiplier: default_threshold_multiplier(),
            confluence_threshold: default_confluence_threshold(),
            per_price_cooldown_ms: default_per_price_cooldown_ms(),
            global_spacing_ms: default_global_spacing_ms(),
            ema_periods: default_ema_periods(),
            atr_period: default_atr_period(),
            value_area_fraction: default_value_area_fraction(),
            dom_band_ticks: default_dom_band_ticks(),
            absorption_fill_window_ms: default_absorption_fill_window_ms(),
            weights: ScoreWeights::default(),
            phase_schedule: PhaseSchedule::default(),
        }
    }
}

impl EngineConfig {
    /// Validate invariants that must hold before the router can be
    /// constructed. Configuration errors are the one class of fatal error in
    /// this engine (see the error-handling design); everything else reduces
    /// to a counted drop on the hot path.
    pub fn validate(&self) -> Result<()> {
        if self.ema_periods.is_empty() {
            bail!("ema_periods must not be empty");
        }
        if self.adaptive_window == 0 {
            bail!("adaptive_window must be > 0");
        }
        if self.value_area_fraction <= 0.0 || self.value_area_fraction > 1.0 {
            bail!("value_area_fraction must be in (0, 1]");
        }
        if self.atr_period == 0 {
            bail!("atr_period must be > 0");
        }
        let ps = &self.phase_schedule;
        if !(ps.pre_market_end_minute
            < ps.opening_range_end_minute
            && ps.opening_range_end_minute <= ps.lunch_start_minute
            && ps.lunch_start_minute < ps.lunch_end_minute
            && ps.lunch_end_minute <= ps.close_start_minute
            && ps.close_start_minute < ps.post_market_start_minute)
        {
            bail!("phase_schedule boundaries must be strictly increasing");
        }
        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config.validate()?;

        info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename) to prevent corruption on crash.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}
