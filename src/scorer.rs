// =============================================================================
// Confluence Scorer
// =============================================================================
//
// A pure function of (DetectionEvent, indicator snapshot, time-of-day, DOM
// snapshot) -> (score, breakdown). All factors are additive; weights are
// configuration. The internal sum is allowed to range [-60, 135] before the
// final clamp to [0, 135] — the clamp delta is recorded as its own breakdown
// entry so breakdown values always sum exactly to the final score.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::config::ScoreWeights;
use crate::detectors::DetectionEvent;
use crate::indicators::cvd::CvdTrend;
use crate::indicators::vwap::VwapClassification;
use crate::indicators::IndicatorContext;
use crate::session::Phase;
use crate::types::Direction;

const RAW_FLOOR: i32 = -60;
const RAW_CEIL: i32 = 135;
const FINAL_FLOOR: i32 = 0;
const FINAL_CEIL: i32 = 135;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub iceberg_base: i32,
    pub iceberg_size_mult: i32,
    pub cvd_alignment: i32,
    pub volume_profile: i32,
    pub volume_imbalance: i32,
    pub ema_alignment: i32,
    pub vwap_alignment: i32,
    pub time_of_day: i32,
    pub dom_support_resistance: i32,
    pub spoof_penalty: i32,
    /// Delta applied by the final clamp to [0, 135]; kept so the named
    /// fields plus this entry sum exactly to `total`.
    pub clamp_adjustment: i32,
    pub total: i32,
}

impl ScoreBreakdown {
    fn raw_sum(&self) -> i32 {
        self.iceberg_base
            + self.iceberg_size_mult
            + self.cvd_alignment
            + self.volume_profile
            + self.volume_imbalance
            + self.ema_alignment
            + self.vwap_alignment
            + self.time_of_day
            + self.dom_support_resistance
            + self.spoof_penalty
    }
}

/// log2-bucketed size multiplier, capped at `weights.iceberg_size_mult_max`.
fn iceberg_size_bucket(size: i64, base: i64, max: i32) -> i32 {
    if size <= base || base <= 0 {
        return 0;
    }
    let ratio = size as f64 / base as f64;
    (ratio.log2().floor() as i32).clamp(0, max)
}

fn ema_alignment_points(count: usize, weights: &ScoreWeights) -> i32 {
    match count {
        3 => weights.ema_alignment_3,
        2 => weights.ema_alignment_2,
        1 => weights.ema_alignment_1,
        _ => 0,
    }
}

fn ema_divergence_points(count: usize, weights: &ScoreWeights) -> i32 {
    match count {
        0 => weights.ema_divergence_0,
        1 => weights.ema_divergence_1,
        _ => 0,
    }
}

/// Score one admitted detection against the indicator context captured right
/// after the triggering event. Recent spoof/absorption context for the
/// "spoof on opposing side within 1s" factor is passed explicitly since the
/// scorer itself holds no state.
pub struct ScorerInputs<'a> {
    pub detection: &'a DetectionEvent,
    pub direction: Direction,
    pub context: &'a IndicatorContext,
    pub phase: Phase,
    pub recent_opposing_spoof: bool,
    pub ema_ascending_count: usize,
    pub ema_descending_count: usize,
    pub dom_band_ticks: i64,
}

pub fn score(inputs: &ScorerInputs, weights: &ScoreWeights) -> ScoreBreakdown {
    let mut b = ScoreBreakdown::default();
    let dir_sign = inputs.direction.sign();

    match inputs.detection {
        DetectionEvent::Iceberg { size, .. } => {
            b.iceberg_base = weights.iceberg_base;
            b.iceberg_size_mult =
                iceberg_size_bucket(*size, 20, weights.iceberg_size_mult_max);
        }
        DetectionEvent::Absorption {
            traded_size,
            passive_size,
            ..
        } => {
            b.iceberg_base = weights.iceberg_base;
            b.iceberg_size_mult =
                iceberg_size_bucket(*traded_size + *passive_size, 20, weights.iceberg_size_mult_max);
        }
        DetectionEvent::Spoof { .. } => {
            // Spoof on its own is never the triggering detection for scoring
            // admission per the component design; it only contributes the
            // opposing-side penalty factor below.
        }
    }

    let cvd_sign = match inputs.context.cvd.trend {
        CvdTrend::Bullish => 1,
        CvdTrend::Bearish => -1,
        CvdTrend::Neutral => 0,
    };
    if cvd_sign != 0 {
        if cvd_sign as i64 == dir_sign {
            b.cvd_alignment = weights.cvd_alignment;
        } else {
            b.cvd_alignment = weights.cvd_divergence;
        }
    }

    if let (Some(val), Some(lo), Some(hi)) = (
        inputs.context.volume_profile.poc,
        inputs.context.volume_profile.value_area_low,
        inputs.context.volume_profile.value_area_high,
    ) {
        let _ = val;
        let price = inputs.detection.price();
        let in_area = price >= lo && price <= hi;
        let consistent = match inputs.direction {
            Direction::Long => price >= lo,
            Direction::Short => price <= hi,
        };
        if in_area && consistent {
            b.volume_profile = weights.volume_profile;
        }
    }

    if let Some(imbalance) = inputs.context.dom.imbalance {
        let favors_long = imbalance >= 2.0;
        let favors_short = imbalance <= 0.5;
        if (inputs.direction == Direction::Long && favors_long)
            || (inputs.direction == Direction::Short && favors_short)
        {
            b.volume_imbalance = weights.volume_imbalance;
        }
    }

    let ascending = inputs.direction == Direction::Long;
    let monotonic_count = if ascending {
        inputs.ema_ascending_count
    } else {
        inputs.ema_descending_count
    };
    b.ema_alignment = ema_alignment_points(monotonic_count, weights);
    let divergence = ema_divergence_points(monotonic_count, weights);
    if divergence != 0 {
        b.ema_alignment = divergence;
    }

    if let Some(classification) = inputs.context.vwap.classification {
        let aligned = match (inputs.direction, classification) {
            (Direction::Long, VwapClassification::Above) => true,
            (Direction::Short, VwapClassification::Below) => true,
            (_, VwapClassification::Near) => false,
            _ => false,
        };
        let opposed = match (inputs.direction, classification) {
            (Direction::Long, VwapClassification::Below) => true,
            (Direction::Short, VwapClassification::Above) => true,
            _ => false,
        };
        if aligned {
            b.vwap_alignment = weights.vwap_aligned;
        } else if opposed {
            b.vwap_alignment = weights.vwap_opposed;
        }
    }

    b.time_of_day = match inputs.phase {
        Phase::Morning | Phase::Afternoon => weights.time_of_day_strong,
        Phase::OpeningRange | Phase::Close => weights.time_of_day_weak,
        _ => 0,
    };

    if let (Some(support), Some(resistance)) =
        (inputs.context.dom.support, inputs.context.dom.resistance)
    {
        let price = inputs.detection.price();
        let near_support = inputs.direction == Direction::Long
            && (price - support).abs() <= inputs.dom_band_ticks;
        let near_resistance = inputs.direction == Direction::Short
            && (price - resistance).abs() <= inputs.dom_band_ticks;
        if near_support || near_resistance {
            b.dom_support_resistance = weights.dom_support;
        }
    }

    if inputs.recent_opposing_spoof {
        b.spoof_penalty = weights.spoof_opposing;
    }

    let raw = b.raw_sum().clamp(RAW_FLOOR, RAW_CEIL);
    let final_score = raw.clamp(FINAL_FLOOR, FINAL_CEIL);
    b.clamp_adjustment = final_score - b.raw_sum();
    b.total = final_score;
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::atr::AtrSnapshot;
    use crate::indicators::cvd::CvdSnapshot;
    use crate::indicators::dom::DomSnapshot;
    use crate::indicators::ema::EmaSnapshot;
    use crate::indicators::volume_profile::VolumeProfileSnapshot;
    use crate::indicators::vwap::VwapSnapshot;
    use crate::types::Side;

    fn empty_context() -> IndicatorContext {
        IndicatorContext {
            cvd: CvdSnapshot {
                value: 0,
                trend: CvdTrend::Neutral,
            },
            vwap: VwapSnapshot {
                value: None,
                classification: None,
                distance_ticks: None,
            },
            emas: vec![EmaSnapshot {
                period: 9,
                value: None,
            }],
            volume_profile: VolumeProfileSnapshot {
                poc: None,
                value_area_low: None,
                value_area_high: None,
            },
            atr: AtrSnapshot { value: None },
            dom: DomSnapshot {
                support: None,
                resistance: None,
                imbalance: None,
            },
        }
    }

    #[test]
    fn score_is_always_within_final_range() {
        let weights = ScoreWeights::default();
        let detection = DetectionEvent::Iceberg {
            side: Side::Bid,
            price: 43200,
            count: 20,
            size: 60,
        };
        let inputs = ScorerInputs {
            detection: &detection,
            direction: Direction::Long,
            context: &empty_context(),
            phase: Phase::Morning,
            recent_opposing_spoof: false,
            ema_ascending_count: 0,
            ema_descending_count: 0,
            dom_band_ticks: 5,
        };
        let b = score(&inputs, &weights);
        assert!(b.total >= FINAL_FLOOR && b.total <= FINAL_CEIL);
    }

    #[test]
    fn breakdown_fields_sum_to_total() {
        let weights = ScoreWeights::default();
        let detection = DetectionEvent::Iceberg {
            side: Side::Bid,
            price: 43200,
            count: 20,
            size: 60,
        };
        let mut ctx = empty_context();
        ctx.cvd.trend = CvdTrend::Bearish; // divergence vs LONG
        let inputs = ScorerInputs {
            detection: &detection,
            direction: Direction::Long,
            context: &ctx,
            phase: Phase::Morning,
            recent_opposing_spoof: false,
            ema_ascending_count: 0,
            ema_descending_count: 0,
            dom_band_ticks: 5,
        };
        let b = score(&inputs, &weights);
        assert_eq!(b.raw_sum() + b.clamp_adjustment, b.total);
    }

    #[test]
    fn counter_trend_iceberg_scores_low() {
        let weights = ScoreWeights::default();
        let detection = DetectionEvent::Iceberg {
            side: Side::Ask,
            price: 43200,
            count: 20,
            size: 25,
        };
        let mut ctx = empty_context();
        ctx.cvd.trend = CvdTrend::Bullish; // strongly positive CVD vs SHORT direction
        ctx.vwap.classification = Some(VwapClassification::Above);
        let inputs = ScorerInputs {
            detection: &detection,
            direction: Direction::Short,
            context: &ctx,
            phase: Phase::Morning,
            recent_opposing_spoof: false,
            ema_ascending_count: 0,
            ema_descending_count: 0,
            dom_band_ticks: 5,
        };
        let b = score(&inputs, &weights);
        assert!(b.total < weights.iceberg_base, "expected counter-trend penalty to pull score down, got {}", b.total);
    }

    #[test]
    fn cvd_alignment_awards_points_when_trend_matches_direction() {
        let weights = ScoreWeights::default();
        let detection = DetectionEvent::Iceberg {
            side: Side::Bid,
            price: 43200,
            count: 20,
            size: 25,
        };
        let mut ctx = empty_context();
        ctx.cvd.trend = CvdTrend::Bullish;
        let inputs = ScorerInputs {
            detection: &detection,
            direction: Direction::Long,
            context: &ctx,
            phase: Phase::PreMarket,
            recent_opposing_spoof: false,
            ema_ascending_count: 0,
            ema_descending_count: 0,
            dom_band_ticks: 5,
        };
        let b = score(&inputs, &weights);
        assert_eq!(b.cvd_alignment, weights.cvd_alignment);
    }

    #[test]
    fn iceberg_size_bucket_is_monotonic_and_capped() {
        assert_eq!(iceberg_size_bucket(10, 20, 8), 0);
        let b1 = iceberg_size_bucket(40, 20, 8);
        let b2 = iceberg_size_bucket(400, 20, 8);
        assert!(b2 >= b1);
        assert!(b2 <= 8);
    }
}
