// =============================================================================
// Signal & Signal Gate
// =============================================================================
//
// `Signal` is the immutable record created by the gate on admission — once
// built it is handed to the advisor adapter and plan tracker and never
// mutated again. The gate itself holds no market state: it is purely a
// dedup/cooldown/threshold admission filter over already-scored detections.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detectors::DetectionEvent;
use crate::indicators::IndicatorContext;
use crate::scorer::ScoreBreakdown;
use crate::session::Phase;
use crate::types::{Direction, Ticks, TimestampNs};

/// Opaque identity for a Signal, handed out by the gate in admission order.
/// Used by the advisor adapter to coalesce a response to its originating
/// signal, and by the plan tracker as the key of its append-only log.
pub type SignalId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub direction: Direction,
    pub trigger_price: Ticks,
    pub detection: DetectionEvent,
    pub score: i32,
    pub breakdown: ScoreBreakdown,
    pub context: IndicatorContext,
    pub phase: Phase,
    /// The adaptive threshold `T` in force at emission time.
    pub threshold_at_emission: i32,
    pub ts: TimestampNs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    BelowThreshold,
    Cooldown,
    GlobalSpacing,
}

pub struct SignalGate {
    threshold: i32,
    cooldown_ns: TimestampNs,
    global_spacing_ns: TimestampNs,
    last_emit_at_price: HashMap<Ticks, TimestampNs>,
    last_global_emit: Option<TimestampNs>,
    next_id: SignalId,
}

impl SignalGate {
    pub fn new(threshold: i32, cooldown_ms: u64, global_spacing_ms: u64) -> Self {
        Self {
            threshold,
            cooldown_ns: cooldown_ms as i64 * 1_000_000,
            global_spacing_ns: global_spacing_ms as i64 * 1_000_000,
            last_emit_at_price: HashMap::new(),
            last_global_emit: None,
            next_id: 0,
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Allow an external advisor `thresholdAdjustment` reply to retune the
    /// admission bar at runtime (see §6's outbound advisor contract).
    pub fn set_threshold(&mut self, threshold: i32) {
        self.threshold = threshold;
    }

    /// Evaluate admission for a scored detection. On success, returns the
    /// immutable `Signal` and records the emission for future cooldown
    /// checks. On rejection, returns the reason so the caller can increment
    /// the matching diagnostics counter.
    #[allow(clippy::too_many_arguments)]
    pub fn admit(
        &mut self,
        detection: DetectionEvent,
        direction: Direction,
        score: i32,
        breakdown: ScoreBreakdown,
        context: IndicatorContext,
        phase: Phase,
        ts: TimestampNs,
    ) -> Result<Signal, RejectionReason> {
        if score < self.threshold {
            return Err(RejectionReason::BelowThreshold);
        }

        let price = detection.price();
        if let Some(&last) = self.last_emit_at_price.get(&price) {
            if ts - last < self.cooldown_ns {
                return Err(RejectionReason::Cooldown);
            }
        }
        if let Some(last_global) = self.last_global_emit {
            if ts - last_global < self.global_spacing_ns {
                return Err(RejectionReason::GlobalSpacing);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.last_emit_at_price.insert(price, ts);
        self.last_global_emit = Some(ts);

        Ok(Signal {
            id,
            direction,
            trigger_price: price,
            detection,
            score,
            breakdown,
            context,
            phase,
            threshold_at_emission: self.threshold,
            ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::atr::AtrSnapshot;
    use crate::indicators::cvd::{CvdSnapshot, CvdTrend};
    use crate::indicators::dom::DomSnapshot;
    use crate::indicators::ema::EmaSnapshot;
    use crate::indicators::volume_profile::VolumeProfileSnapshot;
    use crate::indicators::vwap::VwapSnapshot;
    use crate::scorer::ScoreBreakdown;
    use crate::types::Side;

    fn detection(price: Ticks) -> DetectionEvent {
        DetectionEvent::Iceberg {
            side: Side::Bid,
            price,
            count: 20,
            size: 30,
        }
    }

    fn ctx() -> IndicatorContext {
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
    fn rejects_below_threshold() {
        let mut gate = SignalGate::new(50, 2000, 200);
        let err = gate
            .admit(
                detection(43200),
                Direction::Long,
                49,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                0,
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::BelowThreshold);
    }

    #[test]
    fn admits_at_or_above_threshold() {
        let mut gate = SignalGate::new(50, 2000, 200);
        let sig = gate
            .admit(
                detection(43200),
                Direction::Long,
                50,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                0,
            )
            .unwrap();
        assert_eq!(sig.id, 0);
        assert_eq!(sig.score, 50);
    }

    #[test]
    fn never_emits_two_signals_for_the_same_price_within_cooldown() {
        let mut gate = SignalGate::new(50, 2000, 0);
        gate.admit(
            detection(43200),
            Direction::Long,
            90,
            ScoreBreakdown::default(),
            ctx(),
            Phase::Morning,
            0,
        )
        .unwrap();
        let err = gate
            .admit(
                detection(43200),
                Direction::Long,
                90,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                1_500_000_000,
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::Cooldown);

        let sig = gate
            .admit(
                detection(43200),
                Direction::Long,
                90,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                2_000_000_001,
            )
            .unwrap();
        assert_eq!(sig.id, 1);
    }

    #[test]
    fn global_spacing_blocks_rapid_signals_at_different_prices() {
        let mut gate = SignalGate::new(50, 0, 200);
        gate.admit(
            detection(43200),
            Direction::Long,
            90,
            ScoreBreakdown::default(),
            ctx(),
            Phase::Morning,
            0,
        )
        .unwrap();
        let err = gate
            .admit(
                detection(43300),
                Direction::Long,
                90,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                100_000_000,
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::GlobalSpacing);
    }

    #[test]
    fn distinct_prices_do_not_share_cooldown() {
        let mut gate = SignalGate::new(50, 2000, 0);
        gate.admit(
            detection(43200),
            Direction::Long,
            90,
            ScoreBreakdown::default(),
            ctx(),
            Phase::Morning,
            0,
        )
        .unwrap();
        let sig = gate
            .admit(
                detection(43300),
                Direction::Long,
                90,
                ScoreBreakdown::default(),
                ctx(),
                Phase::Morning,
                1,
            )
            .unwrap();
        assert_eq!(sig.id, 1);
    }
}
