// =============================================================================
// Trade Plan & Position-Plan Tracker
// =============================================================================
//
// The core emits trade *plans*, never fills (see §1's non-goals). The
// tracker's append-only log is the only state in this crate that persists
// across signals; the advisor context bundler reads it by reference to
// surface recent plan/outcome history in the next bundle.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::signal::SignalId;
use crate::types::{Direction, Ticks, TimestampNs};

pub type PlanId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionType {
    Market,
    StopMarket,
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub id: PlanId,
    pub originating_signal: SignalId,
    pub direction: Direction,
    pub entry_tick: Ticks,
    pub stop_loss_tick: Ticks,
    pub take_profit_tick: Ticks,
    pub quantity: u32,
    pub execution_type: ExecutionType,
    pub trigger_tick: Option<Ticks>,
    pub reasoning: String,
    pub created_at: TimestampNs,
}

/// An outside collaborator's report of how a plan resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanResolution {
    Filled,
    Cancelled,
    HitStopLoss,
    HitTakeProfit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub resolution: PlanResolution,
    pub realized_ticks: Option<i64>,
    pub max_adverse_excursion_ticks: Option<i64>,
    pub resolved_at: TimestampNs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan: TradePlan,
    pub outcome: Option<PlanOutcome>,
}

/// One line of the persisted stream the tracker emits (§6's persisted state
/// layout). The core reads nothing back; this is write-only telemetry for
/// whatever collaborator indexes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub ts: TimestampNs,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<PlanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Ticks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PlanResolution>,
}

/// Append-only in-memory log of every plan the engine has emitted, keyed by
/// plan identity. The only core component that persists anything across
/// signals.
#[derive(Default)]
pub struct PlanTracker {
    records: HashMap<PlanId, PlanRecord>,
    order: Vec<PlanId>,
    next_id: PlanId,
    /// Lines ready to be drained by the host's persistence collaborator —
    /// append-only, never read back by the core itself.
    persisted: Vec<PersistedRecord>,
}

impl PlanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created plan and return the identity it was filed
    /// under.
    pub fn record_plan(&mut self, mut plan: TradePlan, ts: TimestampNs) -> PlanId {
        let id = self.next_id;
        self.next_id += 1;
        plan.id = id;

        self.persisted.push(PersistedRecord {
            ts,
            kind: "signal-decision",
            id: Some(id),
            direction: Some(plan.direction),
            price: Some(plan.entry_tick),
            score: None,
            decision: Some("TAKE".to_string()),
            confidence: None,
            reasoning: Some(plan.reasoning.clone()),
            outcome: None,
        });

        self.order.push(id);
        self.records.insert(
            id,
            PlanRecord {
                plan,
                outcome: None,
            },
        );
        id
    }

    /// Record an outcome reported by an outside plan-resolution collaborator.
    /// Unknown plan ids are dropped — the tracker never fabricates a plan it
    /// did not itself create.
    pub fn resolve_plan(
        &mut self,
        id: PlanId,
        resolution: PlanResolution,
        realized_ticks: Option<i64>,
        max_adverse_excursion_ticks: Option<i64>,
        ts: TimestampNs,
    ) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        record.outcome = Some(PlanOutcome {
            resolution,
            realized_ticks,
            max_adverse_excursion_ticks,
            resolved_at: ts,
        });
        self.persisted.push(PersistedRecord {
            ts,
            kind: "outcome",
            id: Some(id),
            direction: None,
            price: None,
            score: None,
            decision: None,
            confidence: None,
            reasoning: None,
            outcome: Some(resolution),
        });
        true
    }

    pub fn plan(&self, id: PlanId) -> Option<&PlanRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent `n` records in emission order, newest last — the slice the
    /// context bundler surfaces to the advisor as plan/outcome history.
    pub fn recent(&self, n: usize) -> Vec<&PlanRecord> {
        self.order
            .iter()
            .rev()
            .take(n)
            .rev()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Drain the lines accumulated since the last drain, for the host's
    /// persistence collaborator to append to its stream.
    pub fn drain_persisted(&mut self) -> Vec<PersistedRecord> {
        std::mem::take(&mut self.persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(direction: Direction) -> TradePlan {
        TradePlan {
            id: 0,
            originating_signal: 1,
            direction,
            entry_tick: 43200,
            stop_loss_tick: 43190,
            take_profit_tick: 43220,
            quantity: 1,
            execution_type: ExecutionType::Market,
            trigger_tick: None,
            reasoning: "iceberg confluence".to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn records_plan_and_assigns_sequential_ids() {
        let mut tracker = PlanTracker::new();
        let a = tracker.record_plan(plan(Direction::Long), 0);
        let b = tracker.record_plan(plan(Direction::Short), 1);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn resolve_unknown_plan_returns_false() {
        let mut tracker = PlanTracker::new();
        assert!(!tracker.resolve_plan(999, PlanResolution::Filled, None, None, 0));
    }

    #[test]
    fn resolve_known_plan_records_outcome() {
        let mut tracker = PlanTracker::new();
        let id = tracker.record_plan(plan(Direction::Long), 0);
        assert!(tracker.resolve_plan(id, PlanResolution::HitTakeProfit, Some(20), Some(-3), 10));
        let record = tracker.plan(id).unwrap();
        assert_eq!(
            record.outcome.as_ref().unwrap().resolution,
            PlanResolution::HitTakeProfit
        );
    }

    #[test]
    fn recent_returns_newest_last_bounded_by_n() {
        let mut tracker = PlanTracker::new();
        for i in 0..5u32 {
            let mut p = plan(Direction::Long);
            p.quantity = i;
            tracker.record_plan(p, i as i64);
        }
        let recent = tracker.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].plan.quantity, 4);
        assert_eq!(recent[0].plan.quantity, 3);
    }

    #[test]
    fn drain_persisted_empties_the_buffer() {
        let mut tracker = PlanTracker::new();
        tracker.record_plan(plan(Direction::Long), 0);
        let lines = tracker.drain_persisted();
        assert_eq!(lines.len(), 1);
        assert!(tracker.drain_persisted().is_empty());
    }
}
