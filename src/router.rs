// =============================================================================
// Event Router & Market State
// =============================================================================
//
// Sole entry points into the engine. Each one updates market state, then
// invokes indicators in the fixed leaf order (CVD -> VWAP -> EMAs -> Volume
// Profile -> ATR -> DOM), then pattern detectors, then the confluence scorer
// if a detector fired, then the signal gate. The event is fully absorbed
// before the next arrives — the host is expected to drive one instrument per
// `EventRouter` from a single thread; multi-instrument fan-out is one router
// per instrument, no shared mutable state (§5).
//
// Malformed events (negative size, unknown order id) are counted and
// dropped, never fatal — see `Diagnostics`. The only asynchronous boundary
// is the advisor adapter: a call is fired and forgotten into a background
// task, and its reply is drained from an inbox at the top of the next event
// entry, so it never reorders with market events (§5).
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::advisor::{self, AdvisorClient, AdvisorDecision, ContextBundle, LatencyRing};
use crate::config::EngineConfig;
use crate::detectors::{absorption::AbsorptionDetector, iceberg::IcebergDetector, spoof::SpoofDetector, DetectionEvent};
use crate::diagnostics::Diagnostics;
use crate::handle::EngineHandle;
use crate::indicators::IndicatorSuite;
use crate::instrument::InstrumentContext;
use crate::memory::{MemoryClient, MemoryKind, NullMemoryClient};
use crate::plan::{PlanResolution, PlanTracker};
use crate::registry::{CancelOutcome, MboRegistry, ReplaceResult};
use crate::scorer::{self, ScorerInputs};
use crate::session::{Phase, SessionMachine};
use crate::signal::{RejectionReason, Signal, SignalGate};
use crate::types::{Direction, OrderId, Side, Ticks, TimestampNs};

type LevelKey = (Side, Ticks);

const OPPOSING_SPOOF_WINDOW_NS: TimestampNs = 1_000_000_000;
const MAX_INFLIGHT_ADVISOR_CALLS: usize = 2;

/// Holds everything needed to fire an advisor call from a background task
/// without borrowing the router across an `.await`.
struct AdvisorRuntime {
    client: Arc<dyn AdvisorClient>,
    memory: Arc<dyn MemoryClient>,
    latency: Arc<parking_lot::Mutex<LatencyRing>>,
    inflight: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<AdvisorDecision>,
    day_context_tx: mpsc::UnboundedSender<String>,
}

pub struct EventRouter {
    #[allow(dead_code)]
    instrument: InstrumentContext,
    config: EngineConfig,

    registry: MboRegistry,
    indicators: IndicatorSuite,

    iceberg: IcebergDetector,
    spoof: SpoofDetector,
    absorption: AbsorptionDetector,
    last_spoof_at: HashMap<Side, TimestampNs>,

    gate: SignalGate,
    session: SessionMachine,
    diagnostics: Arc<Diagnostics>,
    plan_tracker: Arc<RwLock<PlanTracker>>,

    /// Recent opposite-side trades per (resting-order side, price), used
    /// only to distinguish a consumption-shrink replace from a plain cancel
    /// within the configured fill window (§4.2's absorption cue).
    consumption_trades: HashMap<LevelKey, VecDeque<(TimestampNs, i64)>>,

    advisor: Option<AdvisorRuntime>,
    inbox: Option<mpsc::UnboundedReceiver<AdvisorDecision>>,

    /// The current per-day context blob (§4.7), rolled over at the
    /// PreMarket -> OpeningRange boundary. `None` until the first rollover
    /// completes (or forever, if no advisor collaborator is wired).
    day_context: Option<String>,
    day_context_inbox: Option<mpsc::UnboundedReceiver<String>>,

    latest_signal: Arc<RwLock<Option<Signal>>>,
}

/// Everything a single event call may have produced, for the host to act on.
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub signals: Vec<Signal>,
}

impl EventRouter {
    pub fn new(instrument: InstrumentContext, config: EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let iceberg = IcebergDetector::new(
            config.iceberg_min_orders,
            config.iceberg_size_base,
            config.threshold_multiplier,
            config.per_price_cooldown_ms,
        );
        let spoof = SpoofDetector::new(config.spoof_max_age_ms, config.spoof_min_size);
        let absorption = AbsorptionDetector::new(config.absorption_min_size);
        let gate = SignalGate::new(
            config.confluence_threshold,
            config.per_price_cooldown_ms,
            config.global_spacing_ms,
        );
        let indicators = IndicatorSuite::new(
            &config.ema_periods,
            config.atr_period,
            config.value_area_fraction,
            config.dom_band_ticks,
        );
        let session = SessionMachine::new(config.phase_schedule.clone());
        let registry = MboRegistry::new(config.adaptive_window);

        Ok(Self {
            instrument,
            registry,
            indicators,
            iceberg,
            spoof,
            absorption,
            last_spoof_at: HashMap::new(),
            gate,
            session,
            diagnostics: Arc::new(Diagnostics::new()),
            plan_tracker: Arc::new(RwLock::new(PlanTracker::new())),
            consumption_trades: HashMap::new(),
            advisor: None,
            inbox: None,
            day_context: None,
            day_context_inbox: None,
            latest_signal: Arc::new(RwLock::new(None)),
            config,
        })
    }

    /// Wire a real advisor transport and memory collaborator. Without this
    /// call the router still scores and gates signals; it simply never
    /// dispatches an advisor call, no `TradePlan` is ever recorded, and the
    /// per-day context blob never rolls over.
    pub fn with_advisor(mut self, client: Arc<dyn AdvisorClient>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (day_context_tx, day_context_rx) = mpsc::unbounded_channel();
        self.advisor = Some(AdvisorRuntime {
            client,
            memory: Arc::new(NullMemoryClient),
            latency: Arc::new(parking_lot::Mutex::new(LatencyRing::default())),
            inflight: Arc::new(AtomicUsize::new(0)),
            tx,
            day_context_tx,
        });
        self.inbox = Some(rx);
        self.day_context_inbox = Some(day_context_rx);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryClient>) -> Self {
        if let Some(runtime) = &mut self.advisor {
            runtime.memory = memory;
        }
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            diagnostics: self.diagnostics.clone(),
            latest_signal: self.latest_signal.clone(),
            recent_plans: Arc::new(RwLock::new(self.plan_tracker.read().recent(50).into_iter().cloned().collect())),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// The current per-day context blob (§4.7), if a rollover has completed.
    pub fn day_context(&self) -> Option<&str> {
        self.day_context.as_deref()
    }

    pub fn plan_tracker(&self) -> Arc<RwLock<PlanTracker>> {
        self.plan_tracker.clone()
    }

    /// Record how an externally-resolved plan turned out (§4.9). Pure
    /// bookkeeping; never touches the hot scoring path.
    pub fn resolve_plan(
        &mut self,
        id: u64,
        resolution: PlanResolution,
        realized_ticks: Option<i64>,
        mae_ticks: Option<i64>,
        ts: TimestampNs,
    ) -> bool {
        self.plan_tracker
            .write()
            .resolve_plan(id, resolution, realized_ticks, mae_ticks, ts)
    }

    // =========================================================================
    // Inbox draining — applies advisor decisions that arrived since the last
    // event, never reordering with market events (§5).
    // =========================================================================

    fn drain_inbox(&mut self, ts: TimestampNs) {
        if let Some(rx) = &mut self.day_context_inbox {
            let mut blobs = Vec::new();
            while let Ok(blob) = rx.try_recv() {
                blobs.push(blob);
            }
            if let Some(blob) = blobs.into_iter().last() {
                self.day_context = Some(blob);
            }
        }

        let Some(rx) = &mut self.inbox else { return };
        let mut decisions = Vec::new();
        while let Ok(decision) = rx.try_recv() {
            decisions.push(decision);
        }
        for decision in decisions {
            self.apply_decision(decision, ts);
        }
    }

    fn apply_decision(&mut self, decision: AdvisorDecision, ts: TimestampNs) {
        use crate::advisor::AdvisorAction;

        if let Some(adjustment) = &decision.threshold_adjustment {
            if let Some(t) = adjustment.get("confluence_threshold").and_then(|v| v.as_i64()) {
                info!(new_threshold = t, "advisor requested threshold adjustment");
                self.gate.set_threshold(t as i32);
            }
        }

        match decision.action {
            AdvisorAction::Skip => {
                debug!(signal_id = decision.signal_id, reasoning = %decision.reasoning, "advisor skipped signal");
            }
            AdvisorAction::Take => {
                if let Some(mut plan) = decision.plan {
                    plan.created_at = ts;
                    let id = self.plan_tracker.write().record_plan(plan, ts);
                    info!(plan_id = id, signal_id = decision.signal_id, "advisor decision produced a trade plan");
                } else {
                    warn!(signal_id = decision.signal_id, "advisor said TAKE but supplied no plan");
                }
            }
        }
    }

    fn dispatch_to_advisor(&mut self, signal: &Signal, ts: TimestampNs) {
        let Some(runtime) = &self.advisor else { return };
        if runtime.inflight.load(Ordering::Relaxed) > MAX_INFLIGHT_ADVISOR_CALLS {
            debug!(signal_id = signal.id, "advisor backlog > 2, skipping this call");
            return;
        }

        let recent_plans = self.plan_tracker.read().recent(5).into_iter().cloned().collect::<Vec<_>>();
        let bundle = advisor::build_bundle(signal, &recent_plans);

        let client = runtime.client.clone();
        let memory = runtime.memory.clone();
        let latency = runtime.latency.clone();
        let inflight = runtime.inflight.clone();
        let tx = runtime.tx.clone();
        let diagnostics = self.diagnostics.clone();
        let signal_id = signal.id;

        inflight.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(e) = memory_search_best_effort(memory.as_ref(), &bundle).await {
                warn!(error = %e, "memory collaborator search failed, continuing with empty context");
            }

            let result = advisor::call_with_retry(client.as_ref(), &bundle).await;
            inflight.fetch_sub(1, Ordering::Relaxed);

            match result {
                Ok((raw, elapsed)) => {
                    latency.lock().record(elapsed);
                    let decision = advisor::decode_reply_or_skip(signal_id, &raw);
                    let _ = tx.send(decision);
                }
                Err(e) => {
                    diagnostics.advisor_timeout();
                    warn!(signal_id, error = %e, "advisor call exhausted retry budget, signal dropped");
                }
            }
        });
        let _ = ts;
    }

    // =========================================================================
    // Session advancement
    // =========================================================================

    fn advance_session(&mut self, ts: TimestampNs) {
        if let Some(transition) = self.session.on_tick(ts) {
            if transition.session_reset {
                self.indicators.reset_session();
            }
            if transition.replay {
                self.diagnostics.wall_clock_regression();
            }
            if transition.from == Phase::PreMarket && transition.to == Phase::OpeningRange {
                self.rollover_day_context();
            }
        }
    }

    /// Fire-and-forget request to the advisor collaborator for a fresh
    /// per-day context blob (§4.7), merged back through `day_context_inbox`
    /// the same way advisor decisions are, so it never reorders with market
    /// events. A no-op if no advisor is wired.
    fn rollover_day_context(&mut self) {
        let Some(runtime) = &self.advisor else { return };
        let client = runtime.client.clone();
        let tx = runtime.day_context_tx.clone();
        let prior = self.day_context.clone();

        tokio::spawn(async move {
            match client.day_context(prior.as_deref()).await {
                Ok(mut blob) => {
                    if blob.len() > advisor::MAX_DAY_CONTEXT_BYTES {
                        let mut cut = advisor::MAX_DAY_CONTEXT_BYTES;
                        while !blob.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        blob.truncate(cut);
                    }
                    let _ = tx.send(blob);
                }
                Err(e) => {
                    warn!(error = %e, "advisor day-context rollover failed, keeping the prior blob");
                }
            }
        });
    }

    // =========================================================================
    // Shared detection -> scoring -> gate pipeline
    // =========================================================================

    fn recent_opposing_spoof(&self, detection_side: Side, ts: TimestampNs) -> bool {
        self.last_spoof_at
            .get(&detection_side.opposite())
            .map(|&last| ts - last <= OPPOSING_SPOOF_WINDOW_NS)
            .unwrap_or(false)
    }

    fn evaluate_detection(&mut self, detection: DetectionEvent, ts: TimestampNs) -> Option<Signal> {
        let direction = Direction::from_side(detection.side());
        let price = detection.price();
        let context = self.indicators.context(price);
        let phase = self.session.phase();
        let recent_opposing_spoof = self.recent_opposing_spoof(detection.side(), ts);
        let ema_ascending_count = self.indicators.emas().monotonic_count(price as f64, true);
        let ema_descending_count = self.indicators.emas().monotonic_count(price as f64, false);

        let breakdown = scorer::score(
            &ScorerInputs {
                detection: &detection,
                direction,
                context: &context,
                phase,
                recent_opposing_spoof,
                ema_ascending_count,
                ema_descending_count,
                dom_band_ticks: self.config.dom_band_ticks,
            },
            &self.config.weights,
        );
        if breakdown.clamp_adjustment != 0 {
            self.diagnostics.scorer_clamped();
        }

        match self.gate.admit(detection, direction, breakdown.total, breakdown, context, phase, ts) {
            Ok(signal) => {
                *self.latest_signal.write() = Some(signal.clone());
                self.dispatch_to_advisor(&signal, ts);
                Some(signal)
            }
            Err(reason) => {
                match reason {
                    RejectionReason::BelowThreshold => self.diagnostics.gate_rejected_below_threshold(),
                    RejectionReason::Cooldown => self.diagnostics.gate_rejected_cooldown(),
                    RejectionReason::GlobalSpacing => self.diagnostics.gate_rejected_global_spacing(),
                }
                None
            }
        }
    }

    // =========================================================================
    // Consumption-vs-cancel cue (§4.2, §9's open question)
    // =========================================================================

    fn record_consumption_trade(&mut self, consumed_side: Side, price: Ticks, size: i64, ts: TimestampNs) {
        let key = (consumed_side, price);
        let window_ns = self.config.absorption_fill_window_ms as i64 * 1_000_000;
        let entry = self.consumption_trades.entry(key).or_default();
        entry.push_back((ts, size));
        while let Some(&(old_ts, _)) = entry.front() {
            if ts - old_ts > window_ns {
                entry.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_matching_consumption(&self, side: Side, price: Ticks, size: i64, ts: TimestampNs) -> bool {
        let window_ns = self.config.absorption_fill_window_ms as i64 * 1_000_000;
        self.consumption_trades
            .get(&(side, price))
            .map(|entries| {
                entries
                    .iter()
                    .any(|&(trade_ts, trade_size)| ts - trade_ts <= window_ns && trade_size == size)
            })
            .unwrap_or(false)
    }

    // =========================================================================
    // Entry points (§4.1, §6)
    // =========================================================================

    pub fn on_trade(&mut self, price: Ticks, size: i64, aggressor: Side, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);
        self.advance_session(ts);

        if size <= 0 {
            self.diagnostics.malformed_event();
            return EventOutcome::default();
        }

        self.indicators.on_trade(price, size, aggressor);

        let consumed_side = aggressor.opposite();
        self.record_consumption_trade(consumed_side, price, size, ts);

        let passive_side = aggressor.opposite();
        let passive_size_now = self
            .registry
            .level(passive_side, price)
            .map(|l| l.total_size)
            .unwrap_or(0);

        let mut signals = Vec::new();
        if let Some(detection) = self.absorption.on_trade(aggressor, price, size, ts, passive_size_now) {
            if let Some(signal) = self.evaluate_detection(detection, ts) {
                signals.push(signal);
            }
        }
        EventOutcome { signals }
    }

    pub fn on_depth(&mut self, side: Side, price: Ticks, aggregated_size: i64, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);
        if aggregated_size < 0 {
            self.diagnostics.malformed_event();
            return EventOutcome::default();
        }
        self.indicators.on_depth(side, price, aggregated_size);
        EventOutcome::default()
    }

    pub fn on_bbo(&mut self, best_bid: Ticks, best_ask: Ticks, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);
        self.advance_session(ts);
        if best_bid > best_ask {
            self.diagnostics.malformed_event();
            return EventOutcome::default();
        }
        self.indicators.on_bbo(best_bid, best_ask);
        EventOutcome::default()
    }

    pub fn on_mbo_insert(&mut self, id: OrderId, side: Side, price: Ticks, size: i64, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);

        if size <= 0 {
            self.diagnostics.malformed_event();
            return EventOutcome::default();
        }

        let mut signals = Vec::new();

        match self.registry.insert(id, side, price, size, ts) {
            Some(outcome) => {
                if let Some(level) = self.registry.level(side, price) {
                    if let Some(detection) = self.iceberg.on_level_growth(
                        side,
                        price,
                        level.inserts_since_first,
                        outcome.level_total_size,
                        outcome.window_mean_count,
                        outcome.window_mean_size,
                        ts,
                    ) {
                        if let Some(signal) = self.evaluate_detection(detection, ts) {
                            signals.push(signal);
                        }
                    }
                }
            }
            None => {
                // Identity already present: treat as replace per §4.2's Insert
                // algorithm.
                if let Some(signal) = self.handle_replace(id, size, ts) {
                    signals.push(signal);
                }
            }
        }

        EventOutcome { signals }
    }

    pub fn on_mbo_replace(&mut self, id: OrderId, new_size: i64, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);

        if new_size < 0 {
            self.diagnostics.malformed_event();
            return EventOutcome::default();
        }

        match self.handle_replace(id, new_size, ts) {
            Some(signal) => EventOutcome { signals: vec![signal] },
            None => EventOutcome::default(),
        }
    }

    fn handle_replace(&mut self, id: OrderId, new_size: i64, ts: TimestampNs) -> Option<Signal> {
        let Some(order) = self.registry.order(id).copied() else {
            self.diagnostics.unknown_order_id();
            return None;
        };

        let traded_against = if new_size < order.size {
            let consumed = order.size - new_size;
            self.has_matching_consumption(order.side, order.price, consumed, ts)
        } else {
            false
        };

        match self.registry.replace(id, new_size, ts, traded_against) {
            Some(ReplaceResult::Replaced(outcome)) => {
                if outcome.delta > 0 {
                    if let Some(level) = self.registry.level(outcome.side, outcome.price) {
                        if let Some(detection) = self.iceberg.on_level_growth(
                            outcome.side,
                            outcome.price,
                            level.inserts_since_first,
                            outcome.level_total_size,
                            outcome.window_mean_count,
                            outcome.window_mean_size,
                            ts,
                        ) {
                            return self.evaluate_detection(detection, ts);
                        }
                    }
                }
                None
            }
            Some(ReplaceResult::BecameCancel(outcome)) => self.handle_cancel_outcome(outcome, ts),
            None => {
                self.diagnostics.unknown_order_id();
                None
            }
        }
    }

    pub fn on_mbo_cancel(&mut self, id: OrderId, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);

        let Some(outcome) = self.registry.cancel(id, ts) else {
            self.diagnostics.unknown_order_id();
            return EventOutcome::default();
        };
        match self.handle_cancel_outcome(outcome, ts) {
            Some(signal) => EventOutcome { signals: vec![signal] },
            None => EventOutcome::default(),
        }
    }

    /// Spoof is a penalty input to scoring, never a trade signal on its own
    /// (§4.3.2) — this only updates `last_spoof_at` and never calls the
    /// scorer/gate directly.
    fn handle_cancel_outcome(&mut self, outcome: CancelOutcome, ts: TimestampNs) -> Option<Signal> {
        if let Some(DetectionEvent::Spoof { side, .. }) = self.spoof.on_cancel(&outcome) {
            self.last_spoof_at.insert(side, ts);
        }
        None
    }

    pub fn on_tick(&mut self, ts: TimestampNs) -> EventOutcome {
        self.drain_inbox(ts);
        self.advance_session(ts);
        EventOutcome::default()
    }
}

async fn memory_search_best_effort(
    memory: &dyn MemoryClient,
    bundle: &ContextBundle,
) -> anyhow::Result<()> {
    let hits = memory.search(&bundle.memory_query, 5).await?;
    debug!(hits = hits.len(), "memory collaborator search completed");
    memory
        .append(&format!("signal at {} scored {}", bundle.price, bundle.score), MemoryKind::SignalDecision)
        .await?;
    Ok(())
}
