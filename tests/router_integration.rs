// =============================================================================
// End-to-end router scenarios
// =============================================================================
//
// Drives `EventRouter`'s public `on_*` entry points directly, the way a host
// integration would. No network or real clock dependency: every timestamp is
// passed explicitly by the caller.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use orderflow_engine::advisor::{AdvisorClient, ContextBundle};
use orderflow_engine::config::EngineConfig;
use orderflow_engine::instrument::InstrumentContext;
use orderflow_engine::router::EventRouter;
use orderflow_engine::types::{Direction, Side};

/// Hands back a fixed blob from `day_context` and is never expected to see a
/// `call` in these tests (no signal is admitted here).
struct StubAdvisorClient {
    blob: String,
}

#[async_trait::async_trait]
impl AdvisorClient for StubAdvisorClient {
    async fn call(&self, _bundle: &ContextBundle) -> anyhow::Result<String> {
        unreachable!("no signal is admitted in the day-context rollover test")
    }

    async fn day_context(&self, _prior: Option<&str>) -> anyhow::Result<String> {
        Ok(self.blob.clone())
    }
}

fn router() -> EventRouter {
    let instrument = InstrumentContext::new("ES", 0.25, 50.0);
    EventRouter::new(instrument, EngineConfig::default()).unwrap()
}

const PRICE: i64 = 17280;

/// Keeps a baseline order resting at `price` so the level (and its adaptive
/// window) never tears down to zero, then churns small one-lot orders in and
/// out to suppress the window's running mean before the real growth begins.
fn seed_suppressed_baseline(router: &mut EventRouter, price: i64, ts: &mut i64, next_id: &mut u64) {
    router.on_mbo_insert(*next_id, Side::Bid, price, 1, *ts);
    *next_id += 1;
    for _ in 0..20 {
        *ts += 2_000_000;
        router.on_mbo_insert(*next_id, Side::Bid, price, 1, *ts);
        router.on_mbo_cancel(*next_id, *ts + 1_000_000);
        *next_id += 1;
    }
}

#[test]
fn clean_iceberg_long_is_admitted_as_a_signal() {
    let mut router = router();
    let mut ts = 10 * 3600 * 1_000_000_000i64; // 10:00, Morning phase
    router.on_tick(ts);

    // Bullish CVD bias: a few bid-aggressor trades before the iceberg forms.
    for _ in 0..5 {
        ts += 1_000_000;
        router.on_trade(PRICE, 5, Side::Bid, ts);
    }

    let mut order_id = 1u64;
    seed_suppressed_baseline(&mut router, PRICE, &mut ts, &mut order_id);

    // A burst of real size dwarfs the suppressed baseline mean, tripping the
    // adaptive iceberg threshold.
    let mut emitted = Vec::new();
    for _ in 0..20 {
        ts += 10_000_000;
        let outcome = router.on_mbo_insert(order_id, Side::Bid, PRICE, 25, ts);
        order_id += 1;
        emitted.extend(outcome.signals);
    }

    assert!(!emitted.is_empty(), "expected the growing bid level to trip the iceberg detector");
    let signal = &emitted[0];
    assert_eq!(signal.direction, Direction::Long);
    assert!(signal.score >= 40);
}

#[test]
fn fast_cancel_of_a_large_untraded_order_is_a_spoof_never_a_standalone_signal() {
    let mut router = router();
    let ts = 0i64;
    router.on_mbo_insert(1, Side::Ask, PRICE, 100, ts);
    let outcome = router.on_mbo_cancel(1, ts + 50_000_000); // 50ms later, never traded

    assert!(outcome.signals.is_empty(), "a spoof must never emit a signal on its own");
}

#[test]
fn opposing_spoof_within_one_second_penalizes_the_next_detection() {
    let mut router = router();
    let mut ts = 10 * 3600 * 1_000_000_000i64;
    router.on_tick(ts);

    // Spoof an ask order: insert large, cancel fast, never traded against.
    router.on_mbo_insert(1, Side::Ask, PRICE + 40, 200, ts);
    router.on_mbo_cancel(1, ts + 50_000_000);
    ts += 100_000_000;

    // Now grow a bid iceberg at a different price within the 1s window.
    let mut order_id = 2u64;
    seed_suppressed_baseline(&mut router, PRICE, &mut ts, &mut order_id);
    let mut last_signal = None;
    for _ in 0..20 {
        ts += 10_000_000;
        let outcome = router.on_mbo_insert(order_id, Side::Bid, PRICE, 25, ts);
        order_id += 1;
        if let Some(s) = outcome.signals.into_iter().next() {
            last_signal = Some(s);
        }
    }

    let signal = last_signal.expect("expected the bid iceberg to fire");
    assert_ne!(signal.breakdown.spoof_penalty, 0, "opposing spoof should show up in the breakdown");
}

#[test]
fn gate_never_emits_two_signals_for_the_same_price_within_cooldown() {
    let mut router = router();
    let mut ts = 10 * 3600 * 1_000_000_000i64;
    router.on_tick(ts);

    let mut order_id = 1u64;
    let mut signals = Vec::new();
    for _ in 0..40 {
        ts += 10_000_000;
        let outcome = router.on_mbo_insert(order_id, Side::Bid, PRICE, 25, ts);
        order_id += 1;
        signals.extend(outcome.signals);
    }

    // Default per-price cooldown is 2s; 40 inserts at 10ms apart span 400ms,
    // well inside one cooldown window, so at most one signal should survive.
    assert!(signals.len() <= 1, "expected cooldown to suppress repeat emissions at one price, got {}", signals.len());
}

#[test]
fn malformed_events_are_counted_and_dropped_not_fatal() {
    let mut router = router();
    router.on_mbo_insert(1, Side::Bid, PRICE, -5, 0); // negative size
    router.on_trade(PRICE, 0, Side::Bid, 1); // zero size
    router.on_depth(Side::Bid, PRICE, -1, 2); // negative aggregated size

    let snapshot = router.diagnostics().snapshot();
    assert_eq!(snapshot.malformed_event, 3);
}

#[test]
fn unknown_order_id_on_replace_or_cancel_is_counted_and_dropped() {
    let mut router = router();
    router.on_mbo_replace(999, 10, 0);
    router.on_mbo_cancel(999, 1);

    let snapshot = router.diagnostics().snapshot();
    assert_eq!(snapshot.unknown_order_id, 2);
}

#[test]
fn a_backward_wall_clock_jump_is_counted_as_a_replay_regression() {
    let mut router = router();
    router.on_tick(10 * 3600 * 1_000_000_000i64);
    router.on_tick(9 * 3600 * 1_000_000_000i64); // more than 1s backward

    let snapshot = router.diagnostics().snapshot();
    assert_eq!(snapshot.wall_clock_regression, 1);
}

#[test]
fn ordinary_daily_close_to_premarket_cycle_is_not_a_regression() {
    let mut router = router();
    router.on_tick(16 * 3600 * 1_000_000_000i64); // PostMarket
    router.on_tick(16 * 3600 * 1_000_000_000i64 + 1_000_000); // still PostMarket, forward

    let snapshot = router.diagnostics().snapshot();
    assert_eq!(snapshot.wall_clock_regression, 0);
}

#[tokio::test]
async fn day_context_rolls_over_at_the_premarket_to_opening_range_boundary() {
    let instrument = InstrumentContext::new("ES", 0.25, 50.0);
    let mut router = EventRouter::new(instrument, EngineConfig::default())
        .unwrap()
        .with_advisor(Arc::new(StubAdvisorClient {
            blob: "fresh day notes".to_string(),
        }));

    assert!(router.day_context().is_none());

    router.on_tick(0); // PreMarket, no transition yet
    assert!(router.day_context().is_none());

    router.on_tick(9 * 3600 * 1_000_000_000i64 + 30 * 60 * 1_000_000_000i64); // 09:30, crosses into OpeningRange

    // The rollover is fire-and-forget; give the spawned task a turn, then
    // drain it on the next tick the same way an advisor decision is drained.
    tokio::time::sleep(Duration::from_millis(10)).await;
    router.on_tick(9 * 3600 * 1_000_000_000i64 + 31 * 60 * 1_000_000_000i64);

    assert_eq!(router.day_context(), Some("fresh day notes"));
}
