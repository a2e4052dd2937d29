// =============================================================================
// orderflow-demo — synthetic event driver
// =============================================================================
//
// Feeds a small synthetic order-flow sequence through an `EventRouter` and
// prints whatever signals and diagnostics fall out. The core crate never
// calls `tracing_subscriber::fmt().init()` itself since an embedding host may
// own its own subscriber; this binary is the one place that does.
// =============================================================================

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use orderflow_engine::advisor::HttpAdvisorClient;
use orderflow_engine::config::EngineConfig;
use orderflow_engine::instrument::InstrumentContext;
use orderflow_engine::router::EventRouter;
use orderflow_engine::types::Side;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("orderflow-demo starting up");

    let instrument = InstrumentContext::new("ES", 0.25, 50.0);
    let config = EngineConfig::default();

    let mut router = EventRouter::new(instrument, config)?;
    if let Ok(endpoint) = std::env::var("ADVISOR_ENDPOINT") {
        router = router.with_advisor(Arc::new(HttpAdvisorClient::new(endpoint)));
    }

    let mut ts: i64 = 9 * 3600 * 1_000_000_000; // 09:00 local, still pre-market
    router.on_tick(ts);

    ts = 9 * 3600 * 1_000_000_000 + 31 * 60 * 1_000_000_000; // 09:31, into Morning
    router.on_tick(ts);

    let price = 17280i64; // 4320.00 on a 0.25 tick grid
    let mut order_id = 1u64;

    // Simulate a resting bid replenishing repeatedly at one price — the
    // classic iceberg signature.
    for i in 0..20u32 {
        ts += 10_000_000; // 10ms apart
        router.on_mbo_insert(order_id, Side::Bid, price, 25, ts);
        order_id += 1;
        if i % 3 == 0 {
            router.on_trade(price, 10, Side::Ask, ts);
        }
    }

    let outcome = router.on_mbo_insert(order_id, Side::Bid, price, 25, ts + 20_000_000);

    for signal in &outcome.signals {
        info!(
            signal_id = signal.id,
            direction = %signal.direction,
            price = signal.trigger_price,
            score = signal.score,
            "signal emitted"
        );
    }

    let snapshot = router.diagnostics().snapshot();
    info!(?snapshot, "final diagnostics");

    Ok(())
}
