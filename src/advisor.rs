// =============================================================================
// Context Bundler & Advisor Adapter
// =============================================================================
//
// On each admitted Signal, bundle direction/detection/score/breakdown plus an
// indicator snapshot into the §6 UTF-8 wire contract and hand it to the
// advisor collaborator. The adapter only encodes the bundle and decodes the
// reply — it never interprets market semantics itself.
//
// The adapter is a trait so a host can substitute its own transport; this
// crate ships one default implementation, `HttpAdvisorClient`, over
// `reqwest`, matching the request/response shape of the teacher's
// `BinanceClient` but without HMAC signing — the advisor endpoint is not an
// execution venue, so there is nothing to authenticate with a trading secret.
// =============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::plan::{ExecutionType, PlanRecord, TradePlan};
use crate::session::Phase;
use crate::signal::{Signal, SignalId};
use crate::types::{Direction, Ticks};

const MAX_BUNDLE_BYTES: usize = 8 * 1024;
const LATENCY_RING_LEN: usize = 20;
const RETRY_BACKOFFS_MS: [u64; 3] = [1_000, 2_000, 4_000];
const TOTAL_BUDGET_MS: u64 = 60_000;

// =============================================================================
// Outbound bundle
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub direction: Direction,
    pub detection: &'static str,
    pub price: Ticks,
    pub score: i32,
    pub breakdown: serde_json::Value,
    pub context: BundleContext,
    pub phase: Phase,
    pub threshold: i32,
    /// Bounded query string for the memory collaborator's `search`.
    pub memory_query: String,
    /// Recent plan/outcome history, truncated to keep the whole bundle under
    /// `MAX_BUNDLE_BYTES`.
    pub recent_plans: Vec<RecentPlanSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentPlanSummary {
    pub direction: Direction,
    pub entry_tick: Ticks,
    pub resolution: Option<&'static str>,
}

impl From<&PlanRecord> for RecentPlanSummary {
    fn from(record: &PlanRecord) -> Self {
        Self {
            direction: record.plan.direction,
            entry_tick: record.plan.entry_tick,
            resolution: record.outcome.as_ref().map(|o| match o.resolution {
                crate::plan::PlanResolution::Filled => "filled",
                crate::plan::PlanResolution::Cancelled => "cancelled",
                crate::plan::PlanResolution::HitStopLoss => "hit-sl",
                crate::plan::PlanResolution::HitTakeProfit => "hit-tp",
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleContext {
    pub cvd: i64,
    pub cvd_trend: &'static str,
    pub vwap: Option<f64>,
    pub poc: Option<Ticks>,
    pub value_area_low: Option<Ticks>,
    pub value_area_high: Option<Ticks>,
    pub emas: Vec<(u32, Option<f64>)>,
    pub dom_support: Option<Ticks>,
    pub dom_resistance: Option<Ticks>,
}

/// Build the outbound bundle for an admitted signal. Truncates
/// `recent_plans` as needed to respect the 8 KiB wire budget; this is the
/// only place in the adapter that enforces the byte ceiling, since it is the
/// only variable-length field.
pub fn build_bundle(signal: &Signal, recent_plans: &[PlanRecord]) -> ContextBundle {
    let detection = match &signal.detection {
        crate::detectors::DetectionEvent::Iceberg { .. } => "iceberg",
        crate::detectors::DetectionEvent::Spoof { .. } => "spoof",
        crate::detectors::DetectionEvent::Absorption { .. } => "absorption",
    };

    let mut bundle = ContextBundle {
        direction: signal.direction,
        detection,
        price: signal.trigger_price,
        score: signal.score,
        breakdown: serde_json::to_value(signal.breakdown).unwrap_or(serde_json::Value::Null),
        context: BundleContext {
            cvd: signal.context.cvd.value,
            cvd_trend: match signal.context.cvd.trend {
                crate::indicators::cvd::CvdTrend::Bullish => "bullish",
                crate::indicators::cvd::CvdTrend::Bearish => "bearish",
                crate::indicators::cvd::CvdTrend::Neutral => "neutral",
            },
            vwap: signal.context.vwap.value,
            poc: signal.context.volume_profile.poc,
            value_area_low: signal.context.volume_profile.value_area_low,
            value_area_high: signal.context.volume_profile.value_area_high,
            emas: signal
                .context
                .emas
                .iter()
                .map(|e| (e.period, e.value))
                .collect(),
            dom_support: signal.context.dom.support,
            dom_resistance: signal.context.dom.resistance,
        },
        phase: signal.phase,
        threshold: signal.threshold_at_emission,
        memory_query: format!(
            "{detection} {} {} score={}",
            signal.direction, signal.trigger_price, signal.score
        ),
        recent_plans: recent_plans.iter().map(RecentPlanSummary::from).collect(),
    };

    while estimated_bundle_bytes(&bundle) > MAX_BUNDLE_BYTES && !bundle.recent_plans.is_empty() {
        bundle.recent_plans.remove(0);
    }
    bundle
}

fn estimated_bundle_bytes(bundle: &ContextBundle) -> usize {
    serde_json::to_vec(bundle).map(|v| v.len()).unwrap_or(0)
}

// =============================================================================
// Inbound decision
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdvisorAction {
    Take,
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanReply {
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "executionType")]
    pub execution_type: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: f64,
    #[serde(rename = "triggerPrice")]
    pub trigger_price: Option<f64>,
    #[serde(rename = "stopLossPrice")]
    pub stop_loss_price: f64,
    #[serde(rename = "takeProfitPrice")]
    pub take_profit_price: f64,
    #[serde(rename = "executionReasoning")]
    pub execution_reasoning: String,
}

/// The raw JSON shape of the §6 reply contract. Unknown fields are ignored by
/// serde's default behaviour; missing optional fields default per §4.5.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorReply {
    pub action: AdvisorAction,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub plan: Option<PlanReply>,
    #[serde(rename = "thresholdAdjustment", default)]
    pub threshold_adjustment: Option<serde_json::Value>,
}

/// The decoded, engine-native form of an advisor reply — what the router
/// actually acts on.
#[derive(Debug, Clone)]
pub struct AdvisorDecision {
    pub signal_id: SignalId,
    pub action: AdvisorAction,
    pub confidence: f64,
    pub reasoning: String,
    pub plan: Option<TradePlan>,
    pub threshold_adjustment: Option<serde_json::Value>,
}

impl AdvisorDecision {
    /// A parse-failure reply degrades to SKIP with confidence 0 and a
    /// diagnostic reasoning string (§7's advisor-reply-parse-failure row).
    fn parse_failure(signal_id: SignalId, diagnostic: impl Into<String>) -> Self {
        Self {
            signal_id,
            action: AdvisorAction::Skip,
            confidence: 0.0,
            reasoning: diagnostic.into(),
            plan: None,
            threshold_adjustment: None,
        }
    }
}

fn decode_plan(signal_id: SignalId, reply: &PlanReply) -> Option<TradePlan> {
    let direction = match reply.order_type.as_str() {
        "BUY" => Direction::Long,
        "SELL" => Direction::Short,
        _ => return None,
    };
    let execution_type = match reply.execution_type.as_str() {
        "MARKET" => ExecutionType::Market,
        "STOP_MARKET" => ExecutionType::StopMarket,
        "LIMIT" => ExecutionType::Limit,
        _ => return None,
    };
    Some(TradePlan {
        id: 0, // assigned by the plan tracker on record_plan
        originating_signal: signal_id,
        direction,
        entry_tick: reply.entry_price.round() as Ticks,
        stop_loss_tick: reply.stop_loss_price.round() as Ticks,
        take_profit_tick: reply.take_profit_price.round() as Ticks,
        quantity: 1,
        execution_type,
        trigger_tick: reply.trigger_price.map(|p| p.round() as Ticks),
        reasoning: reply.execution_reasoning.clone(),
        created_at: 0, // stamped by the router when the decision is applied
    })
}

fn decode_reply(signal_id: SignalId, reply: AdvisorReply) -> AdvisorDecision {
    let plan = reply
        .plan
        .as_ref()
        .and_then(|p| decode_plan(signal_id, p));
    AdvisorDecision {
        signal_id,
        action: reply.action,
        confidence: reply.confidence.clamp(0.0, 1.0),
        reasoning: reply.reasoning,
        plan,
        threshold_adjustment: reply.threshold_adjustment,
    }
}

// =============================================================================
// Latency ring
// =============================================================================

/// Last 20 call durations; feeds no decision in the core but is exposed so
/// the router can skip advisor calls when backlog > 2 (§4.8).
#[derive(Debug, Clone, Default)]
pub struct LatencyRing {
    samples: VecDeque<Duration>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub samples: usize,
}

impl LatencyRing {
    pub fn record(&mut self, d: Duration) {
        if self.samples.len() == LATENCY_RING_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }
        let ms: Vec<f64> = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let sum: f64 = ms.iter().sum();
        LatencyStats {
            mean_ms: sum / ms.len() as f64,
            min_ms: ms.iter().cloned().fold(f64::INFINITY, f64::min),
            max_ms: ms.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            samples: ms.len(),
        }
    }
}

// =============================================================================
// AdvisorClient trait + default HTTP transport
// =============================================================================

/// Upper bound on the per-day context blob (§4.7), matching the
/// `MAX_BUNDLE_BYTES` budget the per-signal bundle is held to.
pub const MAX_DAY_CONTEXT_BYTES: usize = 8 * 1024;

/// The raw transport the adapter drives. Returns the response body as text —
/// transport failures (connection, non-2xx, timeout) are `Err` and subject to
/// retry; a malformed body is a successful transport call that the adapter
/// separately degrades to SKIP (§7 distinguishes the two failure classes).
/// A host may substitute its own implementation (e.g. an in-process LLM
/// call, a test double); this crate ships `HttpAdvisorClient` as the default.
#[async_trait]
pub trait AdvisorClient: Send + Sync {
    async fn call(&self, bundle: &ContextBundle) -> Result<String>;

    /// Roll the per-day context blob over at the PreMarket->OpeningRange
    /// boundary (§4.7). `prior` is yesterday's blob, if any; the returned
    /// string becomes today's. The default passes `prior` straight through
    /// unchanged — a host that wants the advisor to actually summarize or
    /// refresh the blob overrides this.
    async fn day_context(&self, prior: Option<&str>) -> Result<String> {
        Ok(prior.unwrap_or_default().to_string())
    }
}

pub struct HttpAdvisorClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAdvisorClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build reqwest client");
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl AdvisorClient for HttpAdvisorClient {
    async fn call(&self, bundle: &ContextBundle) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(bundle)
            .send()
            .await
            .context("advisor HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("advisor HTTP request returned status {status}");
        }
        resp.text().await.context("advisor response body read failed")
    }
}

/// Drive `client.call` under the §5 cancellation contract: 60 s total budget,
/// three retries at 1/2/4 s backoff. On exhaustion returns `Err`, which the
/// router treats as a dropped signal counted via `advisor_timeout`. On
/// success returns the raw body plus the latency of the successful attempt,
/// for the caller to record without holding any lock across an `.await`.
pub async fn call_with_retry(
    client: &dyn AdvisorClient,
    bundle: &ContextBundle,
) -> Result<(String, Duration)> {
    let budget = Duration::from_millis(TOTAL_BUDGET_MS);
    let deadline = tokio::time::Instant::now() + budget;
    let mut last_err = None;

    for (attempt, backoff_ms) in std::iter::once(0)
        .chain(RETRY_BACKOFFS_MS.iter().copied())
        .enumerate()
    {
        if attempt > 0 {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }

        let started = std::time::Instant::now();
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, client.call(bundle)).await {
            Ok(Ok(body)) => {
                return Ok((body, started.elapsed()));
            }
            Ok(Err(e)) => {
                warn!(attempt, error = %e, "advisor call failed, will retry");
                last_err = Some(e);
            }
            Err(_) => {
                debug!(attempt, "advisor call timed out against remaining budget");
                last_err = Some(anyhow::anyhow!("advisor call timed out"));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("advisor call exhausted retry budget")))
}

/// Turn a raw (possibly malformed) JSON body into a decision, applying the
/// §7 parse-failure degradation rather than propagating the error.
pub fn decode_reply_or_skip(signal_id: SignalId, raw: &str) -> AdvisorDecision {
    match serde_json::from_str::<AdvisorReply>(raw) {
        Ok(reply) => decode_reply(signal_id, reply),
        Err(e) => AdvisorDecision::parse_failure(signal_id, format!("parse failure: {e}")),
    }
}
