// =============================================================================
// Engine Handle — read-only cross-task side channel
// =============================================================================
//
// The router itself runs single-threaded per instrument (§5) and never takes
// a lock on its hot path. `EngineHandle` is the `Arc` + `parking_lot::RwLock`
// read side-channel an embedding host uses to peek at diagnostics, the most
// recent Signal, or plan-tracker contents from a different task — e.g. an
// HTTP status endpoint, or a multi-instrument supervisor — matching the
// teacher lineage's `AppState`/`RwLock<...>` pattern for cross-task shared
// state, generalized from "API usage tracking" to "engine diagnostics."
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;

use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::plan::PlanRecord;
use crate::signal::Signal;

#[derive(Clone)]
pub struct EngineHandle {
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) latest_signal: Arc<RwLock<Option<Signal>>>,
    pub(crate) recent_plans: Arc<RwLock<Vec<PlanRecord>>>,
}

impl EngineHandle {
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn latest_signal(&self) -> Option<Signal> {
        self.latest_signal.read().clone()
    }

    pub fn recent_plans(&self) -> Vec<PlanRecord> {
        self.recent_plans.read().clone()
    }
}
