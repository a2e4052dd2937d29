// =============================================================================
// Memory Collaborator Interface
// =============================================================================
//
// Persistent storage and vector-embedding search of long-form memory are out
// of scope for this crate (§1) — specified only at the interface the core
// consumes. The core never assumes a persistence format; a best-effort
// failure here degrades to an empty context, never a hot-path error.
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub path: String,
    pub line_range: (u32, u32),
    pub score: f64,
    pub snippet: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    SignalDecision,
    Outcome,
    PhaseNote,
}

/// The two operations the memory collaborator exposes to the core (§6).
#[async_trait]
pub trait MemoryClient: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<MemoryHit>>;
    async fn append(&self, text: &str, kind: MemoryKind) -> anyhow::Result<()>;
}

/// A no-op memory client for hosts that do not wire up a real memory
/// collaborator yet. `search` returns no hits; `append` is a silent success.
/// Useful as the default in `demos/` and in tests.
pub struct NullMemoryClient;

#[async_trait]
impl MemoryClient for NullMemoryClient {
    async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<MemoryHit>> {
        Ok(Vec::new())
    }

    async fn append(&self, _text: &str, _kind: MemoryKind) -> anyhow::Result<()> {
        Ok(())
    }
}
