// =============================================================================
// orderflow_engine
// =============================================================================
//
// A real-time order-flow analytics and decision engine: per-order MBO
// tracking, pattern detection (iceberg/spoof/absorption), a battery of
// streaming indicators, a confluence scorer, a cooldown/dedup signal gate,
// a session/phase state machine, and an advisor/memory adapter layer that
// turns an admitted signal into a trade plan. See `router::EventRouter` for
// the crate's entry points.
// =============================================================================

pub mod advisor;
pub mod config;
pub mod detectors;
pub mod diagnostics;
pub mod handle;
pub mod indicators;
pub mod instrument;
pub mod memory;
pub mod plan;
pub mod registry;
pub mod router;
pub mod scorer;
pub mod session;
pub mod signal;
pub mod types;

pub use handle::EngineHandle;
pub use router::{EventOutcome, EventRouter};
