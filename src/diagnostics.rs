// =============================================================================
// Diagnostics — lock-free counter bundle for the hot-path error taxonomy
// =============================================================================
//
// Nothing in the event loop surfaces a failure as a control-flow abort: every
// row of the error taxonomy increments a named counter here instead. Counters
// are atomics so any thread may read a consistent-enough snapshot without
// taking a lock on the hot path.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe diagnostics counters backed by atomics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    malformed_event: AtomicU64,
    unknown_order_id: AtomicU64,
    indicator_warmup: AtomicU64,
    scorer_clamped: AtomicU64,
    advisor_timeout: AtomicU64,
    advisor_retry: AtomicU64,
    advisor_parse_failure: AtomicU64,
    memory_failure: AtomicU64,
    wall_clock_regression: AtomicU64,
    gate_rejected_below_threshold: AtomicU64,
    gate_rejected_cooldown: AtomicU64,
    gate_rejected_global_spacing: AtomicU64,
}

/// Immutable snapshot of the current counters, suitable for exposing on a
/// host-side status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub malformed_event: u64,
    pub unknown_order_id: u64,
    pub indicator_warmup: u64,
    pub scorer_clamped: u64,
    pub advisor_timeout: u64,
    pub advisor_retry: u64,
    pub advisor_parse_failure: u64,
    pub memory_failure: u64,
    pub wall_clock_regression: u64,
    pub gate_rejected_below_threshold: u64,
    pub gate_rejected_cooldown: u64,
    pub gate_rejected_global_spacing: u64,
}

macro_rules! counter_ops {
    ($($field:ident),* $(,)?) => {
        impl Diagnostics {
            $(
                pub fn $field(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> DiagnosticsSnapshot {
                DiagnosticsSnapshot {
                    $(
                        $field: self.$field.load(Ordering::Relaxed),
                    )*
                }
            }
        }
    };
}

counter_ops!(
    malformed_event,
    unknown_order_id,
    indicator_warmup,
    scorer_clamped,
    advisor_timeout,
    advisor_retry,
    advisor_parse_failure,
    memory_failure,
    wall_clock_regression,
    gate_rejected_below_threshold,
    gate_rejected_cooldown,
    gate_rejected_global_spacing,
);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let diag = Diagnostics::new();
        let snap = diag.snapshot();
        assert_eq!(snap.malformed_event, 0);
        assert_eq!(snap.advisor_timeout, 0);
    }

    #[test]
    fn counters_increment_independently() {
        let diag = Diagnostics::new();
        diag.malformed_event();
        diag.malformed_event();
        diag.advisor_timeout();
        let snap = diag.snapshot();
        assert_eq!(snap.malformed_event, 2);
        assert_eq!(snap.advisor_timeout, 1);
        assert_eq!(snap.unknown_order_id, 0);
    }
}
