//! Cooperative cancellation for a running session (spec §5).
//!
//! Grounded on the teacher's `live.rs` shutdown flag: an `Arc<AtomicBool>` set by a signal
//! handler and polled by the run loop, rather than a hard abort. Here the flag is polled by
//! [`crate::scheduler::run_waves`] between waves and between signals within a wave; on
//! cancellation the wave loop stops admitting new signals and falls straight through to
//! finalization, so every open position still closes through the forced-close path and the
//! ledger invariant in spec §3 holds even on a cancelled run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap-to-clone flag a caller can set from outside the wave loop (e.g. a Ctrl+C handler
/// or a request timeout) to stop a session early without leaving the ledger inconsistent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Idempotent; safe to call from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
