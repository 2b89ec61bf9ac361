//! Quiescence coordinator for tracked operations.
//!
//! Counts in-flight operations, refuses new ones once shutdown begins, and
//! fires a one-shot signal when shutdown has begun and the count is zero.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::drain::deadline::Deadline;
use crate::drain::error::DrainError;
use crate::drain::guard::ActiveGuard;

/// Counter state. Only ever touched under the coordinator lock.
#[derive(Debug, Default)]
struct DrainState {
    active: usize,
    shutdown_requested: bool,
    quiescent: bool,
}

struct Inner {
    state: Mutex<DrainState>,
    // Flips to true exactly once, under the state lock
    quiescent_tx: watch::Sender<bool>,
}

/// Shared handle to one drain coordinator.
///
/// Cloning is cheap and every clone refers to the same counter. Create one per
/// application and hand clones to the wrappers and to the shutdown path.
///
/// Admission is reject-on-shutdown: once [`begin_shutdown`](Self::begin_shutdown)
/// has run, [`try_enter`](Self::try_enter) always returns false, so nothing new
/// starts during the drain.
///
/// Only the tracked operations themselves are observed. A connection that stays
/// in use after its handler returned counts as finished.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create a coordinator with nothing in flight
    pub fn new() -> Self {
        let (quiescent_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DrainState::default()),
                quiescent_tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DrainState> {
        // The state is plain counters; a panic elsewhere cannot leave it torn
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fire(&self, state: &mut DrainState) {
        if !state.quiescent {
            state.quiescent = true;
            self.inner.quiescent_tx.send_replace(true);
        }
    }

    /// Admit one operation unless shutdown has begun.
    ///
    /// Every `true` must be paired with exactly one [`exit`](Self::exit).
    /// Prefer [`enter`](Self::enter), which pairs them for you.
    pub fn try_enter(&self) -> bool {
        let mut state = self.lock();
        if state.shutdown_requested {
            return false;
        }
        state.active += 1;
        true
    }

    /// Mark one admitted operation as finished.
    pub fn exit(&self) {
        let mut state = self.lock();
        debug_assert!(state.active > 0, "exit() without a matching try_enter()");
        state.active = state.active.saturating_sub(1);
        if state.shutdown_requested && state.active == 0 {
            self.fire(&mut state);
        }
    }

    /// Admit one operation and return a guard that exits when dropped.
    ///
    /// Returns `None` once shutdown has begun.
    pub fn enter(&self) -> Option<ActiveGuard> {
        self.try_enter().then(|| ActiveGuard::new(self.clone()))
    }

    /// Run `fut` as a tracked operation.
    ///
    /// The exit runs when `fut` completes, panics, or is dropped unfinished.
    pub async fn track<F: Future>(&self, fut: F) -> Result<F::Output, DrainError> {
        let Some(_guard) = self.enter() else {
            return Err(DrainError::Rejected);
        };
        Ok(fut.await)
    }

    /// Stop admitting operations. Idempotent.
    ///
    /// Fires the quiescent signal right away when nothing is in flight.
    pub fn begin_shutdown(&self) {
        let mut state = self.lock();
        state.shutdown_requested = true;
        if state.active == 0 {
            self.fire(&mut state);
        }
    }

    /// Begin shutdown and wait until every admitted operation has exited.
    ///
    /// A failed wait does not consume anything; call this again (or
    /// [`wait_quiescent`](Self::wait_quiescent)) with a later deadline to keep
    /// waiting.
    pub async fn shutdown(&self, deadline: Deadline) -> Result<(), DrainError> {
        self.begin_shutdown();
        self.wait_quiescent(deadline).await
    }

    /// Wait for the quiescent signal without beginning shutdown.
    pub async fn wait_quiescent(&self, deadline: Deadline) -> Result<(), DrainError> {
        let mut quiescent_rx = self.inner.quiescent_tx.subscribe();
        deadline
            .run(async move {
                // The sender lives as long as `self`, so this cannot see a
                // closed channel; treat it as quiescent if it ever does.
                let _ = quiescent_rx.wait_for(|quiescent| *quiescent).await;
            })
            .await
    }

    /// Number of operations currently in flight
    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    /// Whether shutdown has begun
    pub fn is_shutdown_requested(&self) -> bool {
        self.lock().shutdown_requested
    }

    /// Whether the quiescent signal has fired
    pub fn is_quiescent(&self) -> bool {
        self.lock().quiescent
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Coordinator")
            .field("active", &state.active)
            .field("shutdown_requested", &state.shutdown_requested)
            .field("quiescent", &state.quiescent)
            .finish()
    }
}
