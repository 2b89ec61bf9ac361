//! RAII admission guard.

use crate::drain::coordinator::Coordinator;

/// Proof that one operation was admitted. Dropping it exits the operation,
/// including during a panic unwind or when its future is dropped unfinished.
#[must_use = "dropping the guard immediately exits the tracked operation"]
#[derive(Debug)]
pub struct ActiveGuard {
    coordinator: Coordinator,
}

impl ActiveGuard {
    pub(crate) fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Coordinator this guard was admitted by
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.coordinator.exit();
    }
}
