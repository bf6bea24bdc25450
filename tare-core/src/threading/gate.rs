//! Start gate for coordinating worker startup
//!
//! Unlike `std::sync::Barrier`, the gate is opened by the coordinating thread,
//! so it can always release already-spawned workers even when spawning a later
//! worker fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockWriteGuard};

/// A one-shot gate that holds workers until the coordinator opens it
pub struct StartGate {
    lock: RwLock<()>,
    aborted: AtomicBool,
}

/// Keeps the gate closed until dropped or explicitly opened
pub struct GateHold<'a> {
    gate: &'a StartGate,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl StartGate {
    pub fn new() -> Self {
        Self { lock: RwLock::new(()), aborted: AtomicBool::new(false) }
    }

    /// Close the gate; workers calling [`StartGate::wait`] block until the hold is released
    pub fn close(&self) -> GateHold<'_> {
        let guard = self.lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        GateHold { gate: self, _guard: guard }
    }

    /// Block until the gate opens
    ///
    /// Returns `false` if startup was aborted and the worker should exit immediately.
    pub fn wait(&self) -> bool {
        drop(self.lock.read().unwrap_or_else(|poisoned| poisoned.into_inner()));
        !self.aborted.load(Ordering::Acquire)
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GateHold<'_> {
    /// Release all waiting workers so they start together
    pub fn open(self) {}

    /// Release all waiting workers, telling them not to run
    pub fn abort(self) {
        self.gate.aborted.store(true, Ordering::Release);
    }
}
