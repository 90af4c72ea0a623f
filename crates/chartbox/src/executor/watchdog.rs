//! Interrupt flag owner for one invocation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owns the interrupt flag the interpreter polls
///
/// The flag is raised when the deadline fires and again when the guard is
/// dropped, so a worker never outlives the invocation that started it.
#[derive(Debug, Default)]
pub struct Watchdog {
    flag: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the interpreter
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Ask the worker to stop
    pub fn fire(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.fire();
    }
}
