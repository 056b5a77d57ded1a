//! Cancellation handle for an in-flight run (spec.md §4.3 `cancel_run`).

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

#[derive(Clone)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `true` iff this call delivered the signal (i.e. it was not
    /// already aborted).
    pub fn signal(&self, reason: impl Into<String>) -> bool {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.reason.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason.into());
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}
