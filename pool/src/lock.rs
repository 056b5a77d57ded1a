//! Per-session FIFO run lock (spec.md §4.3 `run_with_lock`).
//!
//! `tokio::sync::Mutex` grants access in the order tasks call `lock().await`
//! (its internal wait queue is FIFO), which is exactly the "next waiter
//! awaits the previous one's completion" ordering spec.md asks for — no
//! custom chained-future machinery is needed on top of it.

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

#[derive(Default)]
pub struct SessionLock(Mutex<()>);

impl SessionLock {
    pub fn new() -> Self {
        Self(Mutex::new(()))
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}
