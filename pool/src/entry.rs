use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Instant;

use codelia_protocol::SandboxContext;
use tokio::sync::Mutex;

use crate::abort::AbortHandle;
use crate::agent::Agent;
use crate::lock::SessionLock;

/// spec.md §3 `PoolEntry`: `{agent, sandbox, tools, last_access, active_runs,
/// abort_handle?, run_lock_chain}`. `tools` is left opaque here — tool
/// wiring is the agent implementation's concern, a non-goal of this crate.
pub struct PoolEntry<A: Agent> {
    pub agent: Arc<A>,
    pub sandbox: SandboxContext,
    last_access: Mutex<Instant>,
    active_runs: AtomicUsize,
    abort_handle: Mutex<Option<AbortHandle>>,
    lock: SessionLock,
}

impl<A: Agent> PoolEntry<A> {
    pub fn new(agent: A, sandbox: SandboxContext) -> Self {
        Self {
            agent: Arc::new(agent),
            sandbox,
            last_access: Mutex::new(Instant::now()),
            active_runs: AtomicUsize::new(0),
            abort_handle: Mutex::new(None),
            lock: SessionLock::new(),
        }
    }

    pub async fn touch(&self) {
        *self.last_access.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> std::time::Duration {
        self.last_access.lock().await.elapsed()
    }

    pub fn active_runs(&self) -> usize {
        self.active_runs.load(Ordering::SeqCst)
    }

    pub async fn has_abort_handle(&self) -> bool {
        self.abort_handle.lock().await.is_some()
    }

    /// Acquires the FIFO session lock, tracks `active_runs`, and installs a
    /// fresh `AbortHandle` for the duration of `f`. Per spec.md §4.3
    /// `run_with_lock`: at most one concurrent invocation of `f` per entry.
    pub async fn run_with_lock<F, Fut, T>(self: &Arc<Self>, f: F) -> T
    where
        F: FnOnce(Arc<Self>, AbortHandle) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self.lock.acquire().await;
        self.touch().await;
        let handle = AbortHandle::new();
        *self.abort_handle.lock().await = Some(handle.clone());
        self.active_runs.fetch_add(1, Ordering::SeqCst);

        let result = f(self.clone(), handle).await;

        self.active_runs.fetch_sub(1, Ordering::SeqCst);
        *self.abort_handle.lock().await = None;
        result
    }

    /// Signals the current abort handle, if any. Returns `true` iff a
    /// cancellation was delivered.
    pub async fn cancel(&self) -> bool {
        self.cancel_with("cancelled by user").await
    }

    pub async fn cancel_with(&self, reason: &str) -> bool {
        match self.abort_handle.lock().await.as_ref() {
            Some(handle) => handle.signal(reason.to_string()),
            None => false,
        }
    }
}
