use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use codelia_protocol::SandboxContext;
use codelia_protocol::SessionState;
use codelia_sessions::SessionStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::agent::Agent;
use crate::agent::AgentFactory;
use crate::entry::PoolEntry;
use crate::error::PoolError;

/// spec.md §4.3: entries are evictable once idle this long with nothing
/// in flight.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const EVICTION_TICK: Duration = Duration::from_secs(60);

const SANDBOX_TTL_ENV: &str = "CODELIA_SANDBOX_TTL_SECONDS";
const SANDBOX_TTL_MIN: u64 = 60;
const SANDBOX_TTL_MAX: u64 = 30 * 24 * 60 * 60;
const SANDBOX_TTL_DEFAULT: u64 = 12 * 60 * 60;

/// Maps `session_id -> PoolEntry` (spec.md §4.3 C3).
pub struct AgentPool<A: Agent, F: AgentFactory<A>> {
    entries: RwLock<HashMap<String, Arc<PoolEntry<A>>>>,
    factory: F,
    store: Arc<dyn SessionStore>,
    sandbox_root: PathBuf,
    sandbox_ttl: Duration,
    reaping: AtomicBool,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<A: Agent, F: AgentFactory<A>> AgentPool<A, F> {
    pub fn new(factory: F, store: Arc<dyn SessionStore>, sandbox_root: PathBuf) -> Arc<Self> {
        let pool = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            factory,
            store,
            sandbox_root,
            sandbox_ttl: sandbox_ttl_from_env(),
            reaping: AtomicBool::new(false),
            background: std::sync::Mutex::new(Vec::new()),
        });

        let eviction = spawn_idle_eviction(Arc::downgrade(&pool));
        let reaper = spawn_sandbox_reaper(Arc::downgrade(&pool));
        if let Ok(mut background) = pool.background.lock() {
            background.push(eviction);
            background.push(reaper);
        }
        pool
    }

    /// Idempotent: returns the existing entry if present, otherwise
    /// allocates a sandbox, loads history and runtime settings from C2, and
    /// constructs a new agent via the factory.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<PoolEntry<A>>, PoolError> {
        if let Some(entry) = self.entries.read().await.get(session_id) {
            entry.touch().await;
            return Ok(entry.clone());
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(session_id) {
            entry.touch().await;
            return Ok(entry.clone());
        }

        let stored = self.store.load(session_id).await?;
        let history = stored.as_ref().map(|state| state.messages.clone()).unwrap_or_default();
        let settings = stored.and_then(|state| state.meta);
        let sandbox = SandboxContext::new(session_id, self.sandbox_root.clone());
        let agent = self.factory.create(session_id, &sandbox, history);
        if let Some(settings) = settings {
            agent.apply_settings(settings);
        }
        let entry = Arc::new(PoolEntry::new(agent, sandbox));
        entries.insert(session_id.to_string(), entry.clone());
        Ok(entry)
    }

    /// Applies a runtime settings update to the live agent and persists it
    /// back into the session's stored `meta` (spec.md §4.3: "when settings
    /// refresh callbacks fire, persists updated settings back to the config
    /// store"), so the next `get_or_create` for this session seeds the same
    /// settings again.
    pub async fn refresh_settings(&self, session_id: &str, settings: serde_json::Value) -> Result<(), PoolError> {
        let entry = self.get_or_create(session_id).await?;
        entry.agent.apply_settings(settings.clone());

        let mut state = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id));
        state.meta = Some(settings);
        state.touch();
        self.store.save(&state).await?;
        Ok(())
    }

    /// Runs `f` under the session's FIFO lock (spec.md §4.3
    /// `run_with_lock`).
    pub async fn run_with_lock<Fn_, Fut, T>(&self, session_id: &str, f: Fn_) -> Result<T, PoolError>
    where
        Fn_: FnOnce(Arc<PoolEntry<A>>, crate::abort::AbortHandle) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let entry = self.get_or_create(session_id).await?;
        Ok(entry.run_with_lock(f).await)
    }

    /// Returns `true` iff a cancellation was delivered to an in-flight run.
    pub async fn cancel_run(&self, session_id: &str) -> bool {
        match self.entries.read().await.get(session_id) {
            Some(entry) => entry.cancel().await,
            None => false,
        }
    }

    /// Snapshots `agent.get_history_messages()` and asks C2 to save it.
    /// Must only be called at a quiescent point or after run termination.
    pub async fn save_session(&self, session_id: &str) -> Result<(), PoolError> {
        let Some(entry) = self.entries.read().await.get(session_id).cloned() else {
            return Ok(());
        };
        let mut state = SessionState::new(session_id);
        state.messages = entry.agent.get_history_messages();
        state.touch();
        self.store.save(&state).await?;
        Ok(())
    }

    /// Aborts every in-flight run and drops every entry. Used when
    /// credentials/settings change.
    pub async fn invalidate_all(&self, reason: &str) {
        let mut entries = self.entries.write().await;
        for entry in entries.values() {
            entry.cancel_with(reason).await;
        }
        entries.clear();
    }

    pub async fn dispose(&self) {
        self.invalidate_all("pool disposed").await;
        if let Ok(mut background) = self.background.lock() {
            for handle in background.drain(..) {
                handle.abort();
            }
        }
    }

    async fn evict_idle(&self) {
        let mut to_remove = Vec::new();
        for (session_id, entry) in self.entries.read().await.iter() {
            let evictable = entry.idle_for().await > IDLE_TIMEOUT
                && !entry.has_abort_handle().await
                && entry.active_runs() == 0;
            if evictable {
                to_remove.push(session_id.clone());
            }
        }
        if to_remove.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        for session_id in to_remove {
            entries.remove(&session_id);
        }
    }

    async fn live_sandbox_roots(&self) -> Vec<PathBuf> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.sandbox.root_dir.clone())
            .collect()
    }

    async fn reap_sandboxes(&self) {
        if self.reaping.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = self.reap_sandboxes_inner().await;
        self.reaping.store(false, Ordering::SeqCst);
        if let Err(err) = result {
            tracing::warn!(%err, "sandbox reaper cycle failed, will retry next tick");
        }
    }

    async fn reap_sandboxes_inner(&self) -> std::io::Result<()> {
        let live = self.live_sandbox_roots().await;
        let mut entries = match tokio::fs::read_dir(&self.sandbox_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_session_dir = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("session-"));
            if !is_session_dir || live.contains(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let age = metadata
                .modified()?
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age > self.sandbox_ttl {
                if let Err(err) = tokio::fs::remove_dir_all(&path).await {
                    tracing::warn!(path = %path.display(), %err, "failed to reap sandbox directory");
                }
            }
        }
        Ok(())
    }
}

fn sandbox_ttl_from_env() -> Duration {
    let seconds = std::env::var(SANDBOX_TTL_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(SANDBOX_TTL_DEFAULT)
        .clamp(SANDBOX_TTL_MIN, SANDBOX_TTL_MAX);
    Duration::from_secs(seconds)
}

fn spawn_idle_eviction<A: Agent, F: AgentFactory<A>>(pool: Weak<AgentPool<A, F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(EVICTION_TICK);
        loop {
            tick.tick().await;
            let Some(pool) = pool.upgrade() else { break };
            pool.evict_idle().await;
        }
    })
}

fn spawn_sandbox_reaper<A: Agent, F: AgentFactory<A>>(pool: Weak<AgentPool<A, F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(EVICTION_TICK);
        loop {
            tick.tick().await;
            let Some(pool) = pool.upgrade() else { break };
            pool.reap_sandboxes().await;
        }
    })
}
