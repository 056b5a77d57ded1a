//! Wires `AgentPool` + a chosen `RunBackend` + `SessionStore` + the
//! permission ruleset into the one object a front-end constructs, matching
//! spec.md §9 ("there is no singleton ... lifecycles are explicit").

use std::sync::Arc;
use std::time::Duration;

use codelia_permission::BashPathGuard;
use codelia_permission::Evaluation;
use codelia_permission::PermissionEngine;
use codelia_pool::Agent;
use codelia_pool::AgentFactory;
use codelia_pool::AgentPool;
use codelia_protocol::RunEvent;
use codelia_protocol::RunRecord;
use codelia_protocol::RunStatus;
use codelia_protocol::RuleSet;
use codelia_scheduler::CancelToken;
use codelia_scheduler::RunBackend;
use codelia_scheduler::WaitOutcome;
use codelia_sessions::SessionStore;
use tokio::sync::RwLock;

use crate::error::CodeliaErr;

/// The single object a front-end (HTTP/SSE or JSON-RPC over stdio) builds
/// and holds for the process lifetime.
pub struct RunHost<A: Agent, F: AgentFactory<A>> {
    pool: Arc<AgentPool<A, F>>,
    backend: Arc<dyn RunBackend>,
    store: Arc<dyn SessionStore>,
    rules: RwLock<RuleSet>,
}

impl<A: Agent, F: AgentFactory<A>> RunHost<A, F> {
    pub fn new(
        pool: Arc<AgentPool<A, F>>,
        backend: Arc<dyn RunBackend>,
        store: Arc<dyn SessionStore>,
        rules: RuleSet,
    ) -> Arc<Self> {
        Arc::new(Self { pool, backend, store, rules: RwLock::new(rules) })
    }

    pub fn backend(&self) -> &Arc<dyn RunBackend> {
        &self.backend
    }

    pub fn pool(&self) -> &Arc<AgentPool<A, F>> {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn replace_rules(&self, rules: RuleSet) {
        *self.rules.write().await = rules;
    }

    /// Pure decision lookup (spec.md §4.1) against the current ruleset. No
    /// I/O besides the optional `BashPathGuard` path comparison.
    pub async fn evaluate_permission(
        &self,
        tool: &str,
        raw_args: &serde_json::Value,
        guard: Option<&BashPathGuard>,
    ) -> Evaluation {
        let rules = self.rules.read().await;
        let engine = match guard {
            Some(guard) => PermissionEngine::with_guard(&rules, guard),
            None => PermissionEngine::new(&rules),
        };
        engine.evaluate(tool, raw_args)
    }

    pub async fn create_run(&self, session_id: &str, input_text: &str) -> Result<RunRecord, CodeliaErr> {
        if input_text.trim().is_empty() {
            return Err(CodeliaErr::InvalidInput("message must not be empty".to_string()));
        }
        Ok(self.backend.create_run(session_id, input_text).await?)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CodeliaErr> {
        Ok(self.backend.get_run(run_id).await?)
    }

    pub async fn list_runs(
        &self,
        session_id: &str,
        statuses: Option<&[RunStatus]>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, CodeliaErr> {
        Ok(self.backend.list_runs(session_id, statuses, limit).await?)
    }

    pub async fn list_events_after(
        &self,
        run_id: &str,
        after_seq: i64,
        limit: usize,
    ) -> Result<Vec<RunEvent>, CodeliaErr> {
        Ok(self.backend.list_events_after(run_id, after_seq, limit).await?)
    }

    pub async fn wait_for_new_event(
        &self,
        run_id: &str,
        after_seq: i64,
        cancel: CancelToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, CodeliaErr> {
        Ok(self.backend.wait_for_new_event(run_id, after_seq, cancel, timeout).await?)
    }

    /// Requests cancellation on the backend's run record and, if that
    /// session currently has the run in flight locally, aborts it too
    /// (spec.md §4.4/§4.3: the pool and the backend are two independent
    /// cancellation paths that must both be poked).
    pub async fn request_cancel(&self, session_id: &str, run_id: &str) -> Result<bool, CodeliaErr> {
        let cancelled = self.backend.request_cancel(run_id).await?;
        self.pool.cancel_run(session_id).await;
        Ok(cancelled)
    }

    pub async fn refresh_settings(&self, session_id: &str, settings: serde_json::Value) -> Result<(), CodeliaErr> {
        Ok(self.pool.refresh_settings(session_id, settings).await?)
    }

    pub async fn dispose(&self) {
        tracing::info!("disposing run host");
        self.backend.dispose().await;
        self.pool.dispose().await;
    }
}
