use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use codelia_pool::Agent;
use codelia_pool::AgentEvent;
use codelia_pool::AgentFactory;
use codelia_pool::AgentPool;
use codelia_protocol::Content;
use codelia_protocol::Message;
use codelia_protocol::RunEvent;
use codelia_protocol::RunRecord;
use codelia_protocol::RunStatus;
use codelia_sessions::SessionStore;
use futures::StreamExt;
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::backend::RunBackend;
use crate::backend::WaitOutcome;
use crate::cancel::CancelToken;
use crate::cancel::is_abort_like;
use crate::error::SchedulerError;
use crate::memory::translate::translate;
use crate::postgres::claim;
use crate::postgres::config;
use crate::postgres::config::Role;
use crate::postgres::row::EventRow;
use crate::postgres::row::RunRow;
use crate::postgres::row::event_type_to_db;
use crate::postgres::row::status_to_db;

/// Guards embedded-migration application at boot (spec.md §4.4.2 "A
/// process-wide advisory lock serializes schema migration at boot").
const MIGRATION_LOCK_KEY: i64 = 0x636f_6465_6c69_61;
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Postgres-backed `RunBackend` (spec.md §4.4.2). Grounded on
/// `clawde-io-apps`'s `mqk-db` crate for the `PgPool` + embedded-migration
/// shape; the claim transaction and lease machinery are this crate's own,
/// since the teacher has no multi-worker claim queue.
pub struct PostgresBackend<A: Agent, F: AgentFactory<A>> {
    pool: Arc<AgentPool<A, F>>,
    session_store: Arc<dyn SessionStore>,
    db: PgPool,
    worker_id: String,
    last_saved: std::sync::Mutex<HashMap<String, Instant>>,
    claim_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    weak_self: std::sync::Mutex<Option<Weak<Self>>>,
}

impl<A: Agent, F: AgentFactory<A>> PostgresBackend<A, F> {
    pub async fn new(
        pool: Arc<AgentPool<A, F>>,
        session_store: Arc<dyn SessionStore>,
        db: PgPool,
        worker_id: impl Into<String>,
        role: Role,
    ) -> Result<Arc<Self>, SchedulerError> {
        migrate_with_lock(&db).await?;

        let backend = Arc::new(Self {
            pool,
            session_store,
            db,
            worker_id: worker_id.into(),
            last_saved: std::sync::Mutex::new(HashMap::new()),
            claim_task: std::sync::Mutex::new(None),
            weak_self: std::sync::Mutex::new(None),
        });
        if let Ok(mut weak_self) = backend.weak_self.lock() {
            *weak_self = Some(Arc::downgrade(&backend));
        }
        if role.runs_claim_loop() {
            let handle = spawn_claim_loop(Arc::downgrade(&backend));
            if let Ok(mut slot) = backend.claim_task.lock() {
                *slot = Some(handle);
            }
        }
        Ok(backend)
    }

    async fn claim_and_run(self: &Arc<Self>) {
        match claim::claim_next_run(&self.db, &self.worker_id).await {
            Ok(Some(row)) => {
                let backend = self.clone();
                tokio::spawn(async move { backend.execute_claimed_run(row.into_record()).await });
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "claim attempt failed"),
        }
    }

    async fn execute_claimed_run(self: Arc<Self>, record: RunRecord) {
        let session_id = record.session_id.clone();
        let run_id = record.run_id.clone();
        let input_text = record.input_text.clone();

        if claim::cancel_requested(&self.db, &run_id).await.unwrap_or(false) {
            self.finish_run(&run_id, RunStatus::Cancelled, None).await;
            return;
        }

        let backend = self.clone();
        let worker_id = self.worker_id.clone();
        let run_id_for_run = run_id.clone();
        let session_id_for_run = session_id.clone();
        self.pool
            .run_with_lock(&session_id, move |entry, abort| async move {
                let lease_abort = abort.clone();
                let lease_backend = backend.clone();
                let lease_run_id = run_id_for_run.clone();
                let lease_session_id = session_id_for_run.clone();
                let lease_worker_id = worker_id.clone();
                let lease_task = tokio::spawn(async move {
                    let mut tick = tokio::time::interval(config::LEASE_RENEWAL_INTERVAL);
                    loop {
                        tick.tick().await;
                        if lease_abort.is_aborted() {
                            break;
                        }
                        match claim::renew_lease(&lease_backend.db, &lease_run_id, &lease_session_id, &lease_worker_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                lease_abort.signal("worker lease lost");
                                break;
                            }
                            Err(err) => tracing::warn!(%err, "lease renewal query failed"),
                        }
                    }
                });

                let cancel_abort = abort.clone();
                let cancel_backend = backend.clone();
                let cancel_run_id = run_id_for_run.clone();
                let cancel_task = tokio::spawn(async move {
                    let mut tick = tokio::time::interval(config::CANCEL_CHECK_INTERVAL);
                    loop {
                        tick.tick().await;
                        if cancel_abort.is_aborted() {
                            break;
                        }
                        match claim::cancel_requested(&cancel_backend.db, &cancel_run_id).await {
                            Ok(true) => {
                                cancel_abort.signal("cancel requested");
                                break;
                            }
                            Ok(false) => {}
                            Err(err) => tracing::warn!(%err, "cancel-check query failed"),
                        }
                    }
                });

                let input = Message::User { content: Content::text(input_text) };
                let mut stream = entry.agent.run_turn(input);
                let mut failure: Option<String> = None;

                while let Some(event) = stream.next().await {
                    if abort.is_aborted() {
                        break;
                    }
                    if let AgentEvent::Error(message) = &event {
                        failure = Some(message.clone());
                        let (event_type, data) = translate(&event);
                        backend.append_event(&run_id_for_run, event_type, data).await.ok();
                        break;
                    }
                    let (event_type, data) = translate(&event);
                    backend.append_event(&run_id_for_run, event_type, data).await.ok();
                    backend
                        .maybe_save_session(&session_id_for_run, entry.agent.get_history_messages(), &run_id_for_run, false)
                        .await;
                }

                lease_task.abort();
                cancel_task.abort();

                let status = if abort.is_aborted() || failure.as_deref().is_some_and(is_abort_like) {
                    RunStatus::Cancelled
                } else if failure.is_some() {
                    RunStatus::Failed
                } else {
                    RunStatus::Completed
                };
                let error_message = abort.reason().or(failure);
                backend
                    .maybe_save_session(&session_id_for_run, entry.agent.get_history_messages(), &run_id_for_run, true)
                    .await;
                backend.finish_run(&run_id_for_run, status, error_message).await;
            })
            .await
            .ok();
    }

    async fn append_event(&self, run_id: &str, event_type: codelia_protocol::EventType, data: serde_json::Value) -> Result<(), SchedulerError> {
        let event_type_str = event_type_to_db(event_type);
        for _ in 0..=config::MAX_SEQ_RETRIES {
            let next_seq: i64 = sqlx::query_scalar("select coalesce(max(seq), -1) + 1 from run_events where run_id = $1")
                .bind(run_id)
                .fetch_one(&self.db)
                .await?;
            let inserted = sqlx::query("insert into run_events (run_id, seq, event_type, payload) values ($1, $2, $3, $4)")
                .bind(run_id)
                .bind(next_seq)
                .bind(event_type_str)
                .bind(&data)
                .execute(&self.db)
                .await;
            match inserted {
                Ok(_) => return Ok(()),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(SchedulerError::SeqConflict(run_id.to_string(), config::MAX_SEQ_RETRIES))
    }

    async fn maybe_save_session(&self, session_id: &str, messages: Vec<Message>, run_id: &str, force: bool) {
        if !force {
            let mut last_saved = match self.last_saved.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let due = last_saved
                .get(session_id)
                .is_none_or(|at| at.elapsed() >= SAVE_DEBOUNCE);
            if !due {
                return;
            }
            last_saved.insert(session_id.to_string(), Instant::now());
        }

        let normalized = codelia_sessions::normalize_pairing(messages);
        let mut state = self
            .session_store
            .load(session_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| codelia_protocol::SessionState::new(session_id));
        state.messages = normalized;
        state.run_id = Some(run_id.to_string());
        state.touch();
        if let Err(err) = self.session_store.save(&state).await {
            tracing::warn!(session_id, %err, "failed to save session state");
        }
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus, error_message: Option<String>) {
        let result = sqlx::query(
            r#"
            update runs
            set status = $1, finished_at = now(), owner_id = null, lease_until = null, error_message = $2
            where run_id = $3
            "#,
        )
        .bind(status_to_db(status))
        .bind(error_message)
        .bind(run_id)
        .execute(&self.db)
        .await;
        if let Err(err) = result {
            tracing::warn!(%err, run_id, "failed to record terminal run status");
            return;
        }
        self.append_event(run_id, codelia_protocol::EventType::Done, serde_json::json!({ "status": status }))
            .await
            .ok();
    }
}

async fn migrate_with_lock(db: &PgPool) -> Result<(), SchedulerError> {
    let mut conn = db.acquire().await?;
    sqlx::query("select pg_advisory_lock($1)").bind(MIGRATION_LOCK_KEY).execute(&mut *conn).await?;
    let result = MIGRATOR.run(&mut *conn).await;
    sqlx::query("select pg_advisory_unlock($1)").bind(MIGRATION_LOCK_KEY).execute(&mut *conn).await?;
    result?;
    Ok(())
}

fn spawn_claim_loop<A: Agent, F: AgentFactory<A>>(backend: Weak<PostgresBackend<A, F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(backend) = backend.upgrade() else { break };
            backend.claim_and_run().await;
            tokio::time::sleep(config::claim_poll_interval()).await;
        }
    })
}

#[async_trait]
impl<A: Agent, F: AgentFactory<A>> RunBackend for PostgresBackend<A, F> {
    async fn create_run(&self, session_id: &str, input_text: &str) -> Result<RunRecord, SchedulerError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let row: RunRow = sqlx::query_as(
            r#"
            insert into runs (run_id, session_id, status, input_text)
            values ($1, $2, 'queued', $3)
            returning *
            "#,
        )
        .bind(&run_id)
        .bind(session_id)
        .bind(input_text)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into_record())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, SchedulerError> {
        let row: Option<RunRow> = sqlx::query_as("select * from runs where run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(RunRow::into_record))
    }

    async fn list_runs(&self, session_id: &str, statuses: Option<&[RunStatus]>, limit: usize) -> Result<Vec<RunRecord>, SchedulerError> {
        let limit = limit.min(100) as i64;
        let status_filter: Option<Vec<&'static str>> = statuses.map(|s| s.iter().map(|status| status_to_db(*status)).collect());
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            select * from runs
            where session_id = $1 and ($2::text[] is null or status = any($2))
            order by created_at desc
            limit $3
            "#,
        )
        .bind(session_id)
        .bind(status_filter)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(RunRow::into_record).collect())
    }

    async fn list_events_after(&self, run_id: &str, after_seq: i64, limit: usize) -> Result<Vec<RunEvent>, SchedulerError> {
        if self.get_run(run_id).await?.is_none() {
            return Err(SchedulerError::NotFound(run_id.to_string()));
        }
        let rows: Vec<EventRow> = sqlx::query_as(
            "select seq, event_type, payload, created_at from run_events where run_id = $1 and seq > $2 order by seq asc limit $3",
        )
        .bind(run_id)
        .bind(after_seq)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    async fn request_cancel(&self, run_id: &str) -> Result<bool, SchedulerError> {
        let result = sqlx::query("update runs set cancel_requested_at = coalesce(cancel_requested_at, now()) where run_id = $1")
            .bind(run_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wait_for_new_event(&self, run_id: &str, after_seq: i64, cancel: CancelToken, timeout: Duration) -> Result<WaitOutcome, SchedulerError> {
        let deadline = Instant::now() + timeout.max(Duration::from_millis(100));
        loop {
            if self.get_run(run_id).await?.is_none() {
                return Ok(WaitOutcome::Missing);
            }
            let max_seq: Option<i64> = sqlx::query_scalar("select max(seq) from run_events where run_id = $1")
                .bind(run_id)
                .fetch_one(&self.db)
                .await?;
            if max_seq.unwrap_or(-1) > after_seq {
                return Ok(WaitOutcome::Event);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::Timeout);
            }
            let step = config::WAIT_POLL_INTERVAL.min(deadline - now);
            tokio::select! {
                () = cancel.cancelled() => return Ok(WaitOutcome::Aborted),
                () = tokio::time::sleep(step) => {}
            }
        }
    }

    async fn dispose(&self) {
        if let Ok(mut task) = self.claim_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
