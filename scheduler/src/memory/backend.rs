use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use codelia_pool::Agent;
use codelia_pool::AgentEvent;
use codelia_pool::AgentFactory;
use codelia_pool::AgentPool;
use codelia_protocol::Content;
use codelia_protocol::EventType;
use codelia_protocol::Message;
use codelia_protocol::RunEvent;
use codelia_protocol::RunRecord;
use codelia_protocol::RunStatus;
use codelia_sessions::SessionStore;
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::backend::RunBackend;
use crate::backend::WaitOutcome;
use crate::cancel::CancelToken;
use crate::cancel::is_abort_like;
use crate::error::SchedulerError;
use crate::memory::translate::translate;

/// spec.md §4.4.1: drop terminal records finished more than this long ago.
pub const TERMINAL_RETENTION: Duration = Duration::from_secs(30 * 60);
const RETENTION_GC_TICK: Duration = Duration::from_secs(5 * 60);
const SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);

struct RunSlot {
    record: RunRecord,
    events: Vec<RunEvent>,
    listeners: Vec<async_channel::Sender<()>>,
}

/// In-memory `RunBackend` (spec.md §4.4.1). Grounded on `codex.rs`'s
/// submission loop: `create_run` schedules `start_run` as a detached task
/// the same way `Codex::spawn` hands a `Submission` to a background task
/// and returns immediately.
pub struct MemoryBackend<A: Agent, F: AgentFactory<A>> {
    pool: Arc<AgentPool<A, F>>,
    session_store: Arc<dyn SessionStore>,
    records: Arc<RwLock<HashMap<String, RunSlot>>>,
    last_saved: Arc<std::sync::Mutex<HashMap<String, Instant>>>,
    gc_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    weak_self: std::sync::Mutex<Option<std::sync::Weak<Self>>>,
}

impl<A: Agent, F: AgentFactory<A>> MemoryBackend<A, F> {
    pub fn new(pool: Arc<AgentPool<A, F>>, session_store: Arc<dyn SessionStore>) -> Arc<Self> {
        let backend = Arc::new(Self {
            pool,
            session_store,
            records: Arc::new(RwLock::new(HashMap::new())),
            last_saved: Arc::new(std::sync::Mutex::new(HashMap::new())),
            gc_task: std::sync::Mutex::new(None),
            weak_self: std::sync::Mutex::new(None),
        });
        let gc_handle = spawn_retention_gc(Arc::downgrade(&backend));
        if let Ok(mut slot) = backend.gc_task.lock() {
            *slot = Some(gc_handle);
        }
        if let Ok(mut weak_self) = backend.weak_self.lock() {
            *weak_self = Some(Arc::downgrade(&backend));
        }
        backend
    }

    async fn append_event(&self, run_id: &str, event_type: EventType, data: serde_json::Value) {
        let mut records = self.records.write().await;
        let Some(slot) = records.get_mut(run_id) else { return };
        let seq = slot.events.len() as u64;
        slot.events.push(RunEvent::new(seq, event_type, data));
        for listener in slot.listeners.drain(..) {
            let _ = listener.try_send(());
        }
    }

    async fn set_record<T>(&self, run_id: &str, f: impl FnOnce(&mut RunRecord) -> T) -> Option<T> {
        let mut records = self.records.write().await;
        records.get_mut(run_id).map(|slot| f(&mut slot.record))
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

    async fn start_run(self: Arc<Self>, run_id: String) {
        let Some(session_id) = self.set_record(&run_id, |r| r.session_id.clone()).await else {
            return;
        };
        let input_text = self.set_record(&run_id, |r| {
            r.status = RunStatus::Running;
            r.started_at = Some(Utc::now());
            r.input_text.clone()
        }).await;
        let Some(input_text) = input_text else { return };

        let already_cancel_requested = self
            .set_record(&run_id, |r| r.cancel_requested_at.is_some())
            .await
            .unwrap_or(false);
        if already_cancel_requested {
            self.finish_run(&run_id, &session_id, RunStatus::Cancelled, None).await;
            return;
        }

        let backend = self.clone();
        let session_id_for_run = session_id.clone();
        let run_id_for_run = run_id.clone();
        self.pool
            .run_with_lock(&session_id, move |entry, abort| async move {
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
                        backend.append_event(&run_id_for_run, event_type, data).await;
                        break;
                    }
                    let (event_type, data) = translate(&event);
                    backend.append_event(&run_id_for_run, event_type, data).await;
                    backend
                        .maybe_save_session(&session_id_for_run, entry.agent.get_history_messages(), &run_id_for_run, false)
                        .await;
                }

                let status = if abort.is_aborted() || failure.as_deref().is_some_and(is_abort_like) {
                    RunStatus::Cancelled
                } else if failure.is_some() {
                    RunStatus::Failed
                } else {
                    RunStatus::Completed
                };
                backend.finish_run(&run_id_for_run, &session_id_for_run, status, failure).await;
            })
            .await
            .ok();
    }

    async fn finish_run(&self, run_id: &str, session_id: &str, status: RunStatus, error_message: Option<String>) {
        let updated = self
            .set_record(run_id, |r| {
                r.status = status;
                r.finished_at = Some(Utc::now());
                r.error_message = error_message.clone();
            })
            .await;
        if updated.is_none() {
            return;
        }
        self.append_event(run_id, EventType::Done, serde_json::json!({ "status": status })).await;

        if let Ok(entry) = self.pool.get_or_create(session_id).await {
            self.maybe_save_session(session_id, entry.agent.get_history_messages(), run_id, true).await;
        }
    }

    async fn retention_gc(&self) {
        let mut records = self.records.write().await;
        let cutoff = Utc::now() - chrono::Duration::from_std(TERMINAL_RETENTION).unwrap_or_default();
        records.retain(|_, slot| {
            !(slot.record.status.is_terminal() && slot.record.finished_at.is_some_and(|at| at < cutoff))
        });
    }
}

#[async_trait]
impl<A: Agent, F: AgentFactory<A>> RunBackend for MemoryBackend<A, F> {
    async fn create_run(&self, session_id: &str, input_text: &str) -> Result<RunRecord, SchedulerError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let record = RunRecord::new(run_id.clone(), session_id, input_text.to_string());
        let inserted = record.clone();
        self.records.write().await.insert(
            run_id.clone(),
            RunSlot { record, events: Vec::new(), listeners: Vec::new() },
        );
        // `start_run` runs as a detached task; the caller gets `(run_id,
        // "queued")` back immediately per spec.md §4.4.1.
        let weak = self.weak_self.lock().ok().and_then(|guard| guard.clone());
        if let Some(weak) = weak {
            let run_id = run_id.clone();
            tokio::spawn(async move {
                if let Some(backend) = weak.upgrade() {
                    backend.start_run(run_id).await;
                }
            });
        }
        Ok(inserted)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, SchedulerError> {
        Ok(self.records.read().await.get(run_id).map(|s| s.record.clone()))
    }

    async fn list_runs(
        &self,
        session_id: &str,
        statuses: Option<&[RunStatus]>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, SchedulerError> {
        let records = self.records.read().await;
        let mut matched: Vec<RunRecord> = records
            .values()
            .map(|s| s.record.clone())
            .filter(|r| r.session_id == session_id)
            .filter(|r| statuses.is_none_or(|statuses| statuses.contains(&r.status)))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit.min(100));
        Ok(matched)
    }

    async fn list_events_after(
        &self,
        run_id: &str,
        after_seq: i64,
        limit: usize,
    ) -> Result<Vec<RunEvent>, SchedulerError> {
        let records = self.records.read().await;
        let Some(slot) = records.get(run_id) else {
            return Err(SchedulerError::NotFound(run_id.to_string()));
        };
        Ok(slot
            .events
            .iter()
            .filter(|e| e.seq as i64 > after_seq)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn request_cancel(&self, run_id: &str) -> Result<bool, SchedulerError> {
        let session_id = self
            .set_record(run_id, |r| {
                r.request_cancel();
                r.session_id.clone()
            })
            .await;
        if let Some(session_id) = &session_id {
            self.pool.cancel_run(session_id).await;
        }
        Ok(session_id.is_some())
    }

    async fn wait_for_new_event(
        &self,
        run_id: &str,
        after_seq: i64,
        cancel: CancelToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, SchedulerError> {
        {
            let records = self.records.read().await;
            match records.get(run_id) {
                None => return Ok(WaitOutcome::Missing),
                Some(slot) if slot.events.len() as i64 > after_seq => return Ok(WaitOutcome::Event),
                _ => {}
            }
        }
        let (tx, rx) = async_channel::bounded::<()>(1);
        {
            let mut records = self.records.write().await;
            match records.get_mut(run_id) {
                None => return Ok(WaitOutcome::Missing),
                Some(slot) => slot.listeners.push(tx),
            }
        }
        let timeout = timeout.max(Duration::from_millis(100));
        tokio::select! {
            result = rx.recv() => Ok(if result.is_ok() { WaitOutcome::Event } else { WaitOutcome::Missing }),
            () = cancel.cancelled() => Ok(WaitOutcome::Aborted),
            () = tokio::time::sleep(timeout) => Ok(WaitOutcome::Timeout),
        }
    }

    async fn dispose(&self) {
        if let Ok(mut task) = self.gc_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        self.records.write().await.clear();
    }
}

fn spawn_retention_gc<A: Agent, F: AgentFactory<A>>(backend: std::sync::Weak<MemoryBackend<A, F>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(RETENTION_GC_TICK);
        loop {
            tick.tick().await;
            let Some(backend) = backend.upgrade() else { break };
            backend.retention_gc().await;
        }
    })
}
