use std::time::Duration;

use async_trait::async_trait;
use codelia_protocol::RunEvent;
use codelia_protocol::RunRecord;
use codelia_protocol::RunStatus;

use crate::cancel::CancelToken;
use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Event,
    Timeout,
    Aborted,
    Missing,
}

/// spec.md §4.4: two backends (in-memory, Postgres) exposing the same API.
/// Kept as a trait with two concrete implementors rather than a tagged
/// enum — spec.md §9 calls this out explicitly ("Dynamic dispatch of
/// backends").
#[async_trait]
pub trait RunBackend: Send + Sync {
    async fn create_run(&self, session_id: &str, input_text: &str) -> Result<RunRecord, SchedulerError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, SchedulerError>;

    async fn list_runs(
        &self,
        session_id: &str,
        statuses: Option<&[RunStatus]>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, SchedulerError>;

    async fn list_events_after(
        &self,
        run_id: &str,
        after_seq: i64,
        limit: usize,
    ) -> Result<Vec<RunEvent>, SchedulerError>;

    async fn request_cancel(&self, run_id: &str) -> Result<bool, SchedulerError>;

    async fn wait_for_new_event(
        &self,
        run_id: &str,
        after_seq: i64,
        cancel: CancelToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, SchedulerError>;

    fn is_terminal_status(&self, status: RunStatus) -> bool {
        status.is_terminal()
    }

    async fn dispose(&self);
}
