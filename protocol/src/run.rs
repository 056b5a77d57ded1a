//! `RunRecord` and `RunEvent` (spec.md §3).

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub session_id: String,
    pub status: RunStatus,
    pub input_text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_until: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, input_text: String) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            status: RunStatus::Queued,
            input_text,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            cancel_requested_at: None,
            error_message: None,
            owner_id: None,
            lease_until: None,
        }
    }

    /// Idempotent per spec.md §5 "Ordering": `coalesce` preserves the first.
    pub fn request_cancel(&mut self) {
        if self.cancel_requested_at.is_none() {
            self.cancel_requested_at = Some(Utc::now());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ToolCall,
    ToolResult,
    StepStart,
    StepComplete,
    Text,
    Final,
    CompactionComplete,
    PermissionPreview,
    PermissionReady,
    Done,
    Error,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(seq: u64, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            seq,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn done(seq: u64, status: RunStatus) -> Self {
        Self::new(
            seq,
            EventType::Done,
            serde_json::json!({ "status": status }),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn request_cancel_is_idempotent() {
        let mut record = RunRecord::new("r1", "s1", "hi".to_string());
        record.request_cancel();
        let first = record.cancel_requested_at;
        record.request_cancel();
        assert_eq!(record.cancel_requested_at, first);
    }

    #[test]
    fn done_event_serializes_status() {
        let event = RunEvent::done(3, RunStatus::Cancelled);
        assert_eq!(event.data["status"], "cancelled");
    }
}
