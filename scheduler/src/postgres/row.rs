use chrono::DateTime;
use chrono::Utc;
use codelia_protocol::EventType;
use codelia_protocol::RunEvent;
use codelia_protocol::RunRecord;
use codelia_protocol::RunStatus;
use sqlx::FromRow;

#[derive(FromRow)]
pub struct RunRow {
    pub run_id: String,
    pub session_id: String,
    pub status: String,
    pub input_text: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl RunRow {
    pub fn into_record(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            session_id: self.session_id,
            status: status_from_db(&self.status),
            input_text: self.input_text,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            cancel_requested_at: self.cancel_requested_at,
            error_message: self.error_message,
            owner_id: self.owner_id,
            lease_until: self.lease_until,
        }
    }
}

pub fn status_to_db(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn status_from_db(status: &str) -> RunStatus {
    match status {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Queued,
    }
}

#[derive(FromRow)]
pub struct EventRow {
    pub seq: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn into_event(self) -> RunEvent {
        RunEvent {
            seq: self.seq as u64,
            event_type: event_type_from_db(&self.event_type),
            data: self.payload,
            created_at: self.created_at,
        }
    }
}

pub fn event_type_to_db(event_type: EventType) -> &'static str {
    match event_type {
        EventType::ToolCall => "tool_call",
        EventType::ToolResult => "tool_result",
        EventType::StepStart => "step_start",
        EventType::StepComplete => "step_complete",
        EventType::Text => "text",
        EventType::Final => "final",
        EventType::CompactionComplete => "compaction_complete",
        EventType::PermissionPreview => "permission_preview",
        EventType::PermissionReady => "permission_ready",
        EventType::Done => "done",
        EventType::Error => "error",
        EventType::Ping => "ping",
    }
}

fn event_type_from_db(event_type: &str) -> EventType {
    match event_type {
        "tool_call" => EventType::ToolCall,
        "tool_result" => EventType::ToolResult,
        "step_start" => EventType::StepStart,
        "step_complete" => EventType::StepComplete,
        "final" => EventType::Final,
        "compaction_complete" => EventType::CompactionComplete,
        "permission_preview" => EventType::PermissionPreview,
        "permission_ready" => EventType::PermissionReady,
        "done" => EventType::Done,
        "error" => EventType::Error,
        "ping" => EventType::Ping,
        _ => EventType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status_from_db(status_to_db(status)), status);
        }
    }

    #[test]
    fn event_type_round_trips_through_db_strings() {
        for event_type in [
            EventType::ToolCall,
            EventType::ToolResult,
            EventType::Text,
            EventType::Final,
            EventType::Done,
            EventType::Error,
        ] {
            assert_eq!(event_type_from_db(event_type_to_db(event_type)), event_type);
        }
    }
}
