//! `SessionState` and the listing `Summary` (spec.md §3, §4.2).

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::messages::Message;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub schema_version: u32,
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_seq: Option<u64>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.into(),
            updated_at: Utc::now(),
            run_id: None,
            invoke_seq: None,
            messages: Vec::new(),
            meta: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Last user message rendered as text (spec.md §4.2 `list()`).
    pub fn last_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(Message::render_text)
    }

    pub fn to_summary(&self) -> Summary {
        Summary {
            session_id: self.session_id.clone(),
            updated_at: self.updated_at,
            run_id: self.run_id.clone(),
            message_count: self.messages.len(),
            last_user_message: self.last_user_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_message: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::messages::Content;

    #[test]
    fn last_user_message_picks_most_recent() {
        let mut state = SessionState::new("s1");
        state.messages.push(Message::User {
            content: Content::text("first"),
        });
        state.messages.push(Message::Assistant {
            content: Some(Content::text("reply")),
            tool_calls: vec![],
        });
        state.messages.push(Message::User {
            content: Content::text("second"),
        });
        assert_eq!(state.last_user_message(), Some("second".to_string()));
    }

    #[test]
    fn summary_reports_message_count() {
        let mut state = SessionState::new("s1");
        state.messages.push(Message::User {
            content: Content::text("hi"),
        });
        state.messages.push(Message::Assistant {
            content: Some(Content::text("hello")),
            tool_calls: vec![],
        });
        let summary = state.to_summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_user_message, Some("hi".to_string()));
    }
}
