#![allow(clippy::unwrap_used, clippy::expect_used)]

use codelia_protocol::Content;
use codelia_protocol::FunctionCall;
use codelia_protocol::Message;
use codelia_protocol::SessionState;
use codelia_protocol::ToolCall;
use codelia_sessions::FsSessionStore;
use codelia_sessions::SessionStore;
use codelia_sessions::normalize_pairing;

#[tokio::test]
async fn rt1_save_then_load_round_trips_modulo_updated_at() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsSessionStore::new(dir.path());
    let mut state = SessionState::new("s1");
    state.messages.push(Message::User { content: Content::text("hi") });
    store.save(&state).await.expect("save");

    let loaded = store.load("s1").await.expect("load").expect("present");
    assert_eq!(loaded.session_id, state.session_id);
    assert_eq!(loaded.messages, state.messages);
    assert_eq!(loaded.schema_version, state.schema_version);
}

#[test]
fn rt2_normalization_is_idempotent() {
    let messages = vec![
        Message::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "k1".to_string(),
                function: FunctionCall { name: "bash".to_string(), arguments: "{}".to_string() },
            }],
        },
        Message::User { content: Content::text("next") },
    ];
    let once = normalize_pairing(messages);
    let twice = normalize_pairing(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn pairing_holds_after_cancellation_mid_tool_call() {
    let messages = vec![
        Message::User { content: Content::text("hi") },
        Message::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "k".to_string(),
                function: FunctionCall { name: "bash".to_string(), arguments: "{}".to_string() },
            }],
        },
        // Cancellation arrives before the tool output is recorded.
    ];
    let normalized = normalize_pairing(messages);
    let has_unpaired_call = normalized.iter().any(|m| {
        matches!(m, Message::Assistant { tool_calls, .. } if tool_calls.iter().any(|tc| tc.id == "k"))
    });
    assert!(!has_unpaired_call);
}
