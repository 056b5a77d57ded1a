#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use codelia_pool::Agent;
use codelia_pool::AgentEvent;
use codelia_pool::AgentFactory;
use codelia_pool::AgentPool;
use codelia_protocol::Content;
use codelia_protocol::Message;
use codelia_protocol::SandboxContext;
use codelia_sessions::FsSessionStore;
use futures::stream;
use futures::stream::BoxStream;

struct StubAgent {
    history: StdMutex<Vec<Message>>,
    settings: StdMutex<Option<serde_json::Value>>,
}

impl Agent for StubAgent {
    fn get_history_messages(&self) -> Vec<Message> {
        self.history.lock().expect("lock").clone()
    }

    fn run_turn(&self, input: Message) -> BoxStream<'static, AgentEvent> {
        self.history.lock().expect("lock").push(input);
        Box::pin(stream::iter(vec![AgentEvent::Final("done".to_string())]))
    }

    fn apply_settings(&self, settings: serde_json::Value) {
        *self.settings.lock().expect("lock") = Some(settings);
    }
}

struct StubFactory;

impl AgentFactory<StubAgent> for StubFactory {
    fn create(&self, _session_id: &str, _sandbox: &SandboxContext, history: Vec<Message>) -> StubAgent {
        StubAgent { history: StdMutex::new(history), settings: StdMutex::new(None) }
    }
}

fn pool(sandbox_root: PathBuf) -> Arc<AgentPool<StubAgent, StubFactory>> {
    let store_dir = sandbox_root.join("store");
    AgentPool::new(StubFactory, Arc::new(FsSessionStore::new(store_dir)), sandbox_root)
}

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    let first = pool.get_or_create("s1").await.expect("entry");
    let second = pool.get_or_create("s1").await.expect("entry");
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn run_with_lock_serializes_calls_for_one_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    let order = Arc::new(StdMutex::new(Vec::new()));

    let o1 = order.clone();
    let o2 = order.clone();
    let (a, b) = tokio::join!(
        pool.run_with_lock("s1", move |entry, _abort| async move {
            entry.agent.run_turn(Message::User { content: Content::text("1") });
            o1.lock().expect("lock").push(1);
        }),
        pool.run_with_lock("s1", move |entry, _abort| async move {
            entry.agent.run_turn(Message::User { content: Content::text("2") });
            o2.lock().expect("lock").push(2);
        }),
    );
    a.expect("run 1");
    b.expect("run 2");
    assert_eq!(order.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn cancel_run_without_inflight_run_returns_false() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    pool.get_or_create("s1").await.expect("entry");
    assert!(!pool.cancel_run("s1").await);
}

#[tokio::test]
async fn save_session_persists_agent_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    let entry = pool.get_or_create("s1").await.expect("entry");
    entry.agent.run_turn(Message::User { content: Content::text("hi") });
    pool.save_session("s1").await.expect("save");

    let store = FsSessionStore::new(dir.path().join("store"));
    let loaded = codelia_sessions::SessionStore::load(&store, "s1")
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.messages.len(), 1);
}

#[tokio::test]
async fn refresh_settings_applies_to_the_live_agent_and_persists() {
    use serde_json::json;

    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    let entry = pool.get_or_create("s1").await.expect("entry");
    assert_eq!(*entry.agent.settings.lock().expect("lock"), None);

    pool.refresh_settings("s1", json!({ "model": "big" })).await.expect("refresh_settings");
    assert_eq!(
        entry.agent.settings.lock().expect("lock").clone(),
        Some(json!({ "model": "big" }))
    );

    let store = FsSessionStore::new(dir.path().join("store"));
    let loaded = codelia_sessions::SessionStore::load(&store, "s1")
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.meta, Some(json!({ "model": "big" })));
}

#[tokio::test]
async fn get_or_create_seeds_a_new_agent_with_previously_saved_settings() {
    use serde_json::json;

    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    pool.refresh_settings("s1", json!({ "model": "big" })).await.expect("refresh_settings");
    pool.invalidate_all("reload").await;

    let entry = pool.get_or_create("s1").await.expect("entry");
    assert_eq!(
        entry.agent.settings.lock().expect("lock").clone(),
        Some(json!({ "model": "big" }))
    );
}

#[tokio::test]
async fn invalidate_all_clears_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = pool(dir.path().to_path_buf());
    let first = pool.get_or_create("s1").await.expect("entry");
    pool.invalidate_all("settings changed").await;
    let second = pool.get_or_create("s1").await.expect("entry");
    assert!(!Arc::ptr_eq(&first, &second));
}
