//! Re-exports the `Agent` seam from `codelia-pool` (spec.md §9): defining it
//! here would create a `core -> pool -> core` cycle, since `core` already
//! depends on `pool` for `AgentPool`.

pub use codelia_pool::Agent;
pub use codelia_pool::AgentEvent;
pub use codelia_pool::AgentFactory;

#[cfg(test)]
pub mod stub {
    use std::sync::Mutex;

    use codelia_protocol::Message;
    use codelia_protocol::SandboxContext;
    use futures::stream;
    use futures::stream::BoxStream;

    use super::Agent;
    use super::AgentEvent;
    use super::AgentFactory;

    /// A scripted `Agent` for pool/scheduler integration tests: replays a
    /// fixed event sequence and records turn history.
    pub struct StubAgent {
        history: Mutex<Vec<Message>>,
        events: Vec<AgentEvent>,
    }

    impl Agent for StubAgent {
        fn get_history_messages(&self) -> Vec<Message> {
            #[allow(clippy::expect_used)]
            self.history.lock().expect("lock").clone()
        }

        fn run_turn(&self, input: Message) -> BoxStream<'static, AgentEvent> {
            #[allow(clippy::expect_used)]
            self.history.lock().expect("lock").push(input);
            Box::pin(stream::iter(self.events.clone()))
        }

        fn apply_settings(&self, _settings: serde_json::Value) {}
    }

    pub struct StubFactory {
        pub events: Vec<AgentEvent>,
    }

    impl AgentFactory<StubAgent> for StubFactory {
        fn create(&self, _session_id: &str, _sandbox: &SandboxContext, history: Vec<Message>) -> StubAgent {
            StubAgent { history: Mutex::new(history), events: self.events.clone() }
        }
    }
}
