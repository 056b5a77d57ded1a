//! The `Agent` seam (spec.md §9): LLM provider internals are a non-goal, so
//! this crate only defines the boundary the run scheduler drives.

use codelia_protocol::Message;
use codelia_protocol::SandboxContext;
use futures::stream::BoxStream;

/// A streamed event produced while an `Agent` executes one turn, before the
/// run scheduler translates it into a `RunEvent` (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Text(String),
    ToolCall { id: String, name: String, arguments: String },
    ToolResult { tool_call_id: String, content: String, is_error: bool },
    Reasoning(String),
    Final(String),
    Error(String),
}

/// A running agent bound to one session. Implementations own whatever model
/// client, tool set, and internal turn-state they need; the pool only needs
/// the operations below. `&self` methods use interior mutability, mirroring
/// `Session`'s `Mutex<State>` pattern — a `PoolEntry` only ever calls into
/// its agent from within the session's FIFO lock, so no further
/// synchronization is required here.
pub trait Agent: Send + Sync + 'static {
    /// Snapshot of the conversation so far, for `save_session`.
    fn get_history_messages(&self) -> Vec<Message>;

    /// Drive one turn of the agent loop. The returned stream ends when the
    /// turn reaches a quiescent point (equivalent to one `done` event at the
    /// scheduler level).
    fn run_turn(&self, input: Message) -> BoxStream<'static, AgentEvent>;

    /// Apply a runtime settings update (e.g. permission rule change).
    fn apply_settings(&self, settings: serde_json::Value);
}

/// Constructs a fresh `Agent` for a session, seeded with its prior history.
pub trait AgentFactory<A: Agent>: Send + Sync + 'static {
    fn create(&self, session_id: &str, sandbox: &SandboxContext, history: Vec<Message>) -> A;
}
