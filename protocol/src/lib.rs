//! Shared data model for the Codelia execution core.
//!
//! This crate has no async runtime and no I/O: it is the wire/storage
//! format shared by the permission engine, session store, agent pool, and
//! run scheduler. Mirrors the role `codex_protocol` plays for `codex-rs`.

pub mod messages;
pub mod permission;
pub mod run;
pub mod sandbox;
pub mod session;

pub use messages::Content;
pub use messages::ContentPart;
pub use messages::FunctionCall;
pub use messages::Message;
pub use messages::ToolCall;
pub use permission::PermissionRule;
pub use permission::RuleSet;
pub use run::EventType;
pub use run::RunEvent;
pub use run::RunRecord;
pub use run::RunStatus;
pub use sandbox::SandboxContext;
pub use session::SessionState;
pub use session::Summary;
