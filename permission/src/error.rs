use thiserror::Error;

/// Per spec.md §7: malformed `rawArgs` must degrade to `confirm`, never
/// `deny`. This error type exists so callers can log the malformed input,
/// but `PermissionEngine::evaluate` never returns it directly — it's caught
/// internally and converted into `Decision::Confirm`.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("bash tool call missing a `command` string in raw_args")]
    MissingCommand,
    #[error("bash path guard required to evaluate a `cd` segment")]
    MissingGuard,
}
