use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthErr {
    #[error("missing authorization code")]
    MissingCode,
    #[error("invalid state")]
    StateMismatch,
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    CallbackFailed(String),
    #[error("login timed out")]
    Timeout,
    #[error("oauth cancelled")]
    Cancelled,
    #[error("callback server error: {0}")]
    Io(#[from] std::io::Error),
}
