//! Unifies the per-crate error types behind one taxonomy (spec.md §7). Kinds
//! describe how a caller should react, not which crate raised the error.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Cancelled,
    Transient,
    Fatal,
}

#[derive(Debug, Error)]
pub enum CodeliaErr {
    #[error(transparent)]
    Permission(#[from] codelia_permission::PermissionError),
    #[error(transparent)]
    Store(#[from] codelia_sessions::StoreError),
    #[error(transparent)]
    Pool(#[from] codelia_pool::PoolError),
    #[error(transparent)]
    Scheduler(#[from] codelia_scheduler::SchedulerError),
    #[error(transparent)]
    OAuth(#[from] codelia_oauth::OAuthErr),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Fatal(String),
}

impl CodeliaErr {
    pub fn kind(&self) -> ErrorKind {
        use codelia_scheduler::SchedulerError;

        match self {
            CodeliaErr::InvalidInput(_) => ErrorKind::InvalidInput,
            CodeliaErr::Fatal(_) => ErrorKind::Fatal,
            CodeliaErr::Permission(_) => ErrorKind::InvalidInput,
            CodeliaErr::Store(_) => ErrorKind::Transient,
            CodeliaErr::Pool(codelia_pool::PoolError::Disposed(_)) => ErrorKind::Conflict,
            CodeliaErr::Pool(codelia_pool::PoolError::Store(_)) => ErrorKind::Transient,
            CodeliaErr::Scheduler(err) => match err {
                SchedulerError::NotFound(_) => ErrorKind::NotFound,
                SchedulerError::SeqConflict(..) => ErrorKind::Conflict,
                SchedulerError::Database(_) => ErrorKind::Transient,
                SchedulerError::Migration(_) => ErrorKind::Fatal,
            },
            CodeliaErr::OAuth(err) => match err {
                codelia_oauth::OAuthErr::MissingCode | codelia_oauth::OAuthErr::StateMismatch => {
                    ErrorKind::InvalidInput
                }
                codelia_oauth::OAuthErr::Upstream(_) => ErrorKind::InvalidInput,
                codelia_oauth::OAuthErr::CallbackFailed(_) => ErrorKind::Transient,
                codelia_oauth::OAuthErr::Timeout => ErrorKind::Cancelled,
                codelia_oauth::OAuthErr::Cancelled => ErrorKind::Cancelled,
                codelia_oauth::OAuthErr::Io(_) => ErrorKind::Fatal,
            },
        }
    }
}
