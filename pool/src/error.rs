use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("session store error: {0}")]
    Store(#[from] codelia_sessions::StoreError),
    #[error("pool entry for session {0} has been disposed")]
    Disposed(String),
}
