use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),
    #[error("session state is corrupt: {0}")]
    Corrupt(String),
}
