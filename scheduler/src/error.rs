use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("run {0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("event seq conflict for run {0} after {1} retries")]
    SeqConflict(String, u32),
}
