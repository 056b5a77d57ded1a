mod backend;
mod cancel;
mod error;
mod memory;
mod postgres;

pub use backend::RunBackend;
pub use backend::WaitOutcome;
pub use cancel::CancelToken;
pub use cancel::is_abort_like;
pub use error::SchedulerError;
pub use memory::MemoryBackend;
pub use memory::TERMINAL_RETENTION;
pub use postgres::PostgresBackend;
pub use postgres::Role;
