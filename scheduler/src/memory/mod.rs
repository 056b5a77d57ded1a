mod backend;
pub(crate) mod translate;

pub use backend::MemoryBackend;
pub use backend::TERMINAL_RETENTION;
