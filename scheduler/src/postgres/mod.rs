mod backend;
mod claim;
mod config;
mod row;

pub use backend::PostgresBackend;
pub use config::CANCEL_CHECK_INTERVAL;
pub use config::LEASE_RENEWAL_INTERVAL;
pub use config::Role;
pub use config::WAIT_POLL_INTERVAL;
pub use config::claim_poll_interval;
pub use config::lease_seconds;
pub use config::session_sticky_seconds;
