mod abort;
mod agent;
mod entry;
mod error;
mod lock;
mod pool;

pub use abort::AbortHandle;
pub use agent::Agent;
pub use agent::AgentEvent;
pub use agent::AgentFactory;
pub use entry::PoolEntry;
pub use error::PoolError;
pub use lock::SessionLock;
pub use pool::AgentPool;
pub use pool::IDLE_TIMEOUT;
