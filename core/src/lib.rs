//! Root of the `codelia-core` library: the facade that wires the
//! permission engine, session store, agent pool, and run scheduler into
//! one object (`RunHost`) a front-end can construct and dispose of.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the appropriate abstraction (e.g.,
// the front-end's own protocol framing or the tracing stack).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod host;

pub use agent::Agent;
pub use agent::AgentEvent;
pub use agent::AgentFactory;
pub use bootstrap::init_tracing;
pub use config::Config;
pub use error::CodeliaErr;
pub use error::ErrorKind;
pub use host::RunHost;
