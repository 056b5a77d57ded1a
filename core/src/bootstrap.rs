//! Tracing setup. Grounded on `exec/src/lib.rs`'s `run_main`: fall back to a
//! default filter if `RUST_LOG` is unset or unparseable, write to stderr so
//! stdout stays free for a front-end's own protocol framing.

use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Installs a global `tracing` subscriber. Safe to call more than once
/// (`try_init` swallows the "already set" error) so tests and multiple
/// front-ends can both call it without coordinating.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(DEFAULT_LEVEL))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
