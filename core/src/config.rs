//! Reads the `CODELIA_*` environment variables (spec.md §6) once at startup
//! into a typed struct, the way `Config::load` assembles a value to pass
//! down rather than re-reading the environment from inside the core.

use std::path::PathBuf;

use codelia_scheduler::Role;

const SANDBOX_ROOT_ENV: &str = "CODELIA_SANDBOX_ROOT";
const RUN_ROLE_ENV: &str = "CODELIA_RUN_ROLE";
const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub sandbox_root: PathBuf,
    pub database_url: Option<String>,
    pub run_role: Role,
}

impl Config {
    /// `CODELIA_SANDBOX_TTL_SECONDS`, `CODELIA_SESSION_STICKY_TTL_SECONDS`,
    /// and `CODELIA_CLAIM_POLL_MS` are read directly by `codelia-pool` and
    /// `codelia-scheduler` at the point they're needed, so they aren't
    /// duplicated here — this struct only holds the values a `RunHost`
    /// needs before constructing those crates' types.
    pub fn from_env() -> Self {
        let database_url = std::env::var(DATABASE_URL_ENV).ok().filter(|s| !s.is_empty());
        let run_role_name = std::env::var(RUN_ROLE_ENV).unwrap_or_else(|_| "all".to_string());
        let run_role = Role::from_name(&run_role_name, database_url.is_some());

        let sandbox_root = std::env::var(SANDBOX_ROOT_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_sandbox_root());

        Self { sandbox_root, database_url, run_role }
    }
}

fn default_sandbox_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(".sandbox")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn worker_role_without_database_url_degrades_to_all() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: serialized by ENV_LOCK; no other thread in this process
        // reads/writes these two vars concurrently with this test.
        unsafe {
            std::env::remove_var(DATABASE_URL_ENV);
            std::env::set_var(RUN_ROLE_ENV, "worker");
        }
        let config = Config::from_env();
        assert_eq!(config.run_role, Role::All);
        unsafe {
            std::env::remove_var(RUN_ROLE_ENV);
        }
    }

    #[test]
    fn default_sandbox_root_falls_back_to_cwd_sandbox() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var(SANDBOX_ROOT_ENV);
        }
        let config = Config::from_env();
        assert!(config.sandbox_root.ends_with(".sandbox"));
    }
}
