use std::time::Duration;

const LEASE_SECONDS_ENV: &str = "CODELIA_WORKER_LEASE_SECONDS";
const LEASE_SECONDS_DEFAULT: u64 = 30;
const LEASE_SECONDS_FLOOR: u64 = 10;

const SESSION_STICKY_SECONDS_ENV: &str = "CODELIA_SESSION_STICKY_TTL_SECONDS";
const SESSION_STICKY_SECONDS_DEFAULT: u64 = 600;
const SESSION_STICKY_SECONDS_MIN: u64 = 10;
const SESSION_STICKY_SECONDS_MAX: u64 = 86_400;

const CLAIM_POLL_MS_ENV: &str = "CODELIA_CLAIM_POLL_MS";
const CLAIM_POLL_MS_DEFAULT: u64 = 1000;
const CLAIM_POLL_MS_FLOOR: u64 = 200;

pub const LEASE_RENEWAL_INTERVAL: Duration = Duration::from_secs(10);
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(750);
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const MAX_SEQ_RETRIES: u32 = 6;

pub fn lease_seconds() -> u64 {
    env_u64(LEASE_SECONDS_ENV, LEASE_SECONDS_DEFAULT).max(LEASE_SECONDS_FLOOR)
}

/// How often an idle worker polls for a claimable run.
pub fn claim_poll_interval() -> Duration {
    Duration::from_millis(env_u64(CLAIM_POLL_MS_ENV, CLAIM_POLL_MS_DEFAULT).max(CLAIM_POLL_MS_FLOOR))
}

pub fn session_sticky_seconds() -> u64 {
    env_u64(SESSION_STICKY_SECONDS_ENV, SESSION_STICKY_SECONDS_DEFAULT)
        .clamp(SESSION_STICKY_SECONDS_MIN, SESSION_STICKY_SECONDS_MAX)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// spec.md §4.4.2 "Role gating": a `worker`-role process without a database
/// URL degrades to `all` so it still serves the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Api,
    Worker,
    All,
}

impl Role {
    pub fn from_name(name: &str, has_database_url: bool) -> Self {
        match name {
            "worker" if !has_database_url => Role::All,
            "worker" => Role::Worker,
            "api" => Role::Api,
            _ => Role::All,
        }
    }

    pub fn runs_claim_loop(self) -> bool {
        matches!(self, Role::Worker | Role::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_without_database_url_degrades_to_all() {
        assert_eq!(Role::from_name("worker", false), Role::All);
        assert_eq!(Role::from_name("worker", true), Role::Worker);
    }

    #[test]
    fn api_role_does_not_run_claim_loop() {
        assert!(!Role::Api.runs_claim_loop());
        assert!(Role::All.runs_claim_loop());
        assert!(Role::Worker.runs_claim_loop());
    }
}
