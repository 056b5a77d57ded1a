//! `SandboxContext` (spec.md §3, §4.3).

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

/// Filesystem jail rooted at a session-specific directory. Built once per
/// session by the agent pool and referenced by the permission engine's
/// `BashPathGuard` for containment checks (spec.md P6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxContext {
    pub session_id: String,
    pub sandbox_root: PathBuf,
    pub session_dir_name: String,
    pub root_dir: PathBuf,
    pub working_dir: PathBuf,
}

impl SandboxContext {
    pub fn new(session_id: impl Into<String>, sandbox_root: PathBuf) -> Self {
        let session_id = session_id.into();
        let session_dir_name = session_dir_name(&session_id);
        let root_dir = sandbox_root.join(&session_dir_name);
        let working_dir = root_dir.clone();
        Self {
            session_id,
            sandbox_root,
            session_dir_name,
            root_dir,
            working_dir,
        }
    }

    /// spec.md P6: every path a tool operates on, after resolution, lies
    /// under `root_dir`.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root_dir)
    }
}

/// `session-<slug>-<12-hex-sha1>` per spec.md §6.
fn session_dir_name(session_id: &str) -> String {
    let slug = slugify(session_id);
    let mut hasher = Sha1::new();
    hasher.update(session_id.as_bytes());
    let digest = hasher.finalize();
    let short_hash = digest.iter().take(6).map(|b| format!("{b:02x}")).collect::<String>();
    format!("session-{slug}-{short_hash}")
}

fn slugify(session_id: &str) -> String {
    let folded: String = session_id
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if folded.is_empty() {
        "session".to_string()
    } else {
        folded.chars().take(32).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn dir_name_is_lowercase_slug_plus_hash() {
        let ctx = SandboxContext::new("Session-ABC 123", PathBuf::from("/tmp/sandboxes"));
        assert!(ctx.session_dir_name.starts_with("session-session-abc123-"));
        let suffix = ctx.session_dir_name.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_session_id_falls_back_to_literal() {
        let ctx = SandboxContext::new("!!!", PathBuf::from("/tmp/sandboxes"));
        assert!(ctx.session_dir_name.starts_with("session-session-"));
    }

    #[test]
    fn containment_check() {
        let ctx = SandboxContext::new("s1", PathBuf::from("/tmp/sandboxes"));
        assert!(ctx.contains(&ctx.root_dir.join("file.txt")));
        assert!(!ctx.contains(Path::new("/etc/passwd")));
    }
}
