//! Filesystem `SessionStore` impl: one JSON file per session, atomic
//! write-to-temp + rename (grounded on `core/src/config.rs`'s
//! `NamedTempFile::new_in(...).persist(...)` pattern).

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use codelia_protocol::SessionState;
use codelia_protocol::Summary;
use codelia_protocol::session::SCHEMA_VERSION;

use crate::error::StoreError;
use crate::store::SessionStore;

pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::StoreUnavailable(err)),
        };
        match serde_json::from_slice::<SessionState>(&bytes) {
            Ok(state) if state.schema_version == SCHEMA_VERSION => Ok(Some(state)),
            Ok(state) => {
                tracing::warn!(
                    session_id,
                    schema_version = state.schema_version,
                    "ignoring session record with unsupported schema_version"
                );
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(session_id, %err, "ignoring corrupt session record");
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(StoreError::StoreUnavailable)?;
        let body = serde_json::to_vec_pretty(state)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let root = self.root.clone();
        let dest = self.path_for(&state.session_id);
        tokio::task::spawn_blocking(move || write_atomic(&root, &dest, &body))
            .await
            .map_err(|err| StoreError::Corrupt(err.to_string()))??;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Summary>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::StoreUnavailable(err)),
        };
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StoreError::StoreUnavailable)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(state) = self.load(session_id).await? {
                summaries.push(state.to_summary());
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::StoreUnavailable(err)),
        }
    }
}

fn write_atomic(dir: &Path, dest: &Path, body: &[u8]) -> Result<(), StoreError> {
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(StoreError::StoreUnavailable)?;
    std::fs::write(tmp.path(), body).map_err(StoreError::StoreUnavailable)?;
    tmp.persist(dest)
        .map_err(|err| StoreError::StoreUnavailable(err.error))?;
    Ok(())
}
