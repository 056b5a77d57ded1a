use async_trait::async_trait;
use codelia_protocol::SessionState;
use codelia_protocol::Summary;

use crate::error::StoreError;

/// C2: persists `SessionState` keyed by `session_id` (spec.md §4.2).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    /// Atomic replace. Must succeed even when `state.messages` is empty.
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Ordered by `updated_at` descending.
    async fn list(&self) -> Result<Vec<Summary>, StoreError>;

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
}
