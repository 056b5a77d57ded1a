//! External cancel token for `wait_for_new_event` (spec.md §4.4, §5).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, otherwise waits.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Any abort-like error is classified as cancellation, not failure
/// (spec.md §5): `name` in `{AbortError, APIUserAbortError, AbortSignal}`
/// or a message matching `/abort|aborted/i`.
pub fn is_abort_like(message: &str) -> bool {
    const ABORT_NAMES: &[&str] = &["AbortError", "APIUserAbortError", "AbortSignal"];
    ABORT_NAMES.iter().any(|name| message.contains(name)) || message.to_ascii_lowercase().contains("abort")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn recognizes_abort_like_messages() {
        assert!(is_abort_like("request aborted by caller"));
        assert!(is_abort_like("AbortError: the operation was aborted"));
        assert!(!is_abort_like("connection refused"));
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_once_signaled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
