//! Remote stats store boundary.

use parking_lot::Mutex;
use statsync_model::StatsDocument;
use std::collections::VecDeque;
use thiserror::Error;

/// Result type for remote store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a remote stats store.
///
/// `Unavailable` marks transient failures eligible for the offline
/// fallback; `Rejected` marks permanent rejections that retrying cannot
/// fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The upsert's expected revision is stale.
    #[error("revision conflict: expected {expected}, server has {actual}")]
    RevisionConflict {
        /// Revision the client sent.
        expected: u64,
        /// Revision the server holds.
        actual: u64,
    },

    /// The store could not be reached; the operation may be retried.
    #[error("remote store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The store rejected the request permanently.
    #[error("request rejected: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },

    /// No document exists for the user.
    #[error("no document for user {user_id}")]
    NotFound {
        /// The user id that was queried.
        user_id: String,
    },
}

impl StoreError {
    /// Creates a transient unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a permanent rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(user_id: impl Into<String>) -> Self {
        Self::NotFound {
            user_id: user_id.into(),
        }
    }

    /// Returns true if the failure is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Returns true if the failure is a stale-revision conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionConflict { .. })
    }
}

/// The remote per-user stats document store.
///
/// This trait is the engine's entire network boundary: one fetch and one
/// optimistic-concurrency upsert. Request construction, signing, and wire
/// retries all live behind it.
pub trait RemoteStatsStore: Send + Sync {
    /// Fetches the user's document; its revision reflects the server copy.
    fn fetch_document(&self, user_id: &str, config_id: &str) -> StoreResult<StatsDocument>;

    /// Writes the document, expecting `document.revision()` to match the
    /// server copy. A stale revision fails with
    /// [`StoreError::RevisionConflict`].
    fn upsert_document(
        &self,
        user_id: &str,
        config_id: &str,
        document: &StatsDocument,
    ) -> StoreResult<()>;
}

/// Extension point for persisting writes while the store is unreachable.
///
/// The default hook declines every write; actual offline persistence is
/// intentionally not implemented.
pub trait OfflineWriteHook: Send + Sync {
    /// Decides whether a failed flush should be written offline.
    fn should_write_offline(&self, _error: &StoreError) -> bool {
        false
    }

    /// Persists the document locally. Only called when
    /// [`OfflineWriteHook::should_write_offline`] returned true.
    fn write_offline(&self, _user_id: &str, _document: &StatsDocument) {}
}

/// The default hook: never writes offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOfflineWrites;

impl OfflineWriteHook for NoOfflineWrites {}

/// A scriptable store for tests.
///
/// Responses are queued per operation; when the queue is empty, fetch
/// yields an empty document at revision 0 and upsert succeeds. Every call
/// is recorded.
#[derive(Default)]
pub struct MockStatsStore {
    fetch_responses: Mutex<VecDeque<StoreResult<StatsDocument>>>,
    upsert_responses: Mutex<VecDeque<StoreResult<()>>>,
    fetch_calls: Mutex<Vec<String>>,
    upsert_calls: Mutex<Vec<(String, StatsDocument)>>,
}

impl MockStatsStore {
    /// Creates a mock with empty response queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fetch response.
    pub fn push_fetch_response(&self, response: StoreResult<StatsDocument>) {
        self.fetch_responses.lock().push_back(response);
    }

    /// Queues an upsert response.
    pub fn push_upsert_response(&self, response: StoreResult<()>) {
        self.upsert_responses.lock().push_back(response);
    }

    /// Returns the user ids fetched so far.
    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.lock().clone()
    }

    /// Returns the upserts recorded so far.
    pub fn upsert_calls(&self) -> Vec<(String, StatsDocument)> {
        self.upsert_calls.lock().clone()
    }

    /// Returns the number of upserts recorded so far.
    pub fn upsert_count(&self) -> usize {
        self.upsert_calls.lock().len()
    }
}

impl RemoteStatsStore for MockStatsStore {
    fn fetch_document(&self, user_id: &str, _config_id: &str) -> StoreResult<StatsDocument> {
        self.fetch_calls.lock().push(user_id.to_string());
        self.fetch_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(StatsDocument::new(user_id)))
    }

    fn upsert_document(
        &self,
        user_id: &str,
        _config_id: &str,
        document: &StatsDocument,
    ) -> StoreResult<()> {
        self.upsert_calls
            .lock()
            .push((user_id.to_string(), document.clone()));
        self.upsert_responses.lock().pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statsync_model::StatValue;

    #[test]
    fn error_classification() {
        assert!(StoreError::unavailable("timeout").is_transient());
        assert!(!StoreError::rejected("bad document").is_transient());
        assert!(StoreError::RevisionConflict {
            expected: 1,
            actual: 2
        }
        .is_conflict());
        assert!(!StoreError::not_found("u1").is_conflict());
    }

    #[test]
    fn default_hook_declines() {
        let hook = NoOfflineWrites;
        assert!(!hook.should_write_offline(&StoreError::unavailable("down")));
    }

    #[test]
    fn mock_defaults() {
        let store = MockStatsStore::new();

        let doc = store.fetch_document("u1", "scid").unwrap();
        assert_eq!(doc.user_id(), "u1");
        assert_eq!(doc.revision(), 0);

        store
            .upsert_document("u1", "scid", &StatsDocument::new("u1"))
            .unwrap();
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(store.fetch_calls(), vec!["u1"]);
    }

    #[test]
    fn mock_scripted_responses() {
        let store = MockStatsStore::new();
        store.push_fetch_response(Ok(StatsDocument::with_stats(
            "u1",
            5,
            vec![StatValue::integer("kills", 3)],
        )));
        store.push_upsert_response(Err(StoreError::unavailable("down")));

        let doc = store.fetch_document("u1", "scid").unwrap();
        assert_eq!(doc.revision(), 5);

        let err = store
            .upsert_document("u1", "scid", &StatsDocument::new("u1"))
            .unwrap_err();
        assert!(err.is_transient());

        // Queue exhausted: back to defaults.
        assert!(store
            .upsert_document("u1", "scid", &StatsDocument::new("u1"))
            .is_ok());
    }
}
