//! The in-memory stats store service.

use parking_lot::Mutex;
use statsync_engine::{RemoteStatsStore, StoreError, StoreResult};
use statsync_model::{StatValue, StatsDocument};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Server-side copy of one user's document.
#[derive(Debug, Clone, Default)]
struct StoredDocument {
    revision: u64,
    stats: BTreeMap<String, StatValue>,
}

/// An in-memory per-user stats document store.
///
/// Documents are keyed by `(user_id, config_id)`. Fetching an unknown user
/// yields an empty document at revision 0, so a first flush flows through
/// the same path as any other write. Upserts enforce optimistic
/// concurrency: the incoming document's revision must equal the stored
/// one, and every accepted write bumps it.
///
/// `set_online(false)` simulates an outage: every call fails with
/// [`StoreError::Unavailable`] until the service is brought back.
pub struct StatsStoreService {
    documents: Mutex<HashMap<(String, String), StoredDocument>>,
    online: AtomicBool,
    reject_writes: AtomicBool,
}

impl StatsStoreService {
    /// Creates an empty, online service.
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Simulates connectivity loss (`false`) or recovery (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true while the service accepts calls.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Makes every upsert fail permanently, as a misconfigured deployment
    /// would.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Returns the stored revision for a user, if a document exists.
    pub fn revision(&self, user_id: &str, config_id: &str) -> Option<u64> {
        self.documents
            .lock()
            .get(&(user_id.to_string(), config_id.to_string()))
            .map(|doc| doc.revision)
    }

    /// Returns a stored stat value, if present.
    pub fn stat(&self, user_id: &str, config_id: &str, name: &str) -> Option<StatValue> {
        self.documents
            .lock()
            .get(&(user_id.to_string(), config_id.to_string()))
            .and_then(|doc| doc.stats.get(name).cloned())
    }

    /// Returns the number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.lock().len()
    }

    /// Seeds a document directly, bypassing revision checks. Test setup
    /// helper.
    pub fn seed_document(
        &self,
        user_id: &str,
        config_id: &str,
        revision: u64,
        stats: impl IntoIterator<Item = StatValue>,
    ) {
        let stored = StoredDocument {
            revision,
            stats: stats
                .into_iter()
                .map(|v| (v.name().to_string(), v))
                .collect(),
        };
        self.documents
            .lock()
            .insert((user_id.to_string(), config_id.to_string()), stored);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::unavailable("stats store is offline"))
        }
    }
}

impl Default for StatsStoreService {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStatsStore for StatsStoreService {
    fn fetch_document(&self, user_id: &str, config_id: &str) -> StoreResult<StatsDocument> {
        self.check_online()?;

        let documents = self.documents.lock();
        let stored = documents
            .get(&(user_id.to_string(), config_id.to_string()))
            .cloned()
            .unwrap_or_default();
        tracing::debug!(user_id, revision = stored.revision, "document fetched");

        Ok(StatsDocument::with_stats(
            user_id,
            stored.revision,
            stored.stats.into_values(),
        ))
    }

    fn upsert_document(
        &self,
        user_id: &str,
        config_id: &str,
        document: &StatsDocument,
    ) -> StoreResult<()> {
        self.check_online()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::rejected("writes are disabled"));
        }

        let mut documents = self.documents.lock();
        let key = (user_id.to_string(), config_id.to_string());
        let stored = documents.entry(key).or_default();

        if document.revision() != stored.revision {
            tracing::debug!(
                user_id,
                expected = document.revision(),
                actual = stored.revision,
                "stale revision rejected"
            );
            return Err(StoreError::RevisionConflict {
                expected: document.revision(),
                actual: stored.revision,
            });
        }

        stored.stats = document
            .stats()
            .map(|v| (v.name().to_string(), v.clone()))
            .collect();
        stored.revision += 1;
        tracing::debug!(user_id, revision = stored.revision, "document upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_unknown_user_yields_empty_document() {
        let service = StatsStoreService::new();
        let doc = service.fetch_document("u1", "scid").unwrap();
        assert_eq!(doc.revision(), 0);
        assert!(doc.is_empty());
    }

    #[test]
    fn upsert_bumps_revision() {
        let service = StatsStoreService::new();

        let mut doc = StatsDocument::new("u1");
        doc.set_integer("kills", 3).unwrap();
        service.upsert_document("u1", "scid", &doc).unwrap();

        assert_eq!(service.revision("u1", "scid"), Some(1));
        assert_eq!(
            service.stat("u1", "scid", "kills").unwrap().as_integer(),
            Some(3)
        );

        let fetched = service.fetch_document("u1", "scid").unwrap();
        assert_eq!(fetched.revision(), 1);
    }

    #[test]
    fn stale_revision_is_rejected() {
        let service = StatsStoreService::new();
        service.seed_document("u1", "scid", 5, vec![StatValue::integer("kills", 1)]);

        let mut doc = StatsDocument::new("u1");
        doc.adopt_revision(3);
        doc.set_integer("kills", 2).unwrap();

        let err = service.upsert_document("u1", "scid", &doc).unwrap_err();
        assert_eq!(
            err,
            StoreError::RevisionConflict {
                expected: 3,
                actual: 5
            }
        );
        // The stored copy is untouched.
        assert_eq!(
            service.stat("u1", "scid", "kills").unwrap().as_integer(),
            Some(1)
        );
    }

    #[test]
    fn offline_service_fails_every_call() {
        let service = StatsStoreService::new();
        service.set_online(false);

        assert!(service.fetch_document("u1", "scid").unwrap_err().is_transient());
        let err = service
            .upsert_document("u1", "scid", &StatsDocument::new("u1"))
            .unwrap_err();
        assert!(err.is_transient());

        service.set_online(true);
        assert!(service.fetch_document("u1", "scid").is_ok());
    }

    #[test]
    fn rejected_writes_are_permanent_errors() {
        let service = StatsStoreService::new();
        service.set_reject_writes(true);

        let err = service
            .upsert_document("u1", "scid", &StatsDocument::new("u1"))
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[test]
    fn documents_are_scoped_by_config() {
        let service = StatsStoreService::new();
        service.seed_document("u1", "scid-a", 2, Vec::new());

        assert_eq!(service.revision("u1", "scid-a"), Some(2));
        assert_eq!(service.revision("u1", "scid-b"), None);
        assert_eq!(service.document_count(), 1);
    }
}
