//! Per-user revisioned stat document with dirty tracking.

use crate::error::{ModelError, ModelResult};
use crate::value::{StatData, StatValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Load state of a document.
///
/// A document starts `NotLoaded` and becomes `Loaded` once the remote copy
/// has been fetched and merged. The offline states are the best-effort
/// fallback when the remote store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentState {
    /// Placeholder; the remote copy has not been fetched yet.
    #[default]
    NotLoaded,
    /// The remote copy was fetched and merged.
    Loaded,
    /// The document was loaded once but a later write failed.
    OfflineLoaded,
    /// The remote copy was never fetched and the last attempt failed.
    OfflineNotLoaded,
}

impl DocumentState {
    /// Returns true once the remote copy has been merged in.
    pub fn is_loaded(&self) -> bool {
        matches!(self, DocumentState::Loaded)
    }

    /// Returns true if the document is in an offline fallback state.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            DocumentState::OfflineLoaded | DocumentState::OfflineNotLoaded
        )
    }
}

/// Dirty bookkeeping captured by [`StatsDocument::clear_dirty_state`].
///
/// A flush clears the marks before dispatching the network call so that
/// writes arriving while the call is in flight register as new dirt. If the
/// call fails, the captured marks are handed back via
/// [`StatsDocument::restore_dirty_state`] so the flush can be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyMarks {
    /// Names that were locally written and not yet confirmed.
    pub names: BTreeSet<String>,
    /// Names that were locally deleted and not yet confirmed.
    pub removed: BTreeSet<String>,
}

impl DirtyMarks {
    /// Returns true if nothing was dirty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.removed.is_empty()
    }
}

/// An in-memory, revision-numbered mapping from stat name to typed value.
///
/// The document tracks which names carry unconfirmed local writes
/// (`dirty_names`) and which were locally deleted (`removed_names`).
/// Deletions are recorded separately because a name in `dirty_names` must
/// always exist in `stats`; either set renders the document dirty.
///
/// The revision is a monotonically increasing counter used for
/// optimistic-concurrency upserts. It only advances after the caller
/// confirms a successful write ([`StatsDocument::advance_revision`]);
/// merging never touches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDocument {
    user_id: String,
    revision: u64,
    stats: BTreeMap<String, StatValue>,
    #[serde(skip)]
    dirty_names: BTreeSet<String>,
    #[serde(skip)]
    removed_names: BTreeSet<String>,
    #[serde(skip)]
    state: DocumentState,
}

impl StatsDocument {
    /// Creates an empty placeholder document at revision 0.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            revision: 0,
            stats: BTreeMap::new(),
            dirty_names: BTreeSet::new(),
            removed_names: BTreeSet::new(),
            state: DocumentState::NotLoaded,
        }
    }

    /// Creates a document from fetched parts.
    ///
    /// Used by remote-store implementations when materializing a fetch
    /// response; nothing is marked dirty.
    pub fn with_stats(
        user_id: impl Into<String>,
        revision: u64,
        stats: impl IntoIterator<Item = StatValue>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            revision,
            stats: stats
                .into_iter()
                .map(|v| (v.name().to_string(), v))
                .collect(),
            dirty_names: BTreeSet::new(),
            removed_names: BTreeSet::new(),
            state: DocumentState::NotLoaded,
        }
    }

    /// Returns the owning user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the current revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the load state.
    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// Sets the load state.
    pub fn set_state(&mut self, state: DocumentState) {
        self.state = state;
    }

    /// Adopts a revision observed from the remote store.
    pub fn adopt_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Advances the revision after a confirmed successful upsert.
    pub fn advance_revision(&mut self) {
        self.revision += 1;
    }

    /// Returns the stat for `name`, if present.
    pub fn get_stat(&self, name: &str) -> Option<&StatValue> {
        self.stats.get(name)
    }

    /// Returns an ordered snapshot of the current stat names.
    pub fn stat_names(&self) -> Vec<String> {
        self.stats.keys().cloned().collect()
    }

    /// Returns an iterator over the current stats.
    pub fn stats(&self) -> impl Iterator<Item = &StatValue> {
        self.stats.values()
    }

    /// Returns the number of stats in the document.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Returns true if the document holds no stats.
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Upserts a number stat and marks it dirty.
    pub fn set_number(&mut self, name: &str, value: f64) -> ModelResult<()> {
        self.set_stat(name, StatData::Number(value))
    }

    /// Upserts an integer stat and marks it dirty.
    pub fn set_integer(&mut self, name: &str, value: i64) -> ModelResult<()> {
        self.set_stat(name, StatData::Integer(value))
    }

    /// Upserts a text stat and marks it dirty.
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> ModelResult<()> {
        self.set_stat(name, StatData::Text(value.into()))
    }

    /// Upserts a stat payload and marks the name dirty.
    ///
    /// Fails only on an empty name. A name that was pending deletion is
    /// un-removed by the write.
    pub fn set_stat(&mut self, name: &str, data: StatData) -> ModelResult<()> {
        if name.is_empty() {
            return Err(ModelError::EmptyStatName);
        }

        match self.stats.get_mut(name) {
            Some(existing) => match data {
                StatData::Number(v) => existing.set_number(v),
                StatData::Integer(v) => existing.set_integer(v),
                StatData::Text(v) => existing.set_text(v),
            },
            None => {
                let value = StatValue::from_parts(name.to_string(), data);
                self.stats.insert(name.to_string(), value);
            }
        }

        self.removed_names.remove(name);
        self.dirty_names.insert(name.to_string());
        Ok(())
    }

    /// Removes a stat from the document and its dirty mark.
    ///
    /// The deletion is remembered in `removed_names` so the document stays
    /// dirty until the next full-document upsert confirms it. Returns true
    /// if the stat existed.
    pub fn delete_stat(&mut self, name: &str) -> ModelResult<bool> {
        if name.is_empty() {
            return Err(ModelError::EmptyStatName);
        }

        self.dirty_names.remove(name);
        if self.stats.remove(name).is_some() {
            self.removed_names.insert(name.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns true iff the document carries unconfirmed local changes.
    pub fn is_dirty(&self) -> bool {
        !self.dirty_names.is_empty() || !self.removed_names.is_empty()
    }

    /// Returns the names currently marked dirty.
    pub fn dirty_names(&self) -> &BTreeSet<String> {
        &self.dirty_names
    }

    /// Empties the dirty bookkeeping without altering values.
    ///
    /// Called immediately before a flush is dispatched; the returned marks
    /// let the caller restore them if the flush fails.
    pub fn clear_dirty_state(&mut self) -> DirtyMarks {
        DirtyMarks {
            names: std::mem::take(&mut self.dirty_names),
            removed: std::mem::take(&mut self.removed_names),
        }
    }

    /// Restores dirty marks captured before a failed flush.
    ///
    /// Marks for names that no longer exist in the document are dropped;
    /// marks acquired since the capture are kept.
    pub fn restore_dirty_state(&mut self, marks: DirtyMarks) {
        for name in marks.names {
            if self.stats.contains_key(&name) {
                self.dirty_names.insert(name);
            }
        }
        for name in marks.removed {
            if !self.stats.contains_key(&name) {
                self.removed_names.insert(name);
            }
        }
    }

    /// Merges a remotely-fetched document into this one.
    ///
    /// Every name present only in `remote` is copied in; for names present
    /// in both, the remote value wins unless the local copy is dirty
    /// (local-write-wins). A remote name that was pending local deletion is
    /// resurrected and dropped from `removed_names`. The revision is never
    /// touched; the call site decides revision policy via
    /// [`StatsDocument::adopt_revision`].
    pub fn merge_remote(&mut self, remote: StatsDocument) {
        for (name, value) in remote.stats {
            if self.dirty_names.contains(&name) {
                continue;
            }
            self.removed_names.remove(&name);
            self.stats.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc() -> StatsDocument {
        StatsDocument::new("user-1")
    }

    #[test]
    fn set_and_get() {
        let mut d = doc();
        d.set_number("score", 10.0).unwrap();
        d.set_text("rank", "gold").unwrap();

        assert_eq!(d.get_stat("score").unwrap().as_number(), Some(10.0));
        assert_eq!(d.get_stat("rank").unwrap().as_text(), Some("gold"));
        assert!(d.get_stat("missing").is_none());
        assert_eq!(d.stat_names(), vec!["rank".to_string(), "score".to_string()]);
    }

    #[test]
    fn empty_name_rejected() {
        let mut d = doc();
        assert_eq!(d.set_number("", 1.0), Err(ModelError::EmptyStatName));
        assert_eq!(d.delete_stat(""), Err(ModelError::EmptyStatName));
        assert!(!d.is_dirty());
    }

    #[test]
    fn writes_mark_dirty() {
        let mut d = doc();
        assert!(!d.is_dirty());

        d.set_integer("kills", 1).unwrap();
        assert!(d.is_dirty());
        assert!(d.dirty_names().contains("kills"));

        let marks = d.clear_dirty_state();
        assert!(!d.is_dirty());
        assert!(marks.names.contains("kills"));
        // Values survive the clear.
        assert_eq!(d.get_stat("kills").unwrap().as_integer(), Some(1));
    }

    #[test]
    fn delete_tracks_removal() {
        let mut d = doc();
        d.set_integer("kills", 1).unwrap();
        d.clear_dirty_state();

        assert!(d.delete_stat("kills").unwrap());
        assert!(d.get_stat("kills").is_none());
        // Deleting drops the name from dirty_names but the document stays
        // dirty until the deletion is pushed.
        assert!(d.is_dirty());
        assert!(!d.dirty_names().contains("kills"));

        // Deleting a stat that never existed is not dirt.
        let mut d2 = doc();
        assert!(!d2.delete_stat("ghost").unwrap());
        assert!(!d2.is_dirty());
    }

    #[test]
    fn set_after_delete_unremoves() {
        let mut d = doc();
        d.set_integer("kills", 1).unwrap();
        d.clear_dirty_state();
        d.delete_stat("kills").unwrap();

        d.set_integer("kills", 2).unwrap();
        let marks = d.clear_dirty_state();
        assert!(marks.removed.is_empty());
        assert!(marks.names.contains("kills"));
    }

    #[test]
    fn merge_precedence() {
        let mut local = doc();
        local.set_integer("a", 1).unwrap();
        local.set_integer("b", 2).unwrap();
        // Only `a` stays dirty.
        local.clear_dirty_state();
        local.set_integer("a", 1).unwrap();

        let remote = StatsDocument::with_stats(
            "user-1",
            7,
            vec![
                StatValue::integer("a", 99),
                StatValue::integer("b", 99),
                StatValue::integer("c", 99),
            ],
        );

        local.merge_remote(remote);

        assert_eq!(local.get_stat("a").unwrap().as_integer(), Some(1));
        assert_eq!(local.get_stat("b").unwrap().as_integer(), Some(99));
        assert_eq!(local.get_stat("c").unwrap().as_integer(), Some(99));
        // Merge never touches the revision.
        assert_eq!(local.revision(), 0);
    }

    #[test]
    fn merge_resurrects_deleted_names() {
        let mut local = doc();
        local.set_integer("a", 1).unwrap();
        local.clear_dirty_state();
        local.delete_stat("a").unwrap();

        let remote =
            StatsDocument::with_stats("user-1", 3, vec![StatValue::integer("a", 50)]);
        local.merge_remote(remote);

        assert_eq!(local.get_stat("a").unwrap().as_integer(), Some(50));
        assert!(!local.is_dirty());
    }

    #[test]
    fn restore_dirty_state_keeps_new_dirt() {
        let mut d = doc();
        d.set_integer("a", 1).unwrap();
        let marks = d.clear_dirty_state();

        // A write lands while the flush is in flight.
        d.set_integer("b", 2).unwrap();

        d.restore_dirty_state(marks);
        assert!(d.dirty_names().contains("a"));
        assert!(d.dirty_names().contains("b"));
    }

    #[test]
    fn restore_dirty_state_drops_vanished_names() {
        let mut d = doc();
        d.set_integer("a", 1).unwrap();
        let marks = d.clear_dirty_state();

        d.delete_stat("a").unwrap();
        d.restore_dirty_state(marks);

        // `a` is gone from the map, so its dirty mark is dropped; the
        // pending deletion still keeps the document dirty.
        assert!(!d.dirty_names().contains("a"));
        assert!(d.is_dirty());
    }

    #[test]
    fn revision_control() {
        let mut d = doc();
        assert_eq!(d.revision(), 0);
        d.adopt_revision(41);
        d.advance_revision();
        assert_eq!(d.revision(), 42);
    }

    #[test]
    fn state_transitions() {
        let mut d = doc();
        assert_eq!(d.state(), DocumentState::NotLoaded);
        assert!(!d.state().is_loaded());

        d.set_state(DocumentState::Loaded);
        assert!(d.state().is_loaded());

        d.set_state(DocumentState::OfflineLoaded);
        assert!(d.state().is_offline());
    }

    #[test]
    fn serde_skips_local_bookkeeping() {
        let mut d = doc();
        d.set_integer("a", 1).unwrap();
        d.set_state(DocumentState::Loaded);

        let json = serde_json::to_string(&d).unwrap();
        let back: StatsDocument = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get_stat("a").unwrap().as_integer(), Some(1));
        assert!(!back.is_dirty());
        assert_eq!(back.state(), DocumentState::NotLoaded);
    }

    proptest! {
        /// Local-write-wins: after any merge, dirty names keep their local
        /// value, clean names take the remote value, and remote-only names
        /// are copied in.
        #[test]
        fn merge_preserves_local_dirt(
            local_vals in proptest::collection::btree_map("[a-e]", 0i64..100, 0..5),
            dirty in proptest::collection::btree_set("[a-e]", 0..5),
            remote_vals in proptest::collection::btree_map("[a-g]", 100i64..200, 0..7),
        ) {
            let mut local = StatsDocument::new("u");
            for (name, v) in &local_vals {
                local.set_integer(name, *v).unwrap();
            }
            local.clear_dirty_state();
            for name in &dirty {
                if local_vals.contains_key(name) {
                    local.set_integer(name, local_vals[name]).unwrap();
                }
            }

            let remote = StatsDocument::with_stats(
                "u",
                1,
                remote_vals.iter().map(|(n, v)| StatValue::integer(n.clone(), *v)),
            );
            local.merge_remote(remote);

            for (name, v) in &remote_vals {
                let got = local.get_stat(name).unwrap().as_integer().unwrap();
                if dirty.contains(name) && local_vals.contains_key(name) {
                    prop_assert_eq!(got, local_vals[name]);
                } else {
                    prop_assert_eq!(got, *v);
                }
            }
            for (name, v) in &local_vals {
                if !remote_vals.contains_key(name) {
                    prop_assert_eq!(
                        local.get_stat(name).unwrap().as_integer().unwrap(),
                        *v
                    );
                }
            }
        }
    }
}
