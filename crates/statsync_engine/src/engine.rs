//! The stat synchronization engine.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{EventQueue, StatEvent, StatEventKind};
use crate::leaderboard::LeaderboardProvider;
use crate::store::{NoOfflineWrites, OfflineWriteHook, RemoteStatsStore, StoreError};
use crate::timer::CoalescingTimer;
use parking_lot::{Condvar, Mutex};
use statsync_model::{DocumentState, LeaderboardQuery, StatValue, StatsDocument};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Counters describing engine activity.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Remote fetches started (initial loads and pre-flush loads).
    pub fetches_attempted: u64,
    /// Remote fetches that failed.
    pub fetches_failed: u64,
    /// Flush attempts dispatched to the store.
    pub flushes_attempted: u64,
    /// Flushes confirmed by the store.
    pub flushes_succeeded: u64,
    /// Flushes that failed, including conflicts.
    pub flushes_failed: u64,
    /// Upserts rejected for a stale revision.
    pub revision_conflicts: u64,
    /// Events handed to the host through the drain.
    pub events_drained: u64,
}

/// Per-user registry entry.
struct UserEntry {
    document: Mutex<StatsDocument>,
    /// Serializes flushes per document so two upserts never race on one
    /// revision.
    flush_in_flight: AtomicBool,
    /// Set while a removal's final flush is draining; the entry is treated
    /// as gone by the caller-facing surface.
    removing: AtomicBool,
    last_flush_request: Mutex<Instant>,
}

impl UserEntry {
    fn new(user_id: &str) -> Self {
        Self {
            document: Mutex::new(StatsDocument::new(user_id)),
            flush_in_flight: AtomicBool::new(false),
            removing: AtomicBool::new(false),
            last_flush_request: Mutex::new(Instant::now()),
        }
    }
}

/// Shared engine state reachable from background tasks.
struct EngineCore {
    config: EngineConfig,
    store: Arc<dyn RemoteStatsStore>,
    leaderboards: Arc<dyn LeaderboardProvider>,
    offline: Arc<dyn OfflineWriteHook>,
    registry: Mutex<HashMap<String, Arc<UserEntry>>>,
    events: EventQueue,
    stats: Mutex<EngineStats>,
}

#[derive(Default)]
struct SweeperStop {
    stopped: Mutex<bool>,
    signal: Condvar,
}

/// The stat synchronization and write-coalescing engine.
///
/// The engine owns one [`StatsDocument`] per locally-added user and keeps
/// it reconciled with the remote store: load on add, coalesced flush on
/// write, a periodic background flush of everything dirty, and conservative
/// revision-conflict handling.
///
/// Every caller-facing method returns immediately; network-bound work runs
/// on background threads whose only visible effect is enqueuing completion
/// events. The host observes outcomes by polling
/// [`StatsEngine::do_work`] on a regular cadence (~200 ms in the demo).
///
/// Construct one engine at startup and share it by reference; there is no
/// process-wide instance.
pub struct StatsEngine {
    core: Arc<EngineCore>,
    flush_timer: CoalescingTimer<String>,
    priority_flush_timer: CoalescingTimer<String>,
    sweeper_stop: Arc<SweeperStop>,
    sweeper: Option<JoinHandle<()>>,
}

impl StatsEngine {
    /// Creates an engine with the default (no-op) offline hook.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RemoteStatsStore>,
        leaderboards: Arc<dyn LeaderboardProvider>,
    ) -> Self {
        Self::with_offline_hook(config, store, leaderboards, Arc::new(NoOfflineWrites))
    }

    /// Creates an engine with a custom offline-write hook.
    pub fn with_offline_hook(
        config: EngineConfig,
        store: Arc<dyn RemoteStatsStore>,
        leaderboards: Arc<dyn LeaderboardProvider>,
        offline: Arc<dyn OfflineWriteHook>,
    ) -> Self {
        let flush_window = config.flush_window;
        let priority_window = config.priority_flush_window;

        let core = Arc::new(EngineCore {
            config,
            store,
            leaderboards,
            offline,
            registry: Mutex::new(HashMap::new()),
            events: EventQueue::new(),
            stats: Mutex::new(EngineStats::default()),
        });

        let timer_core = Arc::clone(&core);
        let flush_timer = CoalescingTimer::new(
            flush_window,
            Box::new(move |batch: Vec<String>| {
                for user_id in batch {
                    EngineCore::spawn_flush(&timer_core, user_id);
                }
            }),
        );

        let timer_core = Arc::clone(&core);
        let priority_flush_timer = CoalescingTimer::new(
            priority_window,
            Box::new(move |batch: Vec<String>| {
                for user_id in batch {
                    EngineCore::spawn_flush(&timer_core, user_id);
                }
            }),
        );

        let sweeper_stop = Arc::new(SweeperStop::default());
        let sweeper = Self::spawn_sweeper(Arc::clone(&core), Arc::clone(&sweeper_stop));

        Self {
            core,
            flush_timer,
            priority_flush_timer,
            sweeper_stop,
            sweeper: Some(sweeper),
        }
    }

    /// Registers a local user and starts fetching their remote document.
    ///
    /// A placeholder document is inserted synchronously, so stats can be
    /// written immediately without racing the fetch. The fetch outcome
    /// arrives as a `LocalUserAdded` event; a fetch failure puts the
    /// document in offline mode instead of failing the call.
    pub fn add_local_user(&self, user_id: &str) -> EngineResult<()> {
        if user_id.is_empty() {
            return Err(EngineError::invalid_argument("user id must not be empty"));
        }

        {
            let mut registry = self.core.registry.lock();
            if registry.contains_key(user_id) {
                return Err(EngineError::duplicate_user(user_id));
            }
            registry.insert(user_id.to_string(), Arc::new(UserEntry::new(user_id)));
        }
        tracing::info!(user_id, "local user added, fetching remote document");

        let core = Arc::clone(&self.core);
        let user = user_id.to_string();
        thread::spawn(move || core.load_user(&user));
        Ok(())
    }

    /// Unregisters a local user.
    ///
    /// Pending local writes are drained with one final flush before the
    /// registry entry disappears; the outcome arrives as a
    /// `LocalUserRemoved` event. From the moment this call returns, the
    /// user is treated as unknown by every other method.
    pub fn remove_local_user(&self, user_id: &str) -> EngineResult<()> {
        let entry = self.core.live_entry(user_id)?;
        if entry.removing.swap(true, Ordering::SeqCst) {
            return Err(EngineError::unknown_user(user_id));
        }

        if !entry.document.lock().is_dirty() {
            self.core.registry.lock().remove(user_id);
            self.core
                .events
                .push(StatEvent::new(StatEventKind::LocalUserRemoved, user_id));
            tracing::info!(user_id, "local user removed");
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let user = user_id.to_string();
        thread::spawn(move || core.finalize_removal(&user, entry));
        Ok(())
    }

    /// Writes a number stat into the user's local document.
    ///
    /// No network call happens here; a normal-priority flush is requested
    /// and coalesced with any others in the window.
    pub fn set_stat_as_number(&self, user_id: &str, name: &str, value: f64) -> EngineResult<()> {
        let entry = self.core.live_entry(user_id)?;
        entry.document.lock().set_number(name, value)?;
        self.request_flush_inner(user_id, false);
        Ok(())
    }

    /// Writes an integer stat into the user's local document.
    pub fn set_stat_as_integer(&self, user_id: &str, name: &str, value: i64) -> EngineResult<()> {
        let entry = self.core.live_entry(user_id)?;
        entry.document.lock().set_integer(name, value)?;
        self.request_flush_inner(user_id, false);
        Ok(())
    }

    /// Writes a text stat into the user's local document.
    pub fn set_stat_as_string(&self, user_id: &str, name: &str, value: &str) -> EngineResult<()> {
        let entry = self.core.live_entry(user_id)?;
        entry.document.lock().set_text(name, value)?;
        self.request_flush_inner(user_id, false);
        Ok(())
    }

    /// Deletes a stat from the user's local document.
    ///
    /// The deletion is pushed with the next full-document flush.
    pub fn delete_stat(&self, user_id: &str, name: &str) -> EngineResult<()> {
        let entry = self.core.live_entry(user_id)?;
        entry.document.lock().delete_stat(name)?;
        self.request_flush_inner(user_id, false);
        Ok(())
    }

    /// Reads a stat from the user's local document. No network access.
    pub fn stat(&self, user_id: &str, name: &str) -> EngineResult<Option<StatValue>> {
        let entry = self.core.live_entry(user_id)?;
        if name.is_empty() {
            return Err(EngineError::invalid_argument("stat name must not be empty"));
        }
        let value = entry.document.lock().get_stat(name).cloned();
        Ok(value)
    }

    /// Returns an ordered snapshot of the user's stat names.
    pub fn stat_names(&self, user_id: &str) -> EngineResult<Vec<String>> {
        let entry = self.core.live_entry(user_id)?;
        let names = entry.document.lock().stat_names();
        Ok(names)
    }

    /// Asks for the user's dirty stats to be pushed.
    ///
    /// High-priority requests use the shorter coalescing window; both
    /// windows share the same flush action. Requests inside one window
    /// collapse into a single upsert.
    pub fn request_flush(&self, user_id: &str, high_priority: bool) -> EngineResult<()> {
        self.core.live_entry(user_id)?;
        self.request_flush_inner(user_id, high_priority);
        Ok(())
    }

    /// Starts a leaderboard query on behalf of a user.
    ///
    /// The page (or the failure) arrives as a `LeaderboardComplete` event.
    pub fn request_leaderboard(
        &self,
        user_id: &str,
        query: LeaderboardQuery,
    ) -> EngineResult<()> {
        self.core.live_entry(user_id)?;
        query.validate()?;

        let core = Arc::clone(&self.core);
        let user = user_id.to_string();
        thread::spawn(move || {
            let event = match core.leaderboards.fetch_page(&user, &query) {
                Ok(page) => StatEvent::new(
                    StatEventKind::LeaderboardComplete(Some(page)),
                    user.as_str(),
                ),
                Err(err) => StatEvent::with_error(
                    StatEventKind::LeaderboardComplete(None),
                    user.as_str(),
                    EngineError::Remote(err),
                ),
            };
            core.events.push(event);
        });
        Ok(())
    }

    /// Drains all completed events, in completion order.
    ///
    /// This is the sole delivery mechanism for asynchronous outcomes; the
    /// engine never calls back into host code. As housekeeping, dirty
    /// documents whose last flush request has gone stale are re-queued.
    pub fn do_work(&self) -> Vec<StatEvent> {
        self.core.requeue_overdue_dirty(&self.flush_timer);

        let events = self.core.events.drain();
        if !events.is_empty() {
            self.core.stats.lock().events_drained += events.len() as u64;
        }
        events
    }

    /// Returns the number of registered users.
    pub fn user_count(&self) -> usize {
        self.core.registry.lock().len()
    }

    /// Returns a snapshot of the activity counters.
    pub fn stats(&self) -> EngineStats {
        self.core.stats.lock().clone()
    }

    fn request_flush_inner(&self, user_id: &str, high_priority: bool) {
        if let Some(entry) = self.core.entry(user_id) {
            *entry.last_flush_request.lock() = Instant::now();
        }
        let timer = if high_priority {
            &self.priority_flush_timer
        } else {
            &self.flush_timer
        };
        timer.submit([user_id.to_string()]);
    }

    fn spawn_sweeper(core: Arc<EngineCore>, stop: Arc<SweeperStop>) -> JoinHandle<()> {
        let interval = core.config.background_flush_interval;
        thread::spawn(move || loop {
            {
                let mut stopped = stop.stopped.lock();
                if !*stopped {
                    let _ = stop.signal.wait_for(&mut stopped, interval);
                }
                if *stopped {
                    return;
                }
            }
            EngineCore::flush_all_dirty(&core);
        })
    }
}

impl Drop for StatsEngine {
    fn drop(&mut self) {
        {
            let mut stopped = self.sweeper_stop.stopped.lock();
            *stopped = true;
            self.sweeper_stop.signal.notify_one();
        }
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

impl EngineCore {
    fn entry(&self, user_id: &str) -> Option<Arc<UserEntry>> {
        self.registry.lock().get(user_id).cloned()
    }

    /// Looks up a user, treating one mid-removal as already gone.
    fn live_entry(&self, user_id: &str) -> EngineResult<Arc<UserEntry>> {
        match self.entry(user_id) {
            Some(entry) if !entry.removing.load(Ordering::SeqCst) => Ok(entry),
            _ => Err(EngineError::unknown_user(user_id)),
        }
    }

    fn spawn_flush(core: &Arc<EngineCore>, user_id: String) {
        let core = Arc::clone(core);
        thread::spawn(move || core.flush_user(&user_id));
    }

    /// Initial load after `add_local_user`.
    fn load_user(&self, user_id: &str) {
        self.stats.lock().fetches_attempted += 1;
        let result = self.store.fetch_document(user_id, &self.config.config_id);
        let entry = self.entry(user_id);

        let error = match result {
            Ok(remote) => {
                if let Some(entry) = &entry {
                    let mut doc = entry.document.lock();
                    if !doc.state().is_loaded() {
                        let revision = remote.revision();
                        doc.merge_remote(remote);
                        doc.adopt_revision(revision);
                        doc.set_state(DocumentState::Loaded);
                    }
                }
                tracing::debug!(user_id, "remote document loaded");
                None
            }
            Err(StoreError::NotFound { .. }) => {
                // First run for this user: nothing remote yet; the first
                // flush creates the document at revision 0.
                if let Some(entry) = &entry {
                    let mut doc = entry.document.lock();
                    if !doc.state().is_loaded() {
                        doc.set_state(DocumentState::Loaded);
                    }
                }
                None
            }
            Err(err) => {
                self.stats.lock().fetches_failed += 1;
                tracing::warn!(user_id, error = %err, "initial fetch failed, entering offline mode");
                if let Some(entry) = &entry {
                    let mut doc = entry.document.lock();
                    if doc.state() == DocumentState::NotLoaded {
                        doc.set_state(DocumentState::OfflineNotLoaded);
                    }
                }
                Some(EngineError::Remote(err))
            }
        };

        let mut event = StatEvent::new(StatEventKind::LocalUserAdded, user_id);
        event.error = error;
        self.events.push(event);
    }

    /// Final flush-then-unregister for `remove_local_user`.
    fn finalize_removal(&self, user_id: &str, entry: Arc<UserEntry>) {
        // Wait out any flush already on the wire so the final state is the
        // one that gets written.
        while entry.flush_in_flight.swap(true, Ordering::SeqCst) {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        let error = if entry.document.lock().is_dirty() {
            self.run_flush(user_id, &entry)
        } else {
            None
        };
        entry.flush_in_flight.store(false, Ordering::SeqCst);

        self.registry.lock().remove(user_id);
        let mut event = StatEvent::new(StatEventKind::LocalUserRemoved, user_id);
        event.error = error;
        self.events.push(event);
        tracing::info!(user_id, "local user removed");
    }

    /// Timer- and sweep-driven flush with completion event.
    fn flush_user(&self, user_id: &str) {
        let Some(entry) = self.entry(user_id) else {
            // User removed between the flush request and the firing.
            return;
        };
        if entry.flush_in_flight.swap(true, Ordering::SeqCst) {
            // Already on the wire; the background sweep retries anything
            // this firing would have carried.
            return;
        }
        if !entry.document.lock().is_dirty() {
            entry.flush_in_flight.store(false, Ordering::SeqCst);
            return;
        }

        let error = self.run_flush(user_id, &entry);
        entry.flush_in_flight.store(false, Ordering::SeqCst);

        let mut event = StatEvent::new(StatEventKind::StatUpdateComplete, user_id);
        event.error = error;
        self.events.push(event);
    }

    /// The shared flush action. Returns the failure, if any; never touches
    /// the event queue.
    fn run_flush(&self, user_id: &str, entry: &UserEntry) -> Option<EngineError> {
        self.stats.lock().flushes_attempted += 1;

        // Never upsert with a revision the client has not observed: a
        // document that was never loaded gets a fetch+merge first.
        let needs_load = !entry.document.lock().state().is_loaded();
        if needs_load {
            if let Some(err) = self.load_before_flush(user_id, entry) {
                self.stats.lock().flushes_failed += 1;
                return Some(err);
            }
        }

        // Clear the dirty marks before dispatch so writes landing during
        // the upsert register as new dirt instead of being dropped.
        let (snapshot, marks) = {
            let mut doc = entry.document.lock();
            let marks = doc.clear_dirty_state();
            (doc.clone(), marks)
        };

        match self
            .store
            .upsert_document(user_id, &self.config.config_id, &snapshot)
        {
            Ok(()) => {
                entry.document.lock().advance_revision();
                self.stats.lock().flushes_succeeded += 1;
                tracing::debug!(user_id, "flush confirmed");
                None
            }
            Err(err) if err.is_conflict() => {
                {
                    let mut stats = self.stats.lock();
                    stats.flushes_failed += 1;
                    stats.revision_conflicts += 1;
                }
                tracing::warn!(user_id, error = %err, "upsert hit a stale revision");
                entry.document.lock().restore_dirty_state(marks);
                // Conservative policy: adopt the server copy and let the
                // next flush retry with the corrected revision, never
                // force-overwrite.
                self.refetch_after_conflict(user_id, entry);
                Some(EngineError::Remote(err))
            }
            Err(err) => {
                self.stats.lock().flushes_failed += 1;
                tracing::warn!(user_id, error = %err, "flush failed");
                {
                    let mut doc = entry.document.lock();
                    doc.restore_dirty_state(marks);
                    if doc.state().is_loaded() {
                        doc.set_state(DocumentState::OfflineLoaded);
                    }
                }
                if self.offline.should_write_offline(&err) {
                    self.offline.write_offline(user_id, &snapshot);
                }
                Some(EngineError::Remote(err))
            }
        }
    }

    fn load_before_flush(&self, user_id: &str, entry: &UserEntry) -> Option<EngineError> {
        self.stats.lock().fetches_attempted += 1;
        match self.store.fetch_document(user_id, &self.config.config_id) {
            Ok(remote) => {
                let mut doc = entry.document.lock();
                let revision = remote.revision();
                doc.merge_remote(remote);
                doc.adopt_revision(revision);
                doc.set_state(DocumentState::Loaded);
                None
            }
            Err(StoreError::NotFound { .. }) => {
                entry.document.lock().set_state(DocumentState::Loaded);
                None
            }
            Err(err) => {
                self.stats.lock().fetches_failed += 1;
                let mut doc = entry.document.lock();
                if doc.state() == DocumentState::NotLoaded {
                    doc.set_state(DocumentState::OfflineNotLoaded);
                }
                Some(EngineError::Remote(err))
            }
        }
    }

    fn refetch_after_conflict(&self, user_id: &str, entry: &UserEntry) {
        self.stats.lock().fetches_attempted += 1;
        match self.store.fetch_document(user_id, &self.config.config_id) {
            Ok(remote) => {
                let mut doc = entry.document.lock();
                let revision = remote.revision();
                doc.merge_remote(remote);
                doc.adopt_revision(revision);
                doc.set_state(DocumentState::Loaded);
                tracing::debug!(user_id, revision, "adopted server revision after conflict");
            }
            Err(err) => {
                self.stats.lock().fetches_failed += 1;
                tracing::warn!(user_id, error = %err, "re-fetch after conflict failed");
                let mut doc = entry.document.lock();
                if doc.state().is_loaded() {
                    doc.set_state(DocumentState::OfflineLoaded);
                }
            }
        }
    }

    /// Background sweep: flush every dirty document.
    fn flush_all_dirty(core: &Arc<EngineCore>) {
        let dirty: Vec<String> = {
            let registry = core.registry.lock();
            registry
                .iter()
                .filter(|(_, entry)| {
                    !entry.removing.load(Ordering::SeqCst) && entry.document.lock().is_dirty()
                })
                .map(|(user_id, _)| user_id.clone())
                .collect()
        };
        if dirty.is_empty() {
            return;
        }

        tracing::debug!(count = dirty.len(), "background sweep flushing dirty documents");
        for user_id in dirty {
            if let Some(entry) = core.entry(&user_id) {
                *entry.last_flush_request.lock() = Instant::now();
            }
            Self::spawn_flush(core, user_id);
        }
    }

    /// `do_work` housekeeping: re-queue dirty documents whose last flush
    /// request has gone stale.
    fn requeue_overdue_dirty(&self, timer: &CoalescingTimer<String>) {
        let interval = self.config.background_flush_interval;
        let mut overdue = Vec::new();
        {
            let registry = self.registry.lock();
            for (user_id, entry) in registry.iter() {
                if entry.removing.load(Ordering::SeqCst) {
                    continue;
                }
                if entry.document.lock().is_dirty()
                    && entry.last_flush_request.lock().elapsed() >= interval
                {
                    *entry.last_flush_request.lock() = Instant::now();
                    overdue.push(user_id.clone());
                }
            }
        }
        if !overdue.is_empty() {
            tracing::debug!(count = overdue.len(), "re-queuing overdue dirty documents");
            timer.submit(overdue);
        }
    }
}
