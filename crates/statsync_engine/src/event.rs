//! Completion events and the drain queue.
//!
//! The engine never calls back into host code. Every asynchronous outcome
//! is recorded as a [`StatEvent`] on an internal queue that the host drains
//! through [`crate::StatsEngine::do_work`]; this sidesteps the re-entrancy
//! and cross-thread callback hazards of observer dispatch.

use crate::error::EngineError;
use parking_lot::Mutex;
use statsync_model::LeaderboardResult;

/// What a completion event reports.
#[derive(Debug, Clone, PartialEq)]
pub enum StatEventKind {
    /// An `add_local_user` call settled (the initial fetch finished).
    LocalUserAdded,
    /// A `remove_local_user` call settled (any final flush finished).
    LocalUserRemoved,
    /// A flush attempt for the user's document settled.
    StatUpdateComplete,
    /// A leaderboard query settled; the page is present on success.
    LeaderboardComplete(Option<LeaderboardResult>),
}

/// A completed lifecycle outcome, immutable once enqueued.
///
/// Ownership passes to the caller on drain. Failures ride on `error`
/// rather than being thrown across the async boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct StatEvent {
    /// What settled.
    pub kind: StatEventKind,
    /// The user the outcome belongs to.
    pub user_id: String,
    /// The failure, if the operation did not succeed.
    pub error: Option<EngineError>,
}

impl StatEvent {
    /// Creates an event with no error.
    pub fn new(kind: StatEventKind, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            error: None,
        }
    }

    /// Creates an event carrying a failure.
    pub fn with_error(
        kind: StatEventKind,
        user_id: impl Into<String>,
        error: EngineError,
    ) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            error: Some(error),
        }
    }

    /// Returns true if the underlying operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Thread-safe append-only list of completion events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<StatEvent>>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: StatEvent) {
        self.events.lock().push(event);
    }

    /// Atomically swaps the accumulator for an empty one and returns the
    /// previous contents in enqueue order.
    pub fn drain(&self) -> Vec<StatEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
