//! Leaderboard collaborator boundary.

use crate::store::{StoreError, StoreResult};
use parking_lot::Mutex;
use statsync_model::{LeaderboardQuery, LeaderboardResult};
use std::collections::VecDeque;

/// The leaderboard query collaborator.
///
/// Queries follow the same async-then-enqueue pattern as stat flushes: the
/// engine runs `fetch_page` on a background thread and reports the outcome
/// through a completion event, never a direct callback.
pub trait LeaderboardProvider: Send + Sync {
    /// Fetches one page of leaderboard results on behalf of a user.
    fn fetch_page(&self, user_id: &str, query: &LeaderboardQuery)
        -> StoreResult<LeaderboardResult>;
}

/// A scriptable provider for tests.
#[derive(Default)]
pub struct MockLeaderboardProvider {
    responses: Mutex<VecDeque<StoreResult<LeaderboardResult>>>,
    calls: Mutex<Vec<(String, LeaderboardQuery)>>,
}

impl MockLeaderboardProvider {
    /// Creates a mock with an empty response queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: StoreResult<LeaderboardResult>) {
        self.responses.lock().push_back(response);
    }

    /// Returns the queries recorded so far.
    pub fn calls(&self) -> Vec<(String, LeaderboardQuery)> {
        self.calls.lock().clone()
    }
}

impl LeaderboardProvider for MockLeaderboardProvider {
    fn fetch_page(
        &self,
        user_id: &str,
        query: &LeaderboardQuery,
    ) -> StoreResult<LeaderboardResult> {
        self.calls
            .lock()
            .push((user_id.to_string(), query.clone()));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StoreError::unavailable("no mock response queued")))
    }
}
