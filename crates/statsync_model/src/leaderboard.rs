//! Leaderboard query and result types.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// A query against a stat-backed leaderboard.
///
/// A query is either global (ranked over all users) or social
/// (ranked over a social group, see [`LeaderboardQuery::for_social_group`]).
/// Skip-to-rank and skip-to-user are mutually exclusive; paging uses the
/// continuation token carried back by [`LeaderboardResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    /// The stat the leaderboard ranks on.
    pub stat_name: String,
    /// Maximum rows per page; 0 lets the service pick.
    pub max_items: u32,
    /// Rank to start from; 0 means "from the top".
    pub skip_to_rank: u32,
    /// User whose ranking the page should start at.
    pub skip_to_user: Option<String>,
    /// Social group to rank over; `None` means a global leaderboard.
    pub social_group: Option<String>,
    /// Continuation token from a previous page.
    pub continuation_token: Option<String>,
}

impl LeaderboardQuery {
    /// Creates a global leaderboard query for a stat.
    pub fn new(stat_name: impl Into<String>) -> Self {
        Self {
            stat_name: stat_name.into(),
            max_items: 0,
            skip_to_rank: 0,
            skip_to_user: None,
            social_group: None,
            continuation_token: None,
        }
    }

    /// Scopes the query to a social group.
    ///
    /// The well-known group "people" is normalized to "all".
    pub fn for_social_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.social_group = Some(if group.eq_ignore_ascii_case("people") {
            "all".to_string()
        } else {
            group
        });
        self
    }

    /// Sets the page size.
    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }

    /// Starts the page at a rank.
    pub fn with_skip_to_rank(mut self, rank: u32) -> Self {
        self.skip_to_rank = rank;
        self
    }

    /// Starts the page at a user's ranking.
    pub fn with_skip_to_user(mut self, user_id: impl Into<String>) -> Self {
        self.skip_to_user = Some(user_id.into());
        self
    }

    /// Continues a previous page.
    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Validates the query.
    pub fn validate(&self) -> ModelResult<()> {
        if self.stat_name.is_empty() {
            return Err(ModelError::invalid_query("stat name must not be empty"));
        }
        if self.skip_to_rank > 0 && self.skip_to_user.is_some() {
            return Err(ModelError::invalid_query(
                "cannot provide both a user and a rank to skip to",
            ));
        }
        if let Some(group) = &self.social_group {
            if group.is_empty() {
                return Err(ModelError::invalid_query(
                    "social group must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// One ranked row of a leaderboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// Ranked user.
    pub user_id: String,
    /// Display name, when the service knows one.
    pub display_name: Option<String>,
    /// 1-based rank.
    pub rank: u32,
    /// Percentile within the full leaderboard.
    pub percentile: f64,
    /// Column values for the row (the ranked stat first).
    pub values: Vec<String>,
}

/// One page of leaderboard results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResult {
    /// Total number of ranked users.
    pub total_count: u64,
    /// Rows in this page.
    pub rows: Vec<LeaderboardRow>,
    /// Token for the next page, if there is one.
    pub continuation_token: Option<String>,
}

impl LeaderboardResult {
    /// Creates a result page.
    pub fn new(total_count: u64, rows: Vec<LeaderboardRow>) -> Self {
        Self {
            total_count,
            rows,
            continuation_token: None,
        }
    }

    /// Attaches a continuation token for the next page.
    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Returns true if another page can be fetched.
    pub fn has_next(&self) -> bool {
        self.continuation_token.is_some()
    }
}
