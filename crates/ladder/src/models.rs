//! Wire-facing types: ingest updates, queries and ranked results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One ingest entry: a user plus the per-category deltas to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub user_id: String,
    pub deltas: HashMap<String, f64>,
}

impl ScoreUpdate {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            deltas: HashMap::new(),
        }
    }

    /// Add a delta for one category.
    pub fn delta(mut self, category: impl Into<String>, value: f64) -> Self {
        self.deltas.insert(category.into(), value);
        self
    }
}

/// A user's position in one rank structure. Ranks are 1-based and follow
/// the requested ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub user_id: String,
    pub score: f64,
    pub rank: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn is_descending(&self) -> bool {
        matches!(self, SortOrder::Desc)
    }
}

/// A partial leaderboard query. Every field is optional; normalization
/// fills the gaps from the configuration's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    pub order_by: Option<String>,
    pub timeframe: Option<String>,
    pub sort: Option<SortOrder>,
    pub limit: Option<i64>,
}

/// A fully defaulted and validated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub order_by: String,
    pub timeframe: String,
    pub sort: SortOrder,
    pub limit: u32,
}

/// One row of a leaderboard response, hydrated with the user's score in
/// every configured category and optional enrichment data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub rank: u64,
    pub score: f64,
    pub scores: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The assembled leaderboard page. `current_user` carries the requester's
/// own standing even when they fall outside the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub current_user: Option<LeaderboardEntry>,
}
