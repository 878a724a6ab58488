//! In-process leaderboard storage.
//!
//! Reference implementation of [`LeaderboardStore`] over plain maps, used
//! by tests and demos. It executes the same write plans as the redis
//! implementation and mirrors sorted-set ordering and TTL behavior, so the
//! two are interchangeable for identical call sequences.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{LeaderboardStore, RankBuild, plan_ingest, plan_rank_builds, resolve_timeframe};
use crate::config::LeaderboardConfig;
use crate::models::{RankedEntry, ScoreUpdate};

/// A sorted set: member to score, with an optional expiry.
#[derive(Debug, Default)]
struct Zset {
    members: BTreeMap<String, f64>,
    expires_at: Option<Instant>,
}

impl Zset {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    windows: HashMap<String, Zset>,
    /// Rank structures. Presence of an entry, even with no members, means
    /// the structure is live.
    ranks: HashMap<String, Zset>,
}

impl MemoryState {
    fn purge(&mut self, now: Instant) {
        self.windows.retain(|_, zset| !zset.expired(now));
        self.ranks.retain(|_, zset| !zset.expired(now));
    }
}

/// In-process implementation of [`LeaderboardStore`]. Clones share the
/// same underlying state, like clones of a redis client share the same
/// server.
#[derive(Clone)]
pub struct MemoryLeaderboardStore {
    config: LeaderboardConfig,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLeaderboardStore {
    pub fn new(config: LeaderboardConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }
}

/// Sorted-set order: by score, then lexicographically by member.
/// Descending reads reverse the whole order, matching ZREVRANGE.
fn ordered_rows(zset: &Zset, descending: bool) -> Vec<(String, f64)> {
    let mut rows: Vec<(String, f64)> = zset
        .members
        .iter()
        .map(|(member, score)| (member.clone(), *score))
        .collect();
    rows.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    if descending {
        rows.reverse();
    }
    rows
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboardStore {
    async fn ingest_windows(&self, entries: &[ScoreUpdate], at: DateTime<Utc>) -> Result<()> {
        let plan = plan_ingest(&self.config, entries, at);
        if plan.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge(now);

        for write in &plan.writes {
            let zset = state.windows.entry(write.key.clone()).or_default();
            zset.members
                .entry(write.member.clone())
                .and_modify(|value| *value = write.aggregation.apply(*value, write.delta))
                .or_insert(write.delta);
        }
        for (key, ttl) in &plan.expires {
            if let Some(zset) = state.windows.get_mut(key) {
                zset.expires_at = Some(now + Duration::from_secs(*ttl));
            }
        }

        Ok(())
    }

    async fn build_ranking(
        &self,
        timeframe: &str,
        at: DateTime<Utc>,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        let timeframe = resolve_timeframe(&self.config, timeframe)?;
        let plans = plan_rank_builds(&self.config, timeframe, at, ttl_secs);

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge(now);

        for plan in plans {
            match plan {
                RankBuild::Merge {
                    rank_key,
                    source_keys,
                    operator,
                    ttl_secs,
                } => {
                    let mut merged: BTreeMap<String, f64> = BTreeMap::new();
                    for source in &source_keys {
                        if let Some(zset) = state.windows.get(source) {
                            for (member, value) in &zset.members {
                                merged
                                    .entry(member.clone())
                                    .and_modify(|current| {
                                        *current = operator.apply(*current, *value)
                                    })
                                    .or_insert(*value);
                            }
                        }
                    }
                    let expires_at = ttl_secs.map(|ttl| now + Duration::from_secs(ttl));
                    state.ranks.insert(rank_key, Zset {
                        members: merged,
                        expires_at,
                    });
                }
                RankBuild::Clear { rank_key } => {
                    state.ranks.remove(&rank_key);
                }
            }
        }

        Ok(())
    }

    async fn top_ranked(
        &self,
        timeframe: &str,
        category: &str,
        limit: u32,
        descending: bool,
    ) -> Result<Option<Vec<RankedEntry>>> {
        let timeframe = resolve_timeframe(&self.config, timeframe)?;
        let rank_key = self
            .config
            .physical_key(&timeframe.strategy().rank_key(category));

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge(now);

        let Some(zset) = state.ranks.get(&rank_key) else {
            return Ok(None);
        };
        let entries = ordered_rows(zset, descending)
            .into_iter()
            .take(limit as usize)
            .enumerate()
            .map(|(position, (user_id, score))| RankedEntry {
                user_id,
                score,
                rank: position as u64 + 1,
            })
            .collect();

        Ok(Some(entries))
    }

    async fn rank_of(
        &self,
        user_id: &str,
        timeframe: &str,
        category: &str,
        descending: bool,
    ) -> Result<Option<RankedEntry>> {
        let timeframe = resolve_timeframe(&self.config, timeframe)?;
        let rank_key = self
            .config
            .physical_key(&timeframe.strategy().rank_key(category));

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge(now);

        let Some(zset) = state.ranks.get(&rank_key) else {
            return Ok(None);
        };
        let Some(score) = zset.members.get(user_id).copied() else {
            return Ok(None);
        };
        let rows = ordered_rows(zset, descending);
        let Some(position) = rows.iter().position(|(member, _)| member == user_id) else {
            return Ok(None);
        };

        Ok(Some(RankedEntry {
            user_id: user_id.to_string(),
            score,
            rank: position as u64 + 1,
        }))
    }

    async fn scores_batch(
        &self,
        timeframe: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, HashMap<String, f64>>> {
        let timeframe = resolve_timeframe(&self.config, timeframe)?;
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge(now);

        let mut result: HashMap<String, HashMap<String, f64>> = user_ids
            .iter()
            .map(|user_id| (user_id.clone(), HashMap::new()))
            .collect();

        for category in self.config.categories() {
            let rank_key = self
                .config
                .physical_key(&timeframe.strategy().rank_key(category.key()));
            let zset = state.ranks.get(&rank_key);
            for user_id in user_ids {
                let score = zset
                    .and_then(|zset| zset.members.get(user_id))
                    .copied()
                    .unwrap_or(0.0);
                if let Some(per_user) = result.get_mut(user_id) {
                    per_user.insert(category.key().to_string(), score);
                }
            }
        }

        Ok(result)
    }
}
