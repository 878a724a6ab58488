//! Redis leaderboard storage.
//!
//! Sorted sets hold the window buckets and rank structures; every logical
//! operation runs as one atomic MULTI/EXEC pipeline, so readers observe
//! whole batches or nothing. Redis cannot hold an empty sorted set, so
//! each rank structure is paired with a `{key}:live` marker sharing its
//! TTL; liveness reads check the marker, never the member count.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

use super::{LeaderboardStore, RankBuild, plan_ingest, plan_rank_builds, resolve_timeframe};
use crate::aggregate::Aggregation;
use crate::config::{LeaderboardConfig, Timeframe};
use crate::models::{RankedEntry, ScoreUpdate};

/// Redis implementation of [`LeaderboardStore`].
///
/// Takes an already-constructed client; connection lifecycle stays with
/// the caller.
#[derive(Clone)]
pub struct RedisLeaderboardStore {
    client: redis::Client,
    config: LeaderboardConfig,
}

impl RedisLeaderboardStore {
    pub fn new(client: redis::Client, config: LeaderboardConfig) -> Self {
        Self { client, config }
    }

    fn live_key(rank_key: &str) -> String {
        format!("{}:live", rank_key)
    }

    fn rank_key(&self, timeframe: &Timeframe, category: &str) -> String {
        self.config
            .physical_key(&timeframe.strategy().rank_key(category))
    }
}

#[async_trait]
impl LeaderboardStore for RedisLeaderboardStore {
    async fn ingest_windows(&self, entries: &[ScoreUpdate], at: DateTime<Utc>) -> Result<()> {
        let plan = plan_ingest(&self.config, entries, at);
        if plan.is_empty() {
            return Ok(());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in &plan.writes {
            match write.aggregation {
                Aggregation::Sum => {
                    pipe.zincr(&write.key, &write.member, write.delta).ignore();
                }
                // ZADD GT/LT keep the recorded extremum and still insert
                // missing members; no high-level helper covers them.
                Aggregation::Max => {
                    pipe.cmd("ZADD")
                        .arg(&write.key)
                        .arg("GT")
                        .arg(write.delta)
                        .arg(&write.member)
                        .ignore();
                }
                Aggregation::Min => {
                    pipe.cmd("ZADD")
                        .arg(&write.key)
                        .arg("LT")
                        .arg(write.delta)
                        .arg(&write.member)
                        .ignore();
                }
            }
        }
        for (key, ttl) in &plan.expires {
            pipe.expire(key, *ttl as i64).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

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
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for plan in &plans {
            match plan {
                RankBuild::Merge {
                    rank_key,
                    source_keys,
                    operator,
                    ttl_secs,
                } => {
                    let live_key = Self::live_key(rank_key);
                    // ZUNIONSTORE replaces the destination wholesale; a
                    // merge of only absent sources deletes it, which
                    // together with the marker is the "live but empty"
                    // state. Replacing a value also clears any previous
                    // TTL, so the no-TTL path needs no PERSIST.
                    pipe.cmd("ZUNIONSTORE")
                        .arg(rank_key)
                        .arg(source_keys.len())
                        .arg(source_keys)
                        .arg("AGGREGATE")
                        .arg(operator.merge_operator())
                        .ignore();
                    pipe.set(&live_key, 1).ignore();
                    if let Some(ttl) = ttl_secs {
                        pipe.expire(rank_key, *ttl as i64).ignore();
                        pipe.expire(&live_key, *ttl as i64).ignore();
                    }
                }
                RankBuild::Clear { rank_key } => {
                    pipe.del(rank_key).ignore();
                    pipe.del(Self::live_key(rank_key)).ignore();
                }
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;

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
        let rank_key = self.rank_key(timeframe, category);
        let live_key = Self::live_key(&rank_key);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // A zero stop index would read the whole range.
        if limit == 0 {
            let live: bool = conn.exists(&live_key).await?;
            return Ok(if live { Some(Vec::new()) } else { None });
        }

        let stop = limit as isize - 1;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.exists(&live_key);
        if descending {
            pipe.zrevrange_withscores(&rank_key, 0, stop);
        } else {
            pipe.zrange_withscores(&rank_key, 0, stop);
        }
        let (live, rows): (bool, Vec<(String, f64)>) = pipe.query_async(&mut conn).await?;

        if !live {
            return Ok(None);
        }
        let entries = rows
            .into_iter()
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
        let rank_key = self.rank_key(timeframe, category);
        let live_key = Self::live_key(&rank_key);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.exists(&live_key);
        if descending {
            pipe.zrevrank(&rank_key, user_id);
        } else {
            pipe.zrank(&rank_key, user_id);
        }
        pipe.zscore(&rank_key, user_id);
        let (live, rank, score): (bool, Option<u64>, Option<f64>) =
            pipe.query_async(&mut conn).await?;

        if !live {
            return Ok(None);
        }
        match (rank, score) {
            (Some(rank), Some(score)) => Ok(Some(RankedEntry {
                user_id: user_id.to_string(),
                score,
                rank: rank + 1,
            })),
            _ => Ok(None),
        }
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
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for category in self.config.categories() {
            let rank_key = self.rank_key(timeframe, category.key());
            pipe.cmd("ZMSCORE").arg(&rank_key).arg(user_ids);
        }
        let rows: Vec<Vec<Option<f64>>> = pipe.query_async(&mut conn).await?;

        let mut result: HashMap<String, HashMap<String, f64>> = user_ids
            .iter()
            .map(|user_id| (user_id.clone(), HashMap::new()))
            .collect();
        for (category, scores) in self.config.categories().iter().zip(rows) {
            for (user_id, score) in user_ids.iter().zip(scores) {
                if let Some(per_user) = result.get_mut(user_id) {
                    per_user.insert(category.key().to_string(), score.unwrap_or(0.0));
                }
            }
        }

        Ok(result)
    }
}
