//! Windowed leaderboard storage.
//!
//! This module contains the storage contract and its two implementations.
//! Deltas are accumulated into window buckets (the source of truth) and
//! merged into rank structures (derived, replaceable) on rebuild; all reads
//! are served from the rank structures.
//!
//! ## Implementations
//!
//! - **redis** - Sorted sets behind atomic MULTI/EXEC pipelines
//! - **memory** - In-process maps behind a mutex, for tests and demos
//!
//! Both consume the write plans computed here, so they execute the same
//! physical mutations and stay observably equivalent for identical call
//! sequences.
//!
//! ## Key Patterns
//!
//! ```text
//! {ns}:window:{timeframe}:{category}       → label window bucket
//! {ns}:window:{unit}:{stamp}:{category}    → calendar window bucket
//! {ns}:rank:{timeframe}:{category}         → rank structure
//! {ns}:rank:{timeframe}:{category}:live    → liveness marker (redis only)
//! ```
//!
//! An empty sorted set cannot exist in Redis, so the redis implementation
//! pairs every rank structure with a marker key sharing its TTL; a read
//! finding the marker but no members reports "live but empty" rather than
//! "missing". The memory implementation keeps possibly-empty map entries
//! and needs no marker.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::aggregate::Aggregation;
use crate::config::{Category, LeaderboardConfig, Timeframe};
use crate::models::{RankedEntry, ScoreUpdate};

pub mod memory;
pub mod redis;

/// Windowed leaderboard storage.
///
/// Implementations accumulate per-user deltas into window buckets, merge
/// those buckets into rank structures, and serve ordered reads. The store
/// owns every physical key inside its configuration's namespace.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Apply one batch of deltas to every participating window bucket.
    ///
    /// Zero deltas never create entries. Window TTLs are refreshed for
    /// every key the batch touches. The batch is atomic: readers observe
    /// all of it or none of it.
    async fn ingest_windows(&self, entries: &[ScoreUpdate], at: DateTime<Utc>) -> Result<()>;

    /// Rebuild every category's rank structure for one timeframe.
    ///
    /// Categories with no source windows at `at` are cleared rather than
    /// left stale. A positive `ttl_secs` expires the rebuilt structures.
    /// The whole timeframe is replaced in one atomic batch.
    async fn build_ranking(
        &self,
        timeframe: &str,
        at: DateTime<Utc>,
        ttl_secs: Option<u64>,
    ) -> Result<()>;

    /// Read the top of a rank structure.
    ///
    /// `None` means the structure is not live (never rebuilt, cleared or
    /// expired); an empty vec means live but unpopulated. Entries carry
    /// contiguous 1-based ranks in the requested order. Ties order
    /// lexicographically by user ID, reversed in descending reads.
    async fn top_ranked(
        &self,
        timeframe: &str,
        category: &str,
        limit: u32,
        descending: bool,
    ) -> Result<Option<Vec<RankedEntry>>>;

    /// Read a single user's entry, with the rank [`top_ranked`] would
    /// assign at the same ordering. `None` when the structure is not live
    /// or the user has no entry in it.
    ///
    /// [`top_ranked`]: Self::top_ranked
    async fn rank_of(
        &self,
        user_id: &str,
        timeframe: &str,
        category: &str,
        descending: bool,
    ) -> Result<Option<RankedEntry>>;

    /// Read scores for a batch of users across every configured category
    /// from one timeframe's rank structures, defaulting to zero. One
    /// batched lookup per category, never one per user per category.
    async fn scores_batch(
        &self,
        timeframe: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, HashMap<String, f64>>>;
}

/// One window mutation from an ingest plan.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WindowWrite {
    pub key: String,
    pub member: String,
    pub delta: f64,
    pub aggregation: Aggregation,
}

/// The physical writes one ingest call performs.
#[derive(Debug, Default)]
pub(crate) struct IngestPlan {
    pub writes: Vec<WindowWrite>,
    /// Expiries applied after the writes, one per touched key.
    pub expires: Vec<(String, u64)>,
}

impl IngestPlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// One category's rebuild action for a timeframe.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RankBuild {
    /// Replace the rank structure with the merge of the source windows.
    Merge {
        rank_key: String,
        source_keys: Vec<String>,
        operator: Aggregation,
        ttl_secs: Option<u64>,
    },
    /// Remove the rank structure and its liveness marker.
    Clear { rank_key: String },
}

pub(crate) fn resolve_timeframe<'a>(
    config: &'a LeaderboardConfig,
    key: &str,
) -> Result<&'a Timeframe> {
    config
        .timeframe(key)
        .ok_or_else(|| anyhow!("unknown timeframe '{}'", key))
}

/// Resolve one ingest call into its physical window writes and expiries.
///
/// Fan-out covers every (timeframe, category) pair whose ingest keys feed a
/// board the category participates in, either the writing timeframe itself
/// or another timeframe that merges the same buckets at rebuild. Zero
/// deltas are dropped here, before any store is touched, and a key's TTL is
/// only refreshed when the batch actually wrote to it.
pub(crate) fn plan_ingest(
    config: &LeaderboardConfig,
    entries: &[ScoreUpdate],
    at: DateTime<Utc>,
) -> IngestPlan {
    let mut writes = Vec::new();
    let mut expires = BTreeMap::new();

    for timeframe in config.timeframes() {
        for category in config.categories() {
            let strategy = timeframe.strategy();
            let keys = strategy.ingest_keys(category.key(), at);
            if keys.is_empty() {
                continue;
            }
            if !feeds_participating_board(config, timeframe, category, at, &keys) {
                continue;
            }
            let ttl = strategy
                .window_ttl_secs(category.key(), at)
                .filter(|ttl| *ttl > 0);

            for key in keys {
                let key = config.physical_key(&key);
                let mut touched = false;
                for entry in entries {
                    if let Some(delta) = entry.deltas.get(category.key()).copied() {
                        if delta != 0.0 {
                            writes.push(WindowWrite {
                                key: key.clone(),
                                member: entry.user_id.clone(),
                                delta,
                                aggregation: category.aggregation(),
                            });
                            touched = true;
                        }
                    }
                }
                if touched {
                    if let Some(ttl) = ttl {
                        expires.insert(key, ttl);
                    }
                }
            }
        }
    }

    IngestPlan {
        writes,
        expires: expires.into_iter().collect(),
    }
}

/// Whether `ingest_keys`, the buckets `timeframe` writes at `at`, feed any
/// board the category participates in.
///
/// With shared calendar buckets one elected timeframe writes for every
/// board over its unit, including boards it does not carry itself, so a
/// category restricted to a non-writing timeframe still has to reach the
/// buckets that timeframe merges.
fn feeds_participating_board(
    config: &LeaderboardConfig,
    timeframe: &Timeframe,
    category: &Category,
    at: DateTime<Utc>,
    ingest_keys: &[String],
) -> bool {
    if category.participates_in(timeframe.key()) {
        return true;
    }
    config.timeframes().iter().any(|other| {
        other.key() != timeframe.key()
            && category.participates_in(other.key())
            && other
                .strategy()
                .source_keys(category.key(), at)
                .iter()
                .any(|source| ingest_keys.contains(source))
    })
}

/// Resolve one rebuild call into per-category actions for a timeframe.
///
/// Non-participating categories and categories whose strategy names no
/// sources are cleared, never left stale. A non-positive TTL is treated as
/// "no TTL".
pub(crate) fn plan_rank_builds(
    config: &LeaderboardConfig,
    timeframe: &Timeframe,
    at: DateTime<Utc>,
    ttl_secs: Option<u64>,
) -> Vec<RankBuild> {
    let ttl_secs = ttl_secs.filter(|ttl| *ttl > 0);
    let strategy = timeframe.strategy();

    config
        .categories()
        .iter()
        .map(|category| {
            let rank_key = config.physical_key(&strategy.rank_key(category.key()));
            if !category.participates_in(timeframe.key()) {
                return RankBuild::Clear { rank_key };
            }
            let source_keys = strategy.source_keys(category.key(), at);
            if source_keys.is_empty() {
                return RankBuild::Clear { rank_key };
            }
            RankBuild::Merge {
                rank_key,
                source_keys: source_keys
                    .iter()
                    .map(|key| config.physical_key(key))
                    .collect(),
                operator: category.aggregation(),
                ttl_secs,
            }
        })
        .collect()
}
