//! Leaderboard service.
//!
//! [`Leaderboard`] ties the configuration, the store and the optional
//! enrichment ports together: it normalizes partial queries against the
//! configured defaults, orchestrates page reads with score and
//! username/metadata hydration, and fans rebuilds out across timeframes.
//!
//! ## Usage
//!
//! ```ignore
//! let board = Leaderboard::new(config.clone(), Arc::new(store))?;
//! board.ingest(&updates, None).await?;
//! board.rebuild(&["24h"], None, None).await?;
//! let page = board.get_leaderboard(&LeaderboardQuery::default(), Some("u1")).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::config::LeaderboardConfig;
use crate::error::Error;
use crate::models::{
    LeaderboardEntry, LeaderboardQuery, LeaderboardResponse, RankedEntry, ResolvedQuery,
    ScoreUpdate, SortOrder,
};
use crate::ports::{MetadataLookup, UsernameLookup};
use crate::store::LeaderboardStore;

/// The leaderboard engine's caller-facing surface.
///
/// Construction validates the configuration and fails fast with a
/// [`Error::Config`] on empty category/timeframe sets, unknown defaults or
/// malformed identifiers. The service itself is stateless beyond the
/// immutable configuration; it is cheap to clone and share.
#[derive(Clone)]
pub struct Leaderboard {
    config: LeaderboardConfig,
    store: Arc<dyn LeaderboardStore>,
    usernames: Option<Arc<dyn UsernameLookup>>,
    metadata: Option<Arc<dyn MetadataLookup>>,
}

impl Leaderboard {
    pub fn new(config: LeaderboardConfig, store: Arc<dyn LeaderboardStore>) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            usernames: None,
            metadata: None,
        })
    }

    /// Attach a username port. Purely additive; pages work without one.
    pub fn with_usernames(mut self, lookup: Arc<dyn UsernameLookup>) -> Self {
        self.usernames = Some(lookup);
        self
    }

    /// Attach a metadata port. Purely additive; pages work without one.
    pub fn with_metadata(mut self, lookup: Arc<dyn MetadataLookup>) -> Self {
        self.metadata = Some(lookup);
        self
    }

    pub fn config(&self) -> &LeaderboardConfig {
        &self.config
    }

    /// Fill a partial query from the configured defaults and validate it.
    ///
    /// Limits are clamped into `[1, max_limit]`, never rejected. Unknown
    /// categories or timeframes and undeclared board combinations are
    /// [`Error::Query`].
    pub fn normalize_query(&self, query: &LeaderboardQuery) -> Result<ResolvedQuery, Error> {
        let order_by = match query.order_by.as_deref() {
            Some(category) => category,
            None => self.config.require_default_category()?,
        };
        if self.config.category(order_by).is_none() {
            return Err(Error::Query(format!("unknown category '{}'", order_by)));
        }

        let timeframe = match query.timeframe.as_deref() {
            Some(timeframe) => timeframe,
            None => self.config.require_default_timeframe()?,
        };
        if self.config.timeframe(timeframe).is_none() {
            return Err(Error::Query(format!("unknown timeframe '{}'", timeframe)));
        }

        if !self.config.supports(order_by, timeframe) {
            return Err(Error::Query(format!(
                "category '{}' is not ranked in timeframe '{}'",
                order_by, timeframe
            )));
        }

        let limit = query
            .limit
            .unwrap_or(i64::from(self.config.default_limit()))
            .clamp(1, i64::from(self.config.max_limit())) as u32;

        Ok(ResolvedQuery {
            order_by: order_by.to_string(),
            timeframe: timeframe.to_string(),
            sort: query.sort.unwrap_or(SortOrder::Desc),
            limit,
        })
    }

    /// Fetch one leaderboard page.
    ///
    /// A missing rank structure yields empty entries and no current user.
    /// Otherwise the page is hydrated with per-category scores and any
    /// attached enrichment in one batch covering exactly the page plus,
    /// when supplied and absent from it, the current user, who gets one
    /// extra targeted rank lookup. A current user with no entry at all is
    /// reported as `None`.
    pub async fn get_leaderboard(
        &self,
        query: &LeaderboardQuery,
        current_user_id: Option<&str>,
    ) -> Result<LeaderboardResponse, Error> {
        let resolved = self.normalize_query(query)?;
        let descending = resolved.sort.is_descending();

        let Some(top) = self
            .store
            .top_ranked(
                &resolved.timeframe,
                &resolved.order_by,
                resolved.limit,
                descending,
            )
            .await?
        else {
            return Ok(LeaderboardResponse {
                entries: Vec::new(),
                current_user: None,
            });
        };

        let mut user_ids: Vec<String> = top.iter().map(|entry| entry.user_id.clone()).collect();
        let mut current_entry: Option<RankedEntry> = None;
        if let Some(user_id) = current_user_id {
            if let Some(in_page) = top.iter().find(|entry| entry.user_id == user_id) {
                current_entry = Some(in_page.clone());
            } else if let Some(found) = self
                .store
                .rank_of(user_id, &resolved.timeframe, &resolved.order_by, descending)
                .await?
            {
                user_ids.push(found.user_id.clone());
                current_entry = Some(found);
            }
        }

        if user_ids.is_empty() {
            return Ok(LeaderboardResponse {
                entries: Vec::new(),
                current_user: None,
            });
        }

        let scores = self
            .store
            .scores_batch(&resolved.timeframe, &user_ids)
            .await?;
        let usernames = match &self.usernames {
            Some(lookup) => lookup.usernames(&user_ids).await?,
            None => HashMap::new(),
        };
        let metadata = match &self.metadata {
            Some(lookup) => lookup.metadata(&resolved.timeframe, &user_ids).await?,
            None => HashMap::new(),
        };

        let hydrate = |ranked: &RankedEntry| LeaderboardEntry {
            user_id: ranked.user_id.clone(),
            rank: ranked.rank,
            score: ranked.score,
            scores: scores.get(&ranked.user_id).cloned().unwrap_or_default(),
            username: usernames.get(&ranked.user_id).cloned(),
            metadata: metadata.get(&ranked.user_id).cloned(),
        };

        Ok(LeaderboardResponse {
            entries: top.iter().map(&hydrate).collect(),
            current_user: current_entry.as_ref().map(&hydrate),
        })
    }

    /// Apply a batch of score deltas. `at` defaults to now.
    pub async fn ingest(
        &self,
        entries: &[ScoreUpdate],
        at: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let at = at.unwrap_or_else(Utc::now);
        self.store.ingest_windows(entries, at).await?;
        Ok(())
    }

    /// Rebuild the rank structures of the given timeframes concurrently.
    ///
    /// Every timeframe is validated up front. Failures are logged once all
    /// attempts have settled and the first one is returned; successfully
    /// rebuilt timeframes stay rebuilt.
    pub async fn rebuild(
        &self,
        timeframes: &[&str],
        at: Option<DateTime<Utc>>,
        ttl_secs: Option<u64>,
    ) -> Result<(), Error> {
        for timeframe in timeframes {
            if self.config.timeframe(timeframe).is_none() {
                return Err(Error::Query(format!("unknown timeframe '{}'", timeframe)));
            }
        }
        let at = at.unwrap_or_else(Utc::now);

        let attempts = timeframes.iter().map(|timeframe| async move {
            let result = self.store.build_ranking(timeframe, at, ttl_secs).await;
            (*timeframe, result)
        });

        let mut first_error = None;
        for (timeframe, result) in join_all(attempts).await {
            if let Err(error) = result {
                tracing::error!(timeframe = %timeframe, error = %error, "Leaderboard rebuild failed");
                if first_error.is_none() {
                    first_error = Some(Error::Store(error));
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregation;
    use crate::keys::WindowUnit;
    use crate::ports::{MockMetadataLookup, MockUsernameLookup};
    use crate::store::MockLeaderboardStore;
    use anyhow::anyhow;
    use mockall::predicate::eq;

    fn config() -> LeaderboardConfig {
        LeaderboardConfig::builder("test")
            .metric("profit", Aggregation::Sum)
            .metric("wagered", Aggregation::Sum)
            .metric_in("best_streak", Aggregation::Max, ["lifetime"])
            .rolling("day", WindowUnit::Day, 1)
            .all_time("lifetime")
            .default_board("profit", "day")
            .limits(25, 100)
            .finalize()
            .unwrap()
    }

    fn service(store: MockLeaderboardStore) -> Leaderboard {
        Leaderboard::new(config(), Arc::new(store)).unwrap()
    }

    fn ranked(user_id: &str, score: f64, rank: u64) -> RankedEntry {
        RankedEntry {
            user_id: user_id.to_string(),
            score,
            rank,
        }
    }

    mod normalization {
        use super::*;

        #[test]
        fn defaults_fill_an_empty_query() {
            let board = service(MockLeaderboardStore::new());

            let resolved = board.normalize_query(&LeaderboardQuery::default()).unwrap();

            assert_eq!(resolved, ResolvedQuery {
                order_by: "profit".to_string(),
                timeframe: "day".to_string(),
                sort: SortOrder::Desc,
                limit: 25,
            });
        }

        #[test]
        fn limits_clamp_instead_of_rejecting() {
            let board = service(MockLeaderboardStore::new());
            let limit = |requested: i64| {
                let query = LeaderboardQuery {
                    limit: Some(requested),
                    ..Default::default()
                };
                board.normalize_query(&query).unwrap().limit
            };

            assert_eq!(limit(0), 1);
            assert_eq!(limit(-5), 1);
            assert_eq!(limit(40), 40);
            assert_eq!(limit(10_000), 100);
        }

        #[test]
        fn unknown_category_is_a_query_error() {
            let board = service(MockLeaderboardStore::new());
            let query = LeaderboardQuery {
                order_by: Some("karma".to_string()),
                ..Default::default()
            };

            match board.normalize_query(&query) {
                Err(Error::Query(msg)) => assert!(msg.contains("unknown category 'karma'")),
                other => panic!("expected query error, got {:?}", other),
            }
        }

        #[test]
        fn undeclared_board_combination_is_a_query_error() {
            let board = service(MockLeaderboardStore::new());
            let query = LeaderboardQuery {
                order_by: Some("best_streak".to_string()),
                timeframe: Some("day".to_string()),
                ..Default::default()
            };

            match board.normalize_query(&query) {
                Err(Error::Query(msg)) => {
                    assert!(msg.contains("'best_streak' is not ranked in timeframe 'day'"));
                }
                other => panic!("expected query error, got {:?}", other),
            }
        }
    }

    mod pages {
        use super::*;

        #[tokio::test]
        async fn missing_rank_structure_yields_an_empty_response() {
            let mut store = MockLeaderboardStore::new();
            store.expect_top_ranked().returning(|_, _, _, _| Ok(None));
            store.expect_scores_batch().never();
            let board = service(store);

            let response = board
                .get_leaderboard(&LeaderboardQuery::default(), Some("u1"))
                .await
                .unwrap();

            assert!(response.entries.is_empty());
            assert!(response.current_user.is_none());
        }

        #[tokio::test]
        async fn page_users_are_hydrated_in_one_batch() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_top_ranked()
                .with(eq("day"), eq("profit"), eq(25u32), eq(true))
                .returning(|_, _, _, _| {
                    Ok(Some(vec![ranked("u2", 20.0, 1), ranked("u1", 10.0, 2)]))
                });
            store
                .expect_scores_batch()
                .withf(|timeframe, user_ids| {
                    timeframe == "day"
                        && user_ids.len() == 2
                        && user_ids[0] == "u2"
                        && user_ids[1] == "u1"
                })
                .times(1)
                .returning(|_, user_ids| {
                    Ok(user_ids
                        .iter()
                        .map(|id| {
                            (
                                id.clone(),
                                HashMap::from([("profit".to_string(), 7.0)]),
                            )
                        })
                        .collect())
                });
            let mut usernames = MockUsernameLookup::new();
            usernames.expect_usernames().times(1).returning(|user_ids| {
                Ok(user_ids
                    .iter()
                    .map(|id| (id.clone(), format!("name-{}", id)))
                    .collect())
            });
            let board = service(store).with_usernames(Arc::new(usernames));

            let response = board
                .get_leaderboard(&LeaderboardQuery::default(), None)
                .await
                .unwrap();

            assert_eq!(response.entries.len(), 2);
            assert_eq!(response.entries[0].user_id, "u2");
            assert_eq!(response.entries[0].rank, 1);
            assert_eq!(response.entries[0].scores.get("profit"), Some(&7.0));
            assert_eq!(response.entries[0].username.as_deref(), Some("name-u2"));
            assert!(response.current_user.is_none());
        }

        #[tokio::test]
        async fn current_user_outside_the_page_gets_a_targeted_lookup() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_top_ranked()
                .returning(|_, _, _, _| Ok(Some(vec![ranked("u2", 20.0, 1)])));
            store
                .expect_rank_of()
                .with(eq("u9"), eq("day"), eq("profit"), eq(true))
                .times(1)
                .returning(|_, _, _, _| Ok(Some(ranked("u9", 1.0, 57))));
            store
                .expect_scores_batch()
                .withf(|_, user_ids| {
                    user_ids.len() == 2 && user_ids[0] == "u2" && user_ids[1] == "u9"
                })
                .returning(|_, _| Ok(HashMap::new()));
            let board = service(store);

            let response = board
                .get_leaderboard(&LeaderboardQuery::default(), Some("u9"))
                .await
                .unwrap();

            let current = response.current_user.unwrap();
            assert_eq!(current.user_id, "u9");
            assert_eq!(current.rank, 57);
            assert_eq!(response.entries.len(), 1);
        }

        #[tokio::test]
        async fn current_user_in_the_page_is_copied_without_refetch() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_top_ranked()
                .returning(|_, _, _, _| Ok(Some(vec![ranked("u2", 20.0, 1)])));
            store.expect_rank_of().never();
            store
                .expect_scores_batch()
                .withf(|_, user_ids| user_ids.len() == 1 && user_ids[0] == "u2")
                .returning(|_, _| Ok(HashMap::new()));
            let board = service(store);

            let response = board
                .get_leaderboard(&LeaderboardQuery::default(), Some("u2"))
                .await
                .unwrap();

            let current = response.current_user.unwrap();
            assert_eq!(current.user_id, "u2");
            assert_eq!(current.rank, 1);
        }

        #[tokio::test]
        async fn unranked_current_user_is_reported_as_none() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_top_ranked()
                .returning(|_, _, _, _| Ok(Some(vec![ranked("u2", 20.0, 1)])));
            store.expect_rank_of().returning(|_, _, _, _| Ok(None));
            store
                .expect_scores_batch()
                .withf(|_, user_ids| user_ids.len() == 1)
                .returning(|_, _| Ok(HashMap::new()));
            let board = service(store);

            let response = board
                .get_leaderboard(&LeaderboardQuery::default(), Some("u9"))
                .await
                .unwrap();

            assert!(response.current_user.is_none());
        }

        #[tokio::test]
        async fn metadata_port_failures_propagate_as_store_errors() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_top_ranked()
                .returning(|_, _, _, _| Ok(Some(vec![ranked("u2", 20.0, 1)])));
            store
                .expect_scores_batch()
                .returning(|_, _| Ok(HashMap::new()));
            let mut metadata = MockMetadataLookup::new();
            metadata
                .expect_metadata()
                .returning(|_, _| Err(anyhow!("lookup service down")));
            let board = service(store).with_metadata(Arc::new(metadata));

            let result = board
                .get_leaderboard(&LeaderboardQuery::default(), None)
                .await;

            match result {
                Err(Error::Store(error)) => {
                    assert!(error.to_string().contains("lookup service down"));
                }
                other => panic!("expected store error, got {:?}", other),
            }
        }
    }

    mod rebuilds {
        use super::*;

        #[tokio::test]
        async fn rebuild_validates_timeframes_up_front() {
            let mut store = MockLeaderboardStore::new();
            store.expect_build_ranking().never();
            let board = service(store);

            match board.rebuild(&["weekly"], None, None).await {
                Err(Error::Query(msg)) => assert!(msg.contains("unknown timeframe 'weekly'")),
                other => panic!("expected query error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn rebuild_surfaces_the_first_failure_after_all_attempts() {
            let mut store = MockLeaderboardStore::new();
            store
                .expect_build_ranking()
                .with(eq("day"), mockall::predicate::always(), eq(None::<u64>))
                .times(1)
                .returning(|_, _, _| Err(anyhow!("connection reset")));
            store
                .expect_build_ranking()
                .with(eq("lifetime"), mockall::predicate::always(), eq(None::<u64>))
                .times(1)
                .returning(|_, _, _| Ok(()));
            let board = service(store);

            let result = board.rebuild(&["day", "lifetime"], None, None).await;

            match result {
                Err(Error::Store(error)) => {
                    assert!(error.to_string().contains("connection reset"));
                }
                other => panic!("expected store error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn ingest_passes_through_with_a_defaulted_reference_time() {
        let mut store = MockLeaderboardStore::new();
        store
            .expect_ingest_windows()
            .times(1)
            .returning(|_, _| Ok(()));
        let board = service(store);

        let entries = vec![ScoreUpdate::new("u1").delta("profit", 10.0)];
        board.ingest(&entries, None).await.unwrap();
    }
}
