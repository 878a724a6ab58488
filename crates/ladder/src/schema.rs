//! Declarative schema builder.
//!
//! The builder accumulates metric and timeframe declarations and derives
//! everything else at [`finalize`](SchemaBuilder::finalize): key strategies,
//! aggregation policies and query defaults all come from the one definition,
//! so they cannot drift apart. Validation is deferred entirely to
//! `finalize`; the accumulator itself accepts anything.
//!
//! Rolling timeframes get calendar-aligned bucket strategies. Timeframes
//! sharing a calendar unit share physical buckets: the first-declared one is
//! elected as the unit's sole ingest trigger and the others read the same
//! buckets at rebuild time, with bucket TTLs sized to cover the longest
//! same-unit span plus one slack bucket.
//!
//! ```ignore
//! let config = LeaderboardConfig::builder("casino")
//!     .metric("profit", Aggregation::Sum)
//!     .metric("max_multiplier", Aggregation::Max)
//!     .metric_in("best_streak", Aggregation::Max, ["lifetime"])
//!     .rolling("24h", WindowUnit::Hour, 24)
//!     .all_time("lifetime")
//!     .default_board("profit", "24h")
//!     .finalize()?;
//! ```

use std::collections::HashMap;

use crate::aggregate::Aggregation;
use crate::config::{Category, LeaderboardConfig, Timeframe, TimeframeKind};
use crate::error::Error;
use crate::keys::{CalendarKeyStrategy, WindowUnit};

struct MetricDef {
    key: String,
    aggregation: Aggregation,
    timeframes: Option<Vec<String>>,
}

struct TimeframeDef {
    key: String,
    kind: TimeframeKind,
}

/// Mutable accumulator for a leaderboard schema. Obtained through
/// [`LeaderboardConfig::builder`]; consumed by
/// [`finalize`](Self::finalize).
pub struct SchemaBuilder {
    namespace: String,
    metrics: Vec<MetricDef>,
    timeframes: Vec<TimeframeDef>,
    default_category: Option<String>,
    default_timeframe: Option<String>,
    limits: Option<(u32, u32)>,
}

impl SchemaBuilder {
    pub(crate) fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            metrics: Vec::new(),
            timeframes: Vec::new(),
            default_category: None,
            default_timeframe: None,
            limits: None,
        }
    }

    /// Declare a metric ranked in every timeframe.
    pub fn metric(mut self, key: impl Into<String>, aggregation: Aggregation) -> Self {
        self.metrics.push(MetricDef {
            key: key.into(),
            aggregation,
            timeframes: None,
        });
        self
    }

    /// Declare a metric ranked only in the given timeframes.
    pub fn metric_in<I, S>(
        mut self,
        key: impl Into<String>,
        aggregation: Aggregation,
        timeframes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics.push(MetricDef {
            key: key.into(),
            aggregation,
            timeframes: Some(timeframes.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Declare an all-time timeframe.
    pub fn all_time(mut self, key: impl Into<String>) -> Self {
        self.timeframes.push(TimeframeDef {
            key: key.into(),
            kind: TimeframeKind::AllTime,
        });
        self
    }

    /// Declare a rolling timeframe spanning the `size` most recent `unit`
    /// buckets.
    pub fn rolling(mut self, key: impl Into<String>, unit: WindowUnit, size: u32) -> Self {
        self.timeframes.push(TimeframeDef {
            key: key.into(),
            kind: TimeframeKind::Rolling {
                unit,
                size: size.max(1),
            },
        });
        self
    }

    /// Board queries fall back to when they name no category or timeframe.
    /// Required; `finalize` fails without it.
    pub fn default_board(
        mut self,
        category: impl Into<String>,
        timeframe: impl Into<String>,
    ) -> Self {
        self.default_category = Some(category.into());
        self.default_timeframe = Some(timeframe.into());
        self
    }

    /// Page limits applied during query normalization.
    pub fn limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.limits = Some((default_limit, max_limit));
        self
    }

    /// Validate the accumulated schema and produce the immutable
    /// configuration.
    pub fn finalize(self) -> Result<LeaderboardConfig, Error> {
        let Self {
            namespace,
            metrics,
            timeframes: timeframe_defs,
            default_category,
            default_timeframe,
            limits,
        } = self;

        // Per calendar unit: the first-declared rolling timeframe ingests
        // for everyone, and bucket TTLs must outlive the longest span.
        let mut trigger: HashMap<WindowUnit, &str> = HashMap::new();
        let mut longest: HashMap<WindowUnit, u32> = HashMap::new();
        for def in &timeframe_defs {
            if let TimeframeKind::Rolling { unit, size } = def.kind {
                trigger.entry(unit).or_insert(def.key.as_str());
                let span = longest.entry(unit).or_insert(size);
                *span = (*span).max(size);
            }
        }

        let timeframes = timeframe_defs
            .iter()
            .map(|def| match def.kind {
                TimeframeKind::AllTime => Timeframe::all_time(def.key.clone()),
                TimeframeKind::Rolling { unit, size } => {
                    let is_trigger = trigger.get(&unit).copied() == Some(def.key.as_str());
                    let span = longest.get(&unit).copied().unwrap_or(size);
                    let ttl = (u64::from(span) + 1) * unit.upper_bound_secs();
                    let strategy = CalendarKeyStrategy::new(def.key.clone(), unit, size)
                        .ingest_source(is_trigger)
                        .with_window_ttl(ttl);
                    Timeframe::rolling(def.key.clone(), unit, size).with_strategy(strategy)
                }
            })
            .collect();

        let categories = metrics
            .into_iter()
            .map(|def| {
                let category = Category::new(def.key, def.aggregation);
                match def.timeframes {
                    Some(restricted) => category.only_in(restricted),
                    None => category,
                }
            })
            .collect();

        let mut config = LeaderboardConfig::new(namespace, categories, timeframes);
        if let (Some(category), Some(timeframe)) = (default_category, default_timeframe) {
            config = config.with_defaults(category, timeframe);
        }
        if let Some((default_limit, max_limit)) = limits {
            config = config.with_limits(default_limit, max_limit);
        }
        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn casino_schema() -> SchemaBuilder {
        LeaderboardConfig::builder("casino")
            .metric("profit", Aggregation::Sum)
            .metric("wagered", Aggregation::Sum)
            .metric("max_multiplier", Aggregation::Max)
            .metric_in("best_streak", Aggregation::Max, ["lifetime"])
            .rolling("24h", WindowUnit::Hour, 24)
            .rolling("7d", WindowUnit::Day, 7)
            .all_time("lifetime")
            .default_board("profit", "24h")
    }

    #[test]
    fn finalize_produces_a_validated_config() {
        let config = casino_schema().finalize().unwrap();

        assert_eq!(config.namespace(), "casino");
        assert_eq!(config.categories().len(), 4);
        assert_eq!(config.timeframes().len(), 3);
        assert!(config.supports("profit", "24h"));
        assert!(config.supports("best_streak", "lifetime"));
        assert!(!config.supports("best_streak", "24h"));
    }

    #[test]
    fn duplicate_metric_is_rejected_at_finalize() {
        let result = casino_schema().metric("profit", Aggregation::Max).finalize();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("duplicate category 'profit'")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn missing_default_board_is_rejected_at_finalize() {
        let result = LeaderboardConfig::builder("casino")
            .metric("profit", Aggregation::Sum)
            .all_time("lifetime")
            .finalize();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("no default category")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn rolling_timeframes_use_calendar_buckets() {
        let config = casino_schema().finalize().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 8, 23, 14, 35, 0).unwrap();

        let daily = config.timeframe("24h").unwrap();
        assert_eq!(
            daily.strategy().ingest_keys("profit", at),
            vec!["window:hour:2026082314:profit"]
        );
        assert_eq!(daily.strategy().source_keys("profit", at).len(), 24);
    }

    #[test]
    fn first_declared_rolling_timeframe_is_the_unit_trigger() {
        let config = LeaderboardConfig::builder("casino")
            .metric("profit", Aggregation::Sum)
            .rolling("1h", WindowUnit::Hour, 1)
            .rolling("24h", WindowUnit::Hour, 24)
            .default_board("profit", "24h")
            .finalize()
            .unwrap();
        let at = Utc.with_ymd_and_hms(2026, 8, 23, 14, 35, 0).unwrap();

        let hourly = config.timeframe("1h").unwrap().strategy();
        let daily = config.timeframe("24h").unwrap().strategy();

        // One writer per unit; the other timeframe reads the same buckets.
        assert_eq!(hourly.ingest_keys("profit", at), vec![
            "window:hour:2026082314:profit"
        ]);
        assert!(daily.ingest_keys("profit", at).is_empty());
        assert_eq!(
            daily.source_keys("profit", at)[0],
            "window:hour:2026082314:profit"
        );

        // Bucket TTLs cover the longest same-unit span plus one slack
        // bucket, whichever timeframe they were written through.
        assert_eq!(hourly.window_ttl_secs("profit", at), Some(25 * 3_600));
        assert_eq!(daily.window_ttl_secs("profit", at), Some(25 * 3_600));
    }

    #[test]
    fn extreme_rolling_sizes_still_finalize() {
        let config = LeaderboardConfig::builder("casino")
            .metric("profit", Aggregation::Sum)
            .rolling("ever", WindowUnit::Hour, u32::MAX)
            .default_board("profit", "ever")
            .finalize()
            .unwrap();
        let at = Utc.with_ymd_and_hms(2026, 8, 23, 14, 35, 0).unwrap();

        let strategy = config.timeframe("ever").unwrap().strategy();
        assert_eq!(
            strategy.window_ttl_secs("profit", at),
            Some((u64::from(u32::MAX) + 1) * 3_600)
        );
    }

    #[test]
    fn all_time_keeps_the_label_window() {
        let config = casino_schema().finalize().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 8, 23, 14, 35, 0).unwrap();

        let lifetime = config.timeframe("lifetime").unwrap().strategy();
        assert_eq!(
            lifetime.ingest_keys("best_streak", at),
            vec!["window:lifetime:best_streak"]
        );
        assert_eq!(lifetime.window_ttl_secs("best_streak", at), None);
    }

    #[test]
    fn limits_flow_through_to_the_config() {
        let config = casino_schema().limits(10, 50).finalize().unwrap();

        assert_eq!(config.default_limit(), 10);
        assert_eq!(config.max_limit(), 50);
    }
}
