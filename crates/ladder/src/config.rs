//! Leaderboard configuration: categories, timeframes and query defaults.
//!
//! A [`LeaderboardConfig`] is assembled either manually from [`Category`] and
//! [`Timeframe`] values or through the schema builder
//! ([`LeaderboardConfig::builder`]), and is validated once when the service
//! is constructed. After validation it is immutable.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::Aggregation;
use crate::error::Error;
use crate::keys::{KeyStrategy, LabelKeyStrategy, WindowUnit};
use crate::schema::SchemaBuilder;

const DEFAULT_PAGE_LIMIT: u32 = 25;
const DEFAULT_MAX_PAGE_LIMIT: u32 = 100;

/// A named numeric metric tracked per user.
///
/// By default a category participates in every configured timeframe;
/// [`only_in`](Self::only_in) restricts it to a subset.
#[derive(Debug, Clone)]
pub struct Category {
    key: String,
    aggregation: Aggregation,
    timeframes: Option<BTreeSet<String>>,
}

impl Category {
    pub fn new(key: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            key: key.into(),
            aggregation,
            timeframes: None,
        }
    }

    /// Restrict this category to the given timeframes.
    pub fn only_in<I, S>(mut self, timeframes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timeframes = Some(timeframes.into_iter().map(Into::into).collect());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn participates_in(&self, timeframe: &str) -> bool {
        match &self.timeframes {
            None => true,
            Some(restricted) => restricted.contains(timeframe),
        }
    }
}

/// How a timeframe spans time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeframeKind {
    AllTime,
    Rolling { unit: WindowUnit, size: u32 },
}

/// A named time horizon with the key strategy resolving its physical keys.
#[derive(Clone)]
pub struct Timeframe {
    key: String,
    kind: TimeframeKind,
    strategy: Arc<dyn KeyStrategy>,
}

impl Timeframe {
    /// An unwindowed timeframe: one fixed window key, no expiry.
    pub fn all_time(key: impl Into<String>) -> Self {
        let key = key.into();
        let strategy = LabelKeyStrategy::new(key.clone());
        Self {
            key,
            kind: TimeframeKind::AllTime,
            strategy: Arc::new(strategy),
        }
    }

    /// A rolling timeframe covering the `size` most recent `unit` buckets.
    ///
    /// The default strategy still uses a single label-keyed window whose TTL
    /// approximates the span; swap in a
    /// [`CalendarKeyStrategy`](crate::keys::CalendarKeyStrategy) (directly or
    /// via the schema builder) for true bucket-level expiry.
    pub fn rolling(key: impl Into<String>, unit: WindowUnit, size: u32) -> Self {
        let key = key.into();
        let size = size.max(1);
        let strategy = LabelKeyStrategy::new(key.clone())
            .with_window_ttl(u64::from(size) * unit.upper_bound_secs());
        Self {
            key,
            kind: TimeframeKind::Rolling { unit, size },
            strategy: Arc::new(strategy),
        }
    }

    /// Replace the key strategy. The kind is descriptive only; resolution is
    /// entirely the strategy's.
    pub fn with_strategy(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> TimeframeKind {
        self.kind
    }

    pub fn strategy(&self) -> &dyn KeyStrategy {
        self.strategy.as_ref()
    }
}

impl fmt::Debug for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeframe")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Immutable description of one leaderboard deployment: its namespace, its
/// categories and timeframes, and the defaults queries fall back to.
#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    namespace: String,
    categories: Vec<Category>,
    timeframes: Vec<Timeframe>,
    default_category: Option<String>,
    default_timeframe: Option<String>,
    default_limit: u32,
    max_limit: u32,
}

impl LeaderboardConfig {
    pub fn new(
        namespace: impl Into<String>,
        categories: Vec<Category>,
        timeframes: Vec<Timeframe>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            categories,
            timeframes,
            default_category: None,
            default_timeframe: None,
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_PAGE_LIMIT,
        }
    }

    /// Entry point for the fluent schema builder.
    pub fn builder(namespace: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(namespace)
    }

    pub fn with_defaults(
        mut self,
        category: impl Into<String>,
        timeframe: impl Into<String>,
    ) -> Self {
        self.default_category = Some(category.into());
        self.default_timeframe = Some(timeframe.into());
        self
    }

    pub fn with_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn timeframe(&self, key: &str) -> Option<&Timeframe> {
        self.timeframes.iter().find(|t| t.key == key)
    }

    /// Whether the (category, timeframe) board exists in this configuration.
    pub fn supports(&self, category: &str, timeframe: &str) -> bool {
        if self.timeframe(timeframe).is_none() {
            return false;
        }
        match self.category(category) {
            Some(category) => category.participates_in(timeframe),
            None => false,
        }
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    pub(crate) fn require_default_category(&self) -> Result<&str, Error> {
        self.default_category
            .as_deref()
            .ok_or_else(|| Error::Config("no default category configured".to_string()))
    }

    pub(crate) fn require_default_timeframe(&self) -> Result<&str, Error> {
        self.default_timeframe
            .as_deref()
            .ok_or_else(|| Error::Config("no default timeframe configured".to_string()))
    }

    /// Namespace-prefixed physical key.
    pub(crate) fn physical_key(&self, relative_key: &str) -> String {
        format!("{}:{}", self.namespace, relative_key)
    }

    /// Full structural validation, run once at service construction and by
    /// the schema builder's finalize step.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(Error::Config(
                "at least one category is required".to_string(),
            ));
        }
        if self.timeframes.is_empty() {
            return Err(Error::Config(
                "at least one timeframe is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for category in &self.categories {
            validate_identifier("category", &category.key)?;
            if !seen.insert(category.key.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate category '{}'",
                    category.key
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for timeframe in &self.timeframes {
            validate_identifier("timeframe", &timeframe.key)?;
            if !seen.insert(timeframe.key.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate timeframe '{}'",
                    timeframe.key
                )));
            }
        }

        for category in &self.categories {
            if let Some(restricted) = &category.timeframes {
                if restricted.is_empty() {
                    return Err(Error::Config(format!(
                        "category '{}' participates in no timeframe",
                        category.key
                    )));
                }
                for timeframe in restricted {
                    if self.timeframe(timeframe).is_none() {
                        return Err(Error::Config(format!(
                            "category '{}' references unknown timeframe '{}'",
                            category.key, timeframe
                        )));
                    }
                }
            }
        }

        let default_category = self.require_default_category()?;
        if self.category(default_category).is_none() {
            return Err(Error::Config(format!(
                "default category '{}' is not configured",
                default_category
            )));
        }
        let default_timeframe = self.require_default_timeframe()?;
        if self.timeframe(default_timeframe).is_none() {
            return Err(Error::Config(format!(
                "default timeframe '{}' is not configured",
                default_timeframe
            )));
        }

        if self.default_limit < 1 {
            return Err(Error::Config("default limit must be at least 1".to_string()));
        }
        if self.max_limit < 1 {
            return Err(Error::Config("max limit must be at least 1".to_string()));
        }
        if self.default_limit > self.max_limit {
            return Err(Error::Config(format!(
                "default limit {} exceeds max limit {}",
                self.default_limit, self.max_limit
            )));
        }

        Ok(())
    }
}

fn validate_identifier(role: &str, key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::Config(format!("{} key must not be empty", role)));
    }
    if key.contains(':') {
        return Err(Error::Config(format!(
            "{} key '{}' must not contain ':'",
            role, key
        )));
    }
    Ok(())
}
