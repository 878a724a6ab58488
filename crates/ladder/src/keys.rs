//! Window and rank key resolution.
//!
//! A [`KeyStrategy`] maps a category and a point in time onto the physical
//! keys one timeframe reads and writes. Strategies are bound to a single
//! timeframe at construction; the store adapter prefixes every returned key
//! with the configuration namespace, so keys here are namespace-relative.
//!
//! ## Key Patterns
//!
//! ```text
//! window:{timeframe}:{category}        → label window (naive default)
//! window:{unit}:{stamp}:{category}     → calendar bucket (hour/day/month)
//! rank:{timeframe}:{category}          → materialized rank structure
//! ```
//!
//! Calendar stamps are UTC-truncated: `%Y%m%d%H` for hours, `%Y%m%d` for
//! days, `%Y%m` for months. Category and timeframe keys are validated at
//! configuration time to be non-empty and `:`-free, which keeps every
//! pattern above injective without hashing or truncating identifiers.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Calendar unit a rolling timeframe buckets by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Hour,
    Day,
    Month,
}

impl WindowUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowUnit::Hour => "hour",
            WindowUnit::Day => "day",
            WindowUnit::Month => "month",
        }
    }

    /// Truncate a UTC instant to the start of the unit containing it.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WindowUnit::Hour => at
                .date_naive()
                .and_hms_opt(at.hour(), 0, 0)
                .expect("whole hour is always valid")
                .and_utc(),
            WindowUnit::Day => at
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc(),
            WindowUnit::Month => NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
                .expect("day 1 is always valid")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc(),
        }
    }

    /// Step an instant backward by `steps` whole units.
    pub fn step_back(&self, at: DateTime<Utc>, steps: u32) -> DateTime<Utc> {
        match self {
            WindowUnit::Hour => at - Duration::hours(i64::from(steps)),
            WindowUnit::Day => at - Duration::days(i64::from(steps)),
            WindowUnit::Month => at
                .checked_sub_months(Months::new(steps))
                .expect("month arithmetic overflow"),
        }
    }

    /// Bucket stamp for the unit containing `at`. The format drops every
    /// sub-unit component, so stamping and truncating commute.
    pub fn stamp(&self, at: DateTime<Utc>) -> String {
        match self {
            WindowUnit::Hour => at.format("%Y%m%d%H").to_string(),
            WindowUnit::Day => at.format("%Y%m%d").to_string(),
            WindowUnit::Month => at.format("%Y%m").to_string(),
        }
    }

    /// Upper bound on the unit's length in seconds. TTLs derived from this
    /// only need to outlive the merge horizon, not match it exactly.
    pub(crate) fn upper_bound_secs(&self) -> u64 {
        match self {
            WindowUnit::Hour => 3_600,
            WindowUnit::Day => 86_400,
            WindowUnit::Month => 31 * 86_400,
        }
    }
}

/// Resolution strategy for one timeframe's physical keys.
///
/// All keys are namespace-relative; the adapter owns the namespace prefix.
/// Implementations must keep distinct (category, time-bucket) pairs on
/// distinct keys - the provided strategies guarantee this for identifiers
/// that pass configuration validation, custom ones are responsible for
/// their own injectivity.
pub trait KeyStrategy: Send + Sync {
    /// Window key(s) a delta for `category` at `at` must be written into.
    ///
    /// An empty vec means this timeframe is not an ingest target for the
    /// category - used when a canonical timeframe is elected as the sole
    /// ingest trigger for shared calendar buckets and the others derive
    /// their boards purely at rebuild time. Strategies returning the same
    /// key from several configured timeframes will double-apply deltas;
    /// elect one trigger instead.
    fn ingest_keys(&self, category: &str, at: DateTime<Utc>) -> Vec<String>;

    /// Window keys merged when materializing the rank structure at `at`.
    ///
    /// An empty vec means the category does not participate in this
    /// timeframe and causes the rank structure to be cleared rather than
    /// left stale. Enumeration order does not affect the merge result.
    fn source_keys(&self, category: &str, at: DateTime<Utc>) -> Vec<String>;

    /// Destination key for the materialized rank structure. Total: it must
    /// answer even for categories that never ingest here, so clears can be
    /// addressed.
    fn rank_key(&self, category: &str) -> String;

    /// Expiry applied to window keys written at `at`, refreshed per write.
    fn window_ttl_secs(&self, category: &str, at: DateTime<Utc>) -> Option<u64>;
}

/// Naive default strategy: one window key per (timeframe, category), keyed
/// by the timeframe label. Every configured timeframe ingests its own copy
/// of each delta; rebuild merges that single key. Rolling timeframes get a
/// window TTL approximating their span, so an abandoned board eventually
/// clears itself.
#[derive(Debug, Clone)]
pub struct LabelKeyStrategy {
    timeframe: String,
    window_ttl: Option<u64>,
}

impl LabelKeyStrategy {
    pub fn new(timeframe: impl Into<String>) -> Self {
        Self {
            timeframe: timeframe.into(),
            window_ttl: None,
        }
    }

    pub fn with_window_ttl(mut self, secs: u64) -> Self {
        self.window_ttl = Some(secs);
        self
    }
}

impl KeyStrategy for LabelKeyStrategy {
    fn ingest_keys(&self, category: &str, _at: DateTime<Utc>) -> Vec<String> {
        vec![format!("window:{}:{}", self.timeframe, category)]
    }

    fn source_keys(&self, category: &str, _at: DateTime<Utc>) -> Vec<String> {
        vec![format!("window:{}:{}", self.timeframe, category)]
    }

    fn rank_key(&self, category: &str) -> String {
        format!("rank:{}:{}", self.timeframe, category)
    }

    fn window_ttl_secs(&self, _category: &str, _at: DateTime<Utc>) -> Option<u64> {
        self.window_ttl
    }
}

/// Calendar-bucketed strategy for rolling timeframes: deltas land in the
/// current unit-aligned bucket, rebuild merges the `span` most recent
/// buckets ending at the bucket containing the reference time.
///
/// Buckets are keyed by unit and stamp, independent of the timeframe label,
/// so several timeframes over the same unit share one set of buckets and
/// merge different spans of them. Exactly one of those timeframes should be
/// the ingest source; the schema builder elects the first-declared one and
/// sizes its window TTL to cover the longest same-unit span.
#[derive(Debug, Clone)]
pub struct CalendarKeyStrategy {
    timeframe: String,
    unit: WindowUnit,
    span: u32,
    ingest_source: bool,
    window_ttl: Option<u64>,
}

impl CalendarKeyStrategy {
    pub fn new(timeframe: impl Into<String>, unit: WindowUnit, span: u32) -> Self {
        // Widen before adding the grace bucket; span may sit at u32::MAX.
        let ttl = (u64::from(span.max(1)) + 1) * unit.upper_bound_secs();
        Self {
            timeframe: timeframe.into(),
            unit,
            span: span.max(1),
            ingest_source: true,
            window_ttl: Some(ttl),
        }
    }

    /// Whether this timeframe writes deltas into the shared buckets.
    pub fn ingest_source(mut self, enabled: bool) -> Self {
        self.ingest_source = enabled;
        self
    }

    pub fn with_window_ttl(mut self, secs: u64) -> Self {
        self.window_ttl = Some(secs);
        self
    }

    fn bucket_key(&self, category: &str, at: DateTime<Utc>) -> String {
        format!(
            "window:{}:{}:{}",
            self.unit.as_str(),
            self.unit.stamp(at),
            category
        )
    }
}

impl KeyStrategy for CalendarKeyStrategy {
    fn ingest_keys(&self, category: &str, at: DateTime<Utc>) -> Vec<String> {
        if !self.ingest_source {
            return Vec::new();
        }
        vec![self.bucket_key(category, at)]
    }

    fn source_keys(&self, category: &str, at: DateTime<Utc>) -> Vec<String> {
        (0..self.span)
            .map(|back| self.bucket_key(category, self.unit.step_back(at, back)))
            .collect()
    }

    fn rank_key(&self, category: &str) -> String {
        format!("rank:{}:{}", self.timeframe, category)
    }

    fn window_ttl_secs(&self, _category: &str, _at: DateTime<Utc>) -> Option<u64> {
        self.window_ttl
    }
}
