//! Aggregation policies for categories.
//!
//! A category's policy determines both the window-write operation applied at
//! ingest time and the merge operator used when window buckets are combined
//! into a rank structure. The two always travel together - mixing policies
//! for one category across calls is a configuration bug, prevented by fixing
//! the policy on [`crate::config::Category`] at construction time.

use serde::{Deserialize, Serialize};

/// How per-user values combine, at ingest and at rebuild-time merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Running total: ingest adds the delta, merge sums across buckets.
    Sum,
    /// Running maximum: a delta below the recorded value is silently ignored.
    Max,
    /// Running minimum: a delta above the recorded value is silently ignored.
    Min,
}

impl Aggregation {
    /// Combine a recorded value with an incoming one.
    ///
    /// Used both for applying a delta to a bucket entry and for folding
    /// bucket values into a rank structure.
    pub fn apply(&self, current: f64, incoming: f64) -> f64 {
        match self {
            Aggregation::Sum => current + incoming,
            Aggregation::Max => current.max(incoming),
            Aggregation::Min => current.min(incoming),
        }
    }

    /// Token for the backing store's union-merge `AGGREGATE` option.
    pub(crate) fn merge_operator(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_accumulates_in_sequence() {
        let total = [10.0, -3.0, 5.5]
            .iter()
            .fold(0.0, |acc, d| Aggregation::Sum.apply(acc, *d));

        assert_eq!(total, 12.5);
    }

    #[test]
    fn max_ignores_lower_values() {
        let mut value = 20.0;
        for d in [8.0, 40.0, 12.0] {
            value = Aggregation::Max.apply(value, d);
        }

        assert_eq!(value, 40.0);
    }

    #[test]
    fn min_ignores_higher_values() {
        let mut value = 20.0;
        for d in [8.0, 40.0, 12.0] {
            value = Aggregation::Min.apply(value, d);
        }

        assert_eq!(value, 8.0);
    }

    #[test]
    fn merge_operator_matches_policy() {
        assert_eq!(Aggregation::Sum.merge_operator(), "SUM");
        assert_eq!(Aggregation::Max.merge_operator(), "MAX");
        assert_eq!(Aggregation::Min.merge_operator(), "MIN");
    }
}
