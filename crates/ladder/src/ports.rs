//! Enrichment ports.
//!
//! Optional collaborators the service uses to decorate leaderboard pages.
//! Both are batched and purely additive: scores and ranks never depend on
//! them.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// Batched user ID to username resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsernameLookup: Send + Sync {
    /// Usernames for the given users. Users without one are simply
    /// absent from the result.
    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>>;
}

/// Batched per-timeframe metadata resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Arbitrary JSON metadata for the given users, scoped to one
    /// timeframe. Users without any are simply absent from the result.
    async fn metadata(
        &self,
        timeframe: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, serde_json::Value>>;
}
