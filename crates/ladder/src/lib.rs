//! Rolling multi-category leaderboards on Redis sorted sets.
//!
//! Scores are accumulated per user into time-bucketed window sets (the
//! source of truth), merged into rank structures on rebuild, and read back
//! as top-N pages, individual ranks and batched score lookups. The same
//! engine runs against Redis or fully in process.
//!
//! ## Components
//!
//! - **schema / config** - declarative definition of categories (sum, max
//!   or min metrics) and timeframes (rolling or all-time)
//! - **keys** - strategies resolving (category, timeframe, time) onto
//!   physical storage keys
//! - **store** - the windowed store adapter: ingest, rebuild, ranked reads
//! - **service** - query normalization, page assembly and enrichment
//!
//! ## Quickstart
//!
//! ```ignore
//! use std::sync::Arc;
//! use ladder::{
//!     Aggregation, Leaderboard, LeaderboardConfig, LeaderboardQuery,
//!     MemoryLeaderboardStore, ScoreUpdate, WindowUnit,
//! };
//!
//! let config = LeaderboardConfig::builder("casino")
//!     .metric("profit", Aggregation::Sum)
//!     .rolling("24h", WindowUnit::Hour, 24)
//!     .all_time("lifetime")
//!     .default_board("profit", "24h")
//!     .finalize()?;
//!
//! let store = Arc::new(MemoryLeaderboardStore::new(config.clone()));
//! let board = Leaderboard::new(config, store)?;
//!
//! board.ingest(&[ScoreUpdate::new("u1").delta("profit", 10.0)], None).await?;
//! board.rebuild(&["24h", "lifetime"], None, None).await?;
//! let page = board.get_leaderboard(&LeaderboardQuery::default(), Some("u1")).await?;
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod ports;
pub mod schema;
pub mod service;
pub mod store;

pub use aggregate::Aggregation;
pub use config::{Category, LeaderboardConfig, Timeframe, TimeframeKind};
pub use error::Error;
pub use keys::{CalendarKeyStrategy, KeyStrategy, LabelKeyStrategy, WindowUnit};
pub use models::{
    LeaderboardEntry, LeaderboardQuery, LeaderboardResponse, RankedEntry, ResolvedQuery,
    ScoreUpdate, SortOrder,
};
pub use ports::{MetadataLookup, UsernameLookup};
pub use schema::SchemaBuilder;
pub use service::Leaderboard;
pub use store::{LeaderboardStore, memory::MemoryLeaderboardStore, redis::RedisLeaderboardStore};
