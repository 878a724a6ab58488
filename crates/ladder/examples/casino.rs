//! Runs a small casino leaderboard against the in-memory store.
//!
//! ```text
//! cargo run --example casino
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use ladder::{
    Aggregation, Leaderboard, LeaderboardConfig, LeaderboardQuery, MemoryLeaderboardStore,
    ScoreUpdate, SortOrder, WindowUnit,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let config = LeaderboardConfig::builder("casino")
        .metric("profit", Aggregation::Sum)
        .metric("wagered", Aggregation::Sum)
        .metric("max_multiplier", Aggregation::Max)
        .metric_in("best_streak", Aggregation::Max, ["lifetime"])
        .rolling("24h", WindowUnit::Hour, 24)
        .rolling("7d", WindowUnit::Day, 7)
        .all_time("lifetime")
        .default_board("profit", "24h")
        .finalize()?;

    let store = MemoryLeaderboardStore::new(config.clone());
    let board = Leaderboard::new(config, Arc::new(store))?;

    // (hours ago, user, profit, wagered, multiplier)
    let rounds: [(i64, &str, f64, f64, f64); 6] = [
        (30, "alice", 120.0, 400.0, 3.2),
        (30, "bob", -40.0, 900.0, 48.0),
        (6, "alice", -15.0, 220.0, 1.1),
        (6, "carol", 65.0, 150.0, 9.7),
        (1, "bob", 210.0, 350.0, 12.5),
        (0, "carol", 30.0, 80.0, 2.4),
    ];

    let now = Utc::now();
    for (hours_ago, user, profit, wagered, multiplier) in rounds {
        let at = now - Duration::hours(hours_ago);
        let entries = vec![
            ScoreUpdate::new(user)
                .delta("profit", profit)
                .delta("wagered", wagered)
                .delta("max_multiplier", multiplier),
        ];
        board.ingest(&entries, Some(at)).await?;
        tracing::info!(user = %user, %at, "Ingested a round of play");
    }
    let streak = vec![ScoreUpdate::new("bob").delta("best_streak", 7.0)];
    board.ingest(&streak, Some(now)).await?;

    board.rebuild(&["24h", "7d", "lifetime"], Some(now), None).await?;
    tracing::info!("Rebuilt rank structures");

    // The 30-hours-ago rounds have aged out of the default 24h board.
    let page = board
        .get_leaderboard(&LeaderboardQuery::default(), Some("bob"))
        .await?;
    println!("top profit over 24h:\n{}", serde_json::to_string_pretty(&page)?);

    let query = LeaderboardQuery {
        order_by: Some("wagered".to_string()),
        timeframe: Some("lifetime".to_string()),
        sort: Some(SortOrder::Desc),
        limit: Some(2),
    };
    let whales = board.get_leaderboard(&query, Some("carol")).await?;
    println!(
        "top wagered all-time:\n{}",
        serde_json::to_string_pretty(&whales)?
    );

    Ok(())
}
