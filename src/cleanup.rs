//! Scheduled cleanup of expired session records.
//!
//! An expired refresh token already fails signature verification on its own;
//! the session rows it leaves behind are just dead weight, purged here so
//! the table only holds sessions that could still authenticate.

use crate::db::Database;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run cleanup once.
pub async fn run_cleanup(db: &Database) {
    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs(),
        Err(e) => {
            error!("System clock is before the Unix epoch: {}", e);
            return;
        }
    };

    match db.sessions().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
