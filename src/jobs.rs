/// Background maintenance jobs.
/// All jobs run on tokio intervals — started from main after storage init.

use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::activity::ActivityRecorder;
use crate::queue::DeliveryQueue;

/// Queue janitor: runs hourly.
/// Removes completed/failed delivery jobs older than `clean_after_hours`.
pub async fn run_queue_janitor(queue: DeliveryQueue, clean_after_hours: i64) {
    let mut ticker = interval(Duration::from_secs(3600));
    loop {
        ticker.tick().await;

        match queue.clean(clean_after_hours * 3600).await {
            Ok(count) if count > 0 => info!("Cleaned {count} terminal delivery jobs"),
            Ok(_) => {}
            Err(e) => warn!("Queue janitor error: {e}"),
        }
    }
}

/// Activity log pruner: runs every 24h. The audit log is never pruned.
pub async fn run_activity_pruner(activity: ActivityRecorder, retention_days: i64) {
    let mut ticker = interval(Duration::from_secs(86400));
    loop {
        ticker.tick().await;

        match activity.prune(retention_days).await {
            Ok(count) if count > 0 => info!("Pruned {count} old activity log entries"),
            Ok(_) => {}
            Err(e) => warn!("Activity pruner error: {e}"),
        }
    }
}
