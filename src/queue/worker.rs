// SPDX-License-Identifier: MIT
//! Delivery worker loops.
//!
//! Each worker polls the queue, claims jobs one at a time, and runs the
//! matching channel sender. Failures are isolated per job: a bad SMS number
//! never delays anyone's email. Workers respect the operator pause switch
//! because `claim_next` returns nothing while paused.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use super::DeliveryQueue;
use crate::notify::channel::ChannelSender;

/// Run one delivery worker until the process exits.
///
/// `worker_id` only labels log lines. Spawn as many of these as the
/// configured concurrency — claims are atomic, so workers never collide.
pub async fn run_delivery_worker(
    queue: DeliveryQueue,
    senders: Arc<Vec<Box<dyn ChannelSender>>>,
    worker_id: usize,
    poll_interval: Duration,
) {
    let by_channel: HashMap<&'static str, &Box<dyn ChannelSender>> = senders
        .iter()
        .map(|s| (s.channel().as_str(), s))
        .collect();

    let mut ticker = interval(poll_interval);
    loop {
        ticker.tick().await;

        // Drain everything runnable before sleeping again.
        loop {
            let job = match queue.claim_next().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    warn!(worker_id, err = %e, "delivery claim failed");
                    break;
                }
            };

            let Some(sender) = by_channel.get(job.channel.as_str()) else {
                warn!(worker_id, job_id = %job.id, channel = %job.channel, "no sender for channel");
                if let Err(e) = queue
                    .record_failure(&job, &format!("no sender for channel {}", job.channel))
                    .await
                {
                    warn!(worker_id, err = %e, "failed to record missing-sender failure");
                }
                continue;
            };

            match sender.send(&job).await {
                Ok(()) => {
                    debug!(worker_id, job_id = %job.id, channel = %job.channel, "delivered");
                    if let Err(e) = queue.complete(&job.id).await {
                        warn!(worker_id, job_id = %job.id, err = %e, "failed to mark job completed");
                    }
                }
                Err(e) => {
                    warn!(
                        worker_id,
                        job_id = %job.id,
                        channel = %job.channel,
                        attempt = job.attempts + 1,
                        max = job.max_attempts,
                        err = %e,
                        "delivery attempt failed"
                    );
                    if let Err(e2) = queue.record_failure(&job, &e.to_string()).await {
                        warn!(worker_id, job_id = %job.id, err = %e2, "failed to record delivery failure");
                    }
                }
            }
        }
    }
}
