// SPDX-License-Identifier: MIT
//! Notification fan-out.
//!
//! Turns one mutation event into per-(recipient, channel) delivery jobs.
//! Runs after the mutation has committed: every failure in here is logged
//! and swallowed — a mutation is never rolled back or failed because someone
//! could not be notified.

use std::collections::BTreeSet;
use tracing::warn;

use super::event::{self, RecipientSet, TaskEvent};
use crate::queue::{Channel, DeliveryQueue, NewJob};
use crate::users::{UserDirectory, UserRow};

/// Which channels are wired up in this deployment. In-app always works (it is
/// a local table write); email/SMS depend on provider configuration.
#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    pub email_enabled: bool,
    pub sms_enabled: bool,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            email_enabled: true,
            sms_enabled: true,
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    users: UserDirectory,
    queue: DeliveryQueue,
    channels: ChannelPolicy,
}

impl NotificationDispatcher {
    pub fn new(users: UserDirectory, queue: DeliveryQueue, channels: ChannelPolicy) -> Self {
        Self {
            users,
            queue,
            channels,
        }
    }

    /// Fan an event out to its recipients. Best-effort: per-recipient and
    /// per-channel failures are independent and never propagate.
    pub async fn dispatch(&self, event: &TaskEvent) {
        let user_ids = match event::recipients(event) {
            RecipientSet::Users(ids) => ids,
            RecipientSet::Roles { roles, except } => {
                let mut ids: BTreeSet<String> = match self.users.list_by_roles(&roles).await {
                    Ok(users) => users.into_iter().map(|u| u.id).collect(),
                    Err(e) => {
                        warn!(err = %e, "recipient role expansion failed, dropping fan-out");
                        return;
                    }
                };
                ids.remove(&except);
                ids
            }
        };

        if user_ids.is_empty() {
            return;
        }

        let (title, body) = event::render(event);
        let (related_type, related_id) = event::related(event);
        let urgent = event::is_urgent(event);

        for user_id in user_ids {
            let user = match self.users.get(&user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    warn!(user_id = %user_id, "recipient not in directory, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %user_id, err = %e, "recipient lookup failed, skipping");
                    continue;
                }
            };

            for (channel, address) in self.channels_for(&user, urgent) {
                let job = NewJob {
                    channel,
                    recipient: user.id.clone(),
                    recipient_address: address,
                    title: title.clone(),
                    body: body.clone(),
                    related_type: related_type.to_string(),
                    related_id: related_id.clone(),
                };
                if let Err(e) = self.queue.enqueue(job).await {
                    warn!(
                        user_id = %user.id,
                        channel = channel.as_str(),
                        err = %e,
                        "failed to enqueue delivery job"
                    );
                }
            }
        }
    }

    /// In-app always; email whenever the user has an address; SMS only for
    /// urgent events to users with a phone number.
    fn channels_for(&self, user: &UserRow, urgent: bool) -> Vec<(Channel, String)> {
        let mut out = vec![(Channel::InApp, user.id.clone())];
        if self.channels.email_enabled {
            if let Some(email) = &user.email {
                out.push((Channel::Email, email.clone()));
            }
        }
        if self.channels.sms_enabled && urgent {
            if let Some(phone) = &user.phone {
                out.push((Channel::Sms, phone.clone()));
            }
        }
        out
    }
}
