//! Dispatch fanout: pushing newly created orders to the workers who can take them.
//!
//! Eligibility is a flat set-membership filter over the external directory — no ranking, no
//! load balancing, no radius maths. Delivery is best-effort on both legs: workers without a
//! live gateway connection simply miss the push (they poll the available list on reconnect),
//! and the external notification channel is called fire-and-forget under a short timeout so a
//! slow third party can never delay or fail order creation.
use std::{sync::Arc, time::Duration};

use log::*;

use crate::{
    db_types::{Order, OrderStatusType},
    gateway::LivePush,
    traits::{NotificationChannel, NotifyPayload, WorkerDirectory},
};

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct Dispatcher<D, N> {
    directory: D,
    notifier: N,
    push: Arc<dyn LivePush>,
    notify_timeout: Duration,
}

impl<D, N> Dispatcher<D, N>
where
    D: WorkerDirectory,
    N: NotificationChannel,
{
    pub fn new(directory: D, notifier: N, push: Arc<dyn LivePush>) -> Self {
        Self { directory, notifier, push, notify_timeout: DEFAULT_NOTIFY_TIMEOUT }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Fans a fresh order out to every eligible worker: a live push to their connections, and a
    /// best-effort external notification each.
    pub async fn dispatch_new_order(&self, order: &Order) {
        let eligible = match self.directory.list_eligible_workers(&order.city, &order.district).await {
            Ok(workers) => workers,
            Err(e) => {
                error!("📣️ Could not compute the eligible set for order [{}]: {e}", order.order_id);
                return;
            },
        };
        debug!(
            "📣️ Order [{}] ({}, {}/{}) fans out to {} workers",
            order.order_id,
            order.service_type,
            order.city,
            order.district,
            eligible.len()
        );
        self.push.push_new_order(&eligible, order);
        for worker_id in eligible {
            let payload = NotifyPayload::NewOrderAvailable {
                order_id: order.order_id.clone(),
                service_type: order.service_type.clone(),
                city: order.city.clone(),
                district: order.district.clone(),
            };
            self.notify_external(worker_id, payload).await;
        }
    }

    /// The race has been won: retract the order from every other eligible worker's pending
    /// list (a benign removal, not an error), and push the assignment to the client.
    pub async fn announce_accepted(&self, order: &Order) {
        let Some(winner) = order.medic_id else {
            error!("📣️ Accepted order [{}] has no medic bound; skipping announcements", order.order_id);
            return;
        };
        let mut losers = self
            .directory
            .list_eligible_workers(&order.city, &order.district)
            .await
            .unwrap_or_else(|e| {
                warn!("📣️ Could not recompute the eligible set for order [{}]: {e}", order.order_id);
                Vec::new()
            });
        losers.retain(|w| *w != winner);
        self.push.push_order_taken(&losers, order);
        self.push.push_status_change(order);
        self.notify_external(order.client_id, NotifyPayload::OrderAccepted { order_id: order.order_id.clone() })
            .await;
    }

    /// Pushes a lifecycle step to both parties; the party who did not drive the step also gets
    /// an external notification.
    pub async fn announce_status_change(&self, order: &Order) {
        self.push.push_status_change(order);
        let recipient = match order.status {
            // confirmation is the client's move, everything else is the medic's
            OrderStatusType::Confirmed => order.medic_id,
            _ => Some(order.client_id),
        };
        if let Some(user_id) = recipient {
            let payload = NotifyPayload::OrderStatusChanged {
                order_id: order.order_id.clone(),
                status: order.status,
            };
            self.notify_external(user_id, payload).await;
        }
    }

    /// The client withdrew a `New` order: retract it from the eligible workers' lists.
    pub async fn announce_cancelled(&self, order: &Order) {
        let eligible = self
            .directory
            .list_eligible_workers(&order.city, &order.district)
            .await
            .unwrap_or_default();
        self.push.push_order_cancelled(&eligible, order);
    }

    async fn notify_external(&self, user_id: i64, payload: NotifyPayload) {
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(user_id, payload)).await {
            Ok(Ok(())) => trace!("📣️ External notification delivered to user {user_id}"),
            Ok(Err(e)) => warn!("📣️ External notification to user {user_id} failed: {e}"),
            Err(_) => warn!("📣️ External notification to user {user_id} timed out"),
        }
    }
}
