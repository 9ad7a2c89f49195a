use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{OrderId, OrderStatusType};

/// Payloads handed to the external notification collaborator (Telegram, SMS, ...).
/// Channel choice per user is the collaborator's business, not ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyPayload {
    NewOrderAvailable { order_id: OrderId, service_type: String, city: String, district: String },
    OrderAccepted { order_id: OrderId },
    OrderStatusChanged { order_id: OrderId, status: OrderStatusType },
    NewChatMessage { order_id: OrderId, message_id: i64 },
}

/// Fire-and-forget outbound push.
///
/// The contract is explicitly best-effort and non-blocking: implementations may fail silently,
/// callers wrap every call in a short timeout, log the failure and move on. A failure here must
/// never fail the state transition that triggered it.
#[allow(async_fn_in_trait)]
pub trait NotificationChannel: Clone {
    async fn notify(&self, user_id: i64, payload: NotifyPayload) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("Notification to user {0} was rejected: {1}")]
    Rejected(i64, String),
}

/// Drops every notification on the floor. The default wiring until a real channel is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl NotificationChannel for NullNotifier {
    async fn notify(&self, _user_id: i64, _payload: NotifyPayload) -> Result<(), NotifyError> {
        Ok(())
    }
}
