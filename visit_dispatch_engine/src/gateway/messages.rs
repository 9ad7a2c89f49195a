use serde::{Deserialize, Serialize};

use crate::db_types::{ChatMessage, Order, OrderId, OrderStatusType};

/// Everything the gateway can push down a connection.
///
/// `ChatMessage` frames are used both for live relay and for history replay on join; the
/// embedded server-assigned message id is the documented deduplication key, so a client that
/// already holds a message id discards the redelivery instead of re-inserting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// First frame on any connection; carries the server-assigned connection id.
    Connected { connection_id: u64 },
    Authenticated { user_id: i64 },
    /// A new order this worker is eligible for.
    NewOrderAvailable { order: Order },
    /// Benign retraction: another medic won the race, drop the order from the pending list.
    OrderTaken { order_id: OrderId },
    /// The client withdrew the order before anyone accepted it.
    OrderCancelled { order_id: OrderId },
    OrderStatusChanged { order_id: OrderId, status: OrderStatusType },
    ChatMessage { message: ChatMessage },
    /// Personal ping for a participant with no connection in the room; drives toasts and
    /// unread counters without carrying the message body.
    NewChatMessage { order_id: OrderId, message_id: i64, sender_id: i64 },
}
