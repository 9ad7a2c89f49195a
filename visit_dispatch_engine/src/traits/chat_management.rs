use thiserror::Error;

use crate::db_types::{ChatMessage, NewMessage, OrderId};

/// Per-order append-only message log with read tracking.
///
/// Messages are totally ordered by the server-assigned `id` at persistence time, not by client
/// send time; `fetch_history` always returns the same prefix plus any new suffix, which is what
/// lets clients replay it idempotently after a reconnect.
#[allow(async_fn_in_trait)]
pub trait ChatManagement: Clone {
    /// Appends a message and returns it with its server-assigned id and timestamp.
    /// The caller is responsible for the membership check; this method only validates content.
    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, ChatApiError>;

    /// Marks every message in the order **not authored by** `reader_id` as read.
    /// Idempotent; returns the number of messages newly marked.
    async fn mark_messages_read(&self, order_id: &OrderId, reader_id: i64) -> Result<u64, ChatApiError>;

    /// The full message log for the order, in creation order.
    async fn fetch_history(&self, order_id: &OrderId) -> Result<Vec<ChatMessage>, ChatApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum ChatApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("User {0} is not a participant of order {1}")]
    NotAParticipant(i64, OrderId),
    #[error("A message needs text or an attachment")]
    EmptyMessage,
}

impl From<sqlx::Error> for ChatApiError {
    fn from(e: sqlx::Error) -> Self {
        ChatApiError::DatabaseError(e.to_string())
    }
}
