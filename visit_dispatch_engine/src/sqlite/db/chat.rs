use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ChatMessage, NewMessage, OrderId},
    traits::ChatApiError,
};

/// Appends a message to the order's log. The autoincrement id assigned here is the total order
/// of the log and the deduplication key clients use when history is replayed.
pub async fn insert_message(message: NewMessage, conn: &mut SqliteConnection) -> Result<ChatMessage, ChatApiError> {
    if message.is_empty() {
        return Err(ChatApiError::EmptyMessage);
    }
    let (url, kind) = match message.attachment {
        Some(a) => (Some(a.url), Some(a.kind)),
        None => (None, None),
    };
    let message: ChatMessage = sqlx::query_as(
        r#"
            INSERT INTO chat_messages (order_id, sender_id, body, attachment_url, attachment_kind)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(message.order_id)
    .bind(message.sender_id)
    .bind(message.body)
    .bind(url)
    .bind(kind)
    .fetch_one(conn)
    .await?;
    trace!("💬️ Message {} appended to order [{}]", message.id, message.order_id);
    Ok(message)
}

/// Marks all messages not authored by `reader_id` as read. Idempotent.
pub async fn mark_read(order_id: &OrderId, reader_id: i64, conn: &mut SqliteConnection) -> Result<u64, ChatApiError> {
    let result = sqlx::query(
        "UPDATE chat_messages SET is_read = 1 WHERE order_id = $1 AND sender_id != $2 AND is_read = 0",
    )
    .bind(order_id.as_str())
    .bind(reader_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// The full log for the order, oldest first.
pub async fn fetch_history(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<ChatMessage>, ChatApiError> {
    let messages: Vec<ChatMessage> =
        sqlx::query_as("SELECT * FROM chat_messages WHERE order_id = $1 ORDER BY id ASC")
            .bind(order_id.as_str())
            .fetch_all(conn)
            .await?;
    Ok(messages)
}
