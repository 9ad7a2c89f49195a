use log::*;

use crate::{
    db_types::{Attachment, ChatMessage, NewMessage, Order, OrderId},
    traits::{AccessClaims, ChatApiError, ChatManagement, DispatchDatabase},
};

/// Per-order chat with the membership rule applied on every call: a message log is visible only
/// to the order's client, its bound medic, and platform admins. Channel existence is gated by
/// order existence and nothing else — chat is deliberately independent of the visit lifecycle.
pub struct ChatApi<B> {
    db: B,
}

impl<B> ChatApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ChatApi<B>
where B: DispatchDatabase + ChatManagement
{
    /// Appends a message from `sender`. Requires text or an attachment, and sender membership.
    /// The returned message carries the server-assigned id that clients deduplicate on.
    pub async fn send_message(
        &self,
        order_id: &OrderId,
        sender: &AccessClaims,
        body: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<ChatMessage, ChatApiError> {
        let order = self.fetch_order_for_chat(order_id).await?;
        ensure_participant(&order, sender)?;
        let message =
            NewMessage { order_id: order_id.clone(), sender_id: sender.user_id, body, attachment };
        let message = self.db.append_message(message).await?;
        trace!("💬️ User {} wrote message {} in order [{order_id}]", sender.user_id, message.id);
        Ok(message)
    }

    /// The full log in creation order. Restartable: calling it twice returns the same prefix
    /// plus whatever arrived in between.
    pub async fn history(&self, order_id: &OrderId, requester: &AccessClaims) -> Result<Vec<ChatMessage>, ChatApiError> {
        let order = self.fetch_order_for_chat(order_id).await?;
        ensure_participant(&order, requester)?;
        self.db.fetch_history(order_id).await
    }

    /// Marks everything not authored by the reader as read. Idempotent.
    pub async fn mark_read(&self, order_id: &OrderId, reader: &AccessClaims) -> Result<u64, ChatApiError> {
        let order = self.fetch_order_for_chat(order_id).await?;
        ensure_participant(&order, reader)?;
        self.db.mark_messages_read(order_id, reader.user_id).await
    }

    async fn fetch_order_for_chat(&self, order_id: &OrderId) -> Result<Order, ChatApiError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await
            .map_err(|e| ChatApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ChatApiError::OrderNotFound(order_id.clone()))
    }
}

/// The membership rule shared by every chat operation.
pub fn ensure_participant(order: &Order, claims: &AccessClaims) -> Result<(), ChatApiError> {
    let user_id = claims.user_id;
    if order.client_id == user_id || order.medic_id == Some(user_id) || claims.is_admin() {
        Ok(())
    } else {
        Err(ChatApiError::NotAParticipant(user_id, order.order_id.clone()))
    }
}
