//! The realtime gateway: the connection layer of the platform.
//!
//! The gateway binds long-lived connections to authenticated users and routes three kinds of
//! traffic over them: the personal notification stream, per-order chat room membership, and
//! chat message relay. It is transport-agnostic — a connection is nothing but an
//! [`mpsc::Sender`] of [`GatewayEvent`]s handed in by whatever transport the server runs
//! (SSE today), plus test harnesses driving it directly.
//!
//! Registries are explicit per-order subscriber sets, populated and depopulated on
//! join/leave/disconnect. Delivery into a connection channel is `try_send`: a slow or dead
//! consumer loses pushes (fanout is best-effort) but never blocks the caller. What *is*
//! guaranteed is ordering — each room serialises persist-then-fanout under its own async lock,
//! so members observe messages in exactly the order they were persisted.
mod messages;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::*;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

pub use messages::GatewayEvent;

use crate::{
    chat_api::ensure_participant,
    db_types::{Attachment, ChatMessage, NewMessage, Order, OrderId},
    traits::{AccessClaims, ChatApiError, ChatManagement, DispatchDatabase, OrderFlowError, TokenVerifier},
};

/// Per-connection outbound buffer. Pushes beyond this are dropped, not queued.
pub const EVENT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The connection has not authenticated")]
    Unauthorized,
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("{0}")]
    Chat(#[from] ChatApiError),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<OrderFlowError> for GatewayError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::OrderNotFound(oid) => GatewayError::OrderNotFound(oid),
            other => GatewayError::Backend(other.to_string()),
        }
    }
}

struct ConnectionHandle {
    sender: mpsc::Sender<GatewayEvent>,
    claims: Option<AccessClaims>,
}

#[derive(Default)]
struct Room {
    members: HashSet<ConnectionId>,
    /// Serialises persist-then-fanout (and history replay on join) for this order.
    gate: Arc<Mutex<()>>,
}

/// The surface the dispatcher pushes through. Object-safe and synchronous: every method is a
/// best-effort `try_send` walk over the current registries.
pub trait LivePush: Send + Sync {
    fn push_new_order(&self, worker_ids: &[i64], order: &Order);
    fn push_order_taken(&self, worker_ids: &[i64], order: &Order);
    fn push_order_cancelled(&self, worker_ids: &[i64], order: &Order);
    fn push_status_change(&self, order: &Order);
}

pub struct RealtimeGateway<B, V> {
    db: B,
    verifier: Arc<V>,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    users: RwLock<HashMap<i64, HashSet<ConnectionId>>>,
    rooms: RwLock<HashMap<OrderId, Room>>,
    next_id: AtomicU64,
}

impl<B, V> RealtimeGateway<B, V>
where
    B: DispatchDatabase + ChatManagement,
    V: TokenVerifier,
{
    pub fn new(db: B, verifier: V) -> Self {
        Self {
            db,
            verifier: Arc::new(verifier),
            connections: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new, not yet authenticated connection. The transport keeps the receiving
    /// half; the first frame it sees is `Connected` with the assigned id.
    pub fn register(&self, sender: mpsc::Sender<GatewayEvent>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event = GatewayEvent::Connected { connection_id: id.0 };
        if sender.try_send(event).is_err() {
            warn!("📡️ {id} went away before the hello frame");
        }
        self.connections.write().insert(id, ConnectionHandle { sender, claims: None });
        debug!("📡️ {id} registered");
        id
    }

    /// Validates the token and binds the connection to the verified identity for its lifetime.
    /// On failure the connection stays anonymous: it receives no personal events and cannot
    /// join rooms or send messages.
    pub fn authenticate(&self, conn: ConnectionId, token: &str) -> Result<AccessClaims, GatewayError> {
        let claims =
            self.verifier.verify(token).map_err(|e| GatewayError::AuthenticationFailed(e.to_string()))?;
        self.bind(conn, claims.clone())?;
        Ok(claims)
    }

    /// Binds already-verified claims to the connection. Transports that authenticate before the
    /// connection is established (the SSE route does) call this directly.
    pub fn bind(&self, conn: ConnectionId, claims: AccessClaims) -> Result<(), GatewayError> {
        let mut connections = self.connections.write();
        let handle = connections.get_mut(&conn).ok_or(GatewayError::UnknownConnection(conn))?;
        let user_id = claims.user_id;
        handle.claims = Some(claims);
        let sender = handle.sender.clone();
        drop(connections);
        self.users.write().entry(user_id).or_default().insert(conn);
        let _ = sender.try_send(GatewayEvent::Authenticated { user_id });
        debug!("📡️ {conn} authenticated as user {user_id}");
        Ok(())
    }

    /// Removes the connection from every room and index. Idempotent; already-persisted
    /// operations are unaffected.
    pub fn disconnect(&self, conn: ConnectionId) {
        let handle = self.connections.write().remove(&conn);
        if let Some(ConnectionHandle { claims: Some(claims), .. }) = handle {
            let mut users = self.users.write();
            if let Some(conns) = users.get_mut(&claims.user_id) {
                conns.remove(&conn);
                if conns.is_empty() {
                    users.remove(&claims.user_id);
                }
            }
        }
        // room entries (and their gates) outlive their members; only memberships are dropped
        let mut rooms = self.rooms.write();
        for room in rooms.values_mut() {
            room.members.remove(&conn);
        }
        debug!("📡️ {conn} disconnected");
    }

    /// Adds the connection to the order's room and replays the full persisted history, in
    /// order, to this connection only. Membership (client / bound medic / admin) is re-checked
    /// here — joining is not a way around the chat visibility rule. Returns the number of
    /// replayed messages.
    pub async fn join_order(&self, conn: ConnectionId, order_id: &OrderId) -> Result<usize, GatewayError> {
        let claims = self.claims_for(conn)?;
        let order = self.fetch_order(order_id).await?;
        ensure_participant(&order, &claims)?;
        let gate = self.room_gate(order_id);
        let _guard = gate.lock().await;
        let sender = {
            let mut rooms = self.rooms.write();
            let room = rooms.entry(order_id.clone()).or_default();
            room.members.insert(conn);
            // the connection may have dropped while we waited on the gate
            match self.connections.read().get(&conn) {
                Some(handle) => handle.sender.clone(),
                None => {
                    room.members.remove(&conn);
                    return Err(GatewayError::UnknownConnection(conn));
                },
            }
        };
        let history = self.db.fetch_history(order_id).await.map_err(GatewayError::Chat)?;
        let replayed = history.len();
        for message in history {
            if sender.send(GatewayEvent::ChatMessage { message }).await.is_err() {
                debug!("📡️ {conn} closed during history replay of order [{order_id}]");
                self.disconnect(conn);
                return Err(GatewayError::UnknownConnection(conn));
            }
        }
        debug!("📡️ {conn} joined order [{order_id}], {replayed} messages replayed");
        Ok(replayed)
    }

    /// Removes the connection from the order's room. A no-op if it was not a member.
    pub fn leave_order(&self, conn: ConnectionId, order_id: &OrderId) {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get_mut(order_id) {
            room.members.remove(&conn);
        }
        debug!("📡️ {conn} left order [{order_id}]");
    }

    /// Persists a message and relays it to every *other* connection in the room, in
    /// persistence order. Participants with no connection currently in the room get a personal
    /// `NewChatMessage` ping on all their connections instead.
    pub async fn send_message(
        &self,
        conn: ConnectionId,
        order_id: &OrderId,
        body: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<ChatMessage, GatewayError> {
        let claims = self.claims_for(conn)?;
        self.send_message_inner(Some(conn), &claims, order_id, body, attachment).await
    }

    /// The same persist-and-relay path for senders speaking over plain request/response
    /// transports (the REST message route) rather than through a registered connection.
    pub async fn send_message_as_user(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
        body: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<ChatMessage, GatewayError> {
        self.send_message_inner(None, claims, order_id, body, attachment).await
    }

    async fn send_message_inner(
        &self,
        conn: Option<ConnectionId>,
        claims: &AccessClaims,
        order_id: &OrderId,
        body: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<ChatMessage, GatewayError> {
        let order = self.fetch_order(order_id).await?;
        ensure_participant(&order, claims)?;
        let gate = self.room_gate(order_id);
        let _guard = gate.lock().await;
        let message = self
            .db
            .append_message(NewMessage { order_id: order_id.clone(), sender_id: claims.user_id, body, attachment })
            .await
            .map_err(GatewayError::Chat)?;
        self.relay_message(conn, &order, &message);
        Ok(message)
    }

    fn relay_message(&self, sender_conn: Option<ConnectionId>, order: &Order, message: &ChatMessage) {
        let order_id = &message.order_id;
        let members: Vec<(ConnectionId, mpsc::Sender<GatewayEvent>, Option<i64>)> = {
            let rooms = self.rooms.read();
            let connections = self.connections.read();
            rooms
                .get(order_id)
                .map(|room| {
                    room.members
                        .iter()
                        .filter_map(|id| {
                            connections.get(id).map(|h| {
                                (*id, h.sender.clone(), h.claims.as_ref().map(|c| c.user_id))
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut present_users: HashSet<i64> = HashSet::new();
        for (id, sender, user) in &members {
            if let Some(user) = user {
                present_users.insert(*user);
            }
            if Some(*id) == sender_conn {
                continue;
            }
            self.deliver(*id, sender, GatewayEvent::ChatMessage { message: message.clone() });
        }
        // participants not watching the room get a personal ping for toasts and unread badges
        let participants = [Some(order.client_id), order.medic_id];
        for user in participants.into_iter().flatten() {
            if user == message.sender_id || present_users.contains(&user) {
                continue;
            }
            self.send_to_user(user, GatewayEvent::NewChatMessage {
                order_id: order_id.clone(),
                message_id: message.id,
                sender_id: message.sender_id,
            });
        }
    }

    /// Pushes an event to every live connection of the user. Best-effort.
    pub fn send_to_user(&self, user_id: i64, event: GatewayEvent) {
        let targets: Vec<(ConnectionId, mpsc::Sender<GatewayEvent>)> = {
            let users = self.users.read();
            let connections = self.connections.read();
            users
                .get(&user_id)
                .map(|conns| {
                    conns
                        .iter()
                        .filter_map(|id| connections.get(id).map(|h| (*id, h.sender.clone())))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (id, sender) in targets {
            self.deliver(id, &sender, event.clone());
        }
    }

    /// Number of live connections (all users). Exposed for health reporting.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// The user bound to a connection, if it exists and has authenticated. Transports use this
    /// to stop one user from driving another user's connection.
    pub fn connection_user(&self, conn: ConnectionId) -> Option<i64> {
        self.connections.read().get(&conn).and_then(|h| h.claims.as_ref().map(|c| c.user_id))
    }

    fn deliver(&self, conn: ConnectionId, sender: &mpsc::Sender<GatewayEvent>, event: GatewayEvent) {
        match sender.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("📡️ {conn} is not draining its event buffer; dropping a push");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("📡️ {conn} is gone; cleaning it up");
                self.disconnect(conn);
            },
        }
    }

    fn claims_for(&self, conn: ConnectionId) -> Result<AccessClaims, GatewayError> {
        let connections = self.connections.read();
        let handle = connections.get(&conn).ok_or(GatewayError::UnknownConnection(conn))?;
        handle.claims.clone().ok_or(GatewayError::Unauthorized)
    }

    fn room_gate(&self, order_id: &OrderId) -> Arc<Mutex<()>> {
        let mut rooms = self.rooms.write();
        Arc::clone(&rooms.entry(order_id.clone()).or_default().gate)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, GatewayError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.clone()))
    }
}

impl<B, V> LivePush for RealtimeGateway<B, V>
where
    B: DispatchDatabase + ChatManagement + Send + Sync,
    V: TokenVerifier,
{
    fn push_new_order(&self, worker_ids: &[i64], order: &Order) {
        for worker_id in worker_ids {
            self.send_to_user(*worker_id, GatewayEvent::NewOrderAvailable { order: order.clone() });
        }
    }

    fn push_order_taken(&self, worker_ids: &[i64], order: &Order) {
        for worker_id in worker_ids {
            self.send_to_user(*worker_id, GatewayEvent::OrderTaken { order_id: order.order_id.clone() });
        }
    }

    fn push_order_cancelled(&self, worker_ids: &[i64], order: &Order) {
        for worker_id in worker_ids {
            self.send_to_user(*worker_id, GatewayEvent::OrderCancelled { order_id: order.order_id.clone() });
        }
    }

    fn push_status_change(&self, order: &Order) {
        let event = GatewayEvent::OrderStatusChanged { order_id: order.order_id.clone(), status: order.status };
        self.send_to_user(order.client_id, event.clone());
        if let Some(medic_id) = order.medic_id {
            self.send_to_user(medic_id, event);
        }
    }
}
