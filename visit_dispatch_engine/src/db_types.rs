//! Database row types and the order lifecycle.
//!
//! These types are shared between the SQLite backend and the public APIs. The
//! order status enum is the canonical definition of the visit lifecycle; all
//! transitions go through guarded updates in the backend, never through field
//! assignment.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use vdp_common::Tenge;

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
/// The visit lifecycle. `New → Accepted → Confirmed → OnTheWay → Started → Completed → Paid`,
/// with `Cancelled` reachable only from `New`. No state is reachable twice and there are no
/// backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Newly created; no medic is bound and any eligible medic may accept it.
    New,
    /// A medic won the accept race and is bound to the order.
    Accepted,
    /// The client acknowledged the assignment.
    Confirmed,
    /// The medic is travelling to the address.
    OnTheWay,
    /// The visit is in progress.
    Started,
    /// The visit is done; earnings and commission have been accrued.
    Completed,
    /// The medic confirmed receiving payment in person. Terminal.
    Paid,
    /// The client withdrew the request before any medic accepted it. Terminal.
    Cancelled,
}

impl OrderStatusType {
    /// The single allowed successor driven through `advance`, if any.
    /// `New` is excluded: it is left via `accept` or `cancel`, not `advance`.
    pub fn next(&self) -> Option<OrderStatusType> {
        use OrderStatusType::*;
        match self {
            New => None,
            Accepted => Some(Confirmed),
            Confirmed => Some(OnTheWay),
            OnTheWay => Some(Started),
            Started => Some(Completed),
            Completed => Some(Paid),
            Paid | Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Paid | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::New => write!(f, "New"),
            OrderStatusType::Accepted => write!(f, "Accepted"),
            OrderStatusType::Confirmed => write!(f, "Confirmed"),
            OrderStatusType::OnTheWay => write!(f, "OnTheWay"),
            OrderStatusType::Started => write!(f, "Started"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Accepted" => Ok(Self::Accepted),
            "Confirmed" => Ok(Self::Confirmed),
            "OnTheWay" => Ok(Self::OnTheWay),
            "Started" => Ok(Self::Started),
            "Completed" => Ok(Self::Completed),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// A fresh server-assigned order id.
    pub fn random() -> Self {
        let tail: String = rand::thread_rng().sample_iter(&Alphanumeric).take(10).map(char::from).collect();
        Self(format!("VD-{tail}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------        Order       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub client_id: i64,
    /// Bound by winning the accept race. `Some` iff the status is neither `New` nor `Cancelled`,
    /// and immutable for the life of the order once set.
    pub medic_id: Option<i64>,
    pub service_type: String,
    pub city: String,
    pub district: String,
    pub address: String,
    pub scheduled_at: DateTime<Utc>,
    pub price: Option<Tenge>,
    pub comment: Option<String>,
    pub status: OrderStatusType,
    pub confirmed_by_client: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Server-assigned id, generated before insertion.
    pub order_id: OrderId,
    pub client_id: i64,
    pub service_type: String,
    pub city: String,
    pub district: String,
    pub address: String,
    pub scheduled_at: DateTime<Utc>,
    pub price: Option<Tenge>,
    pub comment: Option<String>,
}

impl NewOrder {
    pub fn new(client_id: i64, service_type: &str, city: &str, district: &str, address: &str) -> Self {
        Self {
            order_id: OrderId::random(),
            client_id,
            service_type: service_type.to_string(),
            city: city.to_string(),
            district: district.to_string(),
            address: address.to_string(),
            scheduled_at: Utc::now(),
            price: None,
            comment: None,
        }
    }

    pub fn with_price(mut self, price: Tenge) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = at;
        self
    }
}

//--------------------------------------    ChatMessage      ---------------------------------------------------------
/// One entry of a per-order message log. Immutable once written; `is_read` is the only mutable
/// field. The server-assigned `id` is the total order within the log and the sole deduplication
/// key for clients replaying history.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub order_id: OrderId,
    pub sender_id: i64,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_kind: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub order_id: OrderId,
    pub sender_id: i64,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn text(order_id: OrderId, sender_id: i64, body: &str) -> Self {
        Self { order_id, sender_id, body: Some(body.to_string()), attachment: None }
    }

    pub fn attachment(order_id: OrderId, sender_id: i64, attachment: Attachment) -> Self {
        Self { order_id, sender_id, body: None, attachment: Some(attachment) }
    }

    pub fn is_empty(&self) -> bool {
        self.body.as_deref().map(str::trim).map_or(true, str::is_empty) && self.attachment.is_none()
    }
}

//--------------------------------------    LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    /// The full order price, credited to the worker on completion.
    Earning,
    /// The platform's share, owed by the worker. A debt until covered by deposits.
    Commission,
    /// A worker's claim to have paid down commission debt; finalised by an admin.
    Deposit,
}

impl Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryKind::Earning => write!(f, "Earning"),
            LedgerEntryKind::Commission => write!(f, "Commission"),
            LedgerEntryKind::Deposit => write!(f, "Deposit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerEntryStatus {
    Pending,
    Approved,
    Rejected,
}

impl Display for LedgerEntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryStatus::Pending => write!(f, "Pending"),
            LedgerEntryStatus::Approved => write!(f, "Approved"),
            LedgerEntryStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub worker_id: i64,
    pub order_id: Option<OrderId>,
    pub kind: LedgerEntryKind,
    pub amount: Tenge,
    pub status: LedgerEntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Places orders and confirms assignments.
    Client,
    /// Accepts and drives visits.
    Medic,
    /// Platform staff: resolves deposits, sees every chat.
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Medic => write!(f, "medic"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "medic" => Ok(Self::Medic),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------   WorkerProfile     ---------------------------------------------------------
/// Eligibility record for one medic. Owned and mutated by the external profile-management
/// collaborator; the engine treats it as read-only and tolerates it changing between fanout
/// computations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub worker_id: i64,
    pub city: String,
    pub districts: Vec<String>,
    pub available: bool,
    pub approved: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in
            ["New", "Accepted", "Confirmed", "OnTheWay", "Started", "Completed", "Paid", "Cancelled"]
        {
            let status: OrderStatusType = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("Pending".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn successor_chain_has_no_cycles() {
        let mut status = OrderStatusType::Accepted;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(!seen.contains(&next));
            seen.push(next);
            status = next;
        }
        assert_eq!(status, OrderStatusType::Paid);
    }

    #[test]
    fn empty_message_detection() {
        let oid = OrderId::random();
        assert!(NewMessage { order_id: oid.clone(), sender_id: 1, body: Some("  ".into()), attachment: None }
            .is_empty());
        assert!(!NewMessage::text(oid.clone(), 1, "hello").is_empty());
        let file = Attachment { url: "files/scan.pdf".into(), kind: "application/pdf".into() };
        assert!(!NewMessage::attachment(oid, 1, file).is_empty());
    }
}
