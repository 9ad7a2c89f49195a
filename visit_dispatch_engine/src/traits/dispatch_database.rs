use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::LedgerApiError,
};

/// The order-lifecycle contract a backend must fulfil.
///
/// The one operation that must be linearizable across concurrent callers is [`accept_order`]:
/// it is specified as a single conditional write (transition guarded by the expected current
/// state), never as a read-then-write from process memory, because many gateway connections
/// race on it concurrently. Every other transition is single-writer by construction (only the
/// bound medic or the client may drive it) and relies on ordinary write atomicity plus the
/// same guarded-update shape.
#[allow(async_fn_in_trait)]
pub trait DispatchDatabase: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Stores a brand-new order in state `New`.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError>;

    /// Atomically binds `worker_id` to the order if and only if it is still `New` and unbound.
    ///
    /// Exactly one concurrent caller wins. Losers receive [`OrderFlowError::AlreadyAssigned`]
    /// when a medic holds the order, or [`OrderFlowError::InvalidTransition`] when the order
    /// was cancelled before anyone claimed it.
    async fn accept_order(&self, order_id: &OrderId, worker_id: i64) -> Result<Order, OrderFlowError>;

    /// Moves the order from `from` to `to` as a guarded update, failing with
    /// [`OrderFlowError::InvalidTransition`] if the order is no longer in `from`.
    ///
    /// Reaching `Completed` accrues the EARNING and COMMISSION ledger entries for the bound
    /// medic in the same transaction as the status flip; a completion that cannot accrue is a
    /// completion that did not happen.
    async fn transition_order(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Order, OrderFlowError>;

    /// Cancels an order that is still `New`. Terminal; no ledger effect.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError>;

    /// Returns the order for the given id, or `None`.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// Fetches orders matching the filter, ordered by creation time.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// The `New` orders in the worker's city and served districts — the poll-based
    /// complement to the live fanout, for workers who were offline when an order arrived.
    async fn available_orders_for_worker(&self, worker_id: i64) -> Result<Vec<Order>, OrderFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderFlowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has already been taken by another medic")]
    AlreadyAssigned(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Invalid order data: {0}")]
    ValidationError(String),
    #[error("{0}")]
    LedgerError(#[from] LedgerApiError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}
