use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatusType},
    events::{
        EventProducers,
        OrderAcceptedEvent,
        OrderCancelledEvent,
        OrderCreatedEvent,
        OrderStatusChangedEvent,
    },
    order_objects::{NewOrderRequest, OrderQueryFilter},
    traits::{DispatchDatabase, OrderFlowError},
};

/// `OrderFlowApi` is the primary API for driving the visit lifecycle in response to client and
/// medic actions.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: DispatchDatabase
{
    /// Places a brand-new order for the client.
    ///
    /// Always succeeds given valid input. Dispatch fanout is not performed here: an
    /// `OrderCreated` event is published and the subscribed dispatcher computes the eligible
    /// set and pushes, so a slow or failing notification channel can never fail creation.
    pub async fn create_order(&self, client_id: i64, request: NewOrderRequest) -> Result<Order, OrderFlowError> {
        let new_order = request.into_new_order(client_id)?;
        let order = self.db.insert_order(new_order).await?;
        for emitter in &self.producers.order_created_producer {
            emitter.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
        debug!("🔄️📦️ Order [{}] created for client {client_id}", order.order_id);
        Ok(order)
    }

    /// Claims the order for `worker_id`.
    ///
    /// This is the core concurrency contract of the whole system: the backend settles the race
    /// in a single conditional write, so exactly one of any number of concurrent callers wins.
    /// Losing is a routine outcome, reported as [`OrderFlowError::AlreadyAssigned`] so the UI
    /// can say "someone else took this order" rather than showing an error dialog.
    pub async fn accept_order(&self, order_id: &OrderId, worker_id: i64) -> Result<Order, OrderFlowError> {
        let order = self.db.accept_order(order_id, worker_id).await?;
        for emitter in &self.producers.order_accepted_producer {
            emitter.publish_event(OrderAcceptedEvent::new(order.clone())).await;
        }
        debug!("🔄️📦️ Order [{}] accepted by medic {worker_id}", order.order_id);
        Ok(order)
    }

    /// Advances the order one step along the lifecycle.
    ///
    /// Who may drive what:
    ///
    /// | Target      | Caller            |
    /// |-------------|-------------------|
    /// | Confirmed   | the client        |
    /// | OnTheWay    | the bound medic   |
    /// | Started     | the bound medic   |
    /// | Completed   | the bound medic   |
    /// | Paid        | the bound medic   |
    ///
    /// Any other target, or a target whose predecessor is not the current status, fails with
    /// [`OrderFlowError::InvalidTransition`] and leaves the order unchanged. A valid target
    /// driven by the wrong caller fails with [`OrderFlowError::Forbidden`].
    ///
    /// Reaching `Completed` accrues the medic's EARNING and the platform COMMISSION in the same
    /// transaction as the status flip.
    pub async fn advance_order(
        &self,
        order_id: &OrderId,
        caller_id: i64,
        target: OrderStatusType,
    ) -> Result<Order, OrderFlowError> {
        use OrderStatusType::*;
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let from = match target {
            Confirmed => Accepted,
            OnTheWay => Confirmed,
            Started => OnTheWay,
            Completed => Started,
            Paid => Completed,
            // `New` is never entered again, accepting and cancelling have their own entry points
            New | Accepted | Cancelled => {
                return Err(OrderFlowError::InvalidTransition {
                    order_id: order_id.clone(),
                    from: order.status,
                    to: target,
                })
            },
        };
        let allowed = match target {
            Confirmed => order.client_id == caller_id,
            _ => order.medic_id == Some(caller_id),
        };
        if !allowed {
            return Err(OrderFlowError::Forbidden(format!(
                "user {caller_id} may not move order {order_id} to {target}"
            )));
        }
        let updated = self.db.transition_order(order_id, from, target).await?;
        for emitter in &self.producers.status_changed_producer {
            emitter.publish_event(OrderStatusChangedEvent::new(updated.clone(), from)).await;
        }
        debug!("🔄️📦️ Order [{order_id}] moved {from} -> {target} by user {caller_id}");
        Ok(updated)
    }

    /// Withdraws an order that nobody has accepted yet. Only the client who placed it may
    /// cancel, and only while the order is still `New`. Terminal; no ledger effect.
    pub async fn cancel_order(&self, order_id: &OrderId, caller_id: i64) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.client_id != caller_id {
            return Err(OrderFlowError::Forbidden(format!("user {caller_id} did not place order {order_id}")));
        }
        let cancelled = self.db.cancel_order(order_id).await?;
        for emitter in &self.producers.order_cancelled_producer {
            emitter.publish_event(OrderCancelledEvent::new(cancelled.clone())).await;
        }
        debug!("🔄️📦️ Order [{order_id}] cancelled by client {caller_id}");
        Ok(cancelled)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn orders_for_client(&self, client_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(OrderQueryFilter::default().with_client_id(client_id)).await
    }

    pub async fn orders_for_medic(&self, medic_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(OrderQueryFilter::default().with_medic_id(medic_id)).await
    }

    /// The poll-based complement to the live fanout: every `New` order the worker could accept.
    pub async fn available_orders(&self, worker_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        self.db.available_orders_for_worker(worker_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(query).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
