//! `SqliteDatabase` is a concrete implementation of a visit-dispatch backend.
//!
//! Unsurprisingly, it uses SQLite and implements all the traits defined in the [`crate::traits`]
//! module. Anything that has to be atomic with something else — the accept race, the
//! completion-plus-accrual, deposit resolution with settlement — is composed here into a single
//! transaction over the low-level functions in [`super::db`].
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;
use vdp_common::Tenge;

use super::db::{auth, chat, db_url, ledger, new_pool, orders, workers};
use crate::{
    db_types::{
        ChatMessage,
        LedgerEntry,
        NewMessage,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        Role,
        WorkerProfile,
    },
    ledger_objects::BalanceSummary,
    order_objects::OrderQueryFilter,
    traits::{
        AuthApiError,
        AuthManagement,
        ChatApiError,
        ChatManagement,
        DispatchDatabase,
        LedgerApiError,
        LedgerManagement,
        OrderFlowError,
        WorkerDirectory,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database api object with a connection pool of size `max_connections`,
    /// using the `VDP_DATABASE_URL` environment variable (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await
    }
}

impl DispatchDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order [{}] has been saved with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn accept_order(&self, order_id: &OrderId, worker_id: i64) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        match orders::try_accept_order(order_id, worker_id, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order [{order_id}] accepted by worker {worker_id}");
                Ok(order)
            },
            None => match orders::fetch_order_by_order_id(order_id, &mut conn).await? {
                None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
                Some(order) if order.medic_id.is_some() => {
                    trace!("🗃️ Worker {worker_id} lost the race for order [{order_id}]");
                    Err(OrderFlowError::AlreadyAssigned(order_id.clone()))
                },
                // No medic bound and still not acceptable: the client cancelled it first.
                Some(order) => Err(OrderFlowError::InvalidTransition {
                    order_id: order_id.clone(),
                    from: order.status,
                    to: OrderStatusType::Accepted,
                }),
            },
        }
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::transition_status(order_id, from, to, &mut tx).await?;
        match updated {
            Some(order) => {
                if order.status == OrderStatusType::Completed {
                    match (order.medic_id, order.price) {
                        (Some(medic_id), Some(price)) => {
                            ledger::accrue_for_order(medic_id, &order.order_id, price, &mut tx).await?;
                        },
                        (Some(_), None) => {
                            // Unpriced visits are billed off-platform; nothing to accrue.
                            info!("🗃️ Order [{order_id}] completed without a price; no ledger accrual");
                        },
                        (None, _) => {
                            // The guarded transitions make this unreachable; refuse to commit a
                            // completion that cannot be attributed.
                            return Err(OrderFlowError::DatabaseError(format!(
                                "Order {order_id} reached Completed with no medic bound"
                            )));
                        },
                    }
                }
                tx.commit().await?;
                Ok(order)
            },
            None => {
                let existing = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                tx.rollback().await?;
                match existing {
                    None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
                    Some(order) => Err(OrderFlowError::InvalidTransition {
                        order_id: order_id.clone(),
                        from: order.status,
                        to,
                    }),
                }
            },
        }
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.transition_order(order_id, OrderStatusType::New, OrderStatusType::Cancelled).await
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn available_orders_for_worker(&self, worker_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::available_orders_for_worker(worker_id, &mut conn).await?;
        Ok(orders)
    }

    async fn close(&mut self) -> Result<(), OrderFlowError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ChatManagement for SqliteDatabase {
    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, ChatApiError> {
        let mut conn = self.pool.acquire().await?;
        chat::insert_message(message, &mut conn).await
    }

    async fn mark_messages_read(&self, order_id: &OrderId, reader_id: i64) -> Result<u64, ChatApiError> {
        let mut conn = self.pool.acquire().await?;
        chat::mark_read(order_id, reader_id, &mut conn).await
    }

    async fn fetch_history(&self, order_id: &OrderId) -> Result<Vec<ChatMessage>, ChatApiError> {
        let mut conn = self.pool.acquire().await?;
        chat::fetch_history(order_id, &mut conn).await
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn request_deposit(&self, worker_id: i64, amount: Tenge) -> Result<LedgerEntry, LedgerApiError> {
        if amount.value() <= 0 {
            return Err(LedgerApiError::InvalidAmount(amount));
        }
        let mut conn = self.pool.acquire().await?;
        let entry = ledger::insert_entry(
            worker_id,
            None,
            crate::db_types::LedgerEntryKind::Deposit,
            amount,
            crate::db_types::LedgerEntryStatus::Pending,
            &mut conn,
        )
        .await?;
        debug!("🧾️ Deposit claim of {amount} recorded for worker {worker_id} (entry {})", entry.id);
        Ok(entry)
    }

    async fn resolve_deposit(&self, entry_id: i64, approve: bool) -> Result<LedgerEntry, LedgerApiError> {
        let mut tx = self.pool.begin().await?;
        let entry = ledger::resolve_deposit(entry_id, approve, &mut tx).await?;
        if approve {
            ledger::settle_commissions(entry.worker_id, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🧾️ Deposit entry {entry_id} {}", if approve { "approved" } else { "rejected" });
        Ok(entry)
    }

    async fn pending_commission(&self, worker_id: i64) -> Result<Tenge, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        ledger::pending_commission(worker_id, &mut conn).await
    }

    async fn balance_for_worker(&self, worker_id: i64) -> Result<BalanceSummary, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        ledger::balance_for_worker(worker_id, &mut conn).await
    }

    async fn entries_for_worker(&self, worker_id: i64) -> Result<Vec<LedgerEntry>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        ledger::entries_for_worker(worker_id, &mut conn).await
    }
}

impl AuthManagement for SqliteDatabase {
    async fn upsert_nonce_for_user(&self, user_id: i64, nonce: u64) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::upsert_nonce_for_user(user_id, nonce, &mut conn).await
    }

    async fn check_user_has_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::check_user_has_roles(user_id, roles, &mut conn).await
    }

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::roles_for_user(user_id, &mut conn).await
    }

    async fn assign_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::assign_roles(user_id, roles, &mut conn).await
    }
}

impl WorkerDirectory for SqliteDatabase {
    async fn list_eligible_workers(&self, city: &str, district: &str) -> Result<Vec<i64>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        workers::list_eligible_workers(city, district, &mut conn).await
    }

    async fn is_approved(&self, worker_id: i64) -> Result<bool, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        workers::is_approved(worker_id, &mut conn).await
    }

    async fn fetch_worker_profile(&self, worker_id: i64) -> Result<Option<WorkerProfile>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        workers::fetch_worker_profile(worker_id, &mut conn).await
    }
}
