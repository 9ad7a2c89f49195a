use thiserror::Error;

use vdp_common::Tenge;

use crate::{db_types::LedgerEntry, ledger_objects::BalanceSummary};

/// Bookkeeping of earnings, commission debt and deposits per worker.
///
/// EARNING and COMMISSION entries are created by the completion transition, not through this
/// trait. Deposits enter as `Pending` and are finalised solely by an admin decision; approving
/// one settles the oldest fully-covered pending commission entries in the same transaction, so
/// the balance identity `deposits + earnings − approved commission` can never go negative
/// through a core operation.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    /// Records a worker's claim to have paid `amount` against their commission debt.
    async fn request_deposit(&self, worker_id: i64, amount: Tenge) -> Result<LedgerEntry, LedgerApiError>;

    /// Admin decision on a pending deposit: `Pending → Approved` or `Pending → Rejected`,
    /// exactly once. Rejection has no balance effect.
    async fn resolve_deposit(&self, entry_id: i64, approve: bool) -> Result<LedgerEntry, LedgerApiError>;

    /// Outstanding commission debt: pending commission minus unapplied approved-deposit
    /// credit, floored at zero. Exposed for the external "may this worker accept new
    /// orders" policy gate; the policy itself lives outside this core.
    async fn pending_commission(&self, worker_id: i64) -> Result<Tenge, LedgerApiError>;

    /// Aggregated balance figures for the worker.
    async fn balance_for_worker(&self, worker_id: i64) -> Result<BalanceSummary, LedgerApiError>;

    /// Every ledger entry for the worker, oldest first.
    async fn entries_for_worker(&self, worker_id: i64) -> Result<Vec<LedgerEntry>, LedgerApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested ledger entry {0} does not exist")]
    EntryNotFound(i64),
    #[error("Ledger entry {0} is not a pending deposit")]
    NotAPendingDeposit(i64),
    #[error("Deposit amounts must be positive, got {0}")]
    InvalidAmount(Tenge),
}

impl From<sqlx::Error> for LedgerApiError {
    fn from(e: sqlx::Error) -> Self {
        LedgerApiError::DatabaseError(e.to_string())
    }
}
