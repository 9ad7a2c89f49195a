use log::*;
use vdp_common::Tenge;

use crate::{
    db_types::LedgerEntry,
    ledger_objects::BalanceSummary,
    traits::{LedgerApiError, LedgerManagement},
};

/// Commission-ledger operations. Accrual itself happens inside the completion transaction in
/// the backend; this API covers the deposit flow and the read projections.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    /// A worker claims to have paid `amount` against their commission debt. The claim stays
    /// `Pending` until an admin resolves it.
    pub async fn request_deposit(&self, worker_id: i64, amount: Tenge) -> Result<LedgerEntry, LedgerApiError> {
        let entry = self.db.request_deposit(worker_id, amount).await?;
        info!("🧾️ Worker {worker_id} claimed a deposit of {amount}");
        Ok(entry)
    }

    /// Admin decision on a pending deposit. Approving settles covered commission debt in the
    /// same transaction; rejecting changes no balance.
    pub async fn resolve_deposit(&self, entry_id: i64, approve: bool) -> Result<LedgerEntry, LedgerApiError> {
        self.db.resolve_deposit(entry_id, approve).await
    }

    /// Outstanding commission debt, floored at zero. The "may this worker take new orders"
    /// policy consuming this number lives outside the core.
    pub async fn pending_commission(&self, worker_id: i64) -> Result<Tenge, LedgerApiError> {
        self.db.pending_commission(worker_id).await
    }

    pub async fn balance(&self, worker_id: i64) -> Result<BalanceSummary, LedgerApiError> {
        self.db.balance_for_worker(worker_id).await
    }

    pub async fn entries(&self, worker_id: i64) -> Result<Vec<LedgerEntry>, LedgerApiError> {
        self.db.entries_for_worker(worker_id).await
    }
}
