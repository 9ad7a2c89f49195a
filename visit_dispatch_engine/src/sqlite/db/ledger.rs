use log::{debug, trace};
use sqlx::SqliteConnection;
use vdp_common::Tenge;

use crate::{
    db_types::{LedgerEntry, LedgerEntryKind, LedgerEntryStatus, OrderId},
    ledger_objects::BalanceSummary,
    traits::LedgerApiError,
};

/// The platform's commission share, in percent of the order price.
pub const COMMISSION_PERCENT: i64 = 10;

pub async fn insert_entry(
    worker_id: i64,
    order_id: Option<&OrderId>,
    kind: LedgerEntryKind,
    amount: Tenge,
    status: LedgerEntryStatus,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerApiError> {
    let entry: LedgerEntry = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (worker_id, order_id, kind, amount, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(worker_id)
    .bind(order_id.map(OrderId::as_str))
    .bind(kind.to_string())
    .bind(amount)
    .bind(status.to_string())
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

/// Books the completion of an order: one EARNING for the full price (immediately approved —
/// the client pays the medic in person) and one COMMISSION for the platform share, pending
/// until covered by deposits. Call inside the completion transaction.
pub async fn accrue_for_order(
    worker_id: i64,
    order_id: &OrderId,
    price: Tenge,
    conn: &mut SqliteConnection,
) -> Result<(LedgerEntry, LedgerEntry), LedgerApiError> {
    let earning = insert_entry(
        worker_id,
        Some(order_id),
        LedgerEntryKind::Earning,
        price,
        LedgerEntryStatus::Approved,
        conn,
    )
    .await?;
    let commission = insert_entry(
        worker_id,
        Some(order_id),
        LedgerEntryKind::Commission,
        price.percent(COMMISSION_PERCENT),
        LedgerEntryStatus::Pending,
        conn,
    )
    .await?;
    debug!(
        "🧾️ Accrued for order [{order_id}]: earning {} / commission {} for worker {worker_id}",
        earning.amount, commission.amount
    );
    Ok((earning, commission))
}

pub async fn fetch_entry(entry_id: i64, conn: &mut SqliteConnection) -> Result<Option<LedgerEntry>, LedgerApiError> {
    let entry = sqlx::query_as("SELECT * FROM ledger_entries WHERE id = $1")
        .bind(entry_id)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn entries_for_worker(
    worker_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, LedgerApiError> {
    let entries = sqlx::query_as("SELECT * FROM ledger_entries WHERE worker_id = $1 ORDER BY id ASC")
        .bind(worker_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Finalises a pending deposit. The status flip is guarded so a deposit can be resolved exactly
/// once; anything else comes back as [`LedgerApiError::NotAPendingDeposit`].
pub async fn resolve_deposit(
    entry_id: i64,
    approve: bool,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerApiError> {
    let status = if approve { LedgerEntryStatus::Approved } else { LedgerEntryStatus::Rejected };
    let entry: Option<LedgerEntry> = sqlx::query_as(
        r#"
            UPDATE ledger_entries
            SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND kind = 'Deposit' AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(entry_id)
    .fetch_optional(&mut *conn)
    .await?;
    match entry {
        Some(entry) => Ok(entry),
        None => match fetch_entry(entry_id, conn).await? {
            None => Err(LedgerApiError::EntryNotFound(entry_id)),
            Some(_) => Err(LedgerApiError::NotAPendingDeposit(entry_id)),
        },
    }
}

pub async fn sum_amount(
    worker_id: i64,
    kind: LedgerEntryKind,
    status: LedgerEntryStatus,
    conn: &mut SqliteConnection,
) -> Result<Tenge, LedgerApiError> {
    let (sum,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE worker_id = $1 AND kind = $2 AND status = $3",
    )
    .bind(worker_id)
    .bind(kind.to_string())
    .bind(status.to_string())
    .fetch_one(conn)
    .await?;
    Ok(Tenge::from(sum))
}

/// Applies approved-deposit credit to the worker's pending commission entries, oldest first.
/// An entry flips to `Approved` only when the remaining credit covers it in full, so the
/// invariant `approved commission <= approved deposits` holds after every settlement.
pub async fn settle_commissions(worker_id: i64, conn: &mut SqliteConnection) -> Result<u64, LedgerApiError> {
    let deposits = sum_amount(worker_id, LedgerEntryKind::Deposit, LedgerEntryStatus::Approved, conn).await?;
    let applied = sum_amount(worker_id, LedgerEntryKind::Commission, LedgerEntryStatus::Approved, conn).await?;
    let mut credit = deposits - applied;
    let pending: Vec<LedgerEntry> = sqlx::query_as(
        "SELECT * FROM ledger_entries WHERE worker_id = $1 AND kind = 'Commission' AND status = 'Pending' ORDER BY \
         id ASC",
    )
    .bind(worker_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut settled = 0;
    for entry in pending {
        if entry.amount > credit {
            break;
        }
        sqlx::query(
            "UPDATE ledger_entries SET status = 'Approved', updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(entry.id)
        .execute(&mut *conn)
        .await?;
        credit -= entry.amount;
        settled += 1;
    }
    trace!("🧾️ Settled {settled} commission entries for worker {worker_id}");
    Ok(settled)
}

/// Outstanding commission debt: pending commission minus the approved-deposit credit not yet
/// applied by settlement, floored at zero.
pub async fn pending_commission(worker_id: i64, conn: &mut SqliteConnection) -> Result<Tenge, LedgerApiError> {
    let pending = sum_amount(worker_id, LedgerEntryKind::Commission, LedgerEntryStatus::Pending, conn).await?;
    let deposits = sum_amount(worker_id, LedgerEntryKind::Deposit, LedgerEntryStatus::Approved, conn).await?;
    let applied = sum_amount(worker_id, LedgerEntryKind::Commission, LedgerEntryStatus::Approved, conn).await?;
    Ok((pending - (deposits - applied)).or_zero())
}

pub async fn balance_for_worker(
    worker_id: i64,
    conn: &mut SqliteConnection,
) -> Result<BalanceSummary, LedgerApiError> {
    let total_earned = sum_amount(worker_id, LedgerEntryKind::Earning, LedgerEntryStatus::Approved, conn).await?;
    let commission_paid = sum_amount(worker_id, LedgerEntryKind::Commission, LedgerEntryStatus::Approved, conn).await?;
    let deposits_approved = sum_amount(worker_id, LedgerEntryKind::Deposit, LedgerEntryStatus::Approved, conn).await?;
    let deposits_pending = sum_amount(worker_id, LedgerEntryKind::Deposit, LedgerEntryStatus::Pending, conn).await?;
    let commission_pending = pending_commission(worker_id, conn).await?;
    let current_balance = deposits_approved + total_earned - commission_paid;
    Ok(BalanceSummary {
        worker_id,
        total_earned,
        commission_pending,
        commission_paid,
        deposits_approved,
        deposits_pending,
        current_balance,
    })
}
