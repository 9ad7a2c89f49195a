use serde::{Deserialize, Serialize};
use vdp_common::Tenge;

/// Aggregated ledger figures for one worker.
///
/// `current_balance` is the conservation identity: approved deposits plus earnings minus
/// approved commission. Settlement only approves commission that deposits already cover, so the
/// balance cannot go negative through any core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub worker_id: i64,
    pub total_earned: Tenge,
    /// Outstanding commission debt, floored at zero.
    pub commission_pending: Tenge,
    pub commission_paid: Tenge,
    pub deposits_approved: Tenge,
    pub deposits_pending: Tenge,
    pub current_balance: Tenge,
}
