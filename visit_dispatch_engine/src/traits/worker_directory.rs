use crate::{db_types::WorkerProfile, traits::OrderFlowError};

/// Read-only view of the eligibility directory.
///
/// The records behind this trait are owned and mutated by the external profile-management
/// collaborator. No snapshot isolation is assumed: the set may change between two fanout
/// computations, and callers must tolerate that.
#[allow(async_fn_in_trait)]
pub trait WorkerDirectory: Clone {
    /// The flat set-membership filter of dispatch: approved workers serving the given city
    /// and district who are currently open for pushes. No ranking, no load balancing.
    async fn list_eligible_workers(&self, city: &str, district: &str) -> Result<Vec<i64>, OrderFlowError>;

    /// Whether the worker has passed profile moderation.
    async fn is_approved(&self, worker_id: i64) -> Result<bool, OrderFlowError>;

    /// The full eligibility record, or `None` for an unknown worker.
    async fn fetch_worker_profile(&self, worker_id: i64) -> Result<Option<WorkerProfile>, OrderFlowError>;
}
