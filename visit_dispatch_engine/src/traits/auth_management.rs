use thiserror::Error;

use crate::db_types::Role;

/// Login-nonce and role bookkeeping backing the server's `/auth` route.
///
/// Registration and identity verification proper live with the external identity
/// collaborator; this trait only tracks what the engine needs to gate its own operations.
#[allow(async_fn_in_trait)]
pub trait AuthManagement: Clone {
    /// Records the login nonce for the user. Nonces must be strictly increasing; a stale
    /// nonce fails with [`AuthApiError::InvalidNonce`] (replay protection).
    async fn upsert_nonce_for_user(&self, user_id: i64, nonce: u64) -> Result<(), AuthApiError>;

    /// Checks that the user holds every one of the given roles.
    async fn check_user_has_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError>;

    /// The roles granted to the user.
    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, AuthApiError>;

    /// Grants the given roles to the user (idempotent).
    async fn assign_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Nonce is not strictly increasing.")]
    InvalidNonce,
    #[error("User requested at least {0} roles that are not allowed")]
    RoleNotAllowed(usize),
    #[error("The presented token is invalid: {0}")]
    InvalidToken(String),
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        AuthApiError::DatabaseError(e.to_string())
    }
}
