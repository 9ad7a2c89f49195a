use serde::{Deserialize, Serialize};

use crate::{db_types::Role, traits::AuthApiError};

/// The identity attached to an authenticated connection or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: i64,
    pub roles: Vec<Role>,
}

impl AccessClaims {
    pub fn new(user_id: i64, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// The boundary with the external identity service: turn a bearer token into claims, or fail
/// with [`AuthApiError::InvalidToken`]. The server crate implements this with HMAC-signed JWTs;
/// tests substitute a stub.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthApiError>;
}
