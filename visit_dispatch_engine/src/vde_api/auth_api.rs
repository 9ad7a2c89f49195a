use crate::{
    db_types::Role,
    traits::{AuthApiError, AuthManagement},
};

/// Nonce and role bookkeeping behind the server's `/auth` route.
pub struct AuthApi<B> {
    db: B,
}

impl<B> AuthApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuthApi<B>
where B: AuthManagement
{
    pub async fn upsert_nonce_for_user(&self, user_id: i64, nonce: u64) -> Result<(), AuthApiError> {
        self.db.upsert_nonce_for_user(user_id, nonce).await
    }

    pub async fn check_user_has_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError> {
        self.db.check_user_has_roles(user_id, roles).await
    }

    pub async fn roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, AuthApiError> {
        self.db.roles_for_user(user_id).await
    }

    pub async fn assign_roles(&self, user_id: i64, roles: &[Role]) -> Result<(), AuthApiError> {
        self.db.assign_roles(user_id, roles).await
    }
}
