use sqlx::SqliteConnection;

use crate::{db_types::Role, traits::AuthApiError};

/// Records the login nonce for the user. The conditional upsert only applies strictly larger
/// nonces; a stale nonce leaves the row untouched and fails with `InvalidNonce`.
pub async fn upsert_nonce_for_user(
    user_id: i64,
    nonce: u64,
    conn: &mut SqliteConnection,
) -> Result<(), AuthApiError> {
    #[allow(clippy::cast_possible_wrap)]
    let nonce = nonce as i64;
    let result = sqlx::query(
        r#"
            INSERT INTO auth_nonces (user_id, nonce) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
                SET nonce = excluded.nonce, updated_at = CURRENT_TIMESTAMP
                WHERE excluded.nonce > auth_nonces.nonce;
        "#,
    )
    .bind(user_id)
    .bind(nonce)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AuthApiError::InvalidNonce);
    }
    Ok(())
}

pub async fn roles_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Role>, AuthApiError> {
    let roles: Vec<(Role,)> = sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(roles.into_iter().map(|(r,)| r).collect())
}

pub async fn assign_roles(user_id: i64, roles: &[Role], conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    for role in roles {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Checks that the user holds every requested role. The error carries how many were missing,
/// not which, so the response leaks nothing about other users' grants.
pub async fn check_user_has_roles(
    user_id: i64,
    roles: &[Role],
    conn: &mut SqliteConnection,
) -> Result<(), AuthApiError> {
    let granted = roles_for_user(user_id, conn).await?;
    let missing = roles.iter().filter(|r| !granted.contains(r)).count();
    if missing > 0 {
        return Err(AuthApiError::RoleNotAllowed(missing));
    }
    Ok(())
}
