use std::sync::Arc;

use actix_web::web;
use vdp_common::Secret;
use visit_dispatch_engine::{
    db_types::Role,
    events::EventProducers,
    gateway::RealtimeGateway,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteDatabase,
};

use crate::{
    auth::{encode_token, JwtVerifier, LoginToken, TokenIssuer},
    config::{AuthConfig, ServerConfig},
    server::test_app_config,
};

pub fn test_config() -> ServerConfig {
    let auth = AuthConfig {
        jwt_secret: Secret::new("0123456789abcdef0123456789abcdef-test".to_string()),
        login_shared_secret: Secret::new("identity-collaborator-secret".to_string()),
        token_ttl: chrono::Duration::hours(1),
    };
    ServerConfig { auth, ..Default::default() }
}

pub async fn test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 8).await.expect("Error creating database")
}

/// The full application wiring against the given database, for `test::init_service`.
pub fn app_config(db: &SqliteDatabase, config: &ServerConfig) -> impl FnOnce(&mut web::ServiceConfig) {
    let gateway = Arc::new(RealtimeGateway::new(db.clone(), JwtVerifier::new(&config.auth)));
    test_app_config(db.clone(), config.clone(), EventProducers::default(), gateway)
}

/// A login token as the external identity service would mint it.
pub fn login_token(config: &ServerConfig, user_id: i64, nonce: u64, roles: &[Role]) -> String {
    let token = LoginToken { user_id, nonce, desired_roles: roles.to_vec() };
    encode_token(&token, config.auth.login_shared_secret.reveal()).expect("Error signing login token")
}

/// A ready-to-use access token, bypassing the `/auth` handshake.
pub fn access_token(config: &ServerConfig, user_id: i64, roles: &[Role]) -> String {
    TokenIssuer::new(&config.auth)
        .issue_token(LoginToken { user_id, nonce: 1, desired_roles: roles.to_vec() }, None)
        .expect("Error issuing access token")
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}
