//! Access tokens and the login handshake.
//!
//! Identity verification proper belongs to the external identity collaborator: it signs a short
//! login token (user id, a strictly increasing nonce, the requested roles) with a secret shared
//! with this server. `/auth` validates that token, records the nonce, checks the role grants and
//! issues a short-lived HS256 access JWT which every other route — and the realtime gateway —
//! verifies locally.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use vdp_common::Secret;
use visit_dispatch_engine::{
    db_types::Role,
    traits::{AccessClaims, AuthApiError, TokenVerifier},
};

use crate::{config::AuthConfig, errors::AuthError, errors::ServerError};

type HmacSha256 = Hmac<Sha256>;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// The claims carried by an access token, available to handlers as an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub user_id: i64,
    pub roles: Vec<Role>,
    pub exp: i64,
}

impl JwtClaims {
    pub fn access_claims(&self) -> AccessClaims {
        AccessClaims::new(self.user_id, self.roles.clone())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl FromRequest for JwtClaims {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned().ok_or_else(|| {
            ServerError::AuthenticationError(AuthError::ValidationError("No access token presented".to_string()))
                .into()
        });
        ready(claims)
    }
}

/// What the external identity service signs on login.
/// The `nonce` must strictly increase on every call (a unix epoch works fine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginToken {
    pub user_id: i64,
    pub nonce: u64,
    pub desired_roles: Vec<Role>,
}

fn b64(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

fn unb64(data: &str) -> Result<Vec<u8>, AuthError> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
        .map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))
}

pub fn encode_token<T: Serialize>(claims: &T, secret: &str) -> Result<String, AuthError> {
    let payload = serde_json::to_vec(claims).map_err(|e| AuthError::ValidationError(e.to_string()))?;
    let message = format!("{}.{}", b64(JWT_HEADER.as_bytes()), b64(&payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::ValidationError(e.to_string()))?;
    mac.update(message.as_bytes());
    let signature = b64(&mac.finalize().into_bytes());
    Ok(format!("{message}.{signature}"))
}

pub fn decode_token<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return Err(AuthError::PoorlyFormattedToken("expected three dot-separated segments".to_string()));
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::ValidationError(e.to_string()))?;
    mac.update(format!("{header}.{payload}").as_bytes());
    let signature = unb64(signature)?;
    mac.verify_slice(&signature).map_err(|_| AuthError::ValidationError("signature mismatch".to_string()))?;
    let payload = unb64(payload)?;
    serde_json::from_slice(&payload).map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))
}

/// Validates a login token against the secret shared with the identity collaborator.
pub fn check_login_token_signature(token: &str, config: &AuthConfig) -> Result<LoginToken, AuthError> {
    decode_token(token, config.login_shared_secret.reveal())
}

pub struct TokenIssuer {
    secret: Secret<String>,
    ttl: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { secret: config.jwt_secret.clone(), ttl: config.token_ttl }
    }

    /// Issue a new access token for the given login token.
    /// This method DOES NOT verify that the `login_token` contains legitimate information.
    /// That must be done prior to calling `issue_token`.
    pub fn issue_token(&self, login_token: LoginToken, ttl: Option<chrono::Duration>) -> Result<String, AuthError> {
        let exp = (Utc::now() + ttl.unwrap_or(self.ttl)).timestamp();
        let claims = JwtClaims { user_id: login_token.user_id, roles: login_token.desired_roles, exp };
        encode_token(&claims, self.secret.reveal())
    }
}

/// The engine-facing verifier: both the HTTP middleware and the realtime gateway use this to
/// turn a bearer token into [`AccessClaims`].
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Secret<String>,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self { secret: config.jwt_secret.clone() }
    }

    pub fn verify_claims(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let claims: JwtClaims = decode_token(token, self.secret.reveal())?;
        if claims.exp < Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthApiError> {
        self.verify_claims(token).map(|c| c.access_claims()).map_err(|e| AuthApiError::InvalidToken(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: Secret::new("access-secret".to_string()),
            login_shared_secret: Secret::new("login-secret".to_string()),
            token_ttl: chrono::Duration::hours(24),
        }
    }

    #[test]
    fn round_trip_and_tamper_detection() {
        let config = config();
        let issuer = TokenIssuer::new(&config);
        let verifier = JwtVerifier::new(&config);
        let token = issuer
            .issue_token(LoginToken { user_id: 42, nonce: 1, desired_roles: vec![Role::Medic] }, None)
            .unwrap();
        let claims = verifier.verify_claims(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.roles, vec![Role::Medic]);

        let tampered = format!("{}x", token);
        assert!(verifier.verify_claims(&tampered).is_err());
        let wrong_key = JwtVerifier { secret: Secret::new("other".to_string()) };
        assert!(wrong_key.verify_claims(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = config();
        let issuer = TokenIssuer::new(&config);
        let verifier = JwtVerifier::new(&config);
        let token = issuer
            .issue_token(
                LoginToken { user_id: 42, nonce: 1, desired_roles: vec![] },
                Some(chrono::Duration::seconds(-5)),
            )
            .unwrap();
        assert!(matches!(verifier.verify_claims(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn login_tokens_use_the_shared_secret() {
        let config = config();
        let login = LoginToken { user_id: 7, nonce: 99, desired_roles: vec![Role::Client] };
        let token = encode_token(&login, config.login_shared_secret.reveal()).unwrap();
        let parsed = check_login_token_signature(&token, &config).unwrap();
        assert_eq!(parsed, login);
        // signing with the access secret is not good enough
        let forged = encode_token(&login, config.jwt_secret.reveal()).unwrap();
        assert!(check_login_token_signature(&forged, &config).is_err());
    }
}
