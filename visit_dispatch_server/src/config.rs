use std::{env, time::Duration};

use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use vdp_common::{parse_boolean_flag, Secret};

use crate::errors::ServerError;

const DEFAULT_VDP_HOST: &str = "127.0.0.1";
const DEFAULT_VDP_PORT: u16 = 8360;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 3000;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather
    /// than the connection's remote address.
    pub use_forwarded: bool,
    /// Upper bound on a single call to the external notification channel. Fanout is
    /// fire-and-forget; this only caps how long a misbehaving channel can tie up the hook task.
    pub notify_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VDP_HOST.to_string(),
            port: DEFAULT_VDP_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            notify_timeout: Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VDP_HOST").ok().unwrap_or_else(|| DEFAULT_VDP_HOST.into());
        let port = env::var("VDP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VDP_PORT. {e} Using the default, {DEFAULT_VDP_PORT}, \
                         instead."
                    );
                    DEFAULT_VDP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VDP_PORT);
        let database_url = env::var("VDP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ VDP_DATABASE_URL is not set. Please set it to the URL for the dispatch database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to \
                 the default configuration."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("VDP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("VDP_USE_FORWARDED").ok(), false);
        let notify_timeout = env::var("VDP_NOTIFY_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VDP_NOTIFY_TIMEOUT_MS. {e}"))
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS));
        Self { host, port, database_url, auth, use_x_forwarded_for, use_forwarded, notify_timeout }
    }
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Signs the access JWTs this server issues and verifies.
    pub jwt_secret: Secret<String>,
    /// Shared with the external identity service; login tokens must carry its HMAC.
    pub login_shared_secret: Secret<String>,
    /// How long an issued access token stays valid. Tokens do not refresh.
    pub token_ttl: chrono::Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. DO NOT \
             operate on production like this, since every issued token dies with this process. Set VDP_JWT_SECRET \
             and VDP_LOGIN_SHARED_SECRET instead. 🚨️🚨️🚨️"
        );
        let mut rng = thread_rng();
        let mut random_secret =
            || (&mut rng).sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        Self {
            jwt_secret: Secret::new(random_secret()),
            login_shared_secret: Secret::new(random_secret()),
            token_ttl: chrono::Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let jwt_secret =
            env::var("VDP_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [VDP_JWT_SECRET]")))?;
        if jwt_secret.len() < 32 {
            return Err(ServerError::ConfigurationError(
                "VDP_JWT_SECRET must be at least 32 characters long".to_string(),
            ));
        }
        let login_shared_secret = env::var("VDP_LOGIN_SHARED_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [VDP_LOGIN_SHARED_SECRET]")))?;
        let token_ttl = env::var("VDP_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VDP_TOKEN_TTL_HOURS. {e}"))
                    .ok()
            })
            .map(chrono::Duration::hours)
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_TOKEN_TTL_HOURS));
        Ok(Self {
            jwt_secret: Secret::new(jwt_secret),
            login_shared_secret: Secret::new(login_shared_secret),
            token_ttl,
        })
    }
}
