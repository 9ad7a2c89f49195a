//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful
//! structs) that accept a `&mut SqliteConnection` argument. Callers obtain a connection from a
//! pool, or open a transaction as the need arises and call through without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod auth;
pub mod chat;
pub mod ledger;
pub mod orders;
pub mod workers;

const SQLITE_DB_URL: &str = "sqlite://data/visit_dispatch.db";

pub fn db_url() -> String {
    let result = env::var("VDP_DATABASE_URL").unwrap_or_else(|_| {
        info!("VDP_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
