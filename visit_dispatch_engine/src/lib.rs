//! Visit Dispatch Engine
//!
//! The core of the home-visit dispatch platform: clients place service requests, independent
//! medics race to accept them, and the two parties track a multi-stage visit through to
//! payment, talking in a per-order chat along the way. This library is provider-agnostic; the
//! HTTP transport lives in the server crate.
//!
//! The library is divided into these sections:
//! 1. Database management and control ([`mod@sqlite`] behind the [`crate::traits`] contracts).
//!    You should never need to access the database directly — use the public APIs instead. The
//!    exception is the data types stored in the database, which are public in
//!    [`mod@db_types`].
//! 2. The engine public APIs ([`OrderFlowApi`], [`ChatApi`], [`LedgerApi`], [`AuthApi`]): the
//!    caller-facing rules on top of a backend.
//! 3. The realtime layer: the [`mod@gateway`] connection/room registries and the
//!    [`mod@dispatch`] fanout.
//!
//! The engine also emits events when orders are created, accepted, advanced or cancelled. A
//! simple hook system ([`mod@events`]) lets the server subscribe the dispatcher and the gateway
//! to them without coupling this crate to either.
pub mod db_types;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;
mod vde_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use vde_api::{
    auth_api,
    auth_api::AuthApi,
    chat_api,
    chat_api::ChatApi,
    ledger_api,
    ledger_api::LedgerApi,
    ledger_objects,
    order_flow_api,
    order_flow_api::OrderFlowApi,
    order_objects,
};
