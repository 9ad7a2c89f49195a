//! Backend and collaborator contracts.
//!
//! Two kinds of traits live here. The first kind defines what a database backend must expose to
//! power the engine: [`DispatchDatabase`] for the order lifecycle, [`ChatManagement`] for the
//! per-order message log, [`LedgerManagement`] for earnings and commission debt, and
//! [`AuthManagement`] for login nonces and role grants.
//!
//! The second kind marks the boundaries with external collaborators that this core does not
//! implement: [`WorkerDirectory`] (the eligibility directory owned by profile management),
//! [`NotificationChannel`] (best-effort outbound push such as Telegram or SMS), and
//! [`TokenVerifier`] (the identity service that turns a bearer token into claims).
mod auth_management;
mod chat_management;
mod dispatch_database;
mod ledger_management;
mod notification;
mod token_verifier;
mod worker_directory;

pub use auth_management::{AuthApiError, AuthManagement};
pub use chat_management::{ChatApiError, ChatManagement};
pub use dispatch_database::{DispatchDatabase, OrderFlowError};
pub use ledger_management::{LedgerApiError, LedgerManagement};
pub use notification::{NotificationChannel, NotifyError, NotifyPayload, NullNotifier};
pub use token_verifier::{AccessClaims, TokenVerifier};
pub use worker_directory::WorkerDirectory;
