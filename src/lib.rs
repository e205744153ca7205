//! Client session layer for the Rival Syndicate storefront.
//!
//! DESIGN
//! ======
//! The backend owns users, orders, and token issuance. This crate owns the
//! client side of that contract: the persisted session (`session`), the OAuth
//! callback protocol (`callback`), and thin typed calls to the REST API
//! (`api`). Browser concerns are injected through small traits (`Storage`,
//! `Navigator`, `Notifier`) so the same logic drives the CLI and tests.

pub mod api;
pub mod callback;
pub mod config;
pub mod currency;
pub mod navigate;
pub mod notify;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError};
pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams, CallbackStatus};
pub use config::{CallbackProtocol, Config};
pub use session::{Session, SessionManager};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use types::{Role, User};
