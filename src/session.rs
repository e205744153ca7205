//! Client session: who is signed in, and with which bearer token.
//!
//! DESIGN
//! ======
//! `SessionManager` is an explicitly passed context object (share it with
//! `Arc`). It owns the durable storage behind a mutex and publishes every
//! change of the in-memory `Session` on a `watch` channel, so views can
//! subscribe instead of polling.
//!
//! INVARIANTS
//! ==========
//! - `user` and `access_token` are only ever replaced together.
//! - Every mutation writes through to storage, under the storage lock,
//!   before the new in-memory state is published.
//! - `loading` is true from construction until `restore` finishes, and
//!   never again afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::api::TokenValidator;
use crate::navigate::Navigator;
use crate::storage::{Storage, StorageError};
use crate::types::{Role, User};

/// Storage key holding the opaque bearer token.
pub const TOKEN_KEY: &str = "accessToken";
/// Storage key holding the JSON-serialized user record.
pub const USER_KEY: &str = "rivalSyndicateUser";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("user encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("access token must not be empty")]
    EmptyToken,
}

// =============================================================================
// SESSION
// =============================================================================

/// Snapshot of the client session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub loading: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self { user: None, access_token: None, loading: true }
    }
}

impl Session {
    /// Signed in with a usable bearer credential: both user and token present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    /// A user record is present, token or not. Weaker than
    /// `is_authenticated`; do not gate API calls on it.
    #[must_use]
    pub fn has_user(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role().is_some_and(Role::is_admin)
    }

    #[must_use]
    pub fn is_booster(&self) -> bool {
        self.role().is_some_and(Role::is_booster)
    }

    /// `Authorization` header value for backend calls.
    #[must_use]
    pub fn bearer_header(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

/// What `restore` / `restore_and_validate` found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing usable in storage.
    Empty,
    /// User and token loaded from storage.
    Restored,
    /// Stored user record was unreadable; both keys were wiped.
    Discarded,
    /// `restore` had already run; nothing changed.
    AlreadyRestored,
    /// Restored token was accepted and the user record refreshed.
    Validated,
    /// Restored token was rejected (or could not be checked); signed out.
    Revoked,
}

enum Loaded {
    Empty,
    Found(User, String),
    Corrupt(String),
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct SessionManager<S> {
    storage: Mutex<S>,
    state: watch::Sender<Session>,
    restored: AtomicBool,
    login_url: String,
}

impl<S: Storage> SessionManager<S> {
    /// Create an empty, loading session over `storage`. `login_url` is the
    /// backend endpoint that starts the OAuth flow.
    pub fn new(storage: S, login_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self { storage: Mutex::new(storage), state, restored: AtomicBool::new(false), login_url: login_url.into() }
    }

    fn lock_storage(&self) -> MutexGuard<'_, S> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the underlying storage while holding the session lock.
    pub fn with_storage<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        f(&mut self.lock_storage())
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    #[must_use]
    pub fn is_booster(&self) -> bool {
        self.state.borrow().is_booster()
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Load the session from storage. Runs once; later calls are no-ops.
    ///
    /// Never fails: an unreadable user record (or a storage read error) wipes
    /// both keys and leaves the session empty. Always ends with
    /// `loading == false`.
    pub fn restore(&self) -> RestoreOutcome {
        if self.restored.swap(true, Ordering::SeqCst) {
            tracing::debug!("session restore already ran");
            return RestoreOutcome::AlreadyRestored;
        }

        let mut storage = self.lock_storage();
        match load(&*storage) {
            Loaded::Found(user, token) => {
                tracing::info!(username = %user.username, role = %user.role, "session restored");
                self.state.send_modify(|s| {
                    s.user = Some(user);
                    s.access_token = Some(token);
                    s.loading = false;
                });
                RestoreOutcome::Restored
            }
            Loaded::Empty => {
                tracing::debug!("no stored session");
                self.state.send_modify(|s| s.loading = false);
                RestoreOutcome::Empty
            }
            Loaded::Corrupt(reason) => {
                tracing::warn!(%reason, "discarding corrupted stored session");
                clear_keys(&mut *storage);
                self.state.send_modify(|s| {
                    s.user = None;
                    s.access_token = None;
                    s.loading = false;
                });
                RestoreOutcome::Discarded
            }
        }
    }

    /// `restore`, then confirm the restored token with the backend.
    ///
    /// On success the user record is replaced by the backend's copy. Any
    /// failure, including transport errors, signs the session out rather
    /// than keeping an unverifiable token.
    pub async fn restore_and_validate(&self, validator: &dyn TokenValidator) -> RestoreOutcome {
        let outcome = self.restore();
        if outcome != RestoreOutcome::Restored {
            return outcome;
        }
        let Some(token) = self.access_token() else {
            return outcome;
        };

        match validator.current_user(&token).await {
            Ok(user) => match self.refresh_user(user, &token) {
                Ok(true) => RestoreOutcome::Validated,
                Ok(false) => {
                    tracing::debug!("session changed during validation; keeping newer state");
                    outcome
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not persist validated user; signing out");
                    self.logout();
                    RestoreOutcome::Revoked
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "stored token failed validation; signing out");
                self.logout();
                RestoreOutcome::Revoked
            }
        }
    }

    /// Hand the browser to the backend's OAuth entry point. No state changes.
    pub fn login(&self, navigator: &dyn Navigator) {
        tracing::info!(target_url = %self.login_url, "starting oauth login");
        navigator.navigate(&self.login_url);
    }

    /// Replace user and token together, writing through to storage first.
    ///
    /// If storage rejects either write, storage is rolled back and the
    /// in-memory session is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty token, an unencodable user, or a
    /// storage failure.
    pub fn set_auth_data(&self, user: User, token: &str) -> Result<(), SessionError> {
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        let encoded = serde_json::to_string(&user)?;

        let mut storage = self.lock_storage();
        write_pair(&mut *storage, &encoded, token)?;
        tracing::info!(username = %user.username, role = %user.role, "session updated");
        self.state.send_modify(|s| {
            s.user = Some(user);
            s.access_token = Some(token.to_owned());
        });
        Ok(())
    }

    /// Sign out: clear memory and both storage keys. Idempotent, never fails.
    pub fn logout(&self) {
        let mut storage = self.lock_storage();
        clear_keys(&mut *storage);
        self.state.send_if_modified(|s| {
            let changed = s.user.is_some() || s.access_token.is_some();
            s.user = None;
            s.access_token = None;
            changed
        });
        tracing::info!("session cleared");
    }

    /// Swap in a fresher user record, but only if `token` is still current.
    fn refresh_user(&self, user: User, token: &str) -> Result<bool, SessionError> {
        let encoded = serde_json::to_string(&user)?;
        let mut storage = self.lock_storage();
        if self.state.borrow().access_token.as_deref() != Some(token) {
            return Ok(false);
        }
        write_pair(&mut *storage, &encoded, token)?;
        self.state.send_modify(|s| s.user = Some(user));
        Ok(true)
    }
}

fn load<S: Storage + ?Sized>(storage: &S) -> Loaded {
    let token = match storage.get(TOKEN_KEY) {
        Ok(v) => v.filter(|t| !t.is_empty()),
        Err(e) => return Loaded::Corrupt(e.to_string()),
    };
    let raw_user = match storage.get(USER_KEY) {
        Ok(v) => v.filter(|u| !u.is_empty()),
        Err(e) => return Loaded::Corrupt(e.to_string()),
    };
    let (Some(token), Some(raw_user)) = (token, raw_user) else {
        return Loaded::Empty;
    };
    match serde_json::from_str::<User>(&raw_user) {
        Ok(user) => Loaded::Found(user, token),
        Err(e) => Loaded::Corrupt(e.to_string()),
    }
}

/// Write user then token; on a token failure put the previous user back.
fn write_pair<S: Storage + ?Sized>(storage: &mut S, encoded_user: &str, token: &str) -> Result<(), StorageError> {
    let previous_user = storage.get(USER_KEY)?;
    storage.set(USER_KEY, encoded_user)?;
    if let Err(e) = storage.set(TOKEN_KEY, token) {
        let rollback = match previous_user.as_deref() {
            Some(prev) => storage.set(USER_KEY, prev),
            None => storage.remove(USER_KEY),
        };
        if let Err(rb) = rollback {
            tracing::error!(error = %rb, "session storage rollback failed");
        }
        return Err(e);
    }
    Ok(())
}

fn clear_keys<S: Storage + ?Sized>(storage: &mut S) {
    for key in [USER_KEY, TOKEN_KEY] {
        if let Err(e) = storage.remove(key) {
            tracing::error!(%key, error = %e, "failed to remove session key");
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
