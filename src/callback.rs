//! OAuth callback handling.
//!
//! ARCHITECTURE
//! ============
//! The identity provider redirects back to the callback route with the result
//! in the query string. `CallbackParams` extracts the recognised parameters,
//! and a `CallbackHandler` (one per callback invocation) turns them into a
//! session mutation plus a terminal `CallbackOutcome`:
//!
//! ```text
//! loading ─┬─ error param / bad user blob / failed exchange ──► error   (→ "/" after 2s)
//!          ├─ token+user parsed / code exchanged ─────────────► success (→ "/dashboard" after 1.5s)
//!          └─ no recognised params ───────────────────────────► idle    (→ "/" now)
//! ```
//!
//! Only one wire contract is active at a time (`CallbackProtocol`). The
//! handler latches before any async work, so a re-fired invocation is a no-op
//! and never writes storage twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::api::CodeExchanger;
use crate::config::{CallbackProtocol, DEFAULT_CALLBACK_TIMEOUT_SECS};
use crate::navigate::{ENTRY_ROUTE, LANDING_ROUTE, Navigator};
use crate::notify::{Notice, Notifier};
use crate::session::SessionManager;
use crate::storage::Storage;
use crate::types::User;

pub const SUCCESS_REDIRECT_DELAY: Duration = Duration::from_millis(1500);
pub const ERROR_REDIRECT_DELAY: Duration = Duration::from_millis(2000);

const GENERIC_FAILURE: &str = "Authentication failed. Please try again.";

// =============================================================================
// PARAMS
// =============================================================================

/// Recognised callback query parameters. Empty values count as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub error: Option<String>,
    pub token: Option<String>,
    /// URL-encoded JSON user record, as found in the query.
    pub user: Option<String>,
    pub code: Option<String>,
}

impl CallbackParams {
    /// Parse from a full callback URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn from_url(url: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(url)?;
        Ok(Self::from_pairs(url.query_pairs()))
    }

    /// Parse from a bare query string, with or without the leading `?`.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>) -> Self {
        // First occurrence wins, like `URLSearchParams.get`.
        let mut first: HashMap<String, String> = HashMap::new();
        for (key, value) in pairs {
            first.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        let mut take = |key: &str| first.remove(key).filter(|v| !v.is_empty());
        Self { error: take("error"), token: take("token"), user: take("user"), code: take("code") }
    }

    fn request(&self, protocol: CallbackProtocol) -> CallbackRequest<'_> {
        if let Some(error) = &self.error {
            return CallbackRequest::ProviderError(error);
        }
        match protocol {
            CallbackProtocol::DirectToken => match (&self.token, &self.user) {
                (Some(token), Some(user)) => CallbackRequest::DirectToken { token, user },
                _ => CallbackRequest::Nothing,
            },
            CallbackProtocol::CodeExchange => {
                self.code.as_deref().map_or(CallbackRequest::Nothing, CallbackRequest::Code)
            }
        }
    }
}

enum CallbackRequest<'a> {
    ProviderError(&'a str),
    DirectToken { token: &'a str, user: &'a str },
    Code(&'a str),
    Nothing,
}

/// Decode the `user` blob: one more percent-decoding pass, then JSON.
///
/// The pass is as strict as `decodeURIComponent`: a `%` that does not start
/// a two-digit hex escape, or escapes that are not UTF-8, reject the blob.
///
/// # Errors
///
/// Returns the decode or parse failure as text.
pub fn decode_user(blob: &str) -> Result<User, String> {
    if let Some(at) = malformed_escape(blob) {
        return Err(format!("malformed percent escape at byte {at}"));
    }
    let decoded = percent_decode_str(blob).decode_utf8().map_err(|e| e.to_string())?;
    serde_json::from_str(&decoded).map_err(|e| e.to_string())
}

/// Offset of the first `%` not followed by two hex digits.
fn malformed_escape(blob: &str) -> Option<usize> {
    let bytes = blob.as_bytes();
    bytes.iter().enumerate().filter(|&(_, &b)| b == b'%').map(|(i, _)| i).find(|&i| {
        !matches!(bytes.get(i + 1..i + 3), Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit())
    })
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Why a callback failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackFailure {
    /// The provider redirected with an `error` parameter.
    Provider(String),
    /// The `user` blob did not decode to a user record.
    MalformedUser(String),
    /// Code exchange was refused or failed; carries the message to show.
    Exchange(String),
    /// Code exchange did not answer in time.
    Timeout,
    /// The session could not be persisted.
    Storage(String),
}

impl CallbackFailure {
    /// Message describing the failure, as reported by the server where
    /// there is one.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Provider(msg) | Self::Exchange(msg) => msg,
            Self::MalformedUser(_) | Self::Storage(_) => GENERIC_FAILURE,
            Self::Timeout => "Authentication timed out. Please try again.",
        }
    }

    fn notice_text(&self) -> String {
        match self {
            Self::Provider(msg) => format!("Authentication failed: {msg}"),
            other => other.message().to_owned(),
        }
    }
}

/// Rendering state of the callback page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackStatus {
    Loading,
    Success,
    Error,
    IdleRedirect,
}

/// Where to go next, and after how long.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub target: &'static str,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success { user: User },
    Failed(CallbackFailure),
    /// No recognised parameters; session untouched.
    NothingToProcess,
    /// This invocation already ran; nothing was done.
    AlreadyHandled,
}

impl CallbackOutcome {
    /// Terminal page status, `None` for a suppressed repeat invocation.
    #[must_use]
    pub fn status(&self) -> Option<CallbackStatus> {
        match self {
            Self::Success { .. } => Some(CallbackStatus::Success),
            Self::Failed(_) => Some(CallbackStatus::Error),
            Self::NothingToProcess => Some(CallbackStatus::IdleRedirect),
            Self::AlreadyHandled => None,
        }
    }

    #[must_use]
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            Self::Success { .. } => Some(Redirect { target: LANDING_ROUTE, delay: SUCCESS_REDIRECT_DELAY }),
            Self::Failed(_) => Some(Redirect { target: ENTRY_ROUTE, delay: ERROR_REDIRECT_DELAY }),
            Self::NothingToProcess => Some(Redirect { target: ENTRY_ROUTE, delay: Duration::ZERO }),
            Self::AlreadyHandled => None,
        }
    }

    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Success { user } => Some(Notice::Success(format!("Welcome, {}!", user.username))),
            Self::Failed(failure) => Some(Notice::Error(failure.notice_text())),
            Self::NothingToProcess | Self::AlreadyHandled => None,
        }
    }
}

// =============================================================================
// HANDLER
// =============================================================================

/// One callback invocation. `handle` does its work at most once.
pub struct CallbackHandler {
    params: CallbackParams,
    protocol: CallbackProtocol,
    timeout: Duration,
    started: AtomicBool,
}

impl CallbackHandler {
    #[must_use]
    pub fn new(params: CallbackParams, protocol: CallbackProtocol) -> Self {
        Self {
            params,
            protocol,
            timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            started: AtomicBool::new(false),
        }
    }

    /// Bound on the code exchange round trip.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Status before (or while) `handle` runs.
    #[must_use]
    pub fn initial_status(&self) -> CallbackStatus {
        CallbackStatus::Loading
    }

    /// Process the callback and update `session` accordingly.
    ///
    /// The session is only ever written on success, and then with user and
    /// token together.
    pub async fn handle<S: Storage>(
        &self,
        session: &SessionManager<S>,
        exchanger: &dyn CodeExchanger,
    ) -> CallbackOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("callback already handled; ignoring repeat invocation");
            return CallbackOutcome::AlreadyHandled;
        }

        let outcome = match self.params.request(self.protocol) {
            CallbackRequest::ProviderError(error) => {
                CallbackOutcome::Failed(CallbackFailure::Provider(error.to_owned()))
            }
            CallbackRequest::DirectToken { token, user } => match decode_user(user) {
                Ok(user) => commit(session, user, token),
                Err(reason) => CallbackOutcome::Failed(CallbackFailure::MalformedUser(reason)),
            },
            CallbackRequest::Code(code) => self.exchange(session, exchanger, code).await,
            CallbackRequest::Nothing => CallbackOutcome::NothingToProcess,
        };

        match &outcome {
            CallbackOutcome::Success { user } => {
                tracing::info!(username = %user.username, protocol = %self.protocol, "oauth callback succeeded");
            }
            CallbackOutcome::Failed(failure) => {
                tracing::warn!(?failure, protocol = %self.protocol, "oauth callback failed");
            }
            _ => tracing::debug!("oauth callback had nothing to process"),
        }
        outcome
    }

    async fn exchange<S: Storage>(
        &self,
        session: &SessionManager<S>,
        exchanger: &dyn CodeExchanger,
        code: &str,
    ) -> CallbackOutcome {
        let response = match tokio::time::timeout(self.timeout, exchanger.exchange_code(code)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let message = e.server_message().unwrap_or(GENERIC_FAILURE).to_owned();
                return CallbackOutcome::Failed(CallbackFailure::Exchange(message));
            }
            Err(_) => return CallbackOutcome::Failed(CallbackFailure::Timeout),
        };

        if !response.success {
            let message = response.error.unwrap_or_else(|| GENERIC_FAILURE.to_owned());
            return CallbackOutcome::Failed(CallbackFailure::Exchange(message));
        }
        match (response.user, response.access_token) {
            (Some(user), Some(token)) => commit(session, user, &token),
            _ => CallbackOutcome::Failed(CallbackFailure::Exchange(GENERIC_FAILURE.to_owned())),
        }
    }
}

fn commit<S: Storage>(session: &SessionManager<S>, user: User, token: &str) -> CallbackOutcome {
    match session.set_auth_data(user.clone(), token) {
        Ok(()) => CallbackOutcome::Success { user },
        Err(e) => CallbackOutcome::Failed(CallbackFailure::Storage(e.to_string())),
    }
}

/// Handle the callback, raise its notification, wait out the redirect
/// delay, then navigate.
pub async fn run_callback<S: Storage>(
    handler: &CallbackHandler,
    session: &SessionManager<S>,
    exchanger: &dyn CodeExchanger,
    notifier: &dyn Notifier,
    navigator: &dyn Navigator,
) -> CallbackOutcome {
    let outcome = handler.handle(session, exchanger).await;
    if let Some(notice) = outcome.notice() {
        notifier.notify(notice);
    }
    if let Some(redirect) = outcome.redirect() {
        if !redirect.delay.is_zero() {
            tokio::time::sleep(redirect.delay).await;
        }
        navigator.navigate(redirect.target);
    }
    outcome
}

#[cfg(test)]
#[path = "callback_test.rs"]
mod tests;
