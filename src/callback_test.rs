use super::*;
use crate::api::ExchangeResponse;
use crate::session::{TOKEN_KEY, USER_KEY};
use crate::storage::MemoryStorage;
use crate::testing::{RecordingNavigator, RecordingNotifier, StubExchanger, user};
use crate::types::Role;

const CALLBACK_BASE: &str = "https://shop.test/auth/callback";
const USER_BLOB: &str = "%7B%22username%22%3A%22X%22%2C%22role%22%3A%22client%22%7D";

fn session() -> SessionManager<MemoryStorage> {
    let mgr = SessionManager::new(MemoryStorage::new(), "http://backend.test/api/auth/discord/login");
    mgr.restore();
    mgr
}

fn params(query: &str) -> CallbackParams {
    CallbackParams::from_url(&format!("{CALLBACK_BASE}?{query}")).unwrap()
}

fn unused_exchanger() -> StubExchanger {
    StubExchanger::ok(ExchangeResponse::default())
}

fn writes(mgr: &SessionManager<MemoryStorage>) -> usize {
    mgr.with_storage(|s| s.write_count())
}

// =============================================================================
// CallbackParams
// =============================================================================

#[test]
fn params_decode_query_values_once() {
    let p = params(&format!("token=tok1&user={USER_BLOB}"));
    assert_eq!(p.token.as_deref(), Some("tok1"));
    assert_eq!(p.user.as_deref(), Some(r#"{"username":"X","role":"client"}"#));
    assert!(p.error.is_none());
    assert!(p.code.is_none());
}

#[test]
fn params_first_value_wins_and_empty_is_absent() {
    let p = CallbackParams::from_query("?code=first&code=second&error=");
    assert_eq!(p.code.as_deref(), Some("first"));
    assert!(p.error.is_none());
}

#[test]
fn params_plus_decodes_to_space() {
    let p = CallbackParams::from_query("error=access+denied");
    assert_eq!(p.error.as_deref(), Some("access denied"));
}

#[test]
fn params_rejects_relative_url() {
    assert!(CallbackParams::from_url("/auth/callback?code=x").is_err());
}

#[test]
fn decode_user_handles_double_encoding() {
    let u = decode_user(USER_BLOB).unwrap();
    assert_eq!(u.username, "X");
    let u = decode_user(r#"{"username":"Y","role":"admin"}"#).unwrap();
    assert_eq!(u.role, Role::Admin);
}

#[test]
fn decode_user_rejects_bad_escapes() {
    for blob in [r#"{"username":"100%"}"#, "%7B%22username%22%3A%22X%22%7", "%zz", "%E2%28%A1"] {
        assert!(decode_user(blob).is_err(), "expected {blob:?} to be rejected");
    }
    assert_eq!(decode_user("%7B%22username%22%3A%22100%2525%22%7D").unwrap().username, "100%25");
}

// =============================================================================
// Provider error
// =============================================================================

#[tokio::test]
async fn error_param_short_circuits_everything_else() {
    let mgr = session();
    let handler = CallbackHandler::new(
        params(&format!("error=access_denied&token=tok1&user={USER_BLOB}&code=abc")),
        CallbackProtocol::DirectToken,
    );
    let exchanger = unused_exchanger();

    let outcome = handler.handle(&mgr, &exchanger).await;
    assert_eq!(outcome, CallbackOutcome::Failed(CallbackFailure::Provider("access_denied".into())));
    assert_eq!(outcome.status(), Some(CallbackStatus::Error));
    assert!(!mgr.snapshot().has_user());
    assert_eq!(writes(&mgr), 0);
    assert_eq!(exchanger.call_count(), 0);
    assert_eq!(outcome.notice(), Some(Notice::Error("Authentication failed: access_denied".into())));
}

#[tokio::test]
async fn error_param_wins_under_code_exchange_too() {
    let mgr = session();
    let handler = CallbackHandler::new(params("error=access_denied&code=abc"), CallbackProtocol::CodeExchange);
    let exchanger = unused_exchanger();
    let outcome = handler.handle(&mgr, &exchanger).await;
    assert!(matches!(outcome, CallbackOutcome::Failed(CallbackFailure::Provider(_))));
    assert_eq!(exchanger.call_count(), 0);
}

// =============================================================================
// Direct token
// =============================================================================

#[tokio::test]
async fn direct_token_success_persists_before_reporting() {
    let mgr = session();
    let handler = CallbackHandler::new(params(&format!("token=tok1&user={USER_BLOB}")), CallbackProtocol::DirectToken);

    let outcome = handler.handle(&mgr, &unused_exchanger()).await;
    let CallbackOutcome::Success { user } = &outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(user.username, "X");
    assert_eq!(user.role, Role::Client);

    let s = mgr.snapshot();
    assert_eq!(s.access_token.as_deref(), Some("tok1"));
    assert_eq!(s.user.as_ref().map(|u| u.username.as_str()), Some("X"));
    assert_eq!(mgr.with_storage(|st| st.get(TOKEN_KEY).unwrap()).as_deref(), Some("tok1"));
    assert!(mgr.with_storage(|st| st.get(USER_KEY).unwrap()).is_some());
    assert_eq!(outcome.notice(), Some(Notice::Success("Welcome, X!".into())));
    assert_eq!(outcome.redirect(), Some(Redirect { target: LANDING_ROUTE, delay: SUCCESS_REDIRECT_DELAY }));
}

#[tokio::test]
async fn direct_token_double_invocation_writes_once() {
    let mgr = session();
    let handler = CallbackHandler::new(params(&format!("token=tok1&user={USER_BLOB}")), CallbackProtocol::DirectToken);
    let exchanger = unused_exchanger();

    let (a, b) = tokio::join!(handler.handle(&mgr, &exchanger), handler.handle(&mgr, &exchanger));
    let successes = [&a, &b].iter().filter(|o| matches!(o, CallbackOutcome::Success { .. })).count();
    let repeats = [&a, &b].iter().filter(|o| matches!(o, CallbackOutcome::AlreadyHandled)).count();
    assert_eq!(successes, 1);
    assert_eq!(repeats, 1);
    assert_eq!(writes(&mgr), 2);
}

#[tokio::test]
async fn direct_token_malformed_user_fails_without_writes() {
    let mgr = session();
    let handler = CallbackHandler::new(params("token=tok1&user=%7Bnope"), CallbackProtocol::DirectToken);

    let outcome = handler.handle(&mgr, &unused_exchanger()).await;
    assert!(matches!(outcome, CallbackOutcome::Failed(CallbackFailure::MalformedUser(_))));
    assert_eq!(outcome.notice(), Some(Notice::Error("Authentication failed. Please try again.".into())));
    assert_eq!(outcome.redirect(), Some(Redirect { target: ENTRY_ROUTE, delay: ERROR_REDIRECT_DELAY }));
    assert!(!mgr.is_authenticated());
    assert_eq!(writes(&mgr), 0);
}

#[tokio::test]
async fn direct_token_stray_percent_in_user_fails_without_writes() {
    let mgr = session();
    let handler = CallbackHandler::new(
        params("token=tok1&user=%7B%22username%22%3A%22100%25%22%7D"),
        CallbackProtocol::DirectToken,
    );

    let outcome = handler.handle(&mgr, &unused_exchanger()).await;
    assert!(matches!(outcome, CallbackOutcome::Failed(CallbackFailure::MalformedUser(_))));
    assert_eq!(outcome.status(), Some(CallbackStatus::Error));
    assert_eq!(outcome.redirect(), Some(Redirect { target: ENTRY_ROUTE, delay: ERROR_REDIRECT_DELAY }));
    assert!(!mgr.snapshot().has_user());
    assert_eq!(writes(&mgr), 0);
}

#[tokio::test]
async fn direct_token_ignores_lone_code() {
    let mgr = session();
    let exchanger = unused_exchanger();
    let handler = CallbackHandler::new(params("code=abc123"), CallbackProtocol::DirectToken);
    assert_eq!(handler.handle(&mgr, &exchanger).await, CallbackOutcome::NothingToProcess);
    assert_eq!(exchanger.call_count(), 0);
}

#[tokio::test]
async fn token_without_user_is_nothing_to_process() {
    let mgr = session();
    let handler = CallbackHandler::new(params("token=tok1"), CallbackProtocol::DirectToken);
    let outcome = handler.handle(&mgr, &unused_exchanger()).await;
    assert_eq!(outcome, CallbackOutcome::NothingToProcess);
    assert_eq!(outcome.status(), Some(CallbackStatus::IdleRedirect));
    assert_eq!(outcome.redirect(), Some(Redirect { target: ENTRY_ROUTE, delay: Duration::ZERO }));
    assert_eq!(outcome.notice(), None);
    assert_eq!(writes(&mgr), 0);
}

// =============================================================================
// Code exchange
// =============================================================================

#[tokio::test]
async fn code_exchange_soft_failure_reports_server_message() {
    let mgr = session();
    let exchanger = StubExchanger::ok(ExchangeResponse { success: false, error: Some("expired".into()), ..ExchangeResponse::default() });
    let handler = CallbackHandler::new(params("code=abc123"), CallbackProtocol::CodeExchange);

    let outcome = handler.handle(&mgr, &exchanger).await;
    let CallbackOutcome::Failed(failure) = &outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(failure.message(), "expired");
    assert_eq!(exchanger.calls.lock().unwrap().as_slice(), ["abc123"]);
    assert!(!mgr.snapshot().has_user());
    assert_eq!(writes(&mgr), 0);
}

#[tokio::test]
async fn code_exchange_success_sets_session() {
    let mgr = session();
    let exchanger = StubExchanger::ok(ExchangeResponse {
        success: true,
        user: Some(user("hela", Role::Admin)),
        access_token: Some("jwt-1".into()),
        error: None,
    });
    let handler = CallbackHandler::new(params("code=good"), CallbackProtocol::CodeExchange);

    let outcome = handler.handle(&mgr, &exchanger).await;
    assert!(matches!(outcome, CallbackOutcome::Success { .. }));
    assert!(mgr.is_admin());
    assert_eq!(mgr.access_token().as_deref(), Some("jwt-1"));
}

#[tokio::test]
async fn code_exchange_success_without_token_is_failure() {
    let mgr = session();
    let exchanger = StubExchanger::ok(ExchangeResponse {
        success: true,
        user: Some(user("hela", Role::Admin)),
        ..ExchangeResponse::default()
    });
    let handler = CallbackHandler::new(params("code=good"), CallbackProtocol::CodeExchange);
    let outcome = handler.handle(&mgr, &exchanger).await;
    assert!(matches!(outcome, CallbackOutcome::Failed(CallbackFailure::Exchange(_))));
    assert!(!mgr.snapshot().has_user());
}

#[tokio::test]
async fn code_exchange_http_error_uses_generic_message() {
    let mgr = session();
    let exchanger = StubExchanger::http_error(500);
    let handler = CallbackHandler::new(params("code=abc"), CallbackProtocol::CodeExchange);
    let outcome = handler.handle(&mgr, &exchanger).await;
    let CallbackOutcome::Failed(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.message(), "Authentication failed. Please try again.");
}

#[tokio::test]
async fn code_exchange_times_out() {
    let mgr = session();
    let mut exchanger = StubExchanger::ok(ExchangeResponse::default());
    exchanger.delay = Some(Duration::from_secs(30));
    let handler = CallbackHandler::new(params("code=slow"), CallbackProtocol::CodeExchange)
        .with_timeout(Duration::from_millis(50));

    let outcome = handler.handle(&mgr, &exchanger).await;
    assert_eq!(outcome, CallbackOutcome::Failed(CallbackFailure::Timeout));
    assert!(!mgr.snapshot().has_user());
}

#[tokio::test]
async fn code_exchange_ignores_direct_token_params() {
    let mgr = session();
    let handler = CallbackHandler::new(params(&format!("token=tok1&user={USER_BLOB}")), CallbackProtocol::CodeExchange);
    assert_eq!(handler.handle(&mgr, &unused_exchanger()).await, CallbackOutcome::NothingToProcess);
    assert!(!mgr.is_authenticated());
}

// =============================================================================
// run_callback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn run_callback_notifies_then_redirects_to_landing() {
    let mgr = session();
    let handler = CallbackHandler::new(params(&format!("token=tok1&user={USER_BLOB}")), CallbackProtocol::DirectToken);
    let notifier = RecordingNotifier::default();
    let navigator = RecordingNavigator::default();

    let started = tokio::time::Instant::now();
    let outcome = run_callback(&handler, &mgr, &unused_exchanger(), &notifier, &navigator).await;
    assert!(started.elapsed() >= SUCCESS_REDIRECT_DELAY);
    assert!(matches!(outcome, CallbackOutcome::Success { .. }));
    assert_eq!(notifier.notices(), vec![Notice::Success("Welcome, X!".into())]);
    assert_eq!(navigator.targets(), vec![LANDING_ROUTE.to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn run_callback_repeat_does_nothing() {
    let mgr = session();
    let handler = CallbackHandler::new(params("error=access_denied"), CallbackProtocol::DirectToken);
    let notifier = RecordingNotifier::default();
    let navigator = RecordingNavigator::default();
    let exchanger = unused_exchanger();

    let started = tokio::time::Instant::now();
    run_callback(&handler, &mgr, &exchanger, &notifier, &navigator).await;
    assert!(started.elapsed() >= ERROR_REDIRECT_DELAY);

    let repeat_started = tokio::time::Instant::now();
    let second = run_callback(&handler, &mgr, &exchanger, &notifier, &navigator).await;
    assert_eq!(repeat_started.elapsed(), Duration::ZERO);
    assert_eq!(second, CallbackOutcome::AlreadyHandled);
    assert_eq!(notifier.notices().len(), 1);
    assert_eq!(navigator.targets(), vec![ENTRY_ROUTE.to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn run_callback_nothing_to_process_redirects_immediately() {
    let mgr = session();
    let handler = CallbackHandler::new(CallbackParams::default(), CallbackProtocol::DirectToken);
    let notifier = RecordingNotifier::default();
    let navigator = RecordingNavigator::default();

    let started = tokio::time::Instant::now();
    let outcome = run_callback(&handler, &mgr, &unused_exchanger(), &notifier, &navigator).await;
    assert_eq!(outcome, CallbackOutcome::NothingToProcess);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(notifier.notices().is_empty());
    assert_eq!(navigator.targets(), vec![ENTRY_ROUTE.to_owned()]);
}

#[test]
fn handler_starts_loading() {
    let handler = CallbackHandler::new(CallbackParams::default(), CallbackProtocol::DirectToken);
    assert_eq!(handler.initial_status(), CallbackStatus::Loading);
}
