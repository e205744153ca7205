//! Test doubles shared by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, CodeExchanger, ExchangeResponse, TokenValidator};
use crate::navigate::Navigator;
use crate::notify::{Notice, Notifier};
use crate::storage::{MemoryStorage, Storage, StorageError};
use crate::types::{Role, User};

pub fn user(username: &str, role: Role) -> User {
    User {
        id: format!("id-{username}"),
        discord_id: "1234".to_owned(),
        username: username.to_owned(),
        discriminator: String::new(),
        avatar: None,
        role,
        created_at: None,
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub targets: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        self.targets.lock().unwrap().push(target.to_owned());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Exchanger returning a canned result, optionally after a delay.
pub struct StubExchanger {
    pub response: Result<ExchangeResponse, u16>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl StubExchanger {
    pub fn ok(response: ExchangeResponse) -> Self {
        Self { response: Ok(response), delay: None, calls: Mutex::default() }
    }

    pub fn http_error(status: u16) -> Self {
        Self { response: Err(status), delay: None, calls: Mutex::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeExchanger for StubExchanger {
    async fn exchange_code(&self, code: &str) -> Result<ExchangeResponse, ApiError> {
        self.calls.lock().unwrap().push(code.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.response {
            Ok(resp) => Ok(resp.clone()),
            Err(status) => Err(ApiError::Status { status: *status, detail: None }),
        }
    }
}

/// Validator that accepts exactly one token.
pub struct StubValidator {
    pub accept: String,
    pub user: User,
}

#[async_trait]
impl TokenValidator for StubValidator {
    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        if token == self.accept {
            Ok(self.user.clone())
        } else {
            Err(ApiError::Status { status: 401, detail: Some("Invalid token".into()) })
        }
    }
}

/// Memory storage that refuses writes to one key.
#[derive(Default)]
pub struct FailingStorage {
    pub inner: MemoryStorage,
    pub fail_key: Option<&'static str>,
}

impl Storage for FailingStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_key == Some(key) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}
