//! REST client for the storefront backend.
//!
//! ARCHITECTURE
//! ============
//! `ApiClient` owns one pooled `reqwest::Client` with request and connect
//! timeouts. The two calls the session layer depends on are also exposed as
//! traits (`CodeExchanger`, `TokenValidator`) so session logic can be driven
//! without a network.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become `ApiError::Status`, carrying the backend's
//! `detail` (or `error`) message when the body has one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::{Config, HttpTimeouts};
use crate::types::{AdminOrderPage, Booster, Character, CharacterClass, NewOrder, Order, OrderPatch, OrderStatus, ServiceInfo, User};

pub const LOGIN_PATH: &str = "/api/auth/discord/login";
pub const EXCHANGE_PATH: &str = "/api/auth/discord/callback";
pub const ME_PATH: &str = "/api/auth/me";

pub const MAX_ADMIN_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_ADMIN_PAGE_LIMIT: u32 = 50;

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned HTTP {status}")]
    Status { status: u16, detail: Option<String> },
    #[error("response parse failed: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Message supplied by the backend, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// True for 401/403, i.e. the bearer token is not (or no longer) accepted.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Payload of the code-exchange endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Swaps a one-time OAuth code for a session.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ExchangeResponse, ApiError>;
}

/// Resolves a bearer token to the user the backend currently has on file.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<User, ApiError>;
}

/// Filter and paging for the admin order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub limit: u32,
}

impl Default for AdminOrderQuery {
    fn default() -> Self {
        Self { status: None, page: 1, limit: DEFAULT_ADMIN_PAGE_LIMIT }
    }
}

impl AdminOrderQuery {
    fn validate(self) -> Result<Self, ApiError> {
        if self.page == 0 {
            return Err(ApiError::InvalidRequest("page must be at least 1".into()));
        }
        if self.limit == 0 || self.limit > MAX_ADMIN_PAGE_LIMIT {
            return Err(ApiError::InvalidRequest(format!("limit must be between 1 and {MAX_ADMIN_PAGE_LIMIT}")));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.backend_url, config.timeouts)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser target that starts the Discord OAuth flow.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.url(LOGIN_PATH)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: reqwest::Method, path: &str, token: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(token)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), detail: extract_detail(&body) });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    /// `GET /api/auth/me`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn me(&self, token: &str) -> Result<User, ApiError> {
        Self::send(self.authed(reqwest::Method::GET, ME_PATH, token)).await
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// `GET /api/orders`: the caller's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn my_orders(&self, token: &str) -> Result<Vec<Order>, ApiError> {
        Self::send(self.authed(reqwest::Method::GET, "/api/orders", token)).await
    }

    /// `GET /api/orders/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn order(&self, token: &str, order_id: &str) -> Result<Order, ApiError> {
        let path = format!("/api/orders/{order_id}");
        Self::send(self.authed(reqwest::Method::GET, &path, token)).await
    }

    /// `POST /api/orders`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn create_order(&self, token: &str, order: &NewOrder) -> Result<Order, ApiError> {
        Self::send(self.authed(reqwest::Method::POST, "/api/orders", token).json(order)).await
    }

    /// `PATCH /api/orders/{id}` (booster or admin).
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty patch, otherwise an error on
    /// transport failure, non-2xx status, or bad JSON.
    pub async fn update_order(&self, token: &str, order_id: &str, patch: &OrderPatch) -> Result<Order, ApiError> {
        if patch.is_empty() {
            return Err(ApiError::InvalidRequest("order patch has no fields set".into()));
        }
        if patch.progress.is_some_and(|p| p > 100) {
            return Err(ApiError::InvalidRequest("progress must be between 0 and 100".into()));
        }
        let path = format!("/api/orders/{order_id}");
        Self::send(self.authed(reqwest::Method::PATCH, &path, token).json(patch)).await
    }

    // -------------------------------------------------------------------------
    // Admin
    // -------------------------------------------------------------------------

    /// `GET /api/admin/orders?status=&page=&limit=`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for out-of-range paging, otherwise an error on
    /// transport failure, non-2xx status, or bad JSON.
    pub async fn admin_orders(&self, token: &str, query: AdminOrderQuery) -> Result<AdminOrderPage, ApiError> {
        let query = query.validate()?;
        let mut params = vec![("page", query.page.to_string()), ("limit", query.limit.to_string())];
        if let Some(status) = query.status {
            params.push(("status", status.as_str().to_owned()));
        }
        Self::send(self.authed(reqwest::Method::GET, "/api/admin/orders", token).query(&params)).await
    }

    /// `GET /api/admin/boosters`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn admin_boosters(&self, token: &str) -> Result<Vec<Booster>, ApiError> {
        Self::send(self.authed(reqwest::Method::GET, "/api/admin/boosters", token)).await
    }

    // -------------------------------------------------------------------------
    // Catalogue (public)
    // -------------------------------------------------------------------------

    /// `GET /api/services`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn services(&self) -> Result<Vec<ServiceInfo>, ApiError> {
        Self::send(self.http.get(self.url("/api/services"))).await
    }

    /// `GET /api/characters/{class}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn characters(&self, class: CharacterClass) -> Result<Vec<Character>, ApiError> {
        let path = format!("/api/characters/{}", class.as_str());
        Self::send(self.http.get(self.url(&path))).await
    }
}

#[async_trait]
impl CodeExchanger for ApiClient {
    async fn exchange_code(&self, code: &str) -> Result<ExchangeResponse, ApiError> {
        let request = self.http.get(self.url(EXCHANGE_PATH)).query(&[("code", code)]);
        Self::send(request).await
    }
}

#[async_trait]
impl TokenValidator for ApiClient {
    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        self.me(token).await
    }
}

/// Pull a human-readable message out of an error body.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .map(str::to_owned)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
