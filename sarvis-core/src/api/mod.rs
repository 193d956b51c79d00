//! Backend REST API client
//!
//! All endpoints live under `/api` on the backend and speak JSON. Requests
//! carry `Authorization: Bearer <access>` read from storage at send time. A
//! 401 triggers one token refresh and one retry of the original request; if
//! the refresh itself fails the stored session is wiped and the caller gets
//! `ApiError::SessionExpired`.

mod auth;
mod control;
mod preset;
pub mod types;

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::BackendConfig;
use crate::models::Tokens;
use crate::storage::{StorageError, UserStorage};

pub use types::*;

const REFRESH_PATH: &str = "/api/auth/refresh/";
const LOGIN_PREFIX: &str = "/api/login/";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Request description, kept so it can be replayed after a token refresh
struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    query: Vec<(&'static str, String)>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|_| ApiError::InvalidRequest("request body is not serializable"))?;
        self.body = Some(value);
        Ok(self)
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn is_auth_request(&self) -> bool {
        self.path.starts_with(LOGIN_PREFIX) || self.path == REFRESH_PATH
    }
}

/// Backend client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    storage: UserStorage,
    config: BackendConfig,
}

impl ApiClient {
    pub fn new(config: &BackendConfig, storage: UserStorage) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            storage,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &UserStorage {
        &self.storage
    }

    /// Exchange the stored refresh token for a new pair
    pub async fn refresh_tokens(&self) -> Result<Tokens, ApiError> {
        let refresh = self.storage.refresh_token().ok_or(ApiError::SessionExpired)?;

        #[derive(Serialize)]
        struct RefreshRequest<'a> {
            refresh: &'a str,
        }

        let req = ApiRequest::new(Method::POST, REFRESH_PATH).json(&RefreshRequest { refresh: &refresh })?;
        let resp = self.dispatch(&req).await?;
        let body: RefreshResponse = Self::decode(resp, &req.path).await?;

        let tokens = Tokens {
            access: body.access,
            refresh: body.refresh.unwrap_or(refresh),
        };
        self.storage.save_tokens(&tokens)?;
        Ok(tokens)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::new(Method::GET, path)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.execute(ApiRequest::new(Method::POST, path).json(body)?).await
    }

    async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.execute(ApiRequest::new(Method::PATCH, path).json(body)?).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::new(Method::DELETE, path)).await
    }

    async fn execute<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let resp = self.dispatch(&req).await?;

        if resp.status() == StatusCode::UNAUTHORIZED && !req.is_auth_request() {
            info!(path = %req.path, "access token rejected, refreshing");
            if let Err(e) = self.refresh_tokens().await {
                error!(error = %e, "token refresh failed, clearing session");
                self.storage.clear_auth()?;
                return Err(ApiError::SessionExpired);
            }
            let retry = self.dispatch(&req).await?;
            return Self::decode(retry, &req.path).await;
        }

        Self::decode(resp, &req.path).await
    }

    async fn dispatch(&self, req: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, req.path);
        debug!(method = %req.method, url = %url, "api request");

        let mut builder = self.client.request(req.method.clone(), &url);

        if req.path != REFRESH_PATH {
            if let Some(token) = self.storage.access_token() {
                builder = builder.bearer_auth(token);
            }
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.inspect_err(|e| {
            error!(url = %url, error = %e, "api request failed");
        })?;
        debug!(status = resp.status().as_u16(), url = %url, "api response");
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response, path: &str) -> Result<T, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let text = resp.text().await.unwrap_or_default();
        let message = error_message(&text).unwrap_or_else(|| format!("HTTP {} on {}", status.as_u16(), path));
        warn!(status = status.as_u16(), path, message = %message, "api error response");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(String::from))
}
