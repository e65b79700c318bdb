//! API client for communicating with the HR dashboard REST API.
//!
//! `ApiClient` knows how to build and send requests and how to turn
//! non-2xx responses into `ApiError`s. It holds no credentials: the caller
//! passes the bearer token per request, which lets the session manager
//! re-issue a request with a refreshed token.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{LoginRequest, LoginResponse, ProfileResponse, RefreshResponse, User};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/token/refresh";
pub const PROFILE_PATH: &str = "/auth/profile";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
pub const REGISTER_PATH: &str = "/auth/register";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A request that can be sent more than once. The body is kept as a JSON
/// value so a rejected request can be re-issued with a fresh token.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post<B>(path: impl Into<String>, body: &B) -> Result<Self, ApiError>
    where
        B: Serialize + ?Sized,
    {
        Self::new(Method::POST, path).with_json(body)
    }

    pub fn put<B>(path: impl Into<String>, body: &B) -> Result<Self, ApiError>
    where
        B: Serialize + ?Sized,
    {
        Self::new(Method::PUT, path).with_json(body)
    }

    fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Login attempts and the refresh call itself must never trigger a refresh.
    pub fn allows_refresh(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        path != LOGIN_PATH && path != REFRESH_PATH
    }
}

/// API client for the HR dashboard backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn auth_headers(token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(
                |_| ApiError::InvalidRequest("Token is not a valid header value".to_string()),
            )?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Read a successful response body as JSON.
    pub async fn parse_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let url = response.url().path().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    /// Send a request, attaching `Authorization: Bearer <token>` when a token is given.
    pub async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(&request.path);
        debug!(
            method = %request.method,
            url = %url,
            authenticated = token.is_some(),
            "Sending request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(Self::auth_headers(token)?);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        Self::check_response(response).await
    }

    // ===== Auth Endpoints =====

    /// Exchange credentials for a token pair. Never carries a bearer token.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH, credentials)?;
        let response = self.send(&request, None).await?;
        let login: LoginResponse = Self::parse_json(response).await?;
        if login.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Login response has an empty access token".to_string(),
            ));
        }
        Ok(login)
    }

    /// Tell the backend to revoke the access token. Body is ignored.
    pub async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let request = ApiRequest::new(Method::POST, LOGOUT_PATH);
        self.send(&request, Some(access_token)).await?;
        Ok(())
    }

    /// Mint a new access token. Authenticated with the refresh token, empty body.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let request = ApiRequest::new(Method::POST, REFRESH_PATH);
        let response = self.send(&request, Some(refresh_token)).await?;
        let refreshed: RefreshResponse = Self::parse_json(response).await?;
        if refreshed.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Refresh response has an empty access token".to_string(),
            ));
        }
        Ok(refreshed)
    }

    /// Fetch the profile of the user owning `access_token`.
    pub async fn profile(&self, access_token: &str) -> Result<User, ApiError> {
        let request = ApiRequest::get(PROFILE_PATH);
        let response = self.send(&request, Some(access_token)).await?;
        let profile: ProfileResponse = Self::parse_json(response).await?;
        Ok(profile.user)
    }
}
