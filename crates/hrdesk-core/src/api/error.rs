use serde::Deserialize;
use thiserror::Error;

/// Message shown when the backend gives no usable `{error}` payload.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

/// Message shown when the backend could not be reached at all.
const NETWORK_ERROR_MESSAGE: &str = "Unable to connect to server. Check your internet connection.";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Error payload returned by the backend. Auth routes use `error`; the JWT
/// layer answers expired or revoked tokens with `msg`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    msg: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error
            .or(self.msg)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable message out of an error body, if there is one.
    pub fn extract_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        let text = message
            .clone()
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
        match status.as_u16() {
            401 => ApiError::Unauthorized(text),
            403 => ApiError::AccessDenied(text),
            404 => ApiError::NotFound(text),
            400 | 409 | 422 => ApiError::Validation(text),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(text),
            _ => ApiError::InvalidResponse(match message {
                Some(m) => format!("Status {}: {}", status, m),
                None => format!("Status {}: {}", status, Self::truncate_body(body)),
            }),
        }
    }

    /// True for 401-class failures, the only errors that drive a token refresh.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Message suitable for showing to the user inline.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::Validation(m)
            | ApiError::ServerError(m) => m.clone(),
            ApiError::RateLimited => self.to_string(),
            ApiError::NetworkError(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) => {
                GENERIC_ERROR_MESSAGE.to_string()
            }
        }
    }
}
