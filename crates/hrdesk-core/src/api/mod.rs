//! REST API client module for the HR dashboard backend.
//!
//! This module provides the `ApiClient` for sending requests to the
//! backend and the `ApiError` taxonomy for failed responses.
//!
//! The API uses JWT bearer token authentication: short-lived access tokens
//! on every request and a refresh token for `/auth/token/refresh`.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiRequest};
pub use error::{ApiError, GENERIC_ERROR_MESSAGE};
