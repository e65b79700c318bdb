//! Data models for the HR dashboard API.
//!
//! This module contains the payloads exchanged with the backend:
//!
//! - `User`, `Role`: the authenticated profile, with permission lookups
//! - Auth request/response bodies: login, refresh, profile, password flows
//! - `Notification`: entries of the per-user notification feed

pub mod auth;
pub mod notification;
pub mod user;

pub use auth::{
    ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
    LoginResponse, MessageResponse, ProfileResponse, ProfileUpdate, RefreshResponse,
    RegisterRequest, RegisterResponse, ResetPasswordRequest,
};
pub use notification::{Notification, NotificationParty};
pub use user::{Role, User};
