//! Per-user notification feed.
//!
//! This module provides the `NotificationCenter`, an in-memory list of the
//! signed-in user's notifications kept in sync with the backend. Feed
//! operations are non-critical: failures are logged and never end the
//! session.

pub mod center;

pub use center::NotificationCenter;
