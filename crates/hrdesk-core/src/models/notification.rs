use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender or recipient reference embedded in a notification. `id` is null
/// when the user has since been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationParty {
    pub id: Option<i64>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notification {
    pub id: i64,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub sender_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub related_id: Option<i64>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub sender: Option<NotificationParty>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub timestamp: Option<DateTime<Utc>>,
}
