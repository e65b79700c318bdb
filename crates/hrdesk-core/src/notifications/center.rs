use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::SessionManager;
use crate::models::{MessageResponse, Notification};

const NOTIFICATIONS_PATH: &str = "/notifications";
const READ_ALL_PATH: &str = "/notifications/read-all";

/// Capacity of the live event channel. Slow subscribers skip older events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct NotificationCenter {
    session: SessionManager,
    items: Mutex<Vec<Notification>>,
    events: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new(session: SessionManager) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session,
            items: Mutex::new(Vec::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest first
    pub fn items(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.is_read).count()
    }

    /// Live notifications pushed by the real-time transport. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Record a notification delivered over the real-time channel.
    pub fn push(&self, notification: Notification) {
        {
            let mut items = self.lock();
            if items.iter().any(|n| n.id == notification.id) {
                debug!(id = notification.id, "Ignoring duplicate notification");
                return;
            }
            items.insert(0, notification.clone());
        }
        // No subscribers is fine
        let _ = self.events.send(notification);
    }

    /// Forget local state, e.g. after the session ends
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Reload the feed. Returns false (keeping the current list) on failure.
    pub async fn refresh(&self) -> bool {
        match self.session.get_json::<Vec<Notification>>(NOTIFICATIONS_PATH).await {
            Ok(list) => {
                debug!(count = list.len(), "Notifications loaded");
                *self.lock() = list;
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch notifications");
                false
            }
        }
    }

    pub async fn mark_read(&self, id: i64) -> bool {
        let path = format!("{}/{}/read", NOTIFICATIONS_PATH, id);
        match self.session.put_empty::<Notification>(&path).await {
            Ok(updated) => {
                let mut items = self.lock();
                if let Some(item) = items.iter_mut().find(|n| n.id == id) {
                    *item = updated;
                }
                true
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to mark notification as read");
                false
            }
        }
    }

    pub async fn mark_all_read(&self) -> bool {
        match self.session.put_empty::<MessageResponse>(READ_ALL_PATH).await {
            Ok(_) => {
                for item in self.lock().iter_mut() {
                    item.is_read = true;
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to mark notifications as read");
                false
            }
        }
    }

    pub async fn clear(&self) -> bool {
        match self.session.delete(NOTIFICATIONS_PATH).await {
            Ok(()) => {
                self.lock().clear();
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear notifications");
                false
            }
        }
    }
}
