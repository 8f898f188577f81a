// Argus Host Monitoring Service - In-App Channel
// Bounded most-recent-first ring of notifications consumed by the UI

use super::{ChannelType, NotificationChannel, NotifyError};
use crate::alerts::{AlertEvent, AlertState, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// One stored in-app notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InAppNotification {
    /// Collision-free record id
    pub id: String,

    pub alert_id: String,
    pub alert_name: String,
    pub severity: Severity,
    pub state: AlertState,
    pub subject: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// In-memory delivery channel backing the UI notification feed.
///
/// Newest records sit at the front; the ring never grows past `max_size`.
/// All operations share one mutex.
pub struct InAppChannel {
    max_size: usize,
    items: Mutex<VecDeque<InAppNotification>>,
}

impl InAppChannel {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// All notifications, most recent first.
    pub fn notifications(&self) -> Vec<InAppNotification> {
        self.items
            .lock()
            .expect("in-app lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Unread notifications, most recent first.
    pub fn unread(&self) -> Vec<InAppNotification> {
        self.items
            .lock()
            .expect("in-app lock poisoned")
            .iter()
            .filter(|n| !n.read)
            .cloned()
            .collect()
    }

    /// Mark one notification read. Marking twice is a no-op; returns
    /// whether the id was found.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut items = self.items.lock().expect("in-app lock poisoned");
        match items.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every notification read.
    pub fn mark_all_read(&self) {
        let mut items = self.items.lock().expect("in-app lock poisoned");
        for notification in items.iter_mut() {
            notification.read = true;
        }
    }

    /// Discard all notifications. Clearing an empty ring is a no-op.
    pub fn clear(&self) {
        self.items.lock().expect("in-app lock poisoned").clear();
    }
}

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::InApp
    }

    fn name(&self) -> &str {
        "in-app"
    }

    async fn send(
        &self,
        event: &AlertEvent,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let notification = InAppNotification {
            id: Uuid::new_v4().to_string(),
            alert_id: event.alert_id.clone(),
            alert_name: event.config.name.clone(),
            severity: event.config.severity,
            state: event.new_state,
            subject: subject.to_string(),
            message: body.to_string(),
            timestamp: event.timestamp,
            read: false,
        };

        let mut items = self.items.lock().expect("in-app lock poisoned");
        items.push_front(notification);
        items.truncate(self.max_size);
        Ok(())
    }
}
