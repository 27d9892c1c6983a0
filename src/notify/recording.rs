#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::error::{Result, TaskflowError};
use crate::notify::{Notification, NotificationGateway, Permission};

/// Keeps every delivered notification in memory.
///
/// Deliveries for tags registered with [`RecordingGateway::fail_tag`] fail
/// with `DeliveryFailed` and are not recorded.
#[derive(Debug)]
pub struct RecordingGateway {
    permission: Mutex<Permission>,
    delivered: Mutex<Vec<Notification>>,
    failing: Mutex<BTreeSet<String>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new(Permission::Granted)
    }
}

impl RecordingGateway {
    #[must_use]
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
            delivered: Mutex::new(Vec::new()),
            failing: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        *lock(&self.permission) = permission;
    }

    pub fn fail_tag(&self, tag: impl Into<String>) {
        lock(&self.failing).insert(tag.into());
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        lock(&self.delivered).clone()
    }

    #[must_use]
    pub fn with_tag(&self, tag: &str) -> Vec<Notification> {
        lock(&self.delivered)
            .iter()
            .filter(|n| n.tag == tag)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.delivered).clear();
    }
}

impl NotificationGateway for RecordingGateway {
    fn request_permission(&self) -> Permission {
        *lock(&self.permission)
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        if lock(&self.failing).contains(&notification.tag) {
            return Err(TaskflowError::DeliveryFailed(format!(
                "refused tag {}",
                notification.tag
            )));
        }
        lock(&self.delivered).push(notification.clone());
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
