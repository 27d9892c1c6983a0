#![forbid(unsafe_code)]

//! Notification delivery.
//!
//! The gateway only shows what it is given. Deciding *what* to send lives
//! in [`crate::reminder`].

pub mod command;
pub mod recording;
pub mod settings;

use std::fmt;

pub use command::CommandGateway;
pub use recording::RecordingGateway;
pub use settings::{NotificationSettings, NotificationSettingsStore, SettingsScope};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// The platform has no way to show notifications.
    Unsupported,
}

impl Permission {
    #[must_use]
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Unsupported => "unsupported",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Notifications with the same tag replace each other.
    pub tag: String,
}

pub trait NotificationGateway: Send + Sync {
    /// `Denied` and `Unsupported` are answers, not errors.
    fn request_permission(&self) -> Permission;

    /// Fails with `DeliveryFailed`.
    fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutGateway;

impl NotificationGateway for StdoutGateway {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        println!("[{}] {}", notification.title, notification.body);
        Ok(())
    }
}
