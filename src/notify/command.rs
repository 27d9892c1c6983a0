#![forbid(unsafe_code)]

use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Result, TaskflowError};
use crate::notify::{Notification, NotificationGateway, Permission};

/// Shows notifications by running a `notify-send` compatible program.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    pub command: String,
    pub app_name: String,
}

impl CommandGateway {
    #[must_use]
    pub fn new(command: String) -> Self {
        Self {
            command,
            app_name: "TaskFlow".to_owned(),
        }
    }

    fn args(&self, n: &Notification) -> Vec<String> {
        vec![
            "--app-name".to_owned(),
            self.app_name.clone(),
            "--urgency".to_owned(),
            "critical".to_owned(),
            "--hint".to_owned(),
            format!("string:x-canonical-private-synchronous:{}", n.tag),
            n.title.clone(),
            n.body.clone(),
        ]
    }
}

impl NotificationGateway for CommandGateway {
    fn request_permission(&self) -> Permission {
        if self.command.trim().is_empty() {
            return Permission::Unsupported;
        }
        match Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => Permission::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Permission::Unsupported,
            Err(e) => {
                debug!("notifier '{}' is not usable: {e}", self.command);
                Permission::Denied
            }
        }
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        let status = Command::new(&self.command)
            .args(self.args(notification))
            .stdout(Stdio::null())
            .status()
            .map_err(|e| {
                TaskflowError::DeliveryFailed(format!("failed to run {}: {e}", self.command))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(TaskflowError::DeliveryFailed(format!(
                "{} failed with exit code {code}",
                self.command,
                code = status.code().unwrap_or(1)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            title: "TaskFlow".to_owned(),
            body: "hello".to_owned(),
            tag: "task-1".to_owned(),
        }
    }

    #[test]
    fn missing_program_is_unsupported() {
        let gw = CommandGateway::new("taskflow-definitely-not-a-real-notifier".to_owned());
        assert_eq!(gw.request_permission(), Permission::Unsupported);
        assert!(matches!(
            gw.deliver(&sample()),
            Err(TaskflowError::DeliveryFailed(_))
        ));
    }

    #[test]
    fn blank_command_is_unsupported() {
        assert_eq!(
            CommandGateway::new("  ".to_owned()).request_permission(),
            Permission::Unsupported
        );
    }

    #[test]
    fn passes_tag_title_and_body() {
        let args = CommandGateway::new("notify-send".to_owned()).args(&sample());
        assert_eq!(args[1], "TaskFlow");
        assert_eq!(args[5], "string:x-canonical-private-synchronous:task-1");
        assert_eq!(&args[6..], ["TaskFlow", "hello"]);
    }
}
