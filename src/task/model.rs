#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::clock::unix_millis;
use crate::error::{Result, TaskflowError};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Display label shown next to a task.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Baixa",
            Self::Medium => "Média",
            Self::High => "Alta",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("expected low|medium|high, got '{other}'")),
        }
    }
}

/// A persisted task record.
///
/// Field names are camelCase on disk and timestamps are RFC 3339 strings.
/// Fields this version does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    /// Millisecond timestamp plus a short random suffix.
    #[must_use]
    pub fn new_id(now: OffsetDateTime) -> String {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        format!("{}-{suffix}", unix_millis(now))
    }
}

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<OffsetDateTime>,
}

impl NewTask {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn due(mut self, at: OffsetDateTime) -> Self {
        self.due_date = Some(at);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Checks the creation-boundary rules: non-blank title, due date strictly
/// after `now`.
pub fn validate_new_task(input: &NewTask, now: OffsetDateTime) -> Result<()> {
    if input.title.trim().is_empty() {
        return Err(TaskflowError::Validation(
            "task title must not be empty".to_owned(),
        ));
    }
    if let Some(due) = input.due_date {
        validate_due_date(due, now)?;
    }
    Ok(())
}

pub fn validate_due_date(due: OffsetDateTime, now: OffsetDateTime) -> Result<()> {
    if due <= now {
        return Err(TaskflowError::Validation(format!(
            "due date {} must be in the future",
            format_timestamp(due)
        )));
    }
    Ok(())
}

/// Parses an RFC 3339 due date typed by the user.
pub fn parse_due_date(input: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(input.trim(), &Rfc3339)
        .map_err(|e| TaskflowError::Validation(format!("invalid due date '{input}': {e}")))
}

#[must_use]
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_owned())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl TaskFilter {
    #[must_use]
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

impl FromStr for TaskFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(format!("expected all|pending|completed, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Rounded share of completed tasks, 0 for an empty collection.
    pub progress_percent: u8,
}

impl TaskStats {
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let progress_percent = if total == 0 {
            0
        } else {
            // completed <= total, so the result fits in 0..=100.
            u8::try_from((completed * 200 + total) / (total * 2)).unwrap_or(100)
        };
        Self {
            total,
            completed,
            pending: total - completed,
            progress_percent,
        }
    }
}
