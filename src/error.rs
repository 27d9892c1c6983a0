#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskflowError {
    #[error("storage unavailable for '{key}': {msg}")]
    StorageUnavailable { key: String, msg: String },

    #[error("corrupt data under '{key}': {msg}")]
    CorruptState { key: String, msg: String },

    #[error("{0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TaskflowError {
    pub(crate) fn storage(key: &str, msg: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            key: key.to_owned(),
            msg: msg.to_string(),
        }
    }

    pub(crate) fn corrupt(key: &str, msg: impl std::fmt::Display) -> Self {
        Self::CorruptState {
            key: key.to_owned(),
            msg: msg.to_string(),
        }
    }
}

pub type Result<T, E = TaskflowError> = std::result::Result<T, E>;
