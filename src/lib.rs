#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod output;
pub mod reminder;
pub mod store;
pub mod task;
