#![forbid(unsafe_code)]

pub mod model;
pub mod repository;
pub mod seed;

pub use model::{NewTask, Priority, Task, TaskFilter, TaskStats};
pub use repository::{LoadOutcome, SharedRepository, TaskRepository};
