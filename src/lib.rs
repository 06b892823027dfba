//! # ToDoList Core
//!
//! Project and task lifecycle rules for the ToDoList service.
//!
//! This crate owns the domain types, the status/deadline rules for tasks,
//! and the storage contract those rules rely on. HTTP routes, CLI menus and
//! process wiring live elsewhere and call in through
//! [`ProjectStore`] and [`TaskLifecycleManager`].

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use clock::{Clock, DefaultClock, FixedClock};
pub use config::{Config, StorageConfig};
pub use domain::{
    project::{Project, ProjectId, ProjectUpdate},
    task::{Task, TaskId, TaskStatus},
    TaskFilter,
};
pub use error::{Result, TodoError};
pub use service::{ProjectStore, TaskLifecycleManager};
pub use storage::Storage;
