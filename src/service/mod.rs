//! Caller-facing operations.
//!
//! [`ProjectStore`] owns projects; [`TaskLifecycleManager`] owns tasks and
//! consults the project store only to validate a new task's parent.

pub mod project_store;
pub mod task_lifecycle;

pub use project_store::ProjectStore;
pub use task_lifecycle::TaskLifecycleManager;
