use crate::{
    domain::{NewProject, NewTask, Project, ProjectId, ProjectUpdate, Task, TaskFilter, TaskId},
    error::Result,
};
use async_trait::async_trait;

#[cfg(feature = "file-storage")]
pub mod file_storage;
pub mod memory_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

#[cfg(feature = "file-storage")]
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// Read-modify-write step applied to a single task inside the adapter's
/// atomic section. Returning an error aborts the update and leaves the
/// stored task unchanged.
pub type TaskMutation = Box<dyn FnOnce(&mut Task) -> Result<()> + Send>;

/// Storage trait for persisting projects and tasks
///
/// Missing rows surface as `ProjectNotFound`/`TaskNotFound`; queries that
/// match nothing return an empty `Vec`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Checks if the backend has been initialized
    async fn is_initialized(&self) -> bool;

    /// Persists a new project, assigning the next project ID
    async fn insert_project(&self, project: NewProject) -> Result<Project>;

    /// Loads a project by ID
    async fn load_project(&self, id: ProjectId) -> Result<Project>;

    /// Lists all projects by creation order
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Applies a validated update to a project
    async fn update_project(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project>;

    /// Deletes a project. Tasks referencing it are left in place.
    async fn delete_project(&self, id: ProjectId) -> Result<()>;

    /// Persists a new task, assigning the next task ID
    async fn insert_task(&self, task: NewTask) -> Result<Task>;

    /// Loads a task by ID
    async fn load_task(&self, id: TaskId) -> Result<Task>;

    /// Returns the tasks matching `filter` in the filter's order
    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Atomically loads, mutates, and persists one task
    async fn update_task(&self, id: TaskId, mutation: TaskMutation) -> Result<Task>;

    /// Deletes a task
    async fn delete_task(&self, id: TaskId) -> Result<()>;

    /// Deletes every task of a project, returning how many were removed
    async fn delete_tasks_by_project(&self, project_id: ProjectId) -> Result<usize>;
}
