pub mod filter;
pub mod project;
pub mod sorting;
pub mod task;

pub use filter::TaskFilter;
pub use project::{NewProject, Project, ProjectId, ProjectUpdate};
pub use sorting::{sort_projects, sort_tasks, SortField};
pub use task::{NewTask, Task, TaskId, TaskStatus};
