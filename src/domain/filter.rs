use crate::domain::{
    project::ProjectId,
    sorting::{sort_tasks, SortField},
    task::Task,
};
use chrono::{DateTime, Utc};

/// Filtered task queries understood by every storage adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    /// Every task, by creation order
    All,
    /// Tasks of one project, by creation order
    ByProject(ProjectId),
    /// Tasks overdue at the given instant, by deadline
    OverdueAt(DateTime<Utc>),
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::ByProject(project_id) => task.project_id == *project_id,
            Self::OverdueAt(now) => task.is_overdue_at(*now),
        }
    }

    pub fn sort_field(&self) -> SortField {
        match self {
            Self::All | Self::ByProject(_) => SortField::Created,
            Self::OverdueAt(_) => SortField::Deadline,
        }
    }

    /// Filters and orders an unordered set of tasks
    pub fn apply(&self, tasks: impl IntoIterator<Item = Task>) -> Vec<Task> {
        let mut matching: Vec<Task> = tasks.into_iter().filter(|t| self.matches(t)).collect();
        sort_tasks(&mut matching, self.sort_field());
        matching
    }
}
