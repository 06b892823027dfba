use crate::domain::{project::Project, task::Task};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Orderings the storage layer guarantees for task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Creation time ascending, ID breaking ties
    Created,
    /// Deadline ascending (tasks without one last), ID breaking ties
    Deadline,
}

/// Sorts tasks in-place so every adapter returns the same sequence for the
/// same data snapshot.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use todolist_core::domain::sorting::{sort_tasks, SortField};
/// use todolist_core::domain::{NewTask, ProjectId, TaskId};
///
/// let now = Utc::now();
/// let make = |id| {
///     NewTask::new(ProjectId::new(1), "t".into(), "d".into(), None, now)
///         .unwrap()
///         .into_task(TaskId::new(id))
/// };
/// let mut tasks = vec![make(3), make(1), make(2)];
///
/// sort_tasks(&mut tasks, SortField::Created);
/// assert_eq!(tasks[0].id, TaskId::new(1));
/// ```
pub fn sort_tasks(tasks: &mut [Task], field: SortField) {
    tasks.sort_by(|a, b| {
        let cmp = match field {
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Deadline => compare_option_dates(a.deadline, b.deadline),
        };
        cmp.then_with(|| a.id.cmp(&b.id))
    });
}

/// Sorts projects by creation time, ID breaking ties
pub fn sort_projects(projects: &mut [Project]) {
    projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Compare Option<DateTime> with None always sorting to end
fn compare_option_dates(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a_date), Some(b_date)) => a_date.cmp(&b_date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
