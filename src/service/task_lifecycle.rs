use crate::{
    clock::Clock,
    domain::{NewTask, ProjectId, Task, TaskFilter, TaskId, TaskStatus},
    error::Result,
    service::project_store::ProjectStore,
    storage::Storage,
};
use chrono::{DateTime, Utc};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, info, instrument};

/// Owns task records and enforces the status and deadline rules.
///
/// Status changes go through `Storage::update_task`, so the `closed_at`
/// bookkeeping is decided against the stored row, never a stale copy.
pub struct TaskLifecycleManager<S: ?Sized, C> {
    storage: Arc<S>,
    projects: ProjectStore<S, C>,
    clock: Arc<C>,
}

impl<S: ?Sized, C> Clone for TaskLifecycleManager<S, C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            projects: self.projects.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> TaskLifecycleManager<S, C>
where
    S: Storage + ?Sized,
    C: Clock + Send + Sync,
{
    pub fn new(storage: Arc<S>, clock: Arc<C>) -> Self {
        let projects = ProjectStore::new(Arc::clone(&storage), Arc::clone(&clock));
        Self {
            storage,
            projects,
            clock,
        }
    }

    /// The project store used to validate parents
    pub fn projects(&self) -> &ProjectStore<S, C> {
        &self.projects
    }

    /// Creates a task in `open` state under an existing project.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank title or description, `ProjectNotFound` when
    /// the project does not exist. Nothing is persisted on failure.
    #[instrument(skip(self, title, description))]
    pub async fn create(
        &self,
        project_id: ProjectId,
        title: impl Into<String>,
        description: impl Into<String>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let draft = NewTask::new(
            project_id,
            title.into(),
            description.into(),
            deadline,
            self.clock.utc(),
        )?;

        // Only existence matters; the project may still be deleted later.
        self.projects.get(project_id).await?;

        let task = self.storage.insert_task(draft).await?;
        info!(task_id = %task.id, project_id = %project_id, "task created");
        Ok(task)
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.storage.load_task(id).await
    }

    /// All tasks by creation time
    pub async fn list_all(&self) -> Result<Vec<Task>> {
        self.query(TaskFilter::All).await
    }

    /// Tasks of one project by creation time. An unknown project yields an
    /// empty list.
    pub async fn list_by_project(&self, project_id: ProjectId) -> Result<Vec<Task>> {
        self.query(TaskFilter::ByProject(project_id)).await
    }

    pub async fn count_by_project(&self, project_id: ProjectId) -> Result<usize> {
        Ok(self.list_by_project(project_id).await?.len())
    }

    /// Changes a task's status from its persisted name.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` when `new_status` is not `open`, `in_progress` or
    /// `done` (checked before storage is touched), `TaskNotFound` when the
    /// task does not exist.
    pub async fn update_status(&self, id: TaskId, new_status: &str) -> Result<Task> {
        let status = TaskStatus::from_str(new_status)?;
        self.set_status(id, status).await
    }

    /// Changes a task's status. Entering `done` stamps `closed_at`; setting
    /// the current status again is a no-op that still succeeds.
    #[instrument(skip(self))]
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task> {
        let now = self.clock.utc();
        let task = self
            .storage
            .update_task(
                id,
                Box::new(move |task| {
                    task.apply_status(status, now);
                    Ok(())
                }),
            )
            .await?;
        info!(task_id = %id, status = %task.status, "task status updated");
        Ok(task)
    }

    /// Tasks whose deadline has passed and that are not done, most overdue
    /// first (deadline ascending, then ID).
    pub async fn list_overdue(&self) -> Result<Vec<Task>> {
        self.query(TaskFilter::OverdueAt(self.clock.utc())).await
    }

    /// Forces a task to `done` and stamps `closed_at` with the current time.
    ///
    /// Unlike `set_status`, this re-stamps `closed_at` even when the task is
    /// already done. Meant for callers sweeping the result of
    /// [`list_overdue`](Self::list_overdue).
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn close_overdue(&self, task: &Task) -> Result<Task> {
        let now = self.clock.utc();
        let closed = self
            .storage
            .update_task(
                task.id,
                Box::new(move |task| {
                    task.force_close(now);
                    Ok(())
                }),
            )
            .await?;
        info!(task_id = %closed.id, closed_at = %now, "overdue task closed");
        Ok(closed)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: TaskId) -> Result<()> {
        self.storage.delete_task(id).await?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Deletes a project together with its tasks, returning how many tasks
    /// were removed.
    #[instrument(skip(self))]
    pub async fn delete_project(&self, project_id: ProjectId) -> Result<usize> {
        self.projects.get(project_id).await?;
        let removed = self.storage.delete_tasks_by_project(project_id).await?;
        self.projects.delete(project_id).await?;
        info!(project_id = %project_id, removed, "project deleted with its tasks");
        Ok(removed)
    }

    async fn query(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.storage.query_tasks(filter).await?;
        debug!(?filter, count = tasks.len(), "queried tasks");
        Ok(tasks)
    }
}
