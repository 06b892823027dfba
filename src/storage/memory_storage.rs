use crate::{
    domain::{
        sort_projects, NewProject, NewTask, Project, ProjectId, ProjectUpdate, Task, TaskFilter,
        TaskId,
    },
    error::{Result, TodoError},
    storage::{Storage, TaskMutation},
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Thread-safe in-memory storage, used in tests and for ephemeral runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: BTreeMap<ProjectId, Project>,
    tasks: BTreeMap<TaskId, Task>,
    last_project_number: u64,
    last_task_number: u64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|err| TodoError::StorageError(err.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|err| TodoError::StorageError(err.to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        true
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let mut state = self.write()?;
        state.last_project_number += 1;
        let project = project.into_project(ProjectId::new(state.last_project_number));
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project> {
        self.read()?
            .projects
            .get(&id)
            .cloned()
            .ok_or(TodoError::ProjectNotFound(id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self.read()?.projects.values().cloned().collect();
        sort_projects(&mut projects);
        Ok(projects)
    }

    async fn update_project(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project> {
        let mut state = self.write()?;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or(TodoError::ProjectNotFound(id))?;
        update.apply(project);
        Ok(project.clone())
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        self.write()?
            .projects
            .remove(&id)
            .map(|_| ())
            .ok_or(TodoError::ProjectNotFound(id))
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task> {
        let mut state = self.write()?;
        state.last_task_number += 1;
        let task = task.into_task(TaskId::new(state.last_task_number));
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn load_task(&self, id: TaskId) -> Result<Task> {
        self.read()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TodoError::TaskNotFound(id))
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let state = self.read()?;
        Ok(filter.apply(state.tasks.values().cloned()))
    }

    async fn update_task(&self, id: TaskId, mutation: TaskMutation) -> Result<Task> {
        let mut state = self.write()?;
        let stored = state.tasks.get_mut(&id).ok_or(TodoError::TaskNotFound(id))?;

        // Mutate a copy so a failing mutation leaves the stored task intact
        let mut updated = stored.clone();
        mutation(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        self.write()?
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(TodoError::TaskNotFound(id))
    }

    async fn delete_tasks_by_project(&self, project_id: ProjectId) -> Result<usize> {
        let mut state = self.write()?;
        let before = state.tasks.len();
        state.tasks.retain(|_, task| task.project_id != project_id);
        Ok(before - state.tasks.len())
    }
}
