use crate::{
    clock::Clock,
    domain::{NewProject, Project, ProjectId, ProjectUpdate},
    error::Result,
    storage::Storage,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Owns project records. Knows nothing about tasks.
pub struct ProjectStore<S: ?Sized, C> {
    storage: Arc<S>,
    clock: Arc<C>,
}

impl<S: ?Sized, C> Clone for ProjectStore<S, C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> ProjectStore<S, C>
where
    S: Storage + ?Sized,
    C: Clock + Send + Sync,
{
    pub fn new(storage: Arc<S>, clock: Arc<C>) -> Self {
        Self { storage, clock }
    }

    /// Creates a project after checking the name and description bounds
    #[instrument(skip(self, name, description))]
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Project> {
        let draft = NewProject::new(name.into(), description.into(), self.clock.utc())?;
        let project = self.storage.insert_project(draft).await?;
        info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub async fn get(&self, id: ProjectId) -> Result<Project> {
        self.storage.load_project(id).await
    }

    /// All projects in creation order
    pub async fn list(&self) -> Result<Vec<Project>> {
        let projects = self.storage.list_projects().await?;
        debug!(count = projects.len(), "listed projects");
        Ok(projects)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project> {
        update.validate()?;
        let project = self.storage.update_project(id, update).await?;
        info!(project_id = %id, "project updated");
        Ok(project)
    }

    /// Deletes only the project record. Its tasks stay behind; use
    /// `TaskLifecycleManager::delete_project` to cascade.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProjectId) -> Result<()> {
        self.storage.delete_project(id).await?;
        info!(project_id = %id, "project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, error::TodoError, storage::MemoryStorage};
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> (ProjectStore<MemoryStorage, FixedClock>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
        ));
        (
            ProjectStore::new(Arc::new(MemoryStorage::new()), Arc::clone(&clock)),
            clock,
        )
    }

    #[tokio::test]
    async fn test_create_stamps_created_at() {
        let (store, clock) = store();
        let project = store.create("Garden", "Spring planting").await.unwrap();

        assert_eq!(project.created_at, clock.utc());
        assert_eq!(store.get(project.id).await.unwrap(), project);
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_bounds_fields() {
        let (store, _) = store();

        let err = store.create("x".repeat(31), "desc").await.unwrap_err();
        assert!(matches!(err, TodoError::Validation { field: "name", .. }));

        let err = store.create("name", "").await.unwrap_err();
        assert!(matches!(
            err,
            TodoError::Validation {
                field: "description",
                ..
            }
        ));

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let (store, clock) = store();
        let first = store.create("First", "1").await.unwrap();
        clock.advance(Duration::minutes(1));
        let second = store.create("Second", "2").await.unwrap();

        let listed: Vec<_> = store.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_update_validates_and_keeps_created_at() {
        let (store, clock) = store();
        let project = store.create("Old", "Old desc").await.unwrap();
        clock.advance(Duration::days(1));

        let updated = store
            .update(project.id, ProjectUpdate::default().description("New desc"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Old");
        assert_eq!(updated.description, "New desc");
        assert_eq!(updated.created_at, project.created_at);

        let err = store
            .update(project.id, ProjectUpdate::default().name(""))
            .await
            .unwrap_err();
        assert!(matches!(err, TodoError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_get_and_delete_missing_project() {
        let (store, _) = store();
        let missing = ProjectId::new(404);

        assert!(matches!(
            store.get(missing).await,
            Err(TodoError::ProjectNotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(TodoError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_project() {
        let (store, _) = store();
        let project = store.create("Temp", "Short lived").await.unwrap();

        store.delete(project.id).await.unwrap();
        assert!(store.get(project.id).await.unwrap_err().is_not_found());
    }
}
