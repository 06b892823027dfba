use crate::{
    domain::{
        sort_projects, NewProject, NewTask, Project, ProjectId, ProjectUpdate, Task, TaskFilter,
        TaskId,
    },
    error::{Result, TodoError},
    storage::{Storage, TaskMutation},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

/// Next-ID bookkeeping persisted alongside the records
#[derive(Debug, Default, Serialize, Deserialize)]
struct Counters {
    next_project_number: u64,
    next_task_number: u64,
}

impl Counters {
    fn next_project_id(&mut self) -> ProjectId {
        self.next_project_number += 1;
        ProjectId::new(self.next_project_number)
    }

    fn next_task_id(&mut self) -> TaskId {
        self.next_task_number += 1;
        TaskId::new(self.next_task_number)
    }
}

/// File-based storage implementation, one JSON document per record
///
/// Writers are serialized through an in-process lock, so read-modify-write
/// is atomic for every caller sharing this instance. Separate processes
/// pointed at the same directory are not coordinated.
pub struct FileStorage {
    root_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    const DATA_DIR: &'static str = ".todolist";
    const PROJECTS_DIR: &'static str = "projects";
    const TASKS_DIR: &'static str = "tasks";
    const COUNTERS_FILE: &'static str = "counters.json";

    /// Creates a new FileStorage rooted under the given data directory
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: data_root.as_ref().join(Self::DATA_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn projects_dir(&self) -> PathBuf {
        self.root_path.join(Self::PROJECTS_DIR)
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root_path.join(Self::TASKS_DIR)
    }

    fn counters_file(&self) -> PathBuf {
        self.root_path.join(Self::COUNTERS_FILE)
    }

    fn project_file(&self, id: ProjectId) -> PathBuf {
        self.projects_dir().join(format!("{}.json", id))
    }

    fn task_file(&self, id: TaskId) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", id))
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Writes through a temp file so readers never observe a partial document
    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// A missing file, including one removed by a concurrent delete, reads
    /// as `None`
    async fn read_json_if_exists<T: DeserializeOwned + Send>(
        &self,
        path: &Path,
    ) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_counters(&self) -> Result<Counters> {
        Ok(self
            .read_json_if_exists(&self.counters_file())
            .await?
            .unwrap_or_default())
    }

    /// Reads every record in `dir` whose file stem parses as an ID
    async fn read_all<I, T>(&self, dir: &Path) -> Result<Vec<T>>
    where
        I: FromStr,
        T: DeserializeOwned + Send,
    {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(dir).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if I::from_str(stem).is_ok() => {
                    match self.read_json_if_exists(&path).await? {
                        Some(record) => records.push(record),
                        None => debug!(path = %path.display(), "record removed during listing"),
                    }
                }
                _ => warn!(path = %path.display(), "skipping unrecognized file in data directory"),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;
        self.ensure_directory_exists(&self.projects_dir()).await?;
        self.ensure_directory_exists(&self.tasks_dir()).await?;

        if !self.counters_file().exists() {
            self.write_json(&self.counters_file(), &Counters::default())
                .await?;
        }

        debug!(root = %self.root_path.display(), "file storage initialized");
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.root_path.exists() && self.counters_file().exists()
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let _guard = self.write_lock.lock().await;
        self.ensure_directory_exists(&self.projects_dir()).await?;

        // The counter is persisted before the record so an ID is never
        // handed out twice; a failed record write only leaves a gap.
        let mut counters = self.load_counters().await?;
        let project = project.into_project(counters.next_project_id());
        self.write_json(&self.counters_file(), &counters).await?;

        self.write_json(&self.project_file(project.id), &project)
            .await?;
        Ok(project)
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project> {
        self.read_json_if_exists(&self.project_file(id))
            .await?
            .ok_or(TodoError::ProjectNotFound(id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .read_all::<ProjectId, Project>(&self.projects_dir())
            .await?;
        sort_projects(&mut projects);
        Ok(projects)
    }

    async fn update_project(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project> {
        let _guard = self.write_lock.lock().await;
        let mut project = self.load_project(id).await?;
        update.apply(&mut project);
        self.write_json(&self.project_file(id), &project).await?;
        Ok(project)
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let file_path = self.project_file(id);
        if !file_path.exists() {
            return Err(TodoError::ProjectNotFound(id));
        }
        fs::remove_file(file_path).await?;
        Ok(())
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        self.ensure_directory_exists(&self.tasks_dir()).await?;

        let mut counters = self.load_counters().await?;
        let task = task.into_task(counters.next_task_id());
        self.write_json(&self.counters_file(), &counters).await?;

        self.write_json(&self.task_file(task.id), &task).await?;
        Ok(task)
    }

    async fn load_task(&self, id: TaskId) -> Result<Task> {
        self.read_json_if_exists(&self.task_file(id))
            .await?
            .ok_or(TodoError::TaskNotFound(id))
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let tasks: Vec<Task> = self.read_all::<TaskId, Task>(&self.tasks_dir()).await?;
        Ok(filter.apply(tasks))
    }

    async fn update_task(&self, id: TaskId, mutation: TaskMutation) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_task(id).await?;
        mutation(&mut task)?;
        self.write_json(&self.task_file(id), &task).await?;
        Ok(task)
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let file_path = self.task_file(id);
        if !file_path.exists() {
            return Err(TodoError::TaskNotFound(id));
        }
        fs::remove_file(file_path).await?;
        Ok(())
    }

    async fn delete_tasks_by_project(&self, project_id: ProjectId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let tasks = TaskFilter::ByProject(project_id)
            .apply(self.read_all::<TaskId, Task>(&self.tasks_dir()).await?);

        for task in &tasks {
            fs::remove_file(self.task_file(task.id)).await?;
        }
        Ok(tasks.len())
    }
}
