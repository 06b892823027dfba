use crate::{
    domain::{
        NewProject, NewTask, Project, ProjectId, ProjectUpdate, Task, TaskFilter, TaskId,
        TaskStatus,
    },
    error::{Result, TodoError},
    storage::{Storage, TaskMutation},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id  INTEGER NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('open', 'in_progress', 'done')),
    deadline    TEXT,
    created_at  TEXT NOT NULL,
    closed_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks (project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks (deadline) WHERE deadline IS NOT NULL;
";

const TASK_COLUMNS: &str =
    "id, project_id, title, description, status, deadline, created_at, closed_at";

/// SQLite-backed storage for projects and tasks
///
/// Timestamps are stored as fixed-width RFC 3339 UTC text, so lexical order
/// in SQL matches chronological order.
pub struct SqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    /// Runs `f` against the connection on the blocking pool, so a busy
    /// database never stalls the async executor
    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut conn = connection
                .lock()
                .map_err(|err| TodoError::StorageError(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| TodoError::StorageError(format!("sqlite worker failed: {}", err)))?
    }
}

fn encode_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
        })
}

fn decode_optional_time(value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(decode_time).transpose()
}

fn to_sql_id(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| TodoError::InvalidId(value.to_string()))
}

fn from_sql_id(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, value))
}

fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    let created_at: String = row.get("created_at")?;
    Ok(Project {
        id: ProjectId::new(from_sql_id(row.get("id")?)?),
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: decode_time(&created_at)?,
    })
}

fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    Ok(Task {
        id: TaskId::new(from_sql_id(row.get("id")?)?),
        project_id: ProjectId::new(from_sql_id(row.get("project_id")?)?),
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::from_str(&status).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
        })?,
        deadline: decode_optional_time(row.get("deadline")?)?,
        created_at: decode_time(&created_at)?,
        closed_at: decode_optional_time(row.get("closed_at")?)?,
    })
}

fn get_project_internal(conn: &Connection, id: ProjectId) -> Result<Project> {
    conn.query_row(
        "SELECT id, name, description, created_at FROM projects WHERE id = ?1",
        params![to_sql_id(id.value())?],
        parse_project_row,
    )
    .optional()?
    .ok_or(TodoError::ProjectNotFound(id))
}

fn get_task_internal(conn: &Connection, id: TaskId) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        params![to_sql_id(id.value())?],
        parse_task_row,
    )
    .optional()?
    .ok_or(TodoError::TaskNotFound(id))
}

fn query_tasks_internal(conn: &Connection, filter: TaskFilter) -> Result<Vec<Task>> {
    let tasks = match filter {
        TaskFilter::All => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks ORDER BY created_at, id",
                TASK_COLUMNS
            ))?;
            let rows = stmt.query_map([], parse_task_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        TaskFilter::ByProject(project_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY created_at, id",
                TASK_COLUMNS
            ))?;
            let rows = stmt.query_map(params![to_sql_id(project_id.value())?], parse_task_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        TaskFilter::OverdueAt(now) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks
                 WHERE deadline IS NOT NULL AND deadline < ?1 AND status != 'done'
                 ORDER BY deadline, id",
                TASK_COLUMNS
            ))?;
            let rows = stmt.query_map(params![encode_time(now)], parse_task_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(tasks)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        self.run_blocking(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await?;
        debug!("sqlite schema ready");
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        let count = self
            .run_blocking(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('projects', 'tasks')",
                    [],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await;

        match count {
            Ok(count) => count == 2,
            Err(err) => {
                warn!(error = %err, "could not inspect sqlite schema");
                false
            }
        }
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO projects (name, description, created_at) VALUES (?1, ?2, ?3)",
                params![
                    project.name,
                    project.description,
                    encode_time(project.created_at)
                ],
            )?;
            let id = ProjectId::new(from_sql_id(conn.last_insert_rowid())?);
            Ok(project.into_project(id))
        })
        .await
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project> {
        self.run_blocking(move |conn| get_project_internal(conn, id))
            .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at FROM projects ORDER BY created_at, id",
            )?;
            let projects = stmt
                .query_map([], parse_project_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
        .await
    }

    async fn update_project(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project> {
        self.run_blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut project = get_project_internal(&tx, id)?;
            update.apply(&mut project);
            tx.execute(
                "UPDATE projects SET name = ?1, description = ?2 WHERE id = ?3",
                params![project.name, project.description, to_sql_id(id.value())?],
            )?;
            tx.commit()?;
            Ok(project)
        })
        .await
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        self.run_blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM projects WHERE id = ?1",
                params![to_sql_id(id.value())?],
            )?;
            if deleted == 0 {
                return Err(TodoError::ProjectNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks (project_id, title, description, status, deadline, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    to_sql_id(task.project_id.value())?,
                    task.title,
                    task.description,
                    TaskStatus::Open.as_str(),
                    task.deadline.map(encode_time),
                    encode_time(task.created_at),
                ],
            )?;
            let id = TaskId::new(from_sql_id(conn.last_insert_rowid())?);
            Ok(task.into_task(id))
        })
        .await
    }

    async fn load_task(&self, id: TaskId) -> Result<Task> {
        self.run_blocking(move |conn| get_task_internal(conn, id))
            .await
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.run_blocking(move |conn| query_tasks_internal(conn, filter))
            .await
    }

    async fn update_task(&self, id: TaskId, mutation: TaskMutation) -> Result<Task> {
        self.run_blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut task = get_task_internal(&tx, id)?;
            mutation(&mut task)?;
            tx.execute(
                "UPDATE tasks
                 SET title = ?1, description = ?2, status = ?3, deadline = ?4, closed_at = ?5
                 WHERE id = ?6",
                params![
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.deadline.map(encode_time),
                    task.closed_at.map(encode_time),
                    to_sql_id(id.value())?,
                ],
            )?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        self.run_blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE id = ?1",
                params![to_sql_id(id.value())?],
            )?;
            if deleted == 0 {
                return Err(TodoError::TaskNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_tasks_by_project(&self, project_id: ProjectId) -> Result<usize> {
        self.run_blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE project_id = ?1",
                params![to_sql_id(project_id.value())?],
            )?;
            Ok(deleted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 30, 0).unwrap()
    }

    async fn storage() -> SqliteStorage {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.initialize().await.unwrap();
        storage
    }

    fn new_task(project_id: ProjectId, deadline: Option<DateTime<Utc>>) -> NewTask {
        NewTask::new(
            project_id,
            "title".to_string(),
            "desc".to_string(),
            deadline,
            at(1),
        )
        .unwrap()
    }

    #[test]
    fn test_encoded_times_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = earlier + Duration::milliseconds(500);
        assert!(encode_time(earlier) < encode_time(later));
        assert_eq!(encode_time(earlier).len(), encode_time(later).len());
        assert_eq!(decode_time(&encode_time(later)).unwrap(), later);
    }

    #[tokio::test]
    async fn test_initialization() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(!storage.is_initialized().await);
        storage.initialize().await.unwrap();
        assert!(storage.is_initialized().await);
        // Idempotent
        storage.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_project_crud() {
        let storage = storage().await;
        let project = storage
            .insert_project(NewProject::new("Home".into(), "Chores".into(), at(1)).unwrap())
            .await
            .unwrap();
        assert_eq!(project.id, ProjectId::new(1));
        assert_eq!(storage.load_project(project.id).await.unwrap(), project);

        let updated = storage
            .update_project(project.id, ProjectUpdate::default().name("House"))
            .await
            .unwrap();
        assert_eq!(updated.name, "House");
        assert_eq!(updated.created_at, at(1));

        storage.delete_project(project.id).await.unwrap();
        assert!(matches!(
            storage.load_project(project.id).await,
            Err(TodoError::ProjectNotFound(_))
        ));
        assert!(matches!(
            storage.delete_project(project.id).await,
            Err(TodoError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_task_round_trip_preserves_timestamps() {
        let storage = storage().await;
        let task = storage
            .insert_task(new_task(ProjectId::new(1), Some(at(3))))
            .await
            .unwrap();

        let closed = at(2) + Duration::nanoseconds(123_456_789);
        let updated = storage
            .update_task(
                task.id,
                Box::new(move |t| {
                    t.apply_status(TaskStatus::Done, closed);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let loaded = storage.load_task(task.id).await.unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(loaded.closed_at, Some(closed));
        assert_eq!(loaded.deadline, Some(at(3)));
    }

    #[tokio::test]
    async fn test_overdue_query() {
        let storage = storage().await;
        let project = ProjectId::new(1);
        let late = storage.insert_task(new_task(project, Some(at(5)))).await.unwrap();
        let later = storage.insert_task(new_task(project, Some(at(3)))).await.unwrap();
        storage.insert_task(new_task(project, Some(at(20)))).await.unwrap();
        storage.insert_task(new_task(project, None)).await.unwrap();
        let done = storage.insert_task(new_task(project, Some(at(2)))).await.unwrap();
        storage
            .update_task(
                done.id,
                Box::new(|t| {
                    t.apply_status(TaskStatus::Done, at(4));
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let overdue = storage
            .query_tasks(TaskFilter::OverdueAt(at(10)))
            .await
            .unwrap();
        let ids: Vec<_> = overdue.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![later.id, late.id]);
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back() {
        let storage = storage().await;
        let task = storage.insert_task(new_task(ProjectId::new(1), None)).await.unwrap();

        let result = storage
            .update_task(
                task.id,
                Box::new(|_| Err(TodoError::StorageError("abort".to_string()))),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(storage.load_task(task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_missing_task_update_is_not_found() {
        let storage = storage().await;
        let result = storage
            .update_task(TaskId::new(42), Box::new(|_| Ok(())))
            .await;
        assert!(matches!(result, Err(TodoError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("todolist.db");
        let task = {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.initialize().await.unwrap();
            storage.insert_task(new_task(ProjectId::new(7), None)).await.unwrap()
        };

        let reopened = SqliteStorage::open(&path).unwrap();
        assert!(reopened.is_initialized().await);
        assert_eq!(reopened.load_task(task.id).await.unwrap(), task);
        assert_eq!(
            reopened
                .query_tasks(TaskFilter::ByProject(ProjectId::new(7)))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_corrupt_database_reads_as_uninitialized() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("todolist.db");
        std::fs::write(&path, "this is not a database file\n".repeat(64)).unwrap();

        let storage = SqliteStorage::open(&path).unwrap();
        assert!(!storage.is_initialized().await);
        assert!(matches!(
            storage.initialize().await,
            Err(TodoError::SqliteError(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_on_file_database_are_serialized() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(SqliteStorage::open(temp_dir.path().join("todolist.db")).unwrap());
        storage.initialize().await.unwrap();
        let task_id = storage
            .insert_task(new_task(ProjectId::new(1), None))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .update_task(
                        task_id,
                        Box::new(|t| {
                            t.description.push('+');
                            Ok(())
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let loaded = storage.load_task(task_id).await.unwrap();
        assert_eq!(loaded.description, format!("desc{}", "+".repeat(32)));
    }
}
