use crate::domain::project::ProjectId;
use crate::error::{Result, TodoError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Unique identifier for a task, assigned by storage in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for TaskId {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TodoError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task
///
/// Persisted as its literal name (`open`, `in_progress`, `done`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Open, Self::InProgress, Self::Done];

    /// The persisted name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(TodoError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work belonging to exactly one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Overdue: a deadline strictly before `now` and not yet done
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => deadline < now && self.status != TaskStatus::Done,
            None => false,
        }
    }

    /// Moves the task to `new_status`.
    ///
    /// Entering `done` from any other status stamps `closed_at`. Every other
    /// transition, including `done` to `done`, leaves `closed_at` untouched.
    /// Returns whether the status actually changed.
    pub fn apply_status(&mut self, new_status: TaskStatus, now: DateTime<Utc>) -> bool {
        let previous = self.status;
        if new_status == TaskStatus::Done && previous != TaskStatus::Done {
            self.closed_at = Some(now);
        }
        self.status = new_status;
        previous != new_status
    }

    /// Forces the task to `done` and stamps `closed_at`, even if it was
    /// already done.
    pub fn force_close(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.closed_at = Some(now);
    }
}

/// A task that has been validated but not yet assigned an ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewTask {
    pub fn new(
        project_id: ProjectId,
        title: String,
        description: String,
        deadline: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if title.trim().is_empty() {
            return Err(TodoError::validation("title", "must not be empty"));
        }
        if description.trim().is_empty() {
            return Err(TodoError::validation("description", "must not be empty"));
        }
        Ok(Self {
            project_id,
            title,
            description,
            deadline,
            created_at,
        })
    }

    /// Materializes the task in its initial `open` state
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::Open,
            deadline: self.deadline,
            created_at: self.created_at,
            closed_at: None,
        }
    }
}
