use crate::error::{Result, TodoError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Unique identifier for a project, assigned by storage in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(u64);

impl ProjectId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for ProjectId {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TodoError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named container for tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub const NAME_MAX_CHARS: usize = 30;
    pub const DESCRIPTION_MAX_CHARS: usize = 150;

    /// Validates a project name (1-30 characters)
    pub fn validate_name(name: &str) -> Result<()> {
        validate_length("name", name, Self::NAME_MAX_CHARS)
    }

    /// Validates a project description (1-150 characters)
    pub fn validate_description(description: &str) -> Result<()> {
        validate_length("description", description, Self::DESCRIPTION_MAX_CHARS)
    }
}

fn validate_length(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TodoError::validation(field, "must not be empty"));
    }
    let count = value.chars().count();
    if count > max {
        return Err(TodoError::validation(
            field,
            format!("must be at most {} characters, got {}", max, count),
        ));
    }
    Ok(())
}

/// A project that has been validated but not yet assigned an ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewProject {
    pub fn new(name: String, description: String, created_at: DateTime<Utc>) -> Result<Self> {
        Project::validate_name(&name)?;
        Project::validate_description(&description)?;
        Ok(Self {
            name,
            description,
            created_at,
        })
    }

    /// Materializes the project once storage has picked an ID
    pub fn into_project(self, id: ProjectId) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

/// Partial update of a project's editable fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ProjectUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            Project::validate_name(name)?;
        }
        if let Some(description) = &self.description {
            Project::validate_description(description)?;
        }
        Ok(())
    }

    /// Applies the provided fields; `created_at` and `id` never change
    pub fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_parsing() {
        assert_eq!(ProjectId::from_str("42").unwrap(), ProjectId::new(42));
        assert_eq!(ProjectId::from_str(" 7 ").unwrap(), ProjectId::new(7));
        assert!(matches!(
            ProjectId::from_str("abc"),
            Err(TodoError::InvalidId(_))
        ));
        assert!(ProjectId::from_str("-1").is_err());
    }

    #[test]
    fn test_name_bounds() {
        assert!(Project::validate_name("A").is_ok());
        assert!(Project::validate_name(&"x".repeat(30)).is_ok());
        assert!(Project::validate_name(&"x".repeat(31)).is_err());
        assert!(Project::validate_name("").is_err());
        assert!(Project::validate_name("   ").is_err());
    }

    #[test]
    fn test_name_bounds_count_characters_not_bytes() {
        // 30 two-byte characters
        let name = "é".repeat(30);
        assert!(Project::validate_name(&name).is_ok());
    }

    #[test]
    fn test_description_bounds() {
        assert!(Project::validate_description(&"d".repeat(150)).is_ok());
        let err = Project::validate_description(&"d".repeat(151)).unwrap_err();
        assert!(matches!(
            err,
            TodoError::Validation {
                field: "description",
                ..
            }
        ));
    }

    #[test]
    fn test_new_project_rejects_invalid_fields() {
        let now = Utc::now();
        assert!(NewProject::new("".to_string(), "desc".to_string(), now).is_err());
        assert!(NewProject::new("name".to_string(), "".to_string(), now).is_err());
        assert!(NewProject::new("name".to_string(), "desc".to_string(), now).is_ok());
    }

    #[test]
    fn test_project_update_applies_only_given_fields() {
        let now = Utc::now();
        let mut project = NewProject::new("Old".to_string(), "Old desc".to_string(), now)
            .unwrap()
            .into_project(ProjectId::new(1));

        ProjectUpdate::default().name("New").apply(&mut project);

        assert_eq!(project.name, "New");
        assert_eq!(project.description, "Old desc");
        assert_eq!(project.created_at, now);
    }

    #[test]
    fn test_project_serialization() {
        let project = NewProject::new("P".to_string(), "D".to_string(), Utc::now())
            .unwrap()
            .into_project(ProjectId::new(3));
        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("\"id\":3"));

        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back, project);
    }
}
