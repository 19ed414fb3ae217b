//! Request types for tracker operations.
//!
//! Create requests become entities; update requests become partial field maps
//! for the update-expression builder; [`IssueFilter`] becomes typed predicates.
//! These are pure data types with no I/O.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{Field, Item, Predicate, RepositoryError, Result};

use super::types::{IssuePriority, IssueStatus, IssueType};

/// Serialize an update request into the field map of a partial write.
fn to_fields<T: Serialize>(request: &T) -> Result<Item> {
    match serde_json::to_value(request)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(RepositoryError::Serialization(format!(
            "update request serialized to {other}, expected an object"
        ))),
    }
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RepositoryError::InvalidData(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Request payload for creating an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub email: String,
    pub name: String,
    /// Already hashed by the authentication layer.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
}

impl CreateAccountRequest {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password_hash: None,
        }
    }

    pub fn with_password_hash(mut self, password_hash: impl Into<String>) -> Self {
        self.password_hash = Some(password_hash.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_text(&self.email, "email")?;
        require_text(&self.name, "name")
    }
}

/// Request payload for updating an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UpdateAccountRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fields(&self) -> Result<Item> {
        to_fields(self)
    }
}

/// Request payload for creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub key: String,
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::serde::deserialize_optional_string"
    )]
    pub description: Option<String>,
}

impl CreateProjectRequest {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_text(&self.key, "project key")?;
        require_text(&self.name, "name")
    }
}

/// Request payload for updating a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateProjectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn fields(&self) -> Result<Item> {
        to_fields(self)
    }
}

/// Request payload for creating an issue. The human key is allocated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueRequest {
    pub title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::serde::deserialize_optional_string"
    )]
    pub description: Option<String>,
    #[serde(default)]
    pub status: IssueStatus,
    #[serde(default)]
    pub priority: IssuePriority,
    #[serde(default)]
    pub issue_type: IssueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
}

impl CreateIssueRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: IssueStatus::default(),
            priority: IssuePriority::default(),
            issue_type: IssueType::default(),
            assignee_id: None,
            story_points: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: IssuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = issue_type;
        self
    }

    pub fn with_assignee(mut self, assignee_id: Uuid) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn with_story_points(mut self, story_points: u32) -> Self {
        self.story_points = Some(story_points);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_text(&self.title, "title")
    }
}

/// Request payload for updating an issue.
///
/// The project and the human key of an issue cannot change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IssuePriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
}

impl UpdateIssueRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: IssuePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_assignee(mut self, assignee_id: Uuid) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn with_story_points(mut self, story_points: u32) -> Self {
        self.story_points = Some(story_points);
        self
    }

    pub fn fields(&self) -> Result<Item> {
        if let Some(title) = &self.title {
            require_text(title, "title")?;
        }
        to_fields(self)
    }
}

/// Filter for issue listings. Every set criterion must hold; a criterion
/// with several accepted values matches any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<IssueStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<IssuePriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub unassigned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_story_points: Option<u32>,
}

impl IssueFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_priority(mut self, priority: IssuePriority) -> Self {
        self.priorities.push(priority);
        self
    }

    pub fn with_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = Some(issue_type);
        self
    }

    pub fn with_assignee(mut self, assignee_id: Uuid) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    pub fn with_title_containing(mut self, text: impl Into<String>) -> Self {
        self.title_contains = Some(text.into());
        self
    }

    pub fn with_min_story_points(mut self, points: u32) -> Self {
        self.min_story_points = Some(points);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    /// The typed predicates this filter stands for.
    pub fn predicates(&self) -> Vec<Predicate> {
        const STATUS: Field = Field::from_static("status");
        const PRIORITY: Field = Field::from_static("priority");
        const ISSUE_TYPE: Field = Field::from_static("issueType");
        const ASSIGNEE: Field = Field::from_static("assigneeId");
        const TITLE: Field = Field::from_static("title");
        const STORY_POINTS: Field = Field::from_static("storyPoints");

        let mut predicates = Vec::new();
        if !self.statuses.is_empty() {
            predicates.push(STATUS.one_of(self.statuses.iter().map(|s| s.as_str())));
        }
        if !self.priorities.is_empty() {
            predicates.push(PRIORITY.one_of(self.priorities.iter().map(|p| p.as_str())));
        }
        if let Some(issue_type) = self.issue_type {
            predicates.push(ISSUE_TYPE.equals(issue_type.as_str()));
        }
        if let Some(assignee_id) = self.assignee_id {
            predicates.push(ASSIGNEE.equals(assignee_id.to_string()));
        } else if self.unassigned {
            predicates.push(ASSIGNEE.not_exists());
        }
        if let Some(text) = self.title_contains.as_deref().filter(|t| !t.is_empty()) {
            predicates.push(TITLE.contains(text));
        }
        if let Some(points) = self.min_story_points {
            predicates.push(STORY_POINTS.greater_or_equal(points));
        }
        predicates
    }
}
