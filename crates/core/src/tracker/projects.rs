//! Project operations.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::storage::{
    keys, EntityKind, IndexName, NaturalKey, QueryOptions, Repository, RepositoryError, Result,
    ScanOptions, UpdateExpression,
};

use super::conversions::{item_to_project, project_to_item};
use super::requests::{CreateProjectRequest, UpdateProjectRequest};
use super::types::{EntityPage, Project};
use super::{not_found, page_of};

/// Short keys are stored upper-case.
pub fn normalize_short_key(key: &str) -> String {
    key.trim().to_uppercase()
}

#[derive(Debug, Clone)]
pub struct ProjectStore {
    repository: Repository,
}

impl ProjectStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create a project owned by `created_by`. The short key must not be in
    /// use and the creator must exist.
    pub async fn create(&self, created_by: Uuid, request: CreateProjectRequest) -> Result<Project> {
        request.validate()?;
        let short_key = normalize_short_key(&request.key);

        let creator = keys::account_key(&created_by.to_string())?;
        if self.repository.get_item_consistent(&creator).await?.is_none() {
            return Err(not_found(EntityKind::Account, created_by));
        }
        if self.find_by_key(&short_key).await?.is_some() {
            return Err(RepositoryError::AlreadyExists {
                entity_type: EntityKind::Project.name(),
                id: short_key,
            });
        }

        let mut project = Project::new(short_key, request.name.trim(), created_by);
        project.description = request.description;
        self.repository
            .create_item(project_to_item(&project)?)
            .await?;

        tracing::info!(project_id = %project.id, key = %project.key, "Created project");
        Ok(project)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Project>> {
        let key = keys::project_key(&id.to_string())?;
        self.repository
            .get_item(&key)
            .await?
            .map(|item| item_to_project(&item))
            .transpose()
    }

    /// Like [`get`](Self::get), but strongly consistent and a missing project
    /// is `NotFound`.
    pub async fn require(&self, id: Uuid) -> Result<Project> {
        let key = keys::project_key(&id.to_string())?;
        match self.repository.get_item_consistent(&key).await? {
            Some(item) => item_to_project(&item),
            None => Err(not_found(EntityKind::Project, id)),
        }
    }

    /// Look a project up by short key through the short-key index.
    pub async fn find_by_key(&self, short_key: &str) -> Result<Option<Project>> {
        let short_key = normalize_short_key(short_key);
        let partition_key = keys::index_partition_key(NaturalKey::ShortKey(&short_key))?;
        let page = self
            .repository
            .query(
                partition_key,
                Vec::new(),
                QueryOptions {
                    index: Some(IndexName::Gsi1),
                    page_size: Some(1),
                    ..QueryOptions::default()
                },
            )
            .await?;

        page.items.first().map(item_to_project).transpose()
    }

    /// Projects created by an account, oldest first.
    pub async fn list_by_creator(
        &self,
        created_by: Uuid,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Project>> {
        let partition_key =
            keys::index_partition_key(NaturalKey::Account(&created_by.to_string()))?;
        let page = self
            .repository
            .query(
                partition_key,
                Vec::new(),
                QueryOptions {
                    index: Some(IndexName::Gsi2),
                    cursor_token,
                    page_size,
                    ..QueryOptions::default()
                },
            )
            .await?;
        page_of(page, item_to_project)
    }

    /// Every project, one page at a time. This scans the table; callers
    /// must authorize cross-tenant listings first.
    pub async fn list(
        &self,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Project>> {
        let page = self
            .repository
            .scan(
                Some(EntityKind::Project),
                Vec::new(),
                ScanOptions {
                    cursor_token,
                    page_size,
                },
            )
            .await?;
        page_of(page, item_to_project)
    }

    /// Apply a partial update. A new short key moves the short-key index
    /// entry; issue keys already allocated keep their old prefix.
    pub async fn update(&self, id: Uuid, request: UpdateProjectRequest) -> Result<Project> {
        let existing = self.require(id).await?;
        let mut fields = request.fields()?;
        let mut new_key = None;

        let requested = fields.get("key").and_then(Value::as_str).map(normalize_short_key);
        if let Some(key) = requested {
            if key.is_empty() {
                return Err(RepositoryError::InvalidData(
                    "project key must not be empty".to_string(),
                ));
            }
            if key != existing.key {
                if self.find_by_key(&key).await?.is_some() {
                    return Err(RepositoryError::AlreadyExists {
                        entity_type: EntityKind::Project.name(),
                        id: key,
                    });
                }
                new_key = Some(key.clone());
            }
            fields.insert("key".to_string(), Value::String(key));
        }

        let mut update = UpdateExpression::from_fields(fields, Utc::now());
        if let Some(key) = &new_key {
            update.set_index_key(
                IndexName::Gsi1,
                &keys::project_short_key_index(key, &existing.created_at)?,
            );
        }

        let key = keys::project_key(&id.to_string())?;
        let item = self.repository.update_item_with(&key, &update).await?;
        item_to_project(&item)
    }

    /// Delete a project. Its issues are left in place.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let key = keys::project_key(&id.to_string())?;
        self.repository.delete_item(&key).await
    }
}
