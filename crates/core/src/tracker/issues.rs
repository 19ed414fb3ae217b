//! Issue operations.
//!
//! Issues live in their project's partition (`PROJECT#<projectId>` /
//! `ISSUE#<id>`), so listing a project is an indexed range query. Lookups by
//! human key go through GSI2 and lookups by creator through GSI1. Searching
//! across projects is a scan.

use chrono::Utc;
use uuid::Uuid;

use crate::storage::{
    keys, EntityKind, IndexName, NaturalKey, PrimaryKey, QueryOptions, Repository,
    RepositoryError, Result, ScanOptions, SortKeyCondition,
};

use super::allocator::IssueKeyAllocator;
use super::conversions::{issue_to_item, item_to_issue};
use super::requests::{CreateIssueRequest, IssueFilter, UpdateIssueRequest};
use super::types::{EntityPage, Issue};
use super::{not_found, page_of};

#[derive(Debug, Clone)]
pub struct IssueStore {
    repository: Repository,
    allocator: IssueKeyAllocator,
}

impl IssueStore {
    pub fn new(repository: Repository, allocator: IssueKeyAllocator) -> Self {
        Self {
            repository,
            allocator,
        }
    }

    /// Create an issue in a project, allocating its human key.
    ///
    /// The key is reserved first; if the issue write then fails the
    /// reservation is released. Creation is not idempotent.
    pub async fn create(
        &self,
        project_id: Uuid,
        created_by: Uuid,
        request: CreateIssueRequest,
    ) -> Result<Issue> {
        request.validate()?;

        let project_key = keys::project_key(&project_id.to_string())?;
        let project = self
            .repository
            .get_item_consistent(&project_key)
            .await?
            .ok_or_else(|| not_found(EntityKind::Project, project_id))?;
        let short_key = project
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RepositoryError::InvalidData("Project is missing its key".to_string()))?
            .to_string();

        let project_id_str = project_id.to_string();
        let human_key = self.allocator.reserve(&project_id_str, &short_key).await?;

        let now = Utc::now();
        let issue = Issue {
            id: Uuid::new_v4(),
            project_id,
            key: human_key,
            title: request.title.trim().to_string(),
            description: request.description,
            status: request.status,
            priority: request.priority,
            issue_type: request.issue_type,
            assignee_id: request.assignee_id,
            story_points: request.story_points,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let written = match issue_to_item(&issue) {
            Ok(item) => self.repository.create_item(item).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(release_error) = self.allocator.release(&project_id_str, &issue.key).await {
                tracing::warn!(
                    human_key = %issue.key,
                    error = %release_error,
                    "Failed to release issue key after a failed create"
                );
            }
            return Err(e);
        }

        tracing::info!(issue_id = %issue.id, key = %issue.key, "Created issue");
        Ok(issue)
    }

    pub async fn get(&self, project_id: Uuid, issue_id: Uuid) -> Result<Option<Issue>> {
        let key = issue_key(project_id, issue_id)?;
        self.repository
            .get_item(&key)
            .await?
            .map(|item| item_to_issue(&item))
            .transpose()
    }

    /// Look an issue up by its human key through GSI2.
    pub async fn find_by_key(&self, project_id: Uuid, human_key: &str) -> Result<Option<Issue>> {
        let index_key = keys::issue_project_index(&project_id.to_string(), human_key)?;
        let page = self
            .repository
            .query(
                index_key.pk,
                Vec::new(),
                QueryOptions {
                    index: Some(IndexName::Gsi2),
                    sort_key: Some(SortKeyCondition::Equals(index_key.sk)),
                    page_size: Some(1),
                    ..QueryOptions::default()
                },
            )
            .await?;

        page.items.first().map(item_to_issue).transpose()
    }

    /// Issues of a project.
    ///
    /// The filter runs on each page after it is read, so a page can hold
    /// fewer issues than requested while more remain.
    pub async fn list(
        &self,
        project_id: Uuid,
        filter: &IssueFilter,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Issue>> {
        let partition_key = keys::index_partition_key(NaturalKey::Project(&project_id.to_string()))?;
        let page = self
            .repository
            .query(
                partition_key,
                filter.predicates(),
                QueryOptions {
                    sort_key: Some(SortKeyCondition::BeginsWith(
                        keys::issue_sk_prefix().to_string(),
                    )),
                    cursor_token,
                    page_size,
                    ..QueryOptions::default()
                },
            )
            .await?;
        page_of(page, item_to_issue)
    }

    /// Issues of a project in human-key order, through GSI2.
    pub async fn list_by_key(
        &self,
        project_id: Uuid,
        filter: &IssueFilter,
        cursor_token: Option<String>,
        page_size: Option<u32>,
        descending: bool,
    ) -> Result<EntityPage<Issue>> {
        let partition_key = keys::index_partition_key(NaturalKey::Project(&project_id.to_string()))?;
        let page = self
            .repository
            .query(
                partition_key,
                filter.predicates(),
                QueryOptions {
                    index: Some(IndexName::Gsi2),
                    cursor_token,
                    page_size,
                    descending,
                    ..QueryOptions::default()
                },
            )
            .await?;
        page_of(page, item_to_issue)
    }

    /// Issues created by an account, oldest first, through GSI1.
    pub async fn list_created_by(
        &self,
        account_id: Uuid,
        filter: &IssueFilter,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Issue>> {
        let partition_key = keys::index_partition_key(NaturalKey::Account(&account_id.to_string()))?;
        let page = self
            .repository
            .query(
                partition_key,
                filter.predicates(),
                QueryOptions {
                    index: Some(IndexName::Gsi1),
                    cursor_token,
                    page_size,
                    ..QueryOptions::default()
                },
            )
            .await?;
        page_of(page, item_to_issue)
    }

    /// Issues of every project matching the filter. This scans the table;
    /// callers must authorize cross-project searches first.
    pub async fn search(
        &self,
        filter: &IssueFilter,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Issue>> {
        let page = self
            .repository
            .scan(
                Some(EntityKind::Issue),
                filter.predicates(),
                ScanOptions {
                    cursor_token,
                    page_size,
                },
            )
            .await?;
        page_of(page, item_to_issue)
    }

    /// Fetch many issues by `(project, issue)` id pairs. Missing issues are
    /// skipped.
    pub async fn get_many(&self, ids: &[(Uuid, Uuid)]) -> Result<Vec<Issue>> {
        let keys = ids
            .iter()
            .map(|(project_id, issue_id)| issue_key(*project_id, *issue_id))
            .collect::<Result<Vec<_>>>()?;
        self.repository
            .batch_get(&keys)
            .await?
            .iter()
            .map(item_to_issue)
            .collect()
    }

    /// Apply a partial update. The project and human key never change, so
    /// no index key is recomputed.
    pub async fn update(
        &self,
        project_id: Uuid,
        issue_id: Uuid,
        request: UpdateIssueRequest,
    ) -> Result<Issue> {
        let fields = request.fields()?;
        let key = issue_key(project_id, issue_id)?;
        match self.repository.update_item(&key, fields).await {
            Ok(item) => item_to_issue(&item),
            Err(RepositoryError::NotFound { .. }) => Err(not_found(EntityKind::Issue, issue_id)),
            Err(e) => Err(e),
        }
    }

    /// Delete an issue. Its human key stays reserved.
    pub async fn delete(&self, project_id: Uuid, issue_id: Uuid) -> Result<()> {
        let key = issue_key(project_id, issue_id)?;
        self.repository.delete_item(&key).await
    }
}

fn issue_key(project_id: Uuid, issue_id: Uuid) -> Result<PrimaryKey> {
    keys::issue_key(&project_id.to_string(), &issue_id.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::storage::item::{entity_kind_of, index_key_of};
    use crate::storage::{
        InMemoryStore, Item, ItemStore, Page, PageSizes, PutCondition, QueryRequest, ScanRequest,
        UpdateExpression, WriteRequest,
    };
    use crate::tracker::accounts::AccountStore;
    use crate::tracker::projects::ProjectStore;
    use crate::tracker::requests::{CreateAccountRequest, CreateProjectRequest};
    use crate::tracker::types::{IssuePriority, IssueStatus, IssueType};

    struct Fixture {
        repository: Repository,
        issues: IssueStore,
        owner: Uuid,
        project: Uuid,
    }

    async fn fixture_with(repository: Repository) -> Fixture {
        let owner = AccountStore::new(repository.clone())
            .create(CreateAccountRequest::new("owner@example.com", "Owner"))
            .await
            .unwrap()
            .id;
        let project = ProjectStore::new(repository.clone())
            .create(owner, CreateProjectRequest::new("ENG", "Engineering"))
            .await
            .unwrap()
            .id;
        let issues = IssueStore::new(
            repository.clone(),
            IssueKeyAllocator::new(repository.clone()),
        );
        Fixture {
            repository,
            issues,
            owner,
            project,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Repository::new(Arc::new(InMemoryStore::new()))).await
    }

    #[tokio::test]
    async fn test_create_allocates_sequential_keys() {
        let f = fixture().await;

        let mut keys = Vec::new();
        for title in ["One", "Two", "Three"] {
            let issue = f
                .issues
                .create(f.project, f.owner, CreateIssueRequest::new(title))
                .await
                .unwrap();
            keys.push(issue.key);
        }

        assert_eq!(keys, vec!["ENG-1001", "ENG-1002", "ENG-1003"]);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_keys() {
        let f = fixture().await;

        let (a, b) = tokio::join!(
            f.issues
                .create(f.project, f.owner, CreateIssueRequest::new("A")),
            f.issues
                .create(f.project, f.owner, CreateIssueRequest::new("B")),
        );

        assert_ne!(a.unwrap().key, b.unwrap().key);
    }

    #[tokio::test]
    async fn test_create_in_missing_project() {
        let f = fixture().await;
        let result = f
            .issues
            .create(Uuid::new_v4(), f.owner, CreateIssueRequest::new("Lost"))
            .await;
        assert!(matches!(
            result,
            Err(RepositoryError::NotFound {
                entity_type: "Project",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_deleted_issue_keys_are_not_reissued() {
        let f = fixture().await;
        let first = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("First"))
            .await
            .unwrap();
        f.issues.delete(f.project, first.id).await.unwrap();

        let second = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("Second"))
            .await
            .unwrap();

        assert_eq!(first.key, "ENG-1001");
        assert_eq!(second.key, "ENG-1002");
    }

    #[tokio::test]
    async fn test_get_and_find_by_key() {
        let f = fixture().await;
        let issue = f
            .issues
            .create(
                f.project,
                f.owner,
                CreateIssueRequest::new("Crash on save")
                    .with_type(IssueType::Bug)
                    .with_priority(IssuePriority::Critical),
            )
            .await
            .unwrap();

        let fetched = f.issues.get(f.project, issue.id).await.unwrap().unwrap();
        assert_eq!(fetched.key, issue.key);
        assert_eq!(fetched.issue_type, IssueType::Bug);

        let found = f.issues.find_by_key(f.project, "ENG-1001").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(issue.id));
        assert!(f
            .issues
            .find_by_key(f.project, "ENG-9999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_excludes_reservations_and_applies_filter() {
        let f = fixture().await;
        for (title, status) in [
            ("a", IssueStatus::Todo),
            ("b", IssueStatus::Done),
            ("c", IssueStatus::Todo),
        ] {
            f.issues
                .create(
                    f.project,
                    f.owner,
                    CreateIssueRequest::new(title).with_status(status),
                )
                .await
                .unwrap();
        }

        let all = f
            .issues
            .list(f.project, &IssueFilter::new(), None, None)
            .await
            .unwrap();
        assert_eq!(all.items.len(), 3);

        let todo = f
            .issues
            .list(
                f.project,
                &IssueFilter::new().with_status(IssueStatus::Todo),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(todo.items.len(), 2);
        assert!(todo.items.iter().all(|i| i.status == IssueStatus::Todo));
    }

    #[tokio::test]
    async fn test_filtered_pages_can_be_short() {
        let f = fixture().await;
        for n in 0..4 {
            let status = if n == 3 { IssueStatus::Done } else { IssueStatus::Todo };
            f.issues
                .create(
                    f.project,
                    f.owner,
                    CreateIssueRequest::new(format!("issue {n}")).with_status(status),
                )
                .await
                .unwrap();
        }
        let done = IssueFilter::new().with_status(IssueStatus::Done);

        let mut token = None;
        let mut found = 0;
        let mut short_page_with_more = false;
        loop {
            let page = f
                .issues
                .list_by_key(f.project, &done, token, Some(2), false)
                .await
                .unwrap();
            found += page.items.len();
            if page.items.len() < 2 && page.has_more() {
                short_page_with_more = true;
            }
            match page.next_cursor_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(found, 1);
        assert!(short_page_with_more);
    }

    #[tokio::test]
    async fn test_list_by_key_descending() {
        let f = fixture().await;
        for title in ["a", "b", "c"] {
            f.issues
                .create(f.project, f.owner, CreateIssueRequest::new(title))
                .await
                .unwrap();
        }

        let page = f
            .issues
            .list_by_key(f.project, &IssueFilter::new(), None, None, true)
            .await
            .unwrap();
        let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["ENG-1003", "ENG-1002", "ENG-1001"]);
    }

    #[tokio::test]
    async fn test_list_created_by_spans_projects() {
        let f = fixture().await;
        let other_project = ProjectStore::new(f.repository.clone())
            .create(f.owner, CreateProjectRequest::new("OPS", "Operations"))
            .await
            .unwrap();
        f.issues
            .create(f.project, f.owner, CreateIssueRequest::new("eng work"))
            .await
            .unwrap();
        f.issues
            .create(other_project.id, f.owner, CreateIssueRequest::new("ops work"))
            .await
            .unwrap();
        f.issues
            .create(f.project, Uuid::new_v4(), CreateIssueRequest::new("not mine"))
            .await
            .unwrap();

        let mine = f
            .issues
            .list_created_by(f.owner, &IssueFilter::new(), None, None)
            .await
            .unwrap();
        assert_eq!(mine.items.len(), 2);
        assert!(mine.items.iter().all(|i| i.created_by == f.owner));
    }

    #[tokio::test]
    async fn test_search_scans_all_projects() {
        let f = fixture().await;
        let other_project = ProjectStore::new(f.repository.clone())
            .create(f.owner, CreateProjectRequest::new("OPS", "Operations"))
            .await
            .unwrap();
        let assignee = Uuid::new_v4();
        f.issues
            .create(
                f.project,
                f.owner,
                CreateIssueRequest::new("eng").with_assignee(assignee),
            )
            .await
            .unwrap();
        f.issues
            .create(
                other_project.id,
                f.owner,
                CreateIssueRequest::new("ops").with_assignee(assignee),
            )
            .await
            .unwrap();
        f.issues
            .create(f.project, f.owner, CreateIssueRequest::new("nobody's"))
            .await
            .unwrap();

        let page = f
            .issues
            .search(&IssueFilter::new().with_assignee(assignee), None, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);

        let unassigned = f
            .issues
            .search(&IssueFilter::new().unassigned(), None, None)
            .await
            .unwrap();
        assert_eq!(unassigned.items.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_keys() {
        let f = fixture().await;
        let issue = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("Draft"))
            .await
            .unwrap();
        let key = issue_key(f.project, issue.id).unwrap();
        let before = f.repository.get_item(&key).await.unwrap().unwrap();

        let updated = f
            .issues
            .update(
                f.project,
                issue.id,
                UpdateIssueRequest::new()
                    .with_title("Final")
                    .with_status(IssueStatus::InProgress)
                    .with_story_points(5),
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Final");
        assert_eq!(updated.status, IssueStatus::InProgress);
        assert_eq!(updated.story_points, Some(5));
        assert_eq!(updated.key, issue.key);

        let after = f.repository.get_item(&key).await.unwrap().unwrap();
        for attribute in keys::KEY_ATTRIBUTES {
            assert_eq!(before.get(attribute), after.get(attribute), "{attribute}");
        }
        for index in [IndexName::Gsi1, IndexName::Gsi2] {
            let expected = index_key_of(&before, index);
            assert!(expected.is_some(), "{index:?}");
            assert_eq!(index_key_of(&after, index), expected, "{index:?}");
        }
    }

    #[tokio::test]
    async fn test_update_nonexistent() {
        let f = fixture().await;
        let result = f
            .issues
            .update(
                f.project,
                Uuid::new_v4(),
                UpdateIssueRequest::new().with_title("Ghost"),
            )
            .await;
        assert!(matches!(
            result,
            Err(RepositoryError::NotFound {
                entity_type: "Issue",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let f = fixture().await;
        let a = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("a"))
            .await
            .unwrap();
        let b = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("b"))
            .await
            .unwrap();

        let issues = f
            .issues
            .get_many(&[
                (f.project, a.id),
                (f.project, Uuid::new_v4()),
                (f.project, b.id),
            ])
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);
    }

    #[tokio::test]
    async fn test_orphaned_issue_is_still_readable() {
        let f = fixture().await;
        let issue = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("orphan"))
            .await
            .unwrap();

        ProjectStore::new(f.repository.clone())
            .delete(f.project)
            .await
            .unwrap();

        assert!(f.issues.get(f.project, issue.id).await.unwrap().is_some());
    }

    /// Rejects every issue write; reservations and other records go through.
    struct RejectsIssues(InMemoryStore);

    #[async_trait]
    impl ItemStore for RejectsIssues {
        async fn get_item(&self, key: &PrimaryKey, consistent: bool) -> Result<Option<Item>> {
            self.0.get_item(key, consistent).await
        }

        async fn put_item(&self, item: Item, condition: PutCondition) -> Result<()> {
            if entity_kind_of(&item) == Some(EntityKind::Issue) {
                return Err(RepositoryError::ConnectionFailed("connection reset".to_string()));
            }
            self.0.put_item(item, condition).await
        }

        async fn update_item(&self, key: &PrimaryKey, update: &UpdateExpression) -> Result<Item> {
            self.0.update_item(key, update).await
        }

        async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
            self.0.delete_item(key).await
        }

        async fn query(&self, request: &QueryRequest) -> Result<Page> {
            self.0.query(request).await
        }

        async fn scan(&self, request: &ScanRequest) -> Result<Page> {
            self.0.scan(request).await
        }

        async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
            self.0.batch_get(keys).await
        }

        async fn batch_write(&self, writes: Vec<WriteRequest>) -> Result<()> {
            self.0.batch_write(writes).await
        }
    }

    #[tokio::test]
    async fn test_failed_write_releases_reservation() {
        let f = fixture_with(Repository::new(Arc::new(RejectsIssues(InMemoryStore::new())))).await;

        let result = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new("Lost write"))
            .await;

        assert!(matches!(result, Err(RepositoryError::ConnectionFailed(_))));
        let reservation = keys::issue_key_reservation(&f.project.to_string(), "ENG-1001").unwrap();
        assert!(f
            .repository
            .get_item_consistent(&reservation)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_reserves_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let f = fixture_with(Repository::new(store.clone())).await;
        let before = store.len().await;

        let result = f
            .issues
            .create(f.project, f.owner, CreateIssueRequest::new(" "))
            .await;

        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
        assert_eq!(store.len().await, before);
    }

    #[tokio::test]
    async fn test_small_pages_still_allocate_past_the_first_page() {
        let repository = Repository::new(Arc::new(InMemoryStore::new()))
            .with_page_sizes(PageSizes { default: 1, max: 1 });
        let f = fixture_with(repository).await;

        let mut last = String::new();
        for n in 0..4 {
            last = f
                .issues
                .create(f.project, f.owner, CreateIssueRequest::new(format!("{n}")))
                .await
                .unwrap()
                .key;
        }
        assert_eq!(last, "ENG-1004");
    }
}
