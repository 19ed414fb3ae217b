//! Issue tracker entities and the stores that persist them.
//!
//! Every store works on a [`Repository`], so the same code runs against
//! DynamoDB and the in-memory store used in tests.

pub mod accounts;
pub mod allocator;
pub mod conversions;
pub mod issues;
pub mod projects;
pub mod requests;
pub mod types;

use std::fmt::Display;
use std::sync::Arc;

use crate::storage::{EntityKind, Item, ItemStore, ListPage, PageSizes, Repository, RepositoryError, Result};

pub use accounts::AccountStore;
pub use allocator::{IssueKeyAllocator, DEFAULT_ISSUE_KEY_BASE, DEFAULT_RESERVE_ATTEMPTS};
pub use issues::IssueStore;
pub use projects::ProjectStore;
pub use requests::{
    CreateAccountRequest, CreateIssueRequest, CreateProjectRequest, IssueFilter,
    UpdateAccountRequest, UpdateIssueRequest, UpdateProjectRequest,
};
pub use types::{
    Account, AccountCredentials, EntityPage, Issue, IssuePriority, IssueStatus, IssueType,
    Project,
};

/// Tunables shared by the tracker stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub page_sizes: PageSizes,
    /// Issue numbers start right after this value.
    pub issue_key_base: u64,
    pub reserve_attempts: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            page_sizes: PageSizes::default(),
            issue_key_base: DEFAULT_ISSUE_KEY_BASE,
            reserve_attempts: DEFAULT_RESERVE_ATTEMPTS,
        }
    }
}

/// The account, project and issue stores over one table.
#[derive(Debug, Clone)]
pub struct Tracker {
    pub accounts: AccountStore,
    pub projects: ProjectStore,
    pub issues: IssueStore,
}

impl Tracker {
    pub fn new(store: Arc<dyn ItemStore>, config: TrackerConfig) -> Self {
        let repository = Repository::new(store).with_page_sizes(config.page_sizes);
        let allocator = IssueKeyAllocator::new(repository.clone())
            .with_base(config.issue_key_base)
            .with_max_attempts(config.reserve_attempts);

        Self {
            accounts: AccountStore::new(repository.clone()),
            projects: ProjectStore::new(repository.clone()),
            issues: IssueStore::new(repository, allocator),
        }
    }
}

pub(crate) fn not_found(kind: EntityKind, id: impl Display) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type: kind.name(),
        id: id.to_string(),
    }
}

pub(crate) fn page_of<T>(
    page: ListPage,
    convert: impl Fn(&Item) -> Result<T>,
) -> Result<EntityPage<T>> {
    let items = page.items.iter().map(convert).collect::<Result<Vec<_>>>()?;
    Ok(EntityPage {
        items,
        next_cursor_token: page.next_cursor_token,
    })
}
