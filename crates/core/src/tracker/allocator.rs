//! Sequential issue-key allocation.
//!
//! Human keys look like `ENG-1042`: the project's short key, a dash, and a
//! number. The next number is one more than the largest number already used
//! in the project, starting after a base (1000 by default).
//!
//! [`IssueKeyAllocator::allocate`] only reads. Two concurrent callers can read
//! the same maximum and return the same key. Issue creation goes through
//! [`IssueKeyAllocator::reserve`] instead, which claims the key with a
//! conditional put on a reservation record and moves to the next number when
//! the claim loses.

use chrono::Utc;

use crate::storage::item::get_str;
use crate::storage::{
    keys, AccessRequest, EntityKind, Repository, RepositoryError, Result, SortKeyCondition,
};

use super::conversions::reservation_to_item;

pub const DEFAULT_ISSUE_KEY_BASE: u64 = 1000;
pub const DEFAULT_RESERVE_ATTEMPTS: u32 = 5;

/// Attribute holding the human key on issues and reservations.
const HUMAN_KEY: &str = "key";

/// Numeric suffix of a human key, after the last `-`.
///
/// Keys without a parsable suffix count as 0.
pub fn parse_issue_number(human_key: &str) -> u64 {
    human_key
        .rsplit_once('-')
        .and_then(|(_, suffix)| suffix.parse().ok())
        .unwrap_or(0)
}

pub fn format_human_key(short_key: &str, number: u64) -> String {
    format!("{short_key}-{number}")
}

/// The number following the largest one in `human_keys`, never below
/// `base + 1`.
///
/// A number with no successor (`u64::MAX`) counts as unparsable.
pub fn next_issue_number<'a>(human_keys: impl IntoIterator<Item = &'a str>, base: u64) -> u64 {
    human_keys
        .into_iter()
        .map(parse_issue_number)
        .filter(|number| *number < u64::MAX)
        .fold(base, u64::max)
        .saturating_add(1)
}

/// Derives human keys from the issues stored in a project partition.
#[derive(Debug, Clone)]
pub struct IssueKeyAllocator {
    repository: Repository,
    base: u64,
    max_attempts: u32,
}

impl IssueKeyAllocator {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            base: DEFAULT_ISSUE_KEY_BASE,
            max_attempts: DEFAULT_RESERVE_ATTEMPTS,
        }
    }

    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Next human key for the project, computed from its existing issues.
    ///
    /// Nothing is written. Concurrent calls may return the same key.
    pub async fn allocate(&self, project_id: &str, short_key: &str) -> Result<String> {
        let issue_keys = self.human_keys(project_id, keys::issue_sk_prefix()).await?;
        let number = next_issue_number(issue_keys.iter().map(String::as_str), self.base);
        let human_key = format_human_key(short_key, number);

        tracing::debug!(
            project_id,
            existing = issue_keys.len(),
            human_key = %human_key,
            "Allocated issue key"
        );
        Ok(human_key)
    }

    /// Allocate a human key and claim it with a reservation record.
    ///
    /// Retries with the next number when another writer holds the candidate,
    /// up to the configured number of attempts.
    pub async fn reserve(&self, project_id: &str, short_key: &str) -> Result<String> {
        let mut used = self.human_keys(project_id, keys::issue_sk_prefix()).await?;
        used.extend(self.human_keys(project_id, keys::ISSUE_KEY_PREFIX).await?);
        let mut number = next_issue_number(used.iter().map(String::as_str), self.base);
        let mut human_key = format_human_key(short_key, number);

        for attempt in 1..=self.max_attempts {
            let reservation = reservation_to_item(project_id, &human_key, &Utc::now())?;
            match self.repository.create_item(reservation).await {
                Ok(()) => {
                    tracing::debug!(
                        project_id,
                        human_key = %human_key,
                        attempt,
                        "Reserved issue key"
                    );
                    return Ok(human_key);
                }
                Err(RepositoryError::AlreadyExists { .. }) => {
                    tracing::warn!(
                        project_id,
                        human_key = %human_key,
                        attempt,
                        "Issue key already reserved, trying the next one"
                    );
                    if attempt < self.max_attempts {
                        let Some(next) = number.checked_add(1) else {
                            break;
                        };
                        number = next;
                        human_key = format_human_key(short_key, number);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::AllocationCollision {
            human_key,
            attempts: self.max_attempts,
        })
    }

    /// Drop a reservation whose issue was never written.
    pub async fn release(&self, project_id: &str, human_key: &str) -> Result<()> {
        let key = keys::issue_key_reservation(project_id, human_key)?;
        self.repository.delete_item(&key).await?;
        tracing::debug!(project_id, human_key, "Released issue key");
        Ok(())
    }

    /// Every human key stored under a sort-key prefix of the project
    /// partition. Reads all pages with strong consistency.
    async fn human_keys(&self, project_id: &str, sort_prefix: &str) -> Result<Vec<String>> {
        let partition_key = keys::project_key(project_id)?.pk;
        let request = AccessRequest::new(EntityKind::Issue)
            .partition_key(partition_key)
            .sort_key(SortKeyCondition::BeginsWith(sort_prefix.to_string()))
            .consistent(true);

        let items = self.repository.query_all(request).await?;
        Ok(items
            .iter()
            .filter_map(|item| get_str(item, HUMAN_KEY).map(str::to_string))
            .collect())
    }
}
