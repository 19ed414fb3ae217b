use async_trait::async_trait;

use super::item::Item;
use super::keys::{IndexName, PrimaryKey};
use super::pagination::Cursor;
use super::predicate::Predicate;
use super::update::UpdateExpression;
use super::Result;

/// Condition attached to a single-item put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Overwrite whatever is stored.
    None,
    /// Fail with `AlreadyExists` if an item with the same key is stored.
    NotExists,
    /// Fail with `NotFound` unless an item with the same key is stored.
    Exists,
}

/// Condition on the sort key of a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    Equals(String),
    BeginsWith(String),
}

impl SortKeyCondition {
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::Equals(expected) => sort_key == expected,
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
        }
    }
}

/// An indexed range query against one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// `None` queries the table itself.
    pub index: Option<IndexName>,
    pub partition_key: String,
    pub sort_key: Option<SortKeyCondition>,
    /// Applied after the page has been read.
    pub filters: Vec<Predicate>,
    pub limit: u32,
    pub cursor: Option<Cursor>,
    /// Ignored for secondary indexes, which are eventually consistent.
    pub consistent: bool,
    pub descending: bool,
}

/// A full-table scan with a filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub filters: Vec<Predicate>,
    pub limit: u32,
    pub cursor: Option<Cursor>,
}

/// One page of a query or scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Present when the store has more to read.
    pub cursor: Option<Cursor>,
}

/// One operation of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(PrimaryKey),
}

/// Single-table key-value store capability.
///
/// Backends offer single-item conditional writes, partition+sort addressing,
/// secondary indexes, range queries, and filtered scans. Nothing here is
/// transactional across items. Store throttling is reported as
/// `RepositoryError::Throttled` and never retried by the backend.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Gets an item by its primary key.
    async fn get_item(&self, key: &PrimaryKey, consistent: bool) -> Result<Option<Item>>;

    /// Writes a full item. The item must carry its `PK` and `SK` attributes.
    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<()>;

    /// Applies an update to an existing item and returns the item as stored.
    ///
    /// Fails with `NotFound` if the item does not exist.
    async fn update_item(&self, key: &PrimaryKey, update: &UpdateExpression) -> Result<Item>;

    /// Deletes an item. Deleting a missing item succeeds.
    async fn delete_item(&self, key: &PrimaryKey) -> Result<()>;

    /// Reads one page of a partition.
    async fn query(&self, request: &QueryRequest) -> Result<Page>;

    /// Reads one page of the whole table.
    async fn scan(&self, request: &ScanRequest) -> Result<Page>;

    /// Gets many items by key. Missing items are skipped.
    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>>;

    /// Applies unconditional puts and deletes.
    async fn batch_write(&self, writes: Vec<WriteRequest>) -> Result<()>;
}
