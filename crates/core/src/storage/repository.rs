//! Repository façade.
//!
//! The single point entity modules call through. It addresses items with
//! the key builder, routes reads through [`route`], builds partial writes with
//! [`UpdateExpression`], and turns store cursors into opaque tokens. It knows
//! nothing about accounts, projects or issues.

use std::sync::Arc;

use chrono::Utc;

use super::item::{primary_key_of, Item};
use super::keys::{EntityKind, IndexName, PrimaryKey};
use super::pagination::{decode_pagination_token, encode_pagination_token, Cursor};
use super::predicate::Predicate;
use super::router::{route, AccessPlan, AccessRequest, PageSizes};
use super::traits::{ItemStore, Page, PutCondition, SortKeyCondition, WriteRequest};
use super::update::UpdateExpression;
use super::Result;

/// DynamoDB caps `BatchGetItem` at 100 keys per call.
pub const BATCH_GET_CHUNK: usize = 100;
/// DynamoDB caps `BatchWriteItem` at 25 requests per call.
pub const BATCH_WRITE_CHUNK: usize = 25;

/// One page of a list operation, with the token for the next page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    pub items: Vec<Item>,
    /// `None` on the last page.
    pub next_cursor_token: Option<String>,
}

/// Options of [`Repository::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub index: Option<IndexName>,
    pub sort_key: Option<SortKeyCondition>,
    pub cursor_token: Option<String>,
    pub page_size: Option<u32>,
    pub consistent: bool,
    pub descending: bool,
}

/// Options of [`Repository::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub cursor_token: Option<String>,
    pub page_size: Option<u32>,
}

/// What a batch write does with each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchWriteMode {
    Put,
    Delete,
}

/// Façade over an injected [`ItemStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ItemStore>,
    page_sizes: PageSizes,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("page_sizes", &self.page_sizes)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            page_sizes: PageSizes::default(),
        }
    }

    pub fn with_page_sizes(mut self, page_sizes: PageSizes) -> Self {
        self.page_sizes = page_sizes;
        self
    }

    pub fn page_sizes(&self) -> PageSizes {
        self.page_sizes
    }

    /// Eventually consistent read by primary key.
    pub async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>> {
        self.store.get_item(key, false).await
    }

    /// Strongly consistent read by primary key.
    pub async fn get_item_consistent(&self, key: &PrimaryKey) -> Result<Option<Item>> {
        self.store.get_item(key, true).await
    }

    /// Unconditional write of a full item.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn put_item(&self, item: Item) -> Result<()> {
        self.store.put_item(item, PutCondition::None).await
    }

    /// Write a full item only if nothing is stored under its key.
    ///
    /// Fails with `AlreadyExists` otherwise.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_item(&self, item: Item) -> Result<()> {
        self.store.put_item(item, PutCondition::NotExists).await
    }

    /// Apply a partial field map. Identity and key fields are dropped and
    /// `updatedAt` is stamped.
    #[tracing::instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn update_item(&self, key: &PrimaryKey, fields: Item) -> Result<Item> {
        let update = UpdateExpression::from_fields(fields, Utc::now());
        self.store.update_item(key, &update).await
    }

    /// Apply a prepared update, e.g. one carrying recomputed index keys.
    #[tracing::instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn update_item_with(
        &self,
        key: &PrimaryKey,
        update: &UpdateExpression,
    ) -> Result<Item> {
        self.store.update_item(key, update).await
    }

    /// Delete by key. Deleting a missing item succeeds.
    #[tracing::instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
        self.store.delete_item(key).await
    }

    /// One page of a partition, optionally through a secondary index.
    pub async fn query(
        &self,
        partition_key: impl Into<String>,
        filters: Vec<Predicate>,
        options: QueryOptions,
    ) -> Result<ListPage> {
        let mut request = AccessRequest {
            index: options.index,
            filters,
            cursor_token: options.cursor_token,
            page_size: options.page_size,
            consistent: options.consistent,
            descending: options.descending,
            ..AccessRequest::default()
        }
        .partition_key(partition_key);
        request.known.sort_key = options.sort_key;
        self.access(request).await
    }

    /// One page of the whole table.
    pub async fn scan(
        &self,
        entity: Option<EntityKind>,
        filters: Vec<Predicate>,
        options: ScanOptions,
    ) -> Result<ListPage> {
        let request = AccessRequest {
            entity,
            filters,
            cursor_token: options.cursor_token,
            page_size: options.page_size,
            ..AccessRequest::default()
        };
        self.access(request).await
    }

    /// Route a request and read one page.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?request.entity))]
    pub async fn access(&self, request: AccessRequest) -> Result<ListPage> {
        let page = self.read_page(&route(request, self.page_sizes)?).await?;
        Ok(ListPage {
            items: page.items,
            next_cursor_token: encode_pagination_token(page.cursor.as_ref()),
        })
    }

    /// Route a request and read every page of it.
    ///
    /// The cursor token and page size of the request are ignored.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?request.entity))]
    pub async fn query_all(&self, mut request: AccessRequest) -> Result<Vec<Item>> {
        request.cursor_token = None;
        request.page_size = Some(self.page_sizes.max);
        let mut plan = route(request, self.page_sizes)?;

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.read_page(&plan).await?;
            pages += 1;
            items.extend(page.items);
            match page.cursor {
                Some(cursor) => resume(&mut plan, cursor),
                None => break,
            }
        }

        tracing::debug!(pages, items = items.len(), "Read all pages");
        Ok(items)
    }

    /// Get many items by key, in chunks the store accepts.
    pub async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
        let mut items = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(BATCH_GET_CHUNK) {
            items.extend(self.store.batch_get(chunk).await?);
        }
        Ok(items)
    }

    /// Put or delete many items, in chunks the store accepts.
    ///
    /// Deletes only need the key attributes of each item.
    #[tracing::instrument(level = "debug", skip_all, fields(count = items.len(), mode = ?mode))]
    pub async fn batch_write(&self, items: Vec<Item>, mode: BatchWriteMode) -> Result<()> {
        let writes = items
            .into_iter()
            .map(|item| match mode {
                BatchWriteMode::Put => Ok(WriteRequest::Put(item)),
                BatchWriteMode::Delete => primary_key_of(&item).map(WriteRequest::Delete),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut writes = writes.into_iter().peekable();
        while writes.peek().is_some() {
            let chunk: Vec<WriteRequest> = writes.by_ref().take(BATCH_WRITE_CHUNK).collect();
            self.store.batch_write(chunk).await?;
        }
        Ok(())
    }

    pub fn encode_pagination_token(&self, cursor: Option<&Cursor>) -> Option<String> {
        encode_pagination_token(cursor)
    }

    pub fn decode_pagination_token(&self, token: &str) -> Option<Cursor> {
        decode_pagination_token(token)
    }

    async fn read_page(&self, plan: &AccessPlan) -> Result<Page> {
        match plan {
            AccessPlan::Query(query) => self.store.query(query).await,
            AccessPlan::Scan(scan) => self.store.scan(scan).await,
        }
    }
}

fn resume(plan: &mut AccessPlan, cursor: Cursor) {
    match plan {
        AccessPlan::Query(query) => query.cursor = Some(cursor),
        AccessPlan::Scan(scan) => scan.cursor = Some(cursor),
    }
}
