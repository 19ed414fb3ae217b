//! Query routing.
//!
//! [`route`] picks the access path from the keys the caller knows:
//!
//! - a partition key is known: an indexed range query on that partition, with
//!   the remaining filters applied to each page after it is read;
//! - nothing is known: a full-table scan with every filter (and the entity
//!   kind) as the scan predicate.
//!
//! The scan is the degraded path. It reads every partition, so callers that
//! list across tenants must authorize the caller before routing here.
//!
//! Naming an index or a sort-key condition without a partition key is a caller
//! bug and fails with `UnroutableQuery`.

use super::item::ENTITY_TYPE;
use super::keys::{EntityKind, IndexName};
use super::pagination::decode_pagination_token;
use super::predicate::{Field, Predicate};
use super::traits::{QueryRequest, ScanRequest, SortKeyCondition};
use super::{RepositoryError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Bounds applied to requested page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
    pub default: u32,
    pub max: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            default: DEFAULT_PAGE_SIZE,
            max: MAX_PAGE_SIZE,
        }
    }
}

impl PageSizes {
    /// Resolve a requested page size into the `[1, max]` range.
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        let max = self.max.max(1);
        requested.unwrap_or(self.default).clamp(1, max)
    }
}

/// Keys of the partition being read, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownKeys {
    pub partition_key: Option<String>,
    pub sort_key: Option<SortKeyCondition>,
}

/// Everything the router needs to choose an access path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessRequest {
    pub entity: Option<EntityKind>,
    pub known: KnownKeys,
    pub filters: Vec<Predicate>,
    pub index: Option<IndexName>,
    pub cursor_token: Option<String>,
    pub page_size: Option<u32>,
    pub consistent: bool,
    pub descending: bool,
}

impl AccessRequest {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity: Some(entity),
            ..Self::default()
        }
    }

    pub fn partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.known.partition_key = Some(partition_key.into());
        self
    }

    pub fn sort_key(mut self, condition: SortKeyCondition) -> Self {
        self.known.sort_key = Some(condition);
        self
    }

    pub fn index(mut self, index: IndexName) -> Self {
        self.index = Some(index);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.filters.extend(predicates);
        self
    }

    pub fn cursor_token(mut self, token: Option<String>) -> Self {
        self.cursor_token = token;
        self
    }

    pub fn page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent = consistent;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }
}

/// The access path chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPlan {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl AccessPlan {
    pub fn is_scan(&self) -> bool {
        matches!(self, AccessPlan::Scan(_))
    }
}

/// Choose between an indexed query and a scan.
pub fn route(request: AccessRequest, page_sizes: PageSizes) -> Result<AccessPlan> {
    let limit = page_sizes.resolve(request.page_size);
    let cursor = request
        .cursor_token
        .as_deref()
        .and_then(decode_pagination_token);

    match request.known.partition_key {
        Some(partition_key) if partition_key.trim().is_empty() => Err(
            RepositoryError::UnroutableQuery("partition key must not be empty".to_string()),
        ),
        Some(partition_key) => {
            tracing::debug!(
                index = request.index.map(|i| i.as_str()).unwrap_or("table"),
                partition_key = %partition_key,
                limit,
                "Routing to indexed query"
            );
            Ok(AccessPlan::Query(QueryRequest {
                index: request.index,
                partition_key,
                sort_key: request.known.sort_key,
                filters: request.filters,
                limit,
                cursor,
                consistent: request.consistent,
                descending: request.descending,
            }))
        }
        None => {
            if let Some(index) = request.index {
                return Err(RepositoryError::UnroutableQuery(format!(
                    "{} requires a partition key",
                    index.as_str()
                )));
            }
            if request.known.sort_key.is_some() {
                return Err(RepositoryError::UnroutableQuery(
                    "a sort-key condition requires a partition key".to_string(),
                ));
            }

            let mut filters = Vec::with_capacity(request.filters.len() + 1);
            if let Some(entity) = request.entity {
                filters.push(Field::from_static(ENTITY_TYPE).equals(entity.as_str()));
            }
            filters.extend(request.filters);

            tracing::debug!(
                entity = request.entity.map(|e| e.as_str()).unwrap_or("any"),
                filters = filters.len(),
                limit,
                "No partition key known, routing to scan"
            );
            Ok(AccessPlan::Scan(ScanRequest {
                filters,
                limit,
                cursor,
            }))
        }
    }
}
