//! Single-table data-access layer.
//!
//! Every entity lives in one table addressed by `PK`/`SK` plus two secondary
//! indexes. Entity modules never talk to a backend directly: they build keys
//! with [`keys`], go through the [`Repository`] façade, and the façade routes
//! each read to an indexed query or a scan.

mod error;
mod http_mapping;
pub mod item;
pub mod keys;
mod memory;
mod pagination;
mod predicate;
mod repository;
mod router;
mod traits;
mod update;

pub use error::{RepositoryError, Result};
pub use http_mapping::repository_error_to_status_code;
pub use item::{public_view, Item};
pub use keys::{EntityKind, IndexKey, IndexName, NaturalKey, PrimaryKey};
pub use memory::InMemoryStore;
pub use pagination::{decode_pagination_token, encode_pagination_token, Cursor};
pub use predicate::{compile_filter, matches_all, Comparator, Field, FilterExpression, Predicate};
pub use repository::{
    BatchWriteMode, ListPage, QueryOptions, Repository, ScanOptions, BATCH_GET_CHUNK,
    BATCH_WRITE_CHUNK,
};
pub use router::{
    route, AccessPlan, AccessRequest, KnownKeys, PageSizes, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use traits::{
    ItemStore, Page, PutCondition, QueryRequest, ScanRequest, SortKeyCondition, WriteRequest,
};
pub use update::{is_protected, Assignment, UpdateExpression, PROTECTED_ATTRIBUTES};
