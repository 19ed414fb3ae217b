//! In-memory item store.
//!
//! Mirrors the DynamoDB behaviour the repository relies on: sparse secondary
//! indexes, sort-key ordering, exclusive-start-key cursors, and a page limit
//! that is applied before filters.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::item::{entity_kind_of, get_str, primary_key_of, Item};
use super::keys::{self, IndexName, PrimaryKey};
use super::pagination::Cursor;
use super::predicate::{matches_all, Predicate};
use super::traits::{ItemStore, Page, PutCondition, QueryRequest, ScanRequest, WriteRequest};
use super::update::UpdateExpression;
use super::{RepositoryError, Result};

/// In-memory storage backend for testing and local runs.
///
/// Uses a `BTreeMap` wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and will be lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    items: Arc<RwLock<BTreeMap<PrimaryKey, Item>>>,
}

/// Position of an item inside a query: its sort key value, then its primary
/// key as a tie-breaker for index queries.
type Position = (String, PrimaryKey);

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

fn entity_label(item: &Item) -> &'static str {
    entity_kind_of(item).map(|kind| kind.name()).unwrap_or("Item")
}

/// Key attributes DynamoDB returns as `LastEvaluatedKey` for this access path.
fn cursor_for(item: &Item, index: Option<IndexName>) -> Cursor {
    let mut attributes = vec![keys::PK, keys::SK];
    if let Some(index) = index {
        attributes.push(index.partition_attribute());
        attributes.push(index.sort_attribute());
    }

    let cursor = attributes
        .into_iter()
        .filter_map(|name| item.get(name).map(|value| (name.to_string(), value.clone())))
        .collect();
    Cursor::new(cursor)
}

fn cursor_position(cursor: &Cursor, sort_attribute: &str) -> Option<Position> {
    let item = cursor.as_item();
    let sort = get_str(item, sort_attribute)?;
    let key = primary_key_of(item).ok()?;
    Some((sort.to_string(), key))
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn get_item(&self, key: &PrimaryKey, _consistent: bool) -> Result<Option<Item>> {
        let items = self.items.read().await;
        Ok(items.get(key).cloned())
    }

    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<()> {
        let key = primary_key_of(&item)?;
        let mut items = self.items.write().await;

        match condition {
            PutCondition::NotExists if items.contains_key(&key) => {
                return Err(RepositoryError::AlreadyExists {
                    entity_type: entity_label(&item),
                    id: key.to_string(),
                });
            }
            PutCondition::Exists if !items.contains_key(&key) => {
                return Err(RepositoryError::NotFound {
                    entity_type: entity_label(&item),
                    id: key.to_string(),
                });
            }
            _ => {}
        }

        items.insert(key, item);
        Ok(())
    }

    async fn update_item(&self, key: &PrimaryKey, update: &UpdateExpression) -> Result<Item> {
        let mut items = self.items.write().await;
        let item = items.get_mut(key).ok_or_else(|| RepositoryError::NotFound {
            entity_type: "Item",
            id: key.to_string(),
        })?;
        update.apply(item);
        Ok(item.clone())
    }

    async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
        let mut items = self.items.write().await;
        items.remove(key);
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Page> {
        let items = self.items.read().await;
        let (partition_attribute, sort_attribute) = keys::key_attributes(request.index);

        // Items without the index attributes are not projected into the index.
        let mut candidates: Vec<(Position, &Item)> = items
            .iter()
            .filter_map(|(key, item)| {
                let partition = get_str(item, partition_attribute)?;
                let sort = get_str(item, sort_attribute)?;
                let in_range = partition == request.partition_key
                    && request
                        .sort_key
                        .as_ref()
                        .map_or(true, |condition| condition.matches(sort));
                in_range.then(|| ((sort.to_string(), key.clone()), item))
            })
            .collect();

        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        if request.descending {
            candidates.reverse();
        }

        let start = request
            .cursor
            .as_ref()
            .and_then(|cursor| cursor_position(cursor, sort_attribute));
        let remaining: Vec<&Item> = candidates
            .into_iter()
            .filter(|(position, _)| match &start {
                None => true,
                Some(start) => {
                    let ordering = position.cmp(start);
                    if request.descending {
                        ordering == Ordering::Less
                    } else {
                        ordering == Ordering::Greater
                    }
                }
            })
            .map(|(_, item)| item)
            .collect();

        Ok(page_of(remaining, request.limit, request.index, &request.filters))
    }

    async fn scan(&self, request: &ScanRequest) -> Result<Page> {
        let items = self.items.read().await;

        let start = request
            .cursor
            .as_ref()
            .and_then(|cursor| primary_key_of(cursor.as_item()).ok());
        let remaining: Vec<&Item> = items
            .iter()
            .filter(|(key, _)| start.as_ref().map_or(true, |start| *key > start))
            .map(|(_, item)| item)
            .collect();

        Ok(page_of(remaining, request.limit, None, &request.filters))
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(keys.iter().filter_map(|key| items.get(key).cloned()).collect())
    }

    async fn batch_write(&self, writes: Vec<WriteRequest>) -> Result<()> {
        let mut items = self.items.write().await;
        for write in writes {
            match write {
                WriteRequest::Put(item) => {
                    let key = primary_key_of(&item)?;
                    items.insert(key, item);
                }
                WriteRequest::Delete(key) => {
                    items.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Take `limit` evaluated items, then filter them.
fn page_of(
    remaining: Vec<&Item>,
    limit: u32,
    index: Option<IndexName>,
    filters: &[Predicate],
) -> Page {
    let limit = limit.max(1) as usize;
    let has_more = remaining.len() > limit;
    let evaluated = &remaining[..remaining.len().min(limit)];

    let cursor = if has_more {
        evaluated.last().map(|item| cursor_for(item, index))
    } else {
        None
    };

    let items = evaluated
        .iter()
        .filter(|item| matches_all(filters, item))
        .map(|item| (*item).clone())
        .collect();

    Page { items, cursor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::item::{set_entity_kind, set_index_key, set_primary_key};
    use crate::storage::keys::{EntityKind, IndexKey};
    use crate::storage::predicate::Field;
    use crate::storage::traits::SortKeyCondition;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn issue(project: &str, n: u32, status: &str) -> Item {
        let mut item = Item::new();
        set_primary_key(
            &mut item,
            &PrimaryKey::new(format!("PROJECT#{project}"), format!("ISSUE#i{n:03}")),
        );
        set_entity_kind(&mut item, EntityKind::Issue);
        item.insert("status".to_string(), json!(status));
        item
    }

    fn query(partition_key: &str, limit: u32) -> QueryRequest {
        QueryRequest {
            index: None,
            partition_key: partition_key.to_string(),
            sort_key: Some(SortKeyCondition::BeginsWith("ISSUE#".to_string())),
            filters: Vec::new(),
            limit,
            cursor: None,
            consistent: false,
            descending: false,
        }
    }

    fn sk(item: &Item) -> &str {
        get_str(item, keys::SK).unwrap()
    }

    async fn seeded(count: u32) -> InMemoryStore {
        let store = InMemoryStore::new();
        for n in 1..=count {
            let status = if n % 2 == 0 { "done" } else { "todo" };
            store
                .put_item(issue("p1", n, status), PutCondition::None)
                .await
                .unwrap();
        }
        store
            .put_item(issue("p2", 1, "todo"), PutCondition::None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        let item = issue("p1", 1, "todo");
        store.put_item(item.clone(), PutCondition::None).await.unwrap();

        let key = PrimaryKey::new("PROJECT#p1", "ISSUE#i001");
        assert_eq!(store.get_item(&key, true).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = InMemoryStore::new();
        let key = PrimaryKey::new("PROJECT#p1", "ISSUE#missing");
        assert!(store.get_item(&key, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_without_primary_key_is_invalid_data() {
        let store = InMemoryStore::new();
        let result = store.put_item(Item::new(), PutCondition::None).await;
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_conditional_put_not_exists() {
        let store = InMemoryStore::new();
        store
            .put_item(issue("p1", 1, "todo"), PutCondition::NotExists)
            .await
            .unwrap();

        let result = store
            .put_item(issue("p1", 1, "done"), PutCondition::NotExists)
            .await;
        assert!(matches!(
            result,
            Err(RepositoryError::AlreadyExists {
                entity_type: "Issue",
                ..
            })
        ));

        let stored = store
            .get_item(&PrimaryKey::new("PROJECT#p1", "ISSUE#i001"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("status").unwrap(), &json!("todo"));
    }

    #[tokio::test]
    async fn test_conditional_put_exists() {
        let store = InMemoryStore::new();
        let result = store
            .put_item(issue("p1", 1, "todo"), PutCondition::Exists)
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_conditional_puts_have_one_winner() {
        let store = InMemoryStore::new();
        let (a, b) = tokio::join!(
            store.put_item(issue("p1", 1, "todo"), PutCondition::NotExists),
            store.put_item(issue("p1", 1, "done"), PutCondition::NotExists),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_update_applies_assignments() {
        let store = InMemoryStore::new();
        store
            .put_item(issue("p1", 1, "todo"), PutCondition::None)
            .await
            .unwrap();

        let mut fields = Item::new();
        fields.insert("status".to_string(), json!("done"));
        let update = UpdateExpression::from_fields(fields, Utc::now());

        let updated = store
            .update_item(&PrimaryKey::new("PROJECT#p1", "ISSUE#i001"), &update)
            .await
            .unwrap();
        assert_eq!(updated.get("status").unwrap(), &json!("done"));
        assert!(updated.contains_key("updatedAt"));
    }

    #[tokio::test]
    async fn test_update_nonexistent() {
        let store = InMemoryStore::new();
        let update = UpdateExpression::from_fields(Item::new(), Utc::now());
        let result = store
            .update_item(&PrimaryKey::new("PROJECT#p1", "ISSUE#missing"), &update)
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = seeded(1).await;
        let key = PrimaryKey::new("PROJECT#p1", "ISSUE#i001");

        store.delete_item(&key).await.unwrap();
        store.delete_item(&key).await.unwrap();

        assert!(store.get_item(&key, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_returns_partition_in_sort_order() {
        let store = seeded(3).await;

        let page = store.query(&query("PROJECT#p1", 25)).await.unwrap();

        let sks: Vec<&str> = page.items.iter().map(sk).collect();
        assert_eq!(sks, vec!["ISSUE#i001", "ISSUE#i002", "ISSUE#i003"]);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_query_descending() {
        let store = seeded(3).await;
        let mut request = query("PROJECT#p1", 25);
        request.descending = true;

        let page = store.query(&request).await.unwrap();

        let sks: Vec<&str> = page.items.iter().map(sk).collect();
        assert_eq!(sks, vec!["ISSUE#i003", "ISSUE#i002", "ISSUE#i001"]);
    }

    #[tokio::test]
    async fn test_query_pages_cover_partition_exactly_once() {
        let store = seeded(7).await;
        let mut request = query("PROJECT#p1", 3);
        let mut seen = Vec::new();
        let mut pages = 0;

        loop {
            let page = store.query(&request).await.unwrap();
            pages += 1;
            seen.extend(page.items.iter().map(|i| sk(i).to_string()));
            match page.cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen.len(), 7);
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(deduped, seen);
    }

    #[tokio::test]
    async fn test_query_limit_applies_before_filter() {
        let store = seeded(4).await;
        let mut request = query("PROJECT#p1", 2);
        request.filters = vec![Field::from_static("status").equals("done")];

        let page = store.query(&request).await.unwrap();

        // i001 (todo) and i002 (done) were evaluated, only i002 matched.
        assert_eq!(page.items.len(), 1);
        assert_eq!(sk(&page.items[0]), "ISSUE#i002");
        assert!(page.cursor.is_some());
    }

    #[tokio::test]
    async fn test_query_resumes_after_deleted_cursor_item() {
        let store = seeded(4).await;
        let page = store.query(&query("PROJECT#p1", 2)).await.unwrap();
        let cursor = page.cursor.unwrap();

        store
            .delete_item(&PrimaryKey::new("PROJECT#p1", "ISSUE#i002"))
            .await
            .unwrap();

        let mut request = query("PROJECT#p1", 2);
        request.cursor = Some(cursor);
        let page = store.query(&request).await.unwrap();

        let sks: Vec<&str> = page.items.iter().map(sk).collect();
        assert_eq!(sks, vec!["ISSUE#i003", "ISSUE#i004"]);
    }

    #[tokio::test]
    async fn test_index_query_is_sparse() {
        let store = InMemoryStore::new();
        let created = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();
        let mut indexed = issue("p1", 1, "todo");
        set_index_key(
            &mut indexed,
            IndexName::Gsi1,
            &IndexKey {
                pk: "ACCOUNT#a1".to_string(),
                sk: keys::creation_sort_key(&created),
            },
        );
        store.put_item(indexed, PutCondition::None).await.unwrap();
        store
            .put_item(issue("p1", 2, "todo"), PutCondition::None)
            .await
            .unwrap();

        let request = QueryRequest {
            index: Some(IndexName::Gsi1),
            partition_key: "ACCOUNT#a1".to_string(),
            sort_key: None,
            filters: Vec::new(),
            limit: 25,
            cursor: None,
            consistent: false,
            descending: false,
        };
        let page = store.query(&request).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(sk(&page.items[0]), "ISSUE#i001");
    }

    #[tokio::test]
    async fn test_index_cursor_carries_index_keys() {
        let store = InMemoryStore::new();
        for n in 1..=2 {
            let mut item = issue("p1", n, "todo");
            set_index_key(
                &mut item,
                IndexName::Gsi2,
                &IndexKey {
                    pk: "PROJECT#p1".to_string(),
                    sk: format!("ISSUE#ENG-{}", 1000 + n),
                },
            );
            store.put_item(item, PutCondition::None).await.unwrap();
        }

        let request = QueryRequest {
            index: Some(IndexName::Gsi2),
            partition_key: "PROJECT#p1".to_string(),
            sort_key: None,
            filters: Vec::new(),
            limit: 1,
            cursor: None,
            consistent: false,
            descending: false,
        };
        let page = store.query(&request).await.unwrap();
        let cursor = page.cursor.unwrap();

        for attribute in [keys::PK, keys::SK, keys::GSI2PK, keys::GSI2SK] {
            assert!(cursor.as_item().contains_key(attribute), "{attribute}");
        }
        assert!(!cursor.as_item().contains_key("status"));
    }

    #[tokio::test]
    async fn test_scan_pages_whole_table() {
        let store = seeded(3).await;
        let mut request = ScanRequest {
            filters: vec![Field::from_static("status").equals("todo")],
            limit: 2,
            cursor: None,
        };
        let mut matched = 0;

        loop {
            let page = store.scan(&request).await.unwrap();
            matched += page.items.len();
            match page.cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        // p1/i001, p1/i003 and p2/i001.
        assert_eq!(matched, 3);
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing() {
        let store = seeded(2).await;
        let items = store
            .batch_get(&[
                PrimaryKey::new("PROJECT#p1", "ISSUE#i001"),
                PrimaryKey::new("PROJECT#p1", "ISSUE#missing"),
                PrimaryKey::new("PROJECT#p1", "ISSUE#i002"),
            ])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_write_puts_and_deletes() {
        let store = seeded(1).await;
        store
            .batch_write(vec![
                WriteRequest::Put(issue("p3", 1, "todo")),
                WriteRequest::Delete(PrimaryKey::new("PROJECT#p1", "ISSUE#i001")),
            ])
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store
            .get_item(&PrimaryKey::new("PROJECT#p3", "ISSUE#i001"), true)
            .await
            .unwrap()
            .is_some());
    }
}
