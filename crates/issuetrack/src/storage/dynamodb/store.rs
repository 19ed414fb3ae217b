//! DynamoDB item store.
//!
//! Implements [`ItemStore`] on one table. Filter predicates and update
//! expressions arrive already compiled to placeholder form, so no caller
//! value is ever spliced into an expression string.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, KeysAndAttributes, PutRequest, ReturnValue,
    WriteRequest as DynamoWriteRequest,
};
use aws_sdk_dynamodb::Client;

use issuetrack_core::storage::item::{entity_kind_of, primary_key_of};
use issuetrack_core::storage::{
    compile_filter, keys, Item, ItemStore, Page, PrimaryKey, PutCondition, QueryRequest,
    RepositoryError, Result, ScanRequest, SortKeyCondition, UpdateExpression, WriteRequest,
};

use super::conversions::{
    cursor_from_attributes, cursor_to_attributes, from_attributes, key_attributes,
    to_attributes, value_placeholders,
};
use super::error::{
    map_batch_get_error, map_batch_write_error, map_delete_item_error, map_get_item_error,
    map_put_item_error, map_query_error, map_scan_error, map_update_item_error, unprocessed,
};

/// DynamoDB-based item store.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
}

impl DynamoDbStore {
    /// Creates a new store with the given DynamoDB client and table name.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

/// Key condition, names and values of a range query.
#[derive(Debug, Clone, PartialEq)]
struct KeyCondition {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn key_condition(request: &QueryRequest) -> KeyCondition {
    let (partition_attribute, sort_attribute) = keys::key_attributes(request.index);
    let mut names = HashMap::from([("#pk".to_string(), partition_attribute.to_string())]);
    let mut values = HashMap::from([(
        ":pk".to_string(),
        AttributeValue::S(request.partition_key.clone()),
    )]);

    let expression = match &request.sort_key {
        None => "#pk = :pk".to_string(),
        Some(condition) => {
            names.insert("#sk".to_string(), sort_attribute.to_string());
            let (clause, value) = match condition {
                SortKeyCondition::Equals(value) => ("#pk = :pk AND #sk = :sk", value),
                SortKeyCondition::BeginsWith(prefix) => {
                    ("#pk = :pk AND begins_with(#sk, :sk)", prefix)
                }
            };
            values.insert(":sk".to_string(), AttributeValue::S(value.clone()));
            clause.to_string()
        }
    };

    KeyCondition {
        expression,
        names,
        values,
    }
}

/// Entity type and id for error messages about an item.
fn describe(item: &Item) -> (&'static str, String) {
    let entity_type = entity_kind_of(item).map_or("Item", |kind| kind.name());
    let id = primary_key_of(item)
        .map(|key| format!("{}/{}", key.pk, key.sk))
        .unwrap_or_default();
    (entity_type, id)
}

fn limit(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl ItemStore for DynamoDbStore {
    async fn get_item(&self, key: &PrimaryKey, consistent: bool) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)))
            .consistent_read(consistent)
            .send()
            .await
            .map_err(map_get_item_error)?;

        result.item.as_ref().map(from_attributes).transpose()
    }

    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<()> {
        let (entity_type, id) = describe(&item);
        primary_key_of(&item)?;

        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_attributes(&item)));
        request = match condition {
            PutCondition::None => request,
            PutCondition::NotExists => request.condition_expression("attribute_not_exists(PK)"),
            PutCondition::Exists => request.condition_expression("attribute_exists(PK)"),
        };

        request
            .send()
            .await
            .map_err(|e| map_put_item_error(e, condition, entity_type, id))?;

        Ok(())
    }

    async fn update_item(&self, key: &PrimaryKey, update: &UpdateExpression) -> Result<Item> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)))
            .update_expression(update.expression())
            .set_expression_attribute_names(Some(update.attribute_names().into_iter().collect()))
            .set_expression_attribute_values(Some(value_placeholders(&update.attribute_values())))
            .condition_expression("attribute_exists(PK)")
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_update_item_error(e, "Item", format!("{}/{}", key.pk, key.sk)))?;

        match result.attributes {
            Some(attributes) => from_attributes(&attributes),
            None => Err(RepositoryError::InvalidData(
                "UpdateItem returned no attributes".to_string(),
            )),
        }
    }

    async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)))
            .send()
            .await
            .map_err(map_delete_item_error)?;

        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Page> {
        let KeyCondition {
            expression,
            mut names,
            mut values,
        } = key_condition(request);

        let filter = compile_filter(&request.filters);
        if let Some(filter) = &filter {
            names.extend(filter.names.clone());
            values.extend(value_placeholders(&filter.values));
        }

        tracing::debug!(
            table = %self.table_name,
            index = request.index.map(|i| i.as_str()),
            filter = filter.as_ref().map(|f| f.expression.as_str()),
            "DynamoDB query"
        );

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .set_index_name(request.index.map(|i| i.as_str().to_string()))
            .key_condition_expression(expression)
            .set_filter_expression(filter.map(|f| f.expression))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .limit(limit(request.limit))
            .set_exclusive_start_key(cursor_to_attributes(request.cursor.as_ref()))
            .consistent_read(request.consistent && request.index.is_none())
            .scan_index_forward(!request.descending)
            .send()
            .await
            .map_err(map_query_error)?;

        let items = result
            .items
            .unwrap_or_default()
            .iter()
            .map(from_attributes)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            cursor: cursor_from_attributes(result.last_evaluated_key)?,
        })
    }

    async fn scan(&self, request: &ScanRequest) -> Result<Page> {
        let filter = compile_filter(&request.filters);

        tracing::debug!(
            table = %self.table_name,
            filter = filter.as_ref().map(|f| f.expression.as_str()),
            "DynamoDB scan"
        );

        let mut scan = self
            .client
            .scan()
            .table_name(&self.table_name)
            .limit(limit(request.limit))
            .set_exclusive_start_key(cursor_to_attributes(request.cursor.as_ref()));
        if let Some(filter) = filter {
            scan = scan
                .filter_expression(filter.expression)
                .set_expression_attribute_names(Some(filter.names.into_iter().collect()));
            if !filter.values.is_empty() {
                scan = scan
                    .set_expression_attribute_values(Some(value_placeholders(&filter.values)));
            }
        }

        let result = scan.send().await.map_err(map_scan_error)?;

        let items = result
            .items
            .unwrap_or_default()
            .iter()
            .map(from_attributes)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            cursor: cursor_from_attributes(result.last_evaluated_key)?,
        })
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys.iter().map(key_attributes).collect()))
            .build()
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let result = self
            .client
            .batch_get_item()
            .request_items(&self.table_name, request)
            .send()
            .await
            .map_err(map_batch_get_error)?;

        let pending = result
            .unprocessed_keys
            .as_ref()
            .and_then(|unprocessed| unprocessed.get(&self.table_name))
            .map_or(0, |pending| pending.keys().len());
        if pending > 0 {
            return Err(unprocessed("BatchGetItem", pending));
        }

        result
            .responses
            .and_then(|mut responses| responses.remove(&self.table_name))
            .unwrap_or_default()
            .iter()
            .map(from_attributes)
            .collect()
    }

    async fn batch_write(&self, writes: Vec<WriteRequest>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let requests = writes
            .iter()
            .map(|write| match write {
                WriteRequest::Put(item) => PutRequest::builder()
                    .set_item(Some(to_attributes(item)))
                    .build()
                    .map(|put| DynamoWriteRequest::builder().put_request(put).build()),
                WriteRequest::Delete(key) => DeleteRequest::builder()
                    .set_key(Some(key_attributes(key)))
                    .build()
                    .map(|delete| DynamoWriteRequest::builder().delete_request(delete).build()),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let result = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(map_batch_write_error)?;

        let pending = result
            .unprocessed_items
            .as_ref()
            .and_then(|unprocessed| unprocessed.get(&self.table_name))
            .map_or(0, Vec::len);
        if pending > 0 {
            return Err(unprocessed("BatchWriteItem", pending));
        }

        Ok(())
    }
}
