//! Backend-neutral item representation.
//!
//! An item is a JSON object. Backends translate it to their native attribute
//! format (see the DynamoDB conversions in the `issuetrack` crate).

use serde_json::Value;

use super::keys::{self, EntityKind, IndexKey, IndexName, PrimaryKey};
use super::{RepositoryError, Result};

/// A stored item: attribute name to value.
pub type Item = serde_json::Map<String, Value>;

pub const ENTITY_TYPE: &str = "entityType";
pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const PASSWORD_HASH: &str = "passwordHash";

/// Attributes only visible inside the authentication boundary.
pub const SECRET_ATTRIBUTES: [&str; 1] = [PASSWORD_HASH];

/// Write the primary key attributes.
pub fn set_primary_key(item: &mut Item, key: &PrimaryKey) {
    item.insert(keys::PK.to_string(), Value::String(key.pk.clone()));
    item.insert(keys::SK.to_string(), Value::String(key.sk.clone()));
}

/// Write the key attributes of a secondary index.
pub fn set_index_key(item: &mut Item, index: IndexName, key: &IndexKey) {
    item.insert(
        index.partition_attribute().to_string(),
        Value::String(key.pk.clone()),
    );
    item.insert(
        index.sort_attribute().to_string(),
        Value::String(key.sk.clone()),
    );
}

/// Write the `entityType` attribute.
pub fn set_entity_kind(item: &mut Item, kind: EntityKind) {
    item.insert(
        ENTITY_TYPE.to_string(),
        Value::String(kind.as_str().to_string()),
    );
}

/// Get a string attribute, if present.
pub fn get_str<'a>(item: &'a Item, attribute: &str) -> Option<&'a str> {
    item.get(attribute).and_then(Value::as_str)
}

/// Read the primary key of an item.
pub fn primary_key_of(item: &Item) -> Result<PrimaryKey> {
    let pk = get_str(item, keys::PK)
        .ok_or_else(|| RepositoryError::InvalidData("Item is missing PK".to_string()))?;
    let sk = get_str(item, keys::SK)
        .ok_or_else(|| RepositoryError::InvalidData("Item is missing SK".to_string()))?;
    Ok(PrimaryKey::new(pk, sk))
}

/// Read the index key of an item, if the item is projected into that index.
pub fn index_key_of(item: &Item, index: IndexName) -> Option<IndexKey> {
    let pk = get_str(item, index.partition_attribute())?;
    let sk = get_str(item, index.sort_attribute())?;
    Some(IndexKey {
        pk: pk.to_string(),
        sk: sk.to_string(),
    })
}

/// Entity kind recorded on the item.
pub fn entity_kind_of(item: &Item) -> Option<EntityKind> {
    get_str(item, ENTITY_TYPE).and_then(EntityKind::parse)
}

/// Copy of the item without key or secret attributes.
///
/// This is the projection handed to callers outside the identity boundary.
pub fn public_view(item: &Item) -> Item {
    item.iter()
        .filter(|(name, _)| {
            !keys::KEY_ATTRIBUTES.contains(&name.as_str())
                && !SECRET_ATTRIBUTES.contains(&name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
