//! DynamoDB attribute conversion functions.
//!
//! Pure functions between the JSON item representation of
//! `issuetrack_core` and DynamoDB `AttributeValue` maps. These are testable
//! in isolation without DynamoDB access.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::AttributeValue;
use issuetrack_core::storage::{keys, Cursor, Item, PrimaryKey, RepositoryError, Result};
use serde_json::{Number, Value};

/// Convert a JSON value to an attribute value.
pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attributes(map)),
    }
}

/// Convert an attribute value to a JSON value.
///
/// String and number sets become arrays. Binary attributes are rejected.
pub fn from_attribute(attribute: &AttributeValue) -> Result<Value> {
    Ok(match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_attributes(map)?),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(RepositoryError::InvalidData(format!(
                "Unsupported attribute value: {other:?}"
            )))
        }
    })
}

fn parse_number(n: &str) -> Result<Number> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid number attribute: {n}")))
}

/// Convert an item to a DynamoDB attribute map.
pub fn to_attributes(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

/// Convert a DynamoDB attribute map to an item.
pub fn from_attributes(attributes: &HashMap<String, AttributeValue>) -> Result<Item> {
    attributes
        .iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect()
}

/// Attribute map addressing an item by its primary key.
pub fn key_attributes(key: &PrimaryKey) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (keys::PK.to_string(), AttributeValue::S(key.pk.clone())),
        (keys::SK.to_string(), AttributeValue::S(key.sk.clone())),
    ])
}

/// `LastEvaluatedKey` -> cursor.
pub fn cursor_from_attributes(
    attributes: Option<HashMap<String, AttributeValue>>,
) -> Result<Option<Cursor>> {
    match attributes {
        Some(map) if !map.is_empty() => Ok(Some(Cursor::new(from_attributes(&map)?))),
        _ => Ok(None),
    }
}

/// Cursor -> `ExclusiveStartKey`.
pub fn cursor_to_attributes(cursor: Option<&Cursor>) -> Option<HashMap<String, AttributeValue>> {
    cursor.map(|c| to_attributes(c.as_item()))
}

/// Placeholder value maps as attribute maps.
pub fn value_placeholders(values: &BTreeMap<String, Value>) -> HashMap<String, AttributeValue> {
    values
        .iter()
        .map(|(placeholder, value)| (placeholder.clone(), to_attribute(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_scalars_convert_both_ways() {
        assert_eq!(to_attribute(&json!("ENG")), AttributeValue::S("ENG".to_string()));
        assert_eq!(to_attribute(&json!(5)), AttributeValue::N("5".to_string()));
        assert_eq!(to_attribute(&json!(true)), AttributeValue::Bool(true));
        assert_eq!(to_attribute(&Value::Null), AttributeValue::Null(true));

        assert_eq!(
            from_attribute(&AttributeValue::N("-12".to_string())).unwrap(),
            json!(-12)
        );
        assert_eq!(
            from_attribute(&AttributeValue::N("1.5".to_string())).unwrap(),
            json!(1.5)
        );
    }

    #[test]
    fn test_nested_item_survives_conversion() {
        let original = item(json!({
            "PK": "PROJECT#p1",
            "SK": "ISSUE#i1",
            "storyPoints": 8,
            "labels": ["ui", "bug"],
            "meta": { "source": "import", "reopened": false }
        }));

        let converted = from_attributes(&to_attributes(&original)).unwrap();
        assert_eq!(converted, original);
    }

    #[test]
    fn test_sets_become_arrays() {
        let value = from_attribute(&AttributeValue::Ss(vec!["a".to_string(), "b".to_string()]))
            .unwrap();
        assert_eq!(value, json!(["a", "b"]));

        let value =
            from_attribute(&AttributeValue::Ns(vec!["1".to_string(), "2".to_string()])).unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn test_invalid_number_is_invalid_data() {
        let result = from_attribute(&AttributeValue::N("twelve".to_string()));
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }

    #[test]
    fn test_key_attributes() {
        let key = PrimaryKey::new("ACCOUNT#a1", "ACCOUNT#a1");
        let attributes = key_attributes(&key);
        assert_eq!(attributes.len(), 2);
        assert_eq!(
            attributes.get("PK"),
            Some(&AttributeValue::S("ACCOUNT#a1".to_string()))
        );
    }

    #[test]
    fn test_empty_last_evaluated_key_is_no_cursor() {
        assert_eq!(cursor_from_attributes(None).unwrap(), None);
        assert_eq!(cursor_from_attributes(Some(HashMap::new())).unwrap(), None);

        let cursor = cursor_from_attributes(Some(HashMap::from([(
            "PK".to_string(),
            AttributeValue::S("PROJECT#p1".to_string()),
        )])))
        .unwrap()
        .unwrap();
        assert_eq!(cursor.as_item().get("PK"), Some(&json!("PROJECT#p1")));
        assert!(cursor_to_attributes(Some(&cursor)).is_some());
    }
}
