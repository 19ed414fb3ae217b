//! Partial-update expressions.
//!
//! [`UpdateExpression::from_fields`] turns a field map into `SET` assignments.
//! Identity and key attributes are dropped, and `updatedAt` is always assigned
//! by the builder. Key attributes only enter an update through
//! [`UpdateExpression::set_index_key`], which entity modules call when the
//! natural key an index is derived from has changed.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::item::{Item, ENTITY_TYPE, ID, UPDATED_AT};
use super::keys::{self, IndexKey, IndexName};

/// Attributes a field map can never assign.
pub const PROTECTED_ATTRIBUTES: [&str; 8] = [
    ID,
    ENTITY_TYPE,
    keys::PK,
    keys::SK,
    keys::GSI1PK,
    keys::GSI1SK,
    keys::GSI2PK,
    keys::GSI2SK,
];

/// True when the attribute is an identity or key attribute.
pub fn is_protected(attribute: &str) -> bool {
    PROTECTED_ATTRIBUTES.contains(&attribute)
}

/// One `attribute = value` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub attribute: String,
    pub value: Value,
}

/// A `SET` mutation with its placeholder maps.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    assignments: Vec<Assignment>,
}

impl UpdateExpression {
    /// Build an update from a partial field map, stamped with `now`.
    pub fn from_fields(fields: Item, now: DateTime<Utc>) -> Self {
        let mut assignments: Vec<Assignment> = fields
            .into_iter()
            .filter(|(attribute, _)| {
                let keep = !is_protected(attribute) && attribute != UPDATED_AT;
                if !keep {
                    tracing::debug!(attribute = %attribute, "Dropping protected attribute from update");
                }
                keep
            })
            .map(|(attribute, value)| Assignment { attribute, value })
            .collect();

        assignments.push(Assignment {
            attribute: UPDATED_AT.to_string(),
            value: Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        });

        Self { assignments }
    }

    /// Assign a recomputed index key pair.
    pub fn set_index_key(&mut self, index: IndexName, key: &IndexKey) {
        self.assign(index.partition_attribute(), Value::String(key.pk.clone()));
        self.assign(index.sort_attribute(), Value::String(key.sk.clone()));
    }

    fn assign(&mut self, attribute: &str, value: Value) {
        self.assignments.retain(|a| a.attribute != attribute);
        self.assignments.push(Assignment {
            attribute: attribute.to_string(),
            value,
        });
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// True when the update assigns this attribute.
    pub fn assigns(&self, attribute: &str) -> bool {
        self.assignments.iter().any(|a| a.attribute == attribute)
    }

    /// The `SET` clause, e.g. `SET #u0 = :u0, #u1 = :u1`.
    pub fn expression(&self) -> String {
        let clauses: Vec<String> = (0..self.assignments.len())
            .map(|i| format!("#u{i} = :u{i}"))
            .collect();
        format!("SET {}", clauses.join(", "))
    }

    /// `#uN` -> attribute name.
    pub fn attribute_names(&self) -> BTreeMap<String, String> {
        self.assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (format!("#u{i}"), a.attribute.clone()))
            .collect()
    }

    /// `:uN` -> value.
    pub fn attribute_values(&self) -> BTreeMap<String, Value> {
        self.assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (format!(":u{i}"), a.value.clone()))
            .collect()
    }

    /// Apply the assignments to an item in place.
    pub fn apply(&self, item: &mut Item) {
        for assignment in &self.assignments {
            item.insert(assignment.attribute.clone(), assignment.value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_builds_set_clause_with_timestamp() {
        let update = UpdateExpression::from_fields(fields(&[("title", json!("New"))]), now());

        assert_eq!(update.expression(), "SET #u0 = :u0, #u1 = :u1");
        let names = update.attribute_names();
        assert_eq!(names.get("#u0").unwrap(), "title");
        assert_eq!(names.get("#u1").unwrap(), "updatedAt");
        let values = update.attribute_values();
        assert_eq!(values.get(":u0").unwrap(), &json!("New"));
        assert_eq!(
            values.get(":u1").unwrap(),
            &json!("2024-06-15T10:30:00.000Z")
        );
    }

    #[test]
    fn test_identity_and_key_fields_are_dropped() {
        let mut input = fields(&[("status", json!("done"))]);
        for attribute in PROTECTED_ATTRIBUTES {
            input.insert(attribute.to_string(), json!("tampered"));
        }

        let update = UpdateExpression::from_fields(input, now());

        for attribute in PROTECTED_ATTRIBUTES {
            assert!(!update.assigns(attribute), "{attribute} leaked into update");
        }
        assert!(update.assigns("status"));
        assert!(update.assigns(UPDATED_AT));
        assert_eq!(update.assignments().len(), 2);
    }

    #[test]
    fn test_caller_cannot_choose_updated_at() {
        let update = UpdateExpression::from_fields(
            fields(&[("updatedAt", json!("1999-01-01T00:00:00Z"))]),
            now(),
        );

        assert_eq!(update.assignments().len(), 1);
        assert_eq!(
            update.assignments()[0].value,
            json!("2024-06-15T10:30:00.000Z")
        );
    }

    #[test]
    fn test_empty_field_map_still_stamps_timestamp() {
        let update = UpdateExpression::from_fields(Item::new(), now());
        assert_eq!(update.expression(), "SET #u0 = :u0");
        assert!(update.assigns(UPDATED_AT));
    }

    #[test]
    fn test_set_index_key_is_the_only_key_path() {
        let mut update =
            UpdateExpression::from_fields(fields(&[("email", json!("new@example.com"))]), now());
        update.set_index_key(
            IndexName::Gsi1,
            &IndexKey {
                pk: "EMAIL#new@example.com".to_string(),
                sk: "2024-01-01T00:00:00.000Z".to_string(),
            },
        );

        assert!(update.assigns(keys::GSI1PK));
        assert!(update.assigns(keys::GSI1SK));
        assert!(!update.assigns(keys::GSI2PK));
        assert!(!update.assigns(keys::PK));
    }

    #[test]
    fn test_apply_overwrites_only_assigned_attributes() {
        let mut item = fields(&[
            ("title", json!("Old")),
            ("status", json!("todo")),
            ("PK", json!("PROJECT#p1")),
        ]);
        let update = UpdateExpression::from_fields(
            fields(&[("title", json!("New")), ("PK", json!("PROJECT#p2"))]),
            now(),
        );

        update.apply(&mut item);

        assert_eq!(item.get("title").unwrap(), &json!("New"));
        assert_eq!(item.get("status").unwrap(), &json!("todo"));
        assert_eq!(item.get("PK").unwrap(), &json!("PROJECT#p1"));
        assert_eq!(
            item.get("updatedAt").unwrap(),
            &json!("2024-06-15T10:30:00.000Z")
        );
    }
}
