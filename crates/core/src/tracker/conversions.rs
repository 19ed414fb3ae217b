//! Entity <-> item conversion functions.
//!
//! Pure functions that attach the key attributes of the single-table layout
//! to an entity's serialized fields, and read entities back out of items.
//! Testable in isolation without a store.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::storage::item::{
    self, get_str, set_entity_kind, set_index_key, set_primary_key, PASSWORD_HASH,
};
use crate::storage::{keys, EntityKind, IndexName, Item, RepositoryError, Result};

use super::types::{Account, AccountCredentials, Issue, Project};

fn fields_of<T: Serialize>(entity: &T) -> Result<Item> {
    match serde_json::to_value(entity)? {
        Value::Object(fields) => Ok(fields),
        other => Err(RepositoryError::Serialization(format!(
            "entity serialized to {other}, expected an object"
        ))),
    }
}

fn entity_from<T: DeserializeOwned>(item: &Item, kind: EntityKind) -> Result<T> {
    if let Some(found) = item::entity_kind_of(item) {
        if found != kind {
            return Err(RepositoryError::InvalidData(format!(
                "expected {} item, found {}",
                kind.as_str(),
                found.as_str()
            )));
        }
    }
    serde_json::from_value(Value::Object(item::public_view(item)))
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid {} item: {e}", kind.name())))
}

// ============================================================================
// Account conversions
// ============================================================================

/// Convert an Account (and optionally its password hash) to an item.
pub fn account_to_item(account: &Account, password_hash: Option<&str>) -> Result<Item> {
    let id = account.id.to_string();
    let mut item = fields_of(account)?;

    set_primary_key(&mut item, &keys::account_key(&id)?);
    set_index_key(
        &mut item,
        IndexName::Gsi1,
        &keys::account_email_index(&account.email, &account.created_at)?,
    );
    set_entity_kind(&mut item, EntityKind::Account);
    if let Some(hash) = password_hash {
        item.insert(PASSWORD_HASH.to_string(), Value::String(hash.to_string()));
    }

    Ok(item)
}

/// Convert an item to an Account. Secret attributes are never read.
pub fn item_to_account(item: &Item) -> Result<Account> {
    entity_from(item, EntityKind::Account)
}

/// Read the credentials stored on an account item, if any.
pub fn item_to_credentials(item: &Item) -> Result<Option<AccountCredentials>> {
    let Some(hash) = get_str(item, PASSWORD_HASH) else {
        return Ok(None);
    };
    let account_id = get_uuid(item, item::ID)?;
    Ok(Some(AccountCredentials {
        account_id,
        password_hash: hash.to_string(),
    }))
}

// ============================================================================
// Project conversions
// ============================================================================

/// Convert a Project to an item.
pub fn project_to_item(project: &Project) -> Result<Item> {
    let id = project.id.to_string();
    let mut item = fields_of(project)?;

    set_primary_key(&mut item, &keys::project_key(&id)?);
    set_index_key(
        &mut item,
        IndexName::Gsi1,
        &keys::project_short_key_index(&project.key, &project.created_at)?,
    );
    set_index_key(
        &mut item,
        IndexName::Gsi2,
        &keys::project_creator_index(&project.created_by.to_string(), &project.created_at)?,
    );
    set_entity_kind(&mut item, EntityKind::Project);

    Ok(item)
}

/// Convert an item to a Project.
pub fn item_to_project(item: &Item) -> Result<Project> {
    entity_from(item, EntityKind::Project)
}

// ============================================================================
// Issue conversions
// ============================================================================

/// Convert an Issue to an item.
pub fn issue_to_item(issue: &Issue) -> Result<Item> {
    let project_id = issue.project_id.to_string();
    let mut item = fields_of(issue)?;

    set_primary_key(
        &mut item,
        &keys::issue_key(&project_id, &issue.id.to_string())?,
    );
    set_index_key(
        &mut item,
        IndexName::Gsi1,
        &keys::issue_creator_index(&issue.created_by.to_string(), &issue.created_at)?,
    );
    set_index_key(
        &mut item,
        IndexName::Gsi2,
        &keys::issue_project_index(&project_id, &issue.key)?,
    );
    set_entity_kind(&mut item, EntityKind::Issue);

    Ok(item)
}

/// Convert an item to an Issue.
pub fn item_to_issue(item: &Item) -> Result<Issue> {
    entity_from(item, EntityKind::Issue)
}

// ============================================================================
// Issue-key reservations
// ============================================================================

/// The record that claims a human key inside a project.
pub fn reservation_to_item(
    project_id: &str,
    human_key: &str,
    reserved_at: &DateTime<Utc>,
) -> Result<Item> {
    let mut item = Item::new();
    set_primary_key(&mut item, &keys::issue_key_reservation(project_id, human_key)?);
    set_entity_kind(&mut item, EntityKind::IssueKey);
    // A reservation is identified by the key it claims.
    item.insert(item::ID.to_string(), Value::String(human_key.to_string()));
    item.insert("projectId".to_string(), Value::String(project_id.to_string()));
    item.insert("key".to_string(), Value::String(human_key.to_string()));
    let reserved_at = Value::String(crate::serde::format_timestamp(reserved_at));
    item.insert(item::CREATED_AT.to_string(), reserved_at.clone());
    item.insert(item::UPDATED_AT.to_string(), reserved_at);
    Ok(item)
}

// ============================================================================
// Helpers
// ============================================================================

fn get_uuid(item: &Item, attribute: &str) -> Result<Uuid> {
    let value = get_str(item, attribute)
        .ok_or_else(|| RepositoryError::InvalidData(format!("Missing field: {attribute}")))?;
    Uuid::parse_str(value)
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid UUID for {attribute}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::types::{IssuePriority, IssueStatus, IssueType};
    use chrono::TimeZone;
    use serde_json::json;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
    }

    fn issue() -> Issue {
        Issue {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            key: "ENG-1001".to_string(),
            title: "Fix login".to_string(),
            description: None,
            status: IssueStatus::Todo,
            priority: IssuePriority::High,
            issue_type: IssueType::Bug,
            assignee_id: None,
            story_points: Some(3),
            created_by: Uuid::new_v4(),
            created_at: created(),
            updated_at: created(),
        }
    }

    #[test]
    fn test_account_item_layout() {
        let mut account = Account::new("ada@example.com", "Ada");
        account.created_at = created();
        let item = account_to_item(&account, Some("hash")).unwrap();

        let id = account.id.to_string();
        assert_eq!(get_str(&item, "PK"), Some(format!("ACCOUNT#{id}").as_str()));
        assert_eq!(get_str(&item, "SK"), Some(format!("ACCOUNT#{id}").as_str()));
        assert_eq!(get_str(&item, "GSI1PK"), Some("EMAIL#ada@example.com"));
        assert_eq!(get_str(&item, "GSI1SK"), Some("2024-06-15T10:30:00.000Z"));
        assert_eq!(get_str(&item, "entityType"), Some("ACCOUNT"));
        assert_eq!(get_str(&item, "passwordHash"), Some("hash"));
        assert!(!item.contains_key("GSI2PK"));
    }

    #[test]
    fn test_account_round_trip_hides_credentials() {
        let account = Account::new("ada@example.com", "Ada");
        let item = account_to_item(&account, Some("hash")).unwrap();

        let parsed = item_to_account(&item).unwrap();
        assert_eq!(parsed.id, account.id);
        assert_eq!(parsed.email, account.email);

        let credentials = item_to_credentials(&item).unwrap().unwrap();
        assert_eq!(credentials.account_id, account.id);
        assert_eq!(credentials.password_hash, "hash");
    }

    #[test]
    fn test_account_without_password_has_no_credentials() {
        let item = account_to_item(&Account::new("b@example.com", "B"), None).unwrap();
        assert!(item_to_credentials(&item).unwrap().is_none());
    }

    #[test]
    fn test_project_item_layout() {
        let creator = Uuid::new_v4();
        let mut project = Project::new("ENG", "Engineering", creator);
        project.created_at = created();
        project.updated_at = created();
        let item = project_to_item(&project).unwrap();

        assert_eq!(get_str(&item, "GSI1PK"), Some("KEY#ENG"));
        assert_eq!(
            get_str(&item, "GSI2PK"),
            Some(format!("ACCOUNT#{creator}").as_str())
        );
        assert_eq!(get_str(&item, "GSI2SK"), Some("2024-06-15T10:30:00.000Z"));
        assert_eq!(item_to_project(&item).unwrap(), project);
    }

    #[test]
    fn test_issue_item_layout() {
        let issue = issue();
        let item = issue_to_item(&issue).unwrap();

        assert_eq!(
            get_str(&item, "PK"),
            Some(format!("PROJECT#{}", issue.project_id).as_str())
        );
        assert_eq!(
            get_str(&item, "SK"),
            Some(format!("ISSUE#{}", issue.id).as_str())
        );
        assert_eq!(
            get_str(&item, "GSI1PK"),
            Some(format!("ACCOUNT#{}", issue.created_by).as_str())
        );
        assert_eq!(get_str(&item, "GSI2SK"), Some("ISSUE#ENG-1001"));
        assert_eq!(item.get("issueType").unwrap(), &json!("bug"));
        assert_eq!(item_to_issue(&item).unwrap(), issue);
    }

    #[test]
    fn test_item_of_wrong_kind_is_rejected() {
        let item = issue_to_item(&issue()).unwrap();
        assert!(matches!(
            item_to_project(&item),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_malformed_item_is_invalid_data() {
        let mut item = issue_to_item(&issue()).unwrap();
        item.insert("status".to_string(), json!("archived"));
        assert!(matches!(
            item_to_issue(&item),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_reservation_item_layout() {
        let item = reservation_to_item("p1", "ENG-1001", &created()).unwrap();
        assert_eq!(get_str(&item, "PK"), Some("PROJECT#p1"));
        assert_eq!(get_str(&item, "SK"), Some("ISSUEKEY#ENG-1001"));
        assert_eq!(get_str(&item, "entityType"), Some("ISSUE_KEY"));
        assert_eq!(get_str(&item, "id"), Some("ENG-1001"));
        assert_eq!(get_str(&item, "createdAt"), Some("2024-06-15T10:30:00.000Z"));
        assert_eq!(get_str(&item, "updatedAt"), get_str(&item, "createdAt"));
        assert!(!item.contains_key("GSI1PK"));
    }
}
