//! Account operations.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::storage::item::PASSWORD_HASH;
use crate::storage::{
    keys, EntityKind, IndexName, Item, NaturalKey, QueryOptions, Repository, RepositoryError,
    Result, ScanOptions, UpdateExpression,
};

use super::conversions::{account_to_item, item_to_account, item_to_credentials};
use super::requests::{CreateAccountRequest, UpdateAccountRequest};
use super::types::{Account, AccountCredentials, EntityPage};
use super::{not_found, page_of};

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct AccountStore {
    repository: Repository,
}

impl AccountStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create an account. The email must not be in use.
    ///
    /// The uniqueness check and the write are two separate store calls.
    pub async fn create(&self, request: CreateAccountRequest) -> Result<Account> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.find_by_email(&email).await?.is_some() {
            return Err(RepositoryError::AlreadyExists {
                entity_type: EntityKind::Account.name(),
                id: email,
            });
        }

        let account = Account::new(email, request.name.trim());
        let item = account_to_item(&account, request.password_hash.as_deref())?;
        self.repository.create_item(item).await?;

        tracing::info!(account_id = %account.id, "Created account");
        Ok(account)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        let key = keys::account_key(&id.to_string())?;
        self.repository
            .get_item(&key)
            .await?
            .map(|item| item_to_account(&item))
            .transpose()
    }

    /// Like [`get`](Self::get), but a missing account is `NotFound`.
    pub async fn require(&self, id: Uuid) -> Result<Account> {
        let key = keys::account_key(&id.to_string())?;
        match self.repository.get_item_consistent(&key).await? {
            Some(item) => item_to_account(&item),
            None => Err(not_found(EntityKind::Account, id)),
        }
    }

    /// Look an account up by email through the email index.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let email = normalize_email(email);
        let partition_key = keys::index_partition_key(NaturalKey::Email(&email))?;
        let page = self
            .repository
            .query(
                partition_key,
                Vec::new(),
                QueryOptions {
                    index: Some(IndexName::Gsi1),
                    page_size: Some(1),
                    ..QueryOptions::default()
                },
            )
            .await?;

        page.items.first().map(item_to_account).transpose()
    }

    /// Every account, one page at a time. This scans the table; callers
    /// must restrict it to administrators.
    pub async fn list(
        &self,
        cursor_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<EntityPage<Account>> {
        let page = self
            .repository
            .scan(
                Some(EntityKind::Account),
                Vec::new(),
                ScanOptions {
                    cursor_token,
                    page_size,
                },
            )
            .await?;
        page_of(page, item_to_account)
    }

    /// Apply a partial update. A new email moves the email index entry.
    pub async fn update(&self, id: Uuid, request: UpdateAccountRequest) -> Result<Account> {
        let existing = self.require(id).await?;
        let mut fields = request.fields()?;
        let mut new_email = None;

        let requested = fields.get("email").and_then(Value::as_str).map(normalize_email);
        if let Some(email) = requested {
            if email.is_empty() {
                return Err(RepositoryError::InvalidData(
                    "email must not be empty".to_string(),
                ));
            }
            if email != existing.email {
                if self.find_by_email(&email).await?.is_some() {
                    return Err(RepositoryError::AlreadyExists {
                        entity_type: EntityKind::Account.name(),
                        id: email,
                    });
                }
                new_email = Some(email.clone());
            }
            fields.insert("email".to_string(), Value::String(email));
        }

        let mut update = UpdateExpression::from_fields(fields, Utc::now());
        if let Some(email) = &new_email {
            update.set_index_key(
                IndexName::Gsi1,
                &keys::account_email_index(email, &existing.created_at)?,
            );
        }

        let key = keys::account_key(&id.to_string())?;
        let item = self.repository.update_item_with(&key, &update).await?;
        item_to_account(&item)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let key = keys::account_key(&id.to_string())?;
        self.repository.delete_item(&key).await
    }

    /// Credentials of an account. Only the authentication layer calls this.
    pub async fn credentials(&self, id: Uuid) -> Result<Option<AccountCredentials>> {
        let key = keys::account_key(&id.to_string())?;
        match self.repository.get_item_consistent(&key).await? {
            Some(item) => item_to_credentials(&item),
            None => Ok(None),
        }
    }

    /// Store a new password hash, computed by the authentication layer.
    pub async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.require(id).await?;
        let mut fields = Item::new();
        fields.insert(
            PASSWORD_HASH.to_string(),
            Value::String(password_hash.to_string()),
        );
        let key = keys::account_key(&id.to_string())?;
        self.repository.update_item(&key, fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{item::get_str, InMemoryStore};

    fn store() -> AccountStore {
        AccountStore::new(Repository::new(Arc::new(InMemoryStore::new())))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let accounts = store();
        let account = accounts
            .create(CreateAccountRequest::new("Ada@Example.com ", "Ada"))
            .await
            .unwrap();

        assert_eq!(account.email, "ada@example.com");
        let fetched = accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, account.id);
        assert_eq!(fetched.email, account.email);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let accounts = store();
        assert!(accounts.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(matches!(
            accounts.require(Uuid::new_v4()).await,
            Err(RepositoryError::NotFound {
                entity_type: "Account",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let accounts = store();
        accounts
            .create(CreateAccountRequest::new("ada@example.com", "Ada"))
            .await
            .unwrap();

        let result = accounts
            .create(CreateAccountRequest::new("ADA@example.com", "Impostor"))
            .await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let accounts = store();
        let account = accounts
            .create(CreateAccountRequest::new("grace@example.com", "Grace"))
            .await
            .unwrap();

        let found = accounts.find_by_email("GRACE@example.com").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));
        assert!(accounts
            .find_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_email_change_moves_index_entry() {
        let repository = Repository::new(Arc::new(InMemoryStore::new()));
        let accounts = AccountStore::new(repository.clone());
        let account = accounts
            .create(CreateAccountRequest::new("old@example.com", "Ada"))
            .await
            .unwrap();

        let updated = accounts
            .update(
                account.id,
                UpdateAccountRequest::new().with_email("new@example.com"),
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "new@example.com");
        assert!(accounts.find_by_email("old@example.com").await.unwrap().is_none());
        assert!(accounts.find_by_email("new@example.com").await.unwrap().is_some());

        let key = keys::account_key(&account.id.to_string()).unwrap();
        let item = repository.get_item(&key).await.unwrap().unwrap();
        assert_eq!(
            get_str(&item, "GSI1SK"),
            Some(keys::creation_sort_key(&account.created_at).as_str())
        );
    }

    #[tokio::test]
    async fn test_name_change_keeps_index_keys() {
        let repository = Repository::new(Arc::new(InMemoryStore::new()));
        let accounts = AccountStore::new(repository.clone());
        let account = accounts
            .create(CreateAccountRequest::new("ada@example.com", "Ada"))
            .await
            .unwrap();
        let key = keys::account_key(&account.id.to_string()).unwrap();
        let before = repository.get_item(&key).await.unwrap().unwrap();

        accounts
            .update(account.id, UpdateAccountRequest::new().with_name("Ada L."))
            .await
            .unwrap();

        let after = repository.get_item(&key).await.unwrap().unwrap();
        for attribute in keys::KEY_ATTRIBUTES {
            assert_eq!(before.get(attribute), after.get(attribute), "{attribute}");
        }
        assert_eq!(get_str(&after, "name"), Some("Ada L."));
    }

    #[tokio::test]
    async fn test_email_change_to_taken_email_is_rejected() {
        let accounts = store();
        accounts
            .create(CreateAccountRequest::new("taken@example.com", "A"))
            .await
            .unwrap();
        let other = accounts
            .create(CreateAccountRequest::new("other@example.com", "B"))
            .await
            .unwrap();

        let result = accounts
            .update(
                other.id,
                UpdateAccountRequest::new().with_email("taken@example.com"),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_update_nonexistent() {
        let accounts = store();
        let result = accounts
            .update(Uuid::new_v4(), UpdateAccountRequest::new().with_name("X"))
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_credentials_stay_behind_the_boundary() {
        let accounts = store();
        let account = accounts
            .create(CreateAccountRequest::new("ada@example.com", "Ada").with_password_hash("h1"))
            .await
            .unwrap();

        let credentials = accounts.credentials(account.id).await.unwrap().unwrap();
        assert_eq!(credentials.password_hash, "h1");

        accounts.set_password_hash(account.id, "h2").await.unwrap();
        let credentials = accounts.credentials(account.id).await.unwrap().unwrap();
        assert_eq!(credentials.password_hash, "h2");

        let json = serde_json::to_value(accounts.get(account.id).await.unwrap().unwrap()).unwrap();
        assert!(json.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_list_pages_through_accounts() {
        let accounts = store();
        for n in 0..5 {
            accounts
                .create(CreateAccountRequest::new(format!("user{n}@example.com"), "U"))
                .await
                .unwrap();
        }

        let first = accounts.list(None, Some(3)).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more());

        let second = accounts
            .list(first.next_cursor_token, Some(3))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(!second.has_more());
    }

    #[tokio::test]
    async fn test_delete() {
        let accounts = store();
        let account = accounts
            .create(CreateAccountRequest::new("ada@example.com", "Ada"))
            .await
            .unwrap();

        accounts.delete(account.id).await.unwrap();
        accounts.delete(account.id).await.unwrap();
        assert!(accounts.get(account.id).await.unwrap().is_none());
    }
}
