//! Single-table key generation.
//!
//! Pure functions for generating partition, sort and index keys. All functions
//! are sync, have no side effects, and reject empty ids or natural keys.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{RepositoryError, Result};

// ============================================================================
// Key prefixes
// ============================================================================

pub const ACCOUNT_PREFIX: &str = "ACCOUNT#";
pub const PROJECT_PREFIX: &str = "PROJECT#";
pub const ISSUE_PREFIX: &str = "ISSUE#";
pub const EMAIL_PREFIX: &str = "EMAIL#";
pub const SHORT_KEY_PREFIX: &str = "KEY#";
pub const ISSUE_KEY_PREFIX: &str = "ISSUEKEY#";

// ============================================================================
// Key attribute names
// ============================================================================

pub const PK: &str = "PK";
pub const SK: &str = "SK";
pub const GSI1PK: &str = "GSI1PK";
pub const GSI1SK: &str = "GSI1SK";
pub const GSI2PK: &str = "GSI2PK";
pub const GSI2SK: &str = "GSI2SK";

/// Every attribute that participates in a primary or index key.
pub const KEY_ATTRIBUTES: [&str; 6] = [PK, SK, GSI1PK, GSI1SK, GSI2PK, GSI2SK];

/// The kind of entity an item stores, written to its `entityType` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Account,
    Project,
    Issue,
    /// Reservation record guarding a human issue key.
    IssueKey,
}

impl EntityKind {
    /// Value stored in the `entityType` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "ACCOUNT",
            EntityKind::Project => "PROJECT",
            EntityKind::Issue => "ISSUE",
            EntityKind::IssueKey => "ISSUE_KEY",
        }
    }

    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Account => "Account",
            EntityKind::Project => "Project",
            EntityKind::Issue => "Issue",
            EntityKind::IssueKey => "IssueKey",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACCOUNT" => Some(EntityKind::Account),
            "PROJECT" => Some(EntityKind::Project),
            "ISSUE" => Some(EntityKind::Issue),
            "ISSUE_KEY" => Some(EntityKind::IssueKey),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary indexes of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexName {
    /// Lookup index: email, project short key, issue creator.
    Gsi1,
    /// Membership index: projects by creator, issues by human key.
    Gsi2,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Gsi1 => "GSI1",
            IndexName::Gsi2 => "GSI2",
        }
    }

    pub fn partition_attribute(&self) -> &'static str {
        match self {
            IndexName::Gsi1 => GSI1PK,
            IndexName::Gsi2 => GSI2PK,
        }
    }

    pub fn sort_attribute(&self) -> &'static str {
        match self {
            IndexName::Gsi1 => GSI1SK,
            IndexName::Gsi2 => GSI2SK,
        }
    }
}

/// Partition and sort key attribute names for the table or one of its indexes.
pub fn key_attributes(index: Option<IndexName>) -> (&'static str, &'static str) {
    match index {
        None => (PK, SK),
        Some(index) => (index.partition_attribute(), index.sort_attribute()),
    }
}

/// Primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey {
    pub pk: String,
    pub sk: String,
}

impl PrimaryKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// Partition and sort key of an item inside a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub pk: String,
    pub sk: String,
}

/// A natural key value that identifies an index partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalKey<'a> {
    /// Account email (GSI1).
    Email(&'a str),
    /// Project short key (GSI1).
    ShortKey(&'a str),
    /// Creator account id (GSI1 for issues, GSI2 for projects).
    Account(&'a str),
    /// Owning project id (GSI2 for issues).
    Project(&'a str),
}

fn require<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(RepositoryError::invalid_key(what));
    }
    Ok(value)
}

/// Sort key for creation-ordered indexes.
///
/// RFC 3339 in UTC with fixed millisecond precision so that lexicographic
/// order matches chronological order.
pub fn creation_sort_key(created_at: &DateTime<Utc>) -> String {
    created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate the partition key of an index from a natural key.
///
/// Patterns: `EMAIL#<email>`, `KEY#<shortKey>`, `ACCOUNT#<id>`, `PROJECT#<id>`
pub fn index_partition_key(natural: NaturalKey<'_>) -> Result<String> {
    Ok(match natural {
        NaturalKey::Email(email) => format!("{EMAIL_PREFIX}{}", require(email, "email")?),
        NaturalKey::ShortKey(key) => {
            format!("{SHORT_KEY_PREFIX}{}", require(key, "project short key")?)
        }
        NaturalKey::Account(id) => format!("{ACCOUNT_PREFIX}{}", require(id, "account id")?),
        NaturalKey::Project(id) => format!("{PROJECT_PREFIX}{}", require(id, "project id")?),
    })
}

// ============================================================================
// Account keys
// ============================================================================

/// Generate the primary key for an Account.
///
/// Pattern: `ACCOUNT#<id>` / `ACCOUNT#<id>`
pub fn account_key(account_id: &str) -> Result<PrimaryKey> {
    let id = require(account_id, "account id")?;
    Ok(PrimaryKey::new(
        format!("{ACCOUNT_PREFIX}{id}"),
        format!("{ACCOUNT_PREFIX}{id}"),
    ))
}

/// Generate the GSI1 key for Account email lookup.
///
/// Pattern: `EMAIL#<email>` / `<createdAt>`
pub fn account_email_index(email: &str, created_at: &DateTime<Utc>) -> Result<IndexKey> {
    Ok(IndexKey {
        pk: index_partition_key(NaturalKey::Email(email))?,
        sk: creation_sort_key(created_at),
    })
}

// ============================================================================
// Project keys
// ============================================================================

/// Generate the primary key for a Project.
///
/// Pattern: `PROJECT#<id>` / `PROJECT#<id>`
pub fn project_key(project_id: &str) -> Result<PrimaryKey> {
    let id = require(project_id, "project id")?;
    Ok(PrimaryKey::new(
        format!("{PROJECT_PREFIX}{id}"),
        format!("{PROJECT_PREFIX}{id}"),
    ))
}

/// Generate the GSI1 key for Project short-key lookup.
///
/// Pattern: `KEY#<shortKey>` / `<createdAt>`
pub fn project_short_key_index(short_key: &str, created_at: &DateTime<Utc>) -> Result<IndexKey> {
    Ok(IndexKey {
        pk: index_partition_key(NaturalKey::ShortKey(short_key))?,
        sk: creation_sort_key(created_at),
    })
}

/// Generate the GSI2 key listing the projects an account created.
///
/// Pattern: `ACCOUNT#<creatorId>` / `<createdAt>`
pub fn project_creator_index(creator_id: &str, created_at: &DateTime<Utc>) -> Result<IndexKey> {
    Ok(IndexKey {
        pk: index_partition_key(NaturalKey::Account(creator_id))?,
        sk: creation_sort_key(created_at),
    })
}

// ============================================================================
// Issue keys
// ============================================================================

/// Generate the primary key for an Issue.
///
/// Pattern: `PROJECT#<projectId>` / `ISSUE#<id>`
pub fn issue_key(project_id: &str, issue_id: &str) -> Result<PrimaryKey> {
    let project_id = require(project_id, "project id")?;
    let issue_id = require(issue_id, "issue id")?;
    Ok(PrimaryKey::new(
        format!("{PROJECT_PREFIX}{project_id}"),
        format!("{ISSUE_PREFIX}{issue_id}"),
    ))
}

/// Generate the GSI1 key listing the issues an account created.
///
/// Pattern: `ACCOUNT#<createdBy>` / `<createdAt>`
pub fn issue_creator_index(created_by: &str, created_at: &DateTime<Utc>) -> Result<IndexKey> {
    Ok(IndexKey {
        pk: index_partition_key(NaturalKey::Account(created_by))?,
        sk: creation_sort_key(created_at),
    })
}

/// Generate the GSI2 key addressing an issue by its human key.
///
/// Pattern: `PROJECT#<projectId>` / `ISSUE#<humanKey>`
pub fn issue_project_index(project_id: &str, human_key: &str) -> Result<IndexKey> {
    Ok(IndexKey {
        pk: index_partition_key(NaturalKey::Project(project_id))?,
        sk: format!("{ISSUE_PREFIX}{}", require(human_key, "issue key")?),
    })
}

/// Sort-key prefix selecting the issues of a project partition.
///
/// Pattern: `ISSUE#`
pub fn issue_sk_prefix() -> &'static str {
    ISSUE_PREFIX
}

/// Generate the primary key of the record reserving a human issue key.
///
/// Pattern: `PROJECT#<projectId>` / `ISSUEKEY#<humanKey>`
pub fn issue_key_reservation(project_id: &str, human_key: &str) -> Result<PrimaryKey> {
    let project_id = require(project_id, "project id")?;
    let human_key = require(human_key, "issue key")?;
    Ok(PrimaryKey::new(
        format!("{PROJECT_PREFIX}{project_id}"),
        format!("{ISSUE_KEY_PREFIX}{human_key}"),
    ))
}
