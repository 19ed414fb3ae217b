use std::{env, str::FromStr};

use issuetrack_core::storage::{PageSizes, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use issuetrack_core::tracker::{TrackerConfig, DEFAULT_ISSUE_KEY_BASE, DEFAULT_RESERVE_ATTEMPTS};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// DynamoDB table name (default: "issuetrack")
    pub table_name: String,
    /// Custom endpoint URL, e.g. a local DynamoDB
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: String,
    /// Page size when a listing does not ask for one (default: 25)
    pub page_size_default: u32,
    /// Largest page size a listing may ask for (default: 100)
    pub page_size_max: u32,
    /// Issue numbers start right after this value (default: 1000)
    pub issue_key_base: u64,
    /// Attempts to claim a fresh issue key (default: 5)
    pub reserve_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TABLE_NAME` - DynamoDB table name (default: "issuetrack")
    /// - `AWS_ENDPOINT_URL` - Use a local DynamoDB (e.g. http://localhost:8000)
    /// - `AWS_REGION` - AWS region (default: "us-east-1")
    /// - `PAGE_SIZE_DEFAULT` - Default page size (default: 25)
    /// - `PAGE_SIZE_MAX` - Maximum page size (default: 100)
    /// - `ISSUE_KEY_BASE` - Issue number base (default: 1000)
    /// - `ISSUE_KEY_RESERVE_ATTEMPTS` - Issue key claim attempts (default: 5)
    pub fn from_env() -> Self {
        Self {
            table_name: env::var("TABLE_NAME").unwrap_or_else(|_| "issuetrack".to_string()),
            endpoint_url: env::var("AWS_ENDPOINT_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            page_size_default: parse_or(env::var("PAGE_SIZE_DEFAULT").ok(), DEFAULT_PAGE_SIZE),
            page_size_max: parse_or(env::var("PAGE_SIZE_MAX").ok(), MAX_PAGE_SIZE),
            issue_key_base: parse_or(env::var("ISSUE_KEY_BASE").ok(), DEFAULT_ISSUE_KEY_BASE),
            reserve_attempts: parse_or(
                env::var("ISSUE_KEY_RESERVE_ATTEMPTS").ok(),
                DEFAULT_RESERVE_ATTEMPTS,
            ),
        }
    }

    /// Page sizes with the default clamped into `1..=max`.
    pub fn page_sizes(&self) -> PageSizes {
        let max = self.page_size_max.max(1);
        PageSizes {
            default: self.page_size_default.clamp(1, max),
            max,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            page_sizes: self.page_sizes(),
            issue_key_base: self.issue_key_base,
            reserve_attempts: self.reserve_attempts.max(1),
        }
    }

    /// Returns a display string for the target environment.
    #[cfg_attr(not(feature = "dynamodb"), allow(dead_code))]
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({url})"),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
