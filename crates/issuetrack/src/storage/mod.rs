//! Storage backend selection.
//!
//! The stores in `issuetrack_core::tracker` work on any
//! [`ItemStore`]. The concrete backend is selected at compile time via
//! feature flags.
//!
//! # Feature Flags
//!
//! - `inmemory` (default): process-local store, nothing survives the process
//! - `dynamodb`: AWS DynamoDB backend using `aws-sdk-dynamodb`
//!
//! These features are mutually exclusive - only one storage backend can be
//! enabled at a time.
//!
//! Build with DynamoDB:
//! ```bash
//! cargo build -p issuetrack --no-default-features --features dynamodb
//! ```

use std::sync::Arc;

use issuetrack_core::storage::ItemStore;

use crate::config::Config;

// Compile-time checks for mutual exclusivity
#[cfg(all(feature = "inmemory", feature = "dynamodb"))]
compile_error!(
    "Features 'inmemory' and 'dynamodb' are mutually exclusive. \
    Enable only one storage backend at a time."
);

#[cfg(not(any(feature = "inmemory", feature = "dynamodb")))]
compile_error!(
    "No storage backend selected. Enable 'inmemory' or 'dynamodb' feature. \
    Example: cargo build -p issuetrack --no-default-features --features dynamodb"
);

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

/// Open the configured backend.
#[cfg(feature = "inmemory")]
pub async fn open_store(_config: &Config) -> anyhow::Result<Arc<dyn ItemStore>> {
    tracing::warn!("Using the in-memory store; data is lost when the process exits");
    Ok(Arc::new(issuetrack_core::storage::InMemoryStore::new()))
}

/// Open the configured backend.
#[cfg(feature = "dynamodb")]
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ItemStore>> {
    let client = dynamodb::create_client(config).await;
    tracing::info!(
        target_env = %config.target_display(),
        table = %config.table_name,
        "Using DynamoDB store"
    );
    Ok(Arc::new(dynamodb::DynamoDbStore::new(
        client,
        config.table_name.clone(),
    )))
}
