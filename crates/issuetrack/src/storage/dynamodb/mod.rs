//! DynamoDB storage backend implementation.
//!
//! Implements [`ItemStore`](issuetrack_core::storage::ItemStore) on one table
//! using `aws-sdk-dynamodb`, plus the table schema and its deploy plan.

mod conversions;
mod deploy;
mod error;
mod store;
mod table;

pub use deploy::{execute_deploy_plan, get_table_state};
pub use store::DynamoDbStore;
pub use table::{
    calculate_deploy_plan, format_deploy_plan, issuetrack_table_config, DeployPlan, TableError,
};

use aws_sdk_dynamodb::Client;

use crate::config::Config;

/// Creates a DynamoDB client for the configured region and endpoint.
pub async fn create_client(config: &Config) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    Client::new(&sdk_config)
}
