mod commands;
mod config;
mod storage;

use anyhow::Result;
use clap::Parser;
use issuetrack_core::storage::{repository_error_to_status_code, RepositoryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{commands::Command, config::Config};

/// IssueTrack - Multi-tenant issue tracking on a single DynamoDB table
#[derive(Parser, Debug)]
#[command(name = "issuetrack")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries command output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "issuetrack=info,issuetrack_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = Config::from_env();

    match commands::run(cli.command, &config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            if let Some(repository_error) = err.downcast_ref::<RepositoryError>() {
                tracing::error!(
                    status = repository_error_to_status_code(repository_error),
                    error = %repository_error,
                    "Command failed"
                );
            }
            Err(err)
        }
    }
}
