//! Operator commands.
//!
//! Every command returns the JSON document `main` prints on stdout.

use anyhow::{anyhow, Result};
use issuetrack_core::tracker::{
    CreateAccountRequest, CreateIssueRequest, CreateProjectRequest, IssueFilter, IssuePriority,
    IssueStatus, IssueType, Tracker, UpdateAccountRequest, UpdateIssueRequest,
    UpdateProjectRequest,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::storage::open_store;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage issues
    #[command(subcommand)]
    Issue(IssueCommand),

    /// Create a demo account, project and issues
    Seed(SeedArgs),

    /// Manage the DynamoDB table
    #[cfg(feature = "dynamodb")]
    #[command(subcommand)]
    Table(TableCommand),
}

#[derive(Debug, clap::Args)]
pub struct PageArgs {
    /// Token returned as `nextCursorToken` by the previous page
    #[arg(long)]
    pub cursor: Option<String>,

    /// Number of items to read
    #[arg(long)]
    pub page_size: Option<u32>,
}

#[derive(Debug, clap::Subcommand)]
pub enum AccountCommand {
    /// Create an account
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Password hash computed by the authentication layer
        #[arg(long)]
        password_hash: Option<String>,
    },
    /// Show an account
    Get { id: Uuid },
    /// Find an account by email
    Find {
        #[arg(long)]
        email: String,
    },
    /// List accounts (scans the table)
    List(PageArgs),
    /// Update an account
    Update {
        id: Uuid,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an account
    Delete { id: Uuid },
}

#[derive(Debug, clap::Subcommand)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        /// Account creating the project
        #[arg(long)]
        owner: Uuid,
        /// Short key, the prefix of issue keys (e.g. ENG)
        #[arg(long)]
        key: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show a project
    Get { id: Uuid },
    /// Find a project by short key
    Find {
        #[arg(long)]
        key: String,
    },
    /// List projects, all of them or those an account created
    List {
        #[arg(long)]
        created_by: Option<Uuid>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Update a project
    Update {
        id: Uuid,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project (its issues are kept)
    Delete { id: Uuid },
}

#[derive(Debug, clap::Args)]
pub struct FilterArgs {
    /// Accepted status, repeatable
    #[arg(long = "status", value_parser = parse_status)]
    pub statuses: Vec<IssueStatus>,

    /// Accepted priority, repeatable
    #[arg(long = "priority", value_parser = parse_priority)]
    pub priorities: Vec<IssuePriority>,

    #[arg(long = "type", value_parser = parse_type)]
    pub issue_type: Option<IssueType>,

    #[arg(long)]
    pub assignee: Option<Uuid>,

    /// Only issues without an assignee
    #[arg(long, conflicts_with = "assignee")]
    pub unassigned: bool,

    #[arg(long)]
    pub title_contains: Option<String>,

    #[arg(long)]
    pub min_points: Option<u32>,
}

impl From<FilterArgs> for IssueFilter {
    fn from(args: FilterArgs) -> Self {
        IssueFilter {
            statuses: args.statuses,
            priorities: args.priorities,
            issue_type: args.issue_type,
            assignee_id: args.assignee,
            unassigned: args.unassigned,
            title_contains: args.title_contains,
            min_story_points: args.min_points,
        }
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum IssueCommand {
    /// Create an issue and allocate its key
    Create {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        created_by: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<IssueStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<IssuePriority>,
        #[arg(long = "type", value_parser = parse_type)]
        issue_type: Option<IssueType>,
        #[arg(long)]
        assignee: Option<Uuid>,
        #[arg(long)]
        points: Option<u32>,
    },
    /// Show an issue
    Get {
        #[arg(long)]
        project: Uuid,
        id: Uuid,
    },
    /// Find an issue by its key (e.g. ENG-1042)
    Find {
        #[arg(long)]
        project: Uuid,
        key: String,
    },
    /// List the issues of a project
    List {
        #[arg(long)]
        project: Uuid,
        /// Order by issue key instead of storage order
        #[arg(long)]
        by_key: bool,
        /// Newest key first, implies --by-key
        #[arg(long)]
        descending: bool,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List the issues an account created
    CreatedBy {
        #[arg(long)]
        account: Uuid,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Search issues across projects (scans the table)
    Search {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Update an issue
    Update {
        #[arg(long)]
        project: Uuid,
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<IssueStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<IssuePriority>,
        #[arg(long = "type", value_parser = parse_type)]
        issue_type: Option<IssueType>,
        #[arg(long)]
        assignee: Option<Uuid>,
        #[arg(long)]
        points: Option<u32>,
    },
    /// Delete an issue (its key is never reissued)
    Delete {
        #[arg(long)]
        project: Uuid,
        id: Uuid,
    },
}

#[derive(Debug, clap::Args)]
#[command(long_about = "Create a demo account, project and issues.

The account and project are reused when they already exist, so running the
command again only adds issues.")]
pub struct SeedArgs {
    #[arg(long, default_value = "demo@example.com")]
    pub email: String,

    #[arg(long, default_value = "DEMO")]
    pub project_key: String,

    /// Number of issues to create
    #[arg(long, default_value = "10")]
    pub count: u32,
}

#[cfg(feature = "dynamodb")]
#[derive(Debug, clap::Subcommand)]
pub enum TableCommand {
    /// Create the table or add missing indexes
    Deploy {
        /// Only print the plan
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_status(value: &str) -> Result<IssueStatus, String> {
    IssueStatus::parse(value).ok_or_else(|| expected(IssueStatus::ALL.map(|s| s.as_str())))
}

fn parse_priority(value: &str) -> Result<IssuePriority, String> {
    IssuePriority::parse(value).ok_or_else(|| expected(IssuePriority::ALL.map(|p| p.as_str())))
}

fn parse_type(value: &str) -> Result<IssueType, String> {
    IssueType::parse(value).ok_or_else(|| expected(IssueType::ALL.map(|t| t.as_str())))
}

fn expected<const N: usize>(names: [&str; N]) -> String {
    format!("expected one of: {}", names.join(", "))
}

/// Open the configured store and run a command.
pub async fn run(command: Command, config: &Config) -> Result<Value> {
    #[cfg(feature = "dynamodb")]
    if let Command::Table(TableCommand::Deploy { dry_run }) = command {
        return deploy_table(config, dry_run).await;
    }

    let store = open_store(config).await?;
    let tracker = Tracker::new(store, config.tracker_config());
    execute(command, &tracker).await
}

#[cfg(feature = "dynamodb")]
async fn deploy_table(config: &Config, dry_run: bool) -> Result<Value> {
    use crate::storage::dynamodb::{
        calculate_deploy_plan, create_client, execute_deploy_plan, format_deploy_plan,
        get_table_state, issuetrack_table_config, DeployPlan,
    };

    let client = create_client(config).await;
    let desired = issuetrack_table_config().with_table_name(&config.table_name);
    let current = get_table_state(&client, &config.table_name).await?;
    let plan = calculate_deploy_plan(current.as_ref(), &desired);
    let lines = format_deploy_plan(&plan);

    for line in &lines {
        tracing::info!(target_env = %config.target_display(), "{line}");
    }

    let applied = !dry_run && !matches!(plan, DeployPlan::NoChanges { .. });
    if applied {
        execute_deploy_plan(&client, &plan).await?;
        tracing::info!(table = %config.table_name, "Table deployed");
    }

    Ok(json!({
        "table": config.table_name,
        "plan": lines,
        "applied": applied,
    }))
}

/// Run a command against the tracker.
pub async fn execute(command: Command, tracker: &Tracker) -> Result<Value> {
    match command {
        Command::Account(command) => account(command, tracker).await,
        Command::Project(command) => project(command, tracker).await,
        Command::Issue(command) => issue(command, tracker).await,
        Command::Seed(args) => seed(args, tracker).await,
        #[cfg(feature = "dynamodb")]
        Command::Table(_) => Err(anyhow!("table commands do not run against the tracker")),
    }
}

async fn account(command: AccountCommand, tracker: &Tracker) -> Result<Value> {
    let accounts = &tracker.accounts;
    Ok(match command {
        AccountCommand::Create {
            email,
            name,
            password_hash,
        } => {
            let mut request = CreateAccountRequest::new(email, name);
            request.password_hash = password_hash;
            serde_json::to_value(accounts.create(request).await?)?
        }
        AccountCommand::Get { id } => serde_json::to_value(accounts.require(id).await?)?,
        AccountCommand::Find { email } => {
            let account = accounts
                .find_by_email(&email)
                .await?
                .ok_or_else(|| anyhow!("no account with email {email}"))?;
            serde_json::to_value(account)?
        }
        AccountCommand::List(page) => {
            serde_json::to_value(accounts.list(page.cursor, page.page_size).await?)?
        }
        AccountCommand::Update { id, email, name } => {
            let request = UpdateAccountRequest { email, name };
            serde_json::to_value(accounts.update(id, request).await?)?
        }
        AccountCommand::Delete { id } => {
            accounts.delete(id).await?;
            json!({ "deleted": id })
        }
    })
}

async fn project(command: ProjectCommand, tracker: &Tracker) -> Result<Value> {
    let projects = &tracker.projects;
    Ok(match command {
        ProjectCommand::Create {
            owner,
            key,
            name,
            description,
        } => {
            let mut request = CreateProjectRequest::new(key, name);
            request.description = description;
            serde_json::to_value(projects.create(owner, request).await?)?
        }
        ProjectCommand::Get { id } => serde_json::to_value(projects.require(id).await?)?,
        ProjectCommand::Find { key } => {
            let project = projects
                .find_by_key(&key)
                .await?
                .ok_or_else(|| anyhow!("no project with key {key}"))?;
            serde_json::to_value(project)?
        }
        ProjectCommand::List { created_by, page } => {
            let listed = match created_by {
                Some(account) => {
                    projects
                        .list_by_creator(account, page.cursor, page.page_size)
                        .await?
                }
                None => projects.list(page.cursor, page.page_size).await?,
            };
            serde_json::to_value(listed)?
        }
        ProjectCommand::Update {
            id,
            key,
            name,
            description,
        } => {
            let request = UpdateProjectRequest {
                key,
                name,
                description,
            };
            serde_json::to_value(projects.update(id, request).await?)?
        }
        ProjectCommand::Delete { id } => {
            projects.delete(id).await?;
            json!({ "deleted": id })
        }
    })
}

async fn issue(command: IssueCommand, tracker: &Tracker) -> Result<Value> {
    let issues = &tracker.issues;
    Ok(match command {
        IssueCommand::Create {
            project,
            created_by,
            title,
            description,
            status,
            priority,
            issue_type,
            assignee,
            points,
        } => {
            let request = CreateIssueRequest {
                title,
                description,
                status: status.unwrap_or_default(),
                priority: priority.unwrap_or_default(),
                issue_type: issue_type.unwrap_or_default(),
                assignee_id: assignee,
                story_points: points,
            };
            serde_json::to_value(issues.create(project, created_by, request).await?)?
        }
        IssueCommand::Get { project, id } => {
            let issue = issues
                .get(project, id)
                .await?
                .ok_or_else(|| anyhow!("issue {id} not found in project {project}"))?;
            serde_json::to_value(issue)?
        }
        IssueCommand::Find { project, key } => {
            let issue = issues
                .find_by_key(project, &key)
                .await?
                .ok_or_else(|| anyhow!("no issue {key} in project {project}"))?;
            serde_json::to_value(issue)?
        }
        IssueCommand::List {
            project,
            by_key,
            descending,
            filter,
            page,
        } => {
            let filter = IssueFilter::from(filter);
            let listed = if by_key || descending {
                issues
                    .list_by_key(project, &filter, page.cursor, page.page_size, descending)
                    .await?
            } else {
                issues
                    .list(project, &filter, page.cursor, page.page_size)
                    .await?
            };
            serde_json::to_value(listed)?
        }
        IssueCommand::CreatedBy {
            account,
            filter,
            page,
        } => serde_json::to_value(
            issues
                .list_created_by(account, &filter.into(), page.cursor, page.page_size)
                .await?,
        )?,
        IssueCommand::Search { filter, page } => serde_json::to_value(
            issues
                .search(&filter.into(), page.cursor, page.page_size)
                .await?,
        )?,
        IssueCommand::Update {
            project,
            id,
            title,
            description,
            status,
            priority,
            issue_type,
            assignee,
            points,
        } => {
            let request = UpdateIssueRequest {
                title,
                description,
                status,
                priority,
                issue_type,
                assignee_id: assignee,
                story_points: points,
            };
            serde_json::to_value(issues.update(project, id, request).await?)?
        }
        IssueCommand::Delete { project, id } => {
            issues.delete(project, id).await?;
            json!({ "deleted": id })
        }
    })
}

// ============================================================================
// Seed
// ============================================================================

/// Generate demo issue requests.
///
/// Statuses, priorities and types rotate so that every filter has something
/// to match; every third issue is unassigned.
pub fn generate_seed_issues(count: u32, assignee: Uuid) -> Vec<CreateIssueRequest> {
    const TITLES: [&str; 8] = [
        "Login page rejects valid passwords",
        "Add CSV export to reports",
        "Migrate billing jobs to the new queue",
        "Dashboard loads slowly for large projects",
        "Document the public API",
        "Crash when uploading empty attachments",
        "Support dark mode",
        "Rotate API credentials",
    ];

    (0..count as usize)
        .map(|i| {
            let mut request = CreateIssueRequest::new(TITLES[i % TITLES.len()])
                .with_status(IssueStatus::ALL[i % IssueStatus::ALL.len()])
                .with_priority(IssuePriority::ALL[(i / 2) % IssuePriority::ALL.len()])
                .with_type(IssueType::ALL[i % IssueType::ALL.len()])
                .with_story_points([1, 2, 3, 5, 8][i % 5]);
            if i % 3 != 2 {
                request = request.with_assignee(assignee);
            }
            request
        })
        .collect()
}

async fn seed(args: SeedArgs, tracker: &Tracker) -> Result<Value> {
    let account = match tracker.accounts.find_by_email(&args.email).await? {
        Some(account) => account,
        None => {
            tracker
                .accounts
                .create(CreateAccountRequest::new(&args.email, "Demo User"))
                .await?
        }
    };

    let project = match tracker.projects.find_by_key(&args.project_key).await? {
        Some(project) => project,
        None => {
            let request = CreateProjectRequest::new(&args.project_key, "Demo Project")
                .with_description("Created by `issuetrack seed`");
            tracker.projects.create(account.id, request).await?
        }
    };

    let mut keys = Vec::with_capacity(args.count as usize);
    for request in generate_seed_issues(args.count, account.id) {
        let issue = tracker.issues.create(project.id, account.id, request).await?;
        keys.push(issue.key);
    }

    tracing::info!(
        project = %project.key,
        created = keys.len(),
        "Seeded demo issues"
    );

    Ok(json!({
        "account": account,
        "project": project,
        "issues": keys,
    }))
}
