//! Table schema and deploy planning (pure data, no I/O).

use issuetrack_core::storage::{keys, IndexName};
use thiserror::Error;

/// Errors that can occur while deploying the table.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Timeout waiting for table '{table_name}' to become active")]
    ActivationTimeout { table_name: String },
}

/// Table schema configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: String,
    pub gsis: Vec<GsiConfig>,
}

/// Global Secondary Index configuration. Every key is a string and every
/// index projects all attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiConfig {
    pub name: String,
    pub partition_key: String,
    pub sort_key: String,
}

impl GsiConfig {
    fn for_index(index: IndexName) -> Self {
        Self {
            name: index.as_str().to_string(),
            partition_key: index.partition_attribute().to_string(),
            sort_key: index.sort_attribute().to_string(),
        }
    }
}

impl TableConfig {
    /// Sets the table name.
    pub fn with_table_name(mut self, name: &str) -> Self {
        self.table_name = name.to_string();
        self
    }

    /// Every key attribute of the table and its indexes, without duplicates.
    pub fn key_attribute_names(&self) -> Vec<&str> {
        let mut names = vec![self.partition_key.as_str(), self.sort_key.as_str()];
        for gsi in &self.gsis {
            for name in [gsi.partition_key.as_str(), gsi.sort_key.as_str()] {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// The single table: `PK`/`SK` plus `GSI1` and `GSI2`, on-demand billing.
pub fn issuetrack_table_config() -> TableConfig {
    TableConfig {
        table_name: "issuetrack".to_string(),
        partition_key: keys::PK.to_string(),
        sort_key: keys::SK.to_string(),
        gsis: vec![
            GsiConfig::for_index(IndexName::Gsi1),
            GsiConfig::for_index(IndexName::Gsi2),
        ],
    }
}

/// Current state of an existing table.
#[derive(Debug, Clone)]
pub struct TableState {
    pub active: bool,
    pub gsis: Vec<GsiState>,
}

#[derive(Debug, Clone)]
pub struct GsiState {
    pub name: String,
    pub active: bool,
}

impl TableState {
    /// The table and all of its indexes accept traffic.
    pub fn is_ready(&self) -> bool {
        self.active && self.gsis.iter().all(|g| g.active)
    }
}

/// Planned changes for deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployPlan {
    /// Table doesn't exist, needs to be created.
    CreateTable { config: TableConfig },
    /// Table exists, GSIs need to be added.
    AddGsis {
        table_name: String,
        gsis_to_add: Vec<GsiConfig>,
    },
    /// Table is up to date, no changes needed.
    NoChanges { table_name: String },
}

/// Calculate what changes are needed to reach the desired state.
pub fn calculate_deploy_plan(current: Option<&TableState>, desired: &TableConfig) -> DeployPlan {
    let Some(state) = current else {
        return DeployPlan::CreateTable {
            config: desired.clone(),
        };
    };

    let gsis_to_add: Vec<GsiConfig> = desired
        .gsis
        .iter()
        .filter(|gsi| !state.gsis.iter().any(|existing| existing.name == gsi.name))
        .cloned()
        .collect();

    if gsis_to_add.is_empty() {
        DeployPlan::NoChanges {
            table_name: desired.table_name.clone(),
        }
    } else {
        DeployPlan::AddGsis {
            table_name: desired.table_name.clone(),
            gsis_to_add,
        }
    }
}

/// Format a deploy plan for display.
pub fn format_deploy_plan(plan: &DeployPlan) -> Vec<String> {
    match plan {
        DeployPlan::CreateTable { config } => {
            let mut lines = vec![
                format!("+ Create table: {}", config.table_name),
                format!("  Partition key: {} (S)", config.partition_key),
                format!("  Sort key: {} (S)", config.sort_key),
            ];
            for gsi in &config.gsis {
                lines.push(format!("  + GSI: {}", gsi.name));
                lines.push(format!("    Partition key: {} (S)", gsi.partition_key));
                lines.push(format!("    Sort key: {} (S)", gsi.sort_key));
            }
            lines.push("  Billing: PAY_PER_REQUEST".to_string());
            lines
        }
        DeployPlan::AddGsis {
            table_name,
            gsis_to_add,
        } => {
            let mut lines = vec![format!("~ Update table: {table_name}")];
            for gsi in gsis_to_add {
                lines.push(format!("  + Add GSI: {}", gsi.name));
            }
            lines
        }
        DeployPlan::NoChanges { table_name } => {
            vec![format!("= Table '{table_name}' is up to date")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(gsis: &[&str]) -> TableState {
        TableState {
            active: true,
            gsis: gsis
                .iter()
                .map(|name| GsiState {
                    name: name.to_string(),
                    active: true,
                })
                .collect(),
        }
    }

    #[test]
    fn test_table_config_matches_key_layout() {
        let config = issuetrack_table_config();
        assert_eq!(config.partition_key, "PK");
        assert_eq!(config.sort_key, "SK");
        let names: Vec<&str> = config.gsis.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["GSI1", "GSI2"]);
        assert_eq!(config.gsis[1].partition_key, "GSI2PK");
        assert_eq!(config.gsis[1].sort_key, "GSI2SK");
    }

    #[test]
    fn test_key_attribute_names_are_unique() {
        let names = issuetrack_table_config().key_attribute_names();
        assert_eq!(names, vec!["PK", "SK", "GSI1PK", "GSI1SK", "GSI2PK", "GSI2SK"]);
    }

    #[test]
    fn test_missing_table_is_created() {
        let desired = issuetrack_table_config().with_table_name("tracker-dev");
        let plan = calculate_deploy_plan(None, &desired);
        assert_eq!(plan, DeployPlan::CreateTable { config: desired });
    }

    #[test]
    fn test_missing_gsi_is_added() {
        let desired = issuetrack_table_config();
        let plan = calculate_deploy_plan(Some(&state(&["GSI1"])), &desired);
        match plan {
            DeployPlan::AddGsis {
                table_name,
                gsis_to_add,
            } => {
                assert_eq!(table_name, "issuetrack");
                assert_eq!(gsis_to_add.len(), 1);
                assert_eq!(gsis_to_add[0].name, "GSI2");
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_complete_table_needs_no_changes() {
        let desired = issuetrack_table_config();
        let plan = calculate_deploy_plan(Some(&state(&["GSI1", "GSI2"])), &desired);
        assert_eq!(
            plan,
            DeployPlan::NoChanges {
                table_name: "issuetrack".to_string()
            }
        );
        assert_eq!(format_deploy_plan(&plan), vec!["= Table 'issuetrack' is up to date"]);
    }

    #[test]
    fn test_format_create_plan() {
        let plan = calculate_deploy_plan(None, &issuetrack_table_config());
        let lines = format_deploy_plan(&plan);
        assert_eq!(lines[0], "+ Create table: issuetrack");
        assert!(lines.contains(&"  + GSI: GSI2".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("  Billing: PAY_PER_REQUEST"));
    }

    #[test]
    fn test_table_ready_requires_active_indexes() {
        let mut table = state(&["GSI1", "GSI2"]);
        assert!(table.is_ready());
        table.gsis[1].active = false;
        assert!(!table.is_ready());
    }
}
