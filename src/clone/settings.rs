use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::clone::types::EntityTally;
use crate::devops::client::DevOpsOps;
use crate::devops::types::{Project, ProjectProperty, ProjectUpdate};

const SYSTEM_PROPERTY_PREFIX: &str = "System.";

/// Properties the platform does not manage itself.
pub fn custom_properties(properties: Vec<ProjectProperty>) -> Vec<ProjectProperty> {
    properties
        .into_iter()
        .filter(|p| !p.name.starts_with(SYSTEM_PROPERTY_PREFIX))
        .collect()
}

/// Copy the description (unless one was requested) and custom properties.
pub async fn clone_project_settings(
    ops: &dyn DevOpsOps,
    source: &Project,
    target: &Project,
    requested_description: Option<&str>,
) -> Result<String> {
    let mut tally = EntityTally::default();
    let mut copied = Vec::new();

    let description = source.description.as_deref().filter(|d| !d.trim().is_empty());
    if let (None, Some(description)) = (requested_description, description) {
        let update = ProjectUpdate {
            description: Some(description.to_string()),
            visibility: None,
        };
        match ops.update_project(&target.id, &update).await {
            Ok(_) => {
                tally.created();
                copied.push("description".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Failed to copy project description");
                tally.skipped();
            }
        }
    }

    let properties = ops
        .get_project_properties(&source.id)
        .await
        .context("Failed to read source project properties")?;
    let custom = custom_properties(properties);
    if !custom.is_empty() {
        match ops.set_project_properties(&target.id, &custom).await {
            Ok(()) => {
                tally.created();
                copied.push(format!("{} properties", custom.len()));
            }
            Err(e) => {
                warn!(error = %e, count = custom.len(), "Failed to copy project properties");
                tally.skipped();
            }
        }
    }

    if tally.all_failed() {
        anyhow::bail!("No project settings could be copied");
    }
    info!(copied = ?copied, "Project settings cloned");

    if copied.is_empty() {
        Ok("No project settings to copy".to_string())
    } else {
        Ok(format!("Copied {}", copied.join(" and ")))
    }
}
