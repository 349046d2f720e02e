use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::clone::types::EntityTally;
use crate::devops::client::DevOpsOps;
use crate::devops::types::{ClassificationNode, NewClassificationNode, Project, StructureGroup};

/// One node to create: its group, the path of its parent below the root,
/// and the node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNode {
    pub group: StructureGroup,
    pub parent_path: String,
    pub node: NewClassificationNode,
}

/// Flatten the subtrees below each root in pre-order. Roots themselves are
/// provisioned with the project and are not included.
pub fn flatten(roots: &[ClassificationNode]) -> Vec<PendingNode> {
    let mut pending = Vec::new();
    for root in roots {
        let mut stack: Vec<(&ClassificationNode, String)> =
            root.children.iter().rev().map(|c| (c, String::new())).collect();
        while let Some((node, parent_path)) = stack.pop() {
            let path = if parent_path.is_empty() {
                node.name.clone()
            } else {
                format!("{parent_path}/{}", node.name)
            };
            pending.push(PendingNode {
                group: root.structure_type,
                parent_path,
                node: NewClassificationNode {
                    name: node.name.clone(),
                    attributes: node.attributes.clone(),
                },
            });
            for child in node.children.iter().rev() {
                stack.push((child, path.clone()));
            }
        }
    }
    pending
}

/// Copy the area and iteration trees.
pub async fn clone_classification_nodes(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> Result<String> {
    let roots = ops
        .list_classification_nodes(&source.id)
        .await
        .context("Failed to list source areas and iterations")?;

    let mut tally = EntityTally::default();
    for pending in flatten(&roots) {
        let result = ops
            .create_classification_node(&target.id, pending.group, &pending.parent_path, &pending.node)
            .await;
        match result {
            Ok(_) => {
                debug!(group = pending.group.path_segment(), name = %pending.node.name, "Created node");
                tally.created();
            }
            Err(e) if e.is_already_exists() => tally.existing(),
            Err(e) => {
                warn!(
                    group = pending.group.path_segment(),
                    parent = %pending.parent_path,
                    name = %pending.node.name,
                    error = %e,
                    "Failed to create node"
                );
                tally.skipped();
            }
        }
    }

    if tally.all_failed() {
        anyhow::bail!("No areas or iterations could be created ({} failed)", tally.skipped);
    }
    Ok(tally.summary("areas and iterations"))
}
