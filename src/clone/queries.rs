use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::clone::replicator::{HierarchicalReplicator, ReplicaTarget, ReplicationReport, TreeNode};
use crate::devops::client::DevOpsOps;
use crate::devops::types::{NewQuery, QueryItem};
use crate::devops::DevOpsError;

/// Root folders every project is provisioned with.
pub const PREEXISTING_QUERY_FOLDERS: [&str; 2] = ["Shared Queries", "My Queries"];

impl From<&QueryItem> for TreeNode {
    fn from(item: &QueryItem) -> Self {
        TreeNode {
            name: item.name.clone(),
            is_container: item.is_folder,
            payload: if item.is_folder { None } else { item.wiql.clone() },
            children: item.children.iter().map(TreeNode::from).collect(),
        }
    }
}

/// Query folders and queries in one target project
pub struct QueryTarget<'a> {
    ops: &'a dyn DevOpsOps,
    project: &'a str,
}

impl<'a> QueryTarget<'a> {
    pub fn new(ops: &'a dyn DevOpsOps, project: &'a str) -> Self {
        Self { ops, project }
    }
}

#[async_trait]
impl ReplicaTarget for QueryTarget<'_> {
    fn is_preexisting(&self, node: &TreeNode) -> bool {
        node.is_container
            && PREEXISTING_QUERY_FOLDERS
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&node.name))
    }

    fn child_path(&self, parent_path: &str, node: &TreeNode) -> String {
        if parent_path.is_empty() {
            node.name.clone()
        } else {
            format!("{parent_path}/{}", node.name)
        }
    }

    async fn create_container(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError> {
        self.ops
            .create_query(self.project, parent_path, &NewQuery::folder(&node.name))
            .await
            .map(|_| ())
    }

    async fn create_leaf(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError> {
        let wiql = node.payload.as_deref().unwrap_or_default();
        self.ops
            .create_query(self.project, parent_path, &NewQuery::query(&node.name, wiql))
            .await
            .map(|_| ())
    }
}

/// Replicate every query folder tree of the source into the target.
pub async fn clone_queries(
    ops: &dyn DevOpsOps,
    source_project: &str,
    target_project: &str,
    leaf_retry_delay: Duration,
) -> Result<String> {
    let roots = ops
        .list_queries(source_project)
        .await
        .context("Failed to list source queries")?;

    let target = QueryTarget::new(ops, target_project);
    let replicator = HierarchicalReplicator::new(&target, leaf_retry_delay);

    let mut report = ReplicationReport::default();
    for root in &roots {
        let root_path = if root.path.is_empty() { &root.name } else { &root.path };
        report.merge(replicator.replicate(&TreeNode::from(root), root_path).await);
    }

    info!(
        queries = report.payload_nodes_created,
        folders = report.containers_created,
        skipped = report.skipped.len(),
        "Queries cloned"
    );

    if report.all_failed() {
        anyhow::bail!("No queries could be created ({} skipped)", report.skipped.len());
    }

    Ok(format!(
        "Created {} queries in {} folders, {} skipped",
        report.payload_nodes_created,
        report.containers_created + report.containers_existing,
        report.skipped.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::MockDevOpsOps;

    fn query_tree() -> Vec<QueryItem> {
        vec![QueryItem {
            name: "Shared Queries".to_string(),
            path: "Shared Queries".to_string(),
            is_folder: true,
            has_children: true,
            children: vec![QueryItem {
                name: "My Folder".to_string(),
                path: "Shared Queries/My Folder".to_string(),
                is_folder: true,
                has_children: true,
                children: vec![QueryItem {
                    name: "Query1".to_string(),
                    path: "Shared Queries/My Folder/Query1".to_string(),
                    wiql: Some("SELECT [System.Id] FROM WorkItems".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }]
    }

    #[test]
    fn converts_folders_and_queries() {
        let node = TreeNode::from(&query_tree()[0]);
        assert!(node.is_container);
        assert!(node.payload.is_none());
        let leaf = &node.children[0].children[0];
        assert!(!leaf.is_container);
        assert_eq!(leaf.payload.as_deref(), Some("SELECT [System.Id] FROM WorkItems"));
    }

    #[tokio::test]
    async fn shared_queries_folder_is_reused() {
        let mut ops = MockDevOpsOps::new();
        ops.expect_list_queries()
            .withf(|project| project == "Source")
            .returning(|_| Ok(query_tree()));
        ops.expect_create_query()
            .withf(|project, parent, query| {
                project == "Target" && parent == "Shared Queries" && query.name == "My Folder" && query.is_folder
            })
            .times(1)
            .returning(|_, _, _| Ok(QueryItem::default()));
        ops.expect_create_query()
            .withf(|project, parent, query| {
                project == "Target" && parent == "Shared Queries/My Folder" && query.name == "Query1" && !query.is_folder
            })
            .times(1)
            .returning(|_, _, _| Ok(QueryItem::default()));

        let message = clone_queries(&ops, "Source", "Target", Duration::ZERO).await.unwrap();
        assert_eq!(message, "Created 1 queries in 1 folders, 0 skipped");
    }
}
