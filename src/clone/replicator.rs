//! Generic depth-first replication of container/leaf trees.
//!
//! Query folders and wiki pages share this walk; a [`ReplicaTarget`] adapter
//! supplies the entity-specific calls and path rules.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::devops::DevOpsError;

/// Tree node independent of the entity kind it came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeNode {
    pub name: String,
    pub is_container: bool,
    /// Verbatim content: WIQL text for queries, markdown for wiki pages
    pub payload: Option<String>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn container(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            is_container: true,
            payload: None,
            children,
        }
    }

    pub fn leaf(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_container: false,
            payload: Some(payload.into()),
            children: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ReplicaTarget: Send + Sync {
    /// Containers the target already provides and that must never be created.
    fn is_preexisting(&self, node: &TreeNode) -> bool;
    fn child_path(&self, parent_path: &str, node: &TreeNode) -> String;
    async fn create_container(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError>;
    async fn create_leaf(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedNode {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    /// Leaves plus containers that carry content
    pub payload_nodes_created: usize,
    pub containers_created: usize,
    pub containers_existing: usize,
    /// Provided by the target, never created
    pub containers_preexisting: usize,
    pub created_paths: Vec<String>,
    pub skipped: Vec<SkippedNode>,
}

impl ReplicationReport {
    /// Create attempts, excluding pre-existing containers.
    pub fn attempted(&self) -> usize {
        self.payload_nodes_created + self.containers_created + self.containers_existing + self.skipped.len()
    }

    pub fn succeeded(&self) -> usize {
        self.payload_nodes_created + self.containers_created + self.containers_existing
    }

    pub fn merge(&mut self, other: ReplicationReport) {
        self.payload_nodes_created += other.payload_nodes_created;
        self.containers_created += other.containers_created;
        self.containers_existing += other.containers_existing;
        self.containers_preexisting += other.containers_preexisting;
        self.created_paths.extend(other.created_paths);
        self.skipped.extend(other.skipped);
    }

    /// True when something was attempted and nothing succeeded.
    pub fn all_failed(&self) -> bool {
        self.attempted() > 0 && self.succeeded() == 0
    }

    fn skip(&mut self, path: String, error: &DevOpsError) {
        warn!(path = %path, error = %error, "Skipping node");
        self.skipped.push(SkippedNode {
            path,
            reason: error.to_string(),
        });
    }
}

pub struct HierarchicalReplicator<'a> {
    target: &'a dyn ReplicaTarget,
    leaf_retry_delay: Duration,
}

impl<'a> HierarchicalReplicator<'a> {
    pub fn new(target: &'a dyn ReplicaTarget, leaf_retry_delay: Duration) -> Self {
        Self {
            target,
            leaf_retry_delay,
        }
    }

    /// Replicate `root` below `target_parent_path`, parents before children.
    ///
    /// A failed container skips its subtree; a failed leaf skips only itself.
    pub async fn replicate(&self, root: &TreeNode, target_parent_path: &str) -> ReplicationReport {
        let mut report = ReplicationReport::default();
        let mut stack: Vec<(&TreeNode, String)> = vec![(root, target_parent_path.to_string())];

        while let Some((node, parent_path)) = stack.pop() {
            if node.is_container {
                let Some(children_path) = self.container(node, &parent_path, &mut report).await else {
                    continue;
                };
                for child in node.children.iter().rev() {
                    stack.push((child, children_path.clone()));
                }
            } else {
                self.leaf(node, &parent_path, &mut report).await;
            }
        }

        info!(
            payload_nodes = report.payload_nodes_created,
            containers_created = report.containers_created,
            containers_existing = report.containers_existing,
            skipped = report.skipped.len(),
            "Replication finished"
        );
        report
    }

    /// Returns the path children are created under, or `None` to skip them.
    async fn container(&self, node: &TreeNode, parent_path: &str, report: &mut ReplicationReport) -> Option<String> {
        if self.target.is_preexisting(node) {
            debug!(container = %node.name, path = parent_path, "Reusing pre-existing container");
            report.containers_preexisting += 1;
            return Some(parent_path.to_string());
        }

        let path = self.target.child_path(parent_path, node);
        match self.target.create_container(parent_path, node).await {
            Ok(()) => {
                report.containers_created += 1;
                if node.payload.is_some() {
                    report.payload_nodes_created += 1;
                }
                report.created_paths.push(path.clone());
                Some(path)
            }
            Err(e) if e.is_already_exists() => {
                debug!(path = %path, "Container already exists");
                report.containers_existing += 1;
                Some(path)
            }
            Err(e) => {
                report.skip(path, &e);
                None
            }
        }
    }

    async fn leaf(&self, node: &TreeNode, parent_path: &str, report: &mut ReplicationReport) {
        let path = self.target.child_path(parent_path, node);
        let mut outcome = self.target.create_leaf(parent_path, node).await;

        if matches!(&outcome, Err(e) if e.is_transient()) {
            debug!(path = %path, "Retrying leaf once");
            tokio::time::sleep(self.leaf_retry_delay).await;
            outcome = self.target.create_leaf(parent_path, node).await;
        }

        match outcome {
            Ok(()) => {
                report.payload_nodes_created += 1;
                report.created_paths.push(path);
            }
            Err(e) => report.skip(path, &e),
        }
    }
}
