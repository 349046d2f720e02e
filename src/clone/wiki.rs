use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clone::replicator::{HierarchicalReplicator, ReplicaTarget, TreeNode};
use crate::devops::client::DevOpsOps;
use crate::devops::types::{Project, Wiki, WikiPage};
use crate::devops::DevOpsError;

const ROOT_PATH: &str = "/";

/// Build the replication tree, taking content from `contents` when the page
/// listing omitted it.
fn to_tree(page: &WikiPage, contents: &HashMap<String, String>) -> TreeNode {
    let payload = page
        .content
        .clone()
        .or_else(|| contents.get(&page.path).cloned());
    TreeNode {
        name: page.name().to_string(),
        is_container: page.path == ROOT_PATH || page.is_parent_page || !page.sub_pages.is_empty(),
        payload: if page.path == ROOT_PATH { None } else { payload },
        children: page.sub_pages.iter().map(|p| to_tree(p, contents)).collect(),
    }
}

/// Paths of every non-root page lacking content.
fn pages_without_content(root: &WikiPage) -> Vec<String> {
    let mut missing = Vec::new();
    let mut stack = vec![root];
    while let Some(page) = stack.pop() {
        if page.path != ROOT_PATH && page.content.is_none() {
            missing.push(page.path.clone());
        }
        stack.extend(page.sub_pages.iter());
    }
    missing
}

/// Pages of one target project wiki
pub struct WikiTarget<'a> {
    ops: &'a dyn DevOpsOps,
    project: &'a str,
    wiki_id: &'a str,
}

impl<'a> WikiTarget<'a> {
    pub fn new(ops: &'a dyn DevOpsOps, project: &'a str, wiki_id: &'a str) -> Self {
        Self { ops, project, wiki_id }
    }

    async fn put_page(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError> {
        let path = self.child_path(parent_path, node);
        let content = node.payload.as_deref().unwrap_or_default();
        self.ops
            .create_or_update_wiki_page(self.project, self.wiki_id, &path, content)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ReplicaTarget for WikiTarget<'_> {
    fn is_preexisting(&self, node: &TreeNode) -> bool {
        node.name.is_empty()
    }

    fn child_path(&self, parent_path: &str, node: &TreeNode) -> String {
        let parent = parent_path.trim_end_matches('/');
        format!("{parent}/{}", node.name)
    }

    async fn create_container(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError> {
        self.put_page(parent_path, node).await
    }

    async fn create_leaf(&self, parent_path: &str, node: &TreeNode) -> Result<(), DevOpsError> {
        self.put_page(parent_path, node).await
    }
}

async fn ensure_target_wiki(ops: &dyn DevOpsOps, target: &Project) -> Result<Wiki> {
    let existing = ops
        .list_wikis(&target.id)
        .await
        .context("Failed to list target wikis")?;
    if let Some(wiki) = existing.into_iter().find(Wiki::is_project_wiki) {
        return Ok(wiki);
    }
    let name = format!("{}.wiki", target.name);
    info!(wiki = %name, "Creating target project wiki");
    ops.create_wiki(&target.id, &name)
        .await
        .with_context(|| format!("Failed to create wiki '{name}'"))
}

/// Copy the source project wiki page tree into the target project wiki.
pub async fn clone_wiki(
    ops: &dyn DevOpsOps,
    source_project: &Project,
    target_project: &Project,
    leaf_retry_delay: Duration,
) -> Result<String> {
    let wikis = ops
        .list_wikis(&source_project.id)
        .await
        .context("Failed to list source wikis")?;
    let Some(source_wiki) = wikis.iter().find(|w| w.is_project_wiki()) else {
        info!("Source project has no project wiki");
        return Ok("No project wiki to clone".to_string());
    };

    let root = ops
        .get_wiki_page(&source_project.id, &source_wiki.id, ROOT_PATH)
        .await
        .context("Failed to read source wiki pages")?;

    let mut contents = HashMap::new();
    for path in pages_without_content(&root) {
        match ops.get_wiki_page(&source_project.id, &source_wiki.id, &path).await {
            Ok(page) => {
                contents.insert(path, page.content.unwrap_or_default());
            }
            Err(e) => warn!(path = %path, error = %e, "Failed to read wiki page content"),
        }
    }
    debug!(fetched = contents.len(), "Fetched wiki page contents");

    let target_wiki = ensure_target_wiki(ops, target_project).await?;
    let target = WikiTarget::new(ops, &target_project.id, &target_wiki.id);
    let report = HierarchicalReplicator::new(&target, leaf_retry_delay)
        .replicate(&to_tree(&root, &contents), ROOT_PATH)
        .await;

    if report.all_failed() {
        anyhow::bail!("No wiki pages could be created ({} skipped)", report.skipped.len());
    }

    Ok(format!(
        "Created {} wiki pages, {} skipped",
        report.payload_nodes_created,
        report.skipped.len()
    ))
}
