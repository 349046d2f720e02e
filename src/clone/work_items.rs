//! Work item clone: creation in dependency order, then relationship linking.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::clone::id_map::IdentifierMap;
use crate::clone::relations::{link_work_items, with_target_id, LinkReport, MappedItem, ATTACHED_FILE};
use crate::clone::sequencer;
use crate::clone::type_map::TypeMap;
use crate::config::WorkItemOrdering;
use crate::devops::client::DevOpsOps;
use crate::devops::types::{PatchOperation, Project, WorkItem, WorkItemRelation};
use crate::observability::OperationTimer;

pub const SOURCE_ITEMS_WIQL: &str =
    "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = @project ORDER BY [System.Id]";

/// Fields copied verbatim into the new item.
pub const COPIED_FIELDS: &[&str] = &[
    "System.Title",
    "System.Description",
    "Microsoft.VSTS.Common.AcceptanceCriteria",
    "Microsoft.VSTS.Common.Priority",
    "Microsoft.VSTS.Common.BusinessValue",
    "Microsoft.VSTS.Common.ValueArea",
    "Microsoft.VSTS.Scheduling.Effort",
    "Microsoft.VSTS.Scheduling.StoryPoints",
    "Microsoft.VSTS.Scheduling.RemainingWork",
    "Microsoft.VSTS.Scheduling.OriginalEstimate",
    "Microsoft.VSTS.Common.Activity",
    "System.Tags",
];

/// Copied only when areas and iterations exist on the target.
pub const CLASSIFICATION_FIELDS: &[&str] = &["System.AreaPath", "System.IterationPath"];

#[derive(Debug, Clone, Copy)]
pub struct WorkItemCloneOptions {
    pub ordering: WorkItemOrdering,
    pub copy_classification_paths: bool,
}

#[derive(Debug, Default)]
pub struct CreationReport {
    pub created: usize,
    pub failed: usize,
    pub attachments_copied: usize,
    pub attachment_failures: usize,
    pub map: IdentifierMap<u32, MappedItem>,
}

/// Rewrite a `Project\Area\Sub` path to start with the target project.
pub fn rewrite_classification_path(path: &str, source_project: &str, target_project: &str) -> String {
    match path.split_once('\\') {
        Some((head, rest)) if head.eq_ignore_ascii_case(source_project) => format!("{target_project}\\{rest}"),
        None if path.eq_ignore_ascii_case(source_project) => target_project.to_string(),
        _ => path.to_string(),
    }
}

fn is_classification_op(op: &PatchOperation) -> bool {
    op.path
        .strip_prefix("/fields/")
        .is_some_and(|field| CLASSIFICATION_FIELDS.contains(&field))
}

fn attachment_name(relation: &WorkItemRelation) -> String {
    relation
        .attributes
        .as_ref()
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            relation
                .url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("attachment")
                .to_string()
        })
}

pub struct WorkItemCloner<'a> {
    ops: &'a dyn DevOpsOps,
    source: &'a Project,
    target: &'a Project,
    options: WorkItemCloneOptions,
}

impl<'a> WorkItemCloner<'a> {
    pub fn new(ops: &'a dyn DevOpsOps, source: &'a Project, target: &'a Project, options: WorkItemCloneOptions) -> Self {
        Self {
            ops,
            source,
            target,
            options,
        }
    }

    pub async fn fetch_source_items(&self) -> Result<Vec<WorkItem>> {
        let ids = self
            .ops
            .query_work_items(&self.source.id, SOURCE_ITEMS_WIQL)
            .await
            .context("Failed to query source work items")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.ops
            .get_work_items(&ids)
            .await
            .context("Failed to fetch source work items")
    }

    /// Reconcile work item types; identity when the target cannot be read.
    pub async fn build_type_map(&self) -> TypeMap {
        let source = self.ops.list_work_item_types(&self.source.id).await;
        let target = self.ops.list_work_item_types(&self.target.id).await;
        match (source, target) {
            (Ok(source), Ok(target)) => TypeMap::build(&source, &target),
            (_, Err(e)) | (Err(e), _) => {
                warn!(error = %e, "Could not list work item types; keeping source types");
                TypeMap::identity()
            }
        }
    }

    fn creation_patch(&self, item: &WorkItem, target_type: &str, type_map: &TypeMap) -> Vec<PatchOperation> {
        let mut patch = Vec::new();
        let mut written: HashSet<String> = HashSet::new();

        for field in COPIED_FIELDS {
            let Some(value) = item.fields.get(*field) else {
                continue;
            };
            let Some(target_field) = type_map.map_field(target_type, field) else {
                debug!(field, target_type, "Dropping field unknown to target type");
                continue;
            };
            if written.insert(target_field.clone()) {
                patch.push(PatchOperation::add_field(&target_field, value.clone()));
            }
        }

        if self.options.copy_classification_paths {
            for field in CLASSIFICATION_FIELDS {
                if let Some(path) = item.fields.get(*field).and_then(Value::as_str) {
                    let rewritten = rewrite_classification_path(path, &self.source.name, &self.target.name);
                    patch.push(PatchOperation::add_field(field, Value::String(rewritten)));
                }
            }
        }

        patch
    }

    /// Download each attachment and re-attach it to `target_id` with one update.
    async fn copy_attachments(&self, item: &WorkItem, target_id: u32, report: &mut CreationReport) {
        let mut relations = Vec::new();
        for relation in item.relations().iter().filter(|r| r.rel == ATTACHED_FILE) {
            let name = attachment_name(relation);
            let uploaded = match self.ops.get_attachment(&relation.url).await {
                Ok(content) => self.ops.create_attachment(&self.target.id, &name, content).await,
                Err(e) => Err(e),
            };
            match uploaded {
                Ok(reference) => relations.push(PatchOperation::add_relation(&WorkItemRelation {
                    rel: ATTACHED_FILE.to_string(),
                    url: reference.url,
                    attributes: Some(BTreeMap::from([("name".to_string(), Value::String(name))])),
                })),
                Err(e) => {
                    warn!(source_id = item.id, attachment = %name, error = %e, "Failed to copy attachment");
                    report.attachment_failures += 1;
                }
            }
        }

        if relations.is_empty() {
            return;
        }
        let count = relations.len();
        match self.ops.update_work_item(target_id, &relations).await {
            Ok(_) => report.attachments_copied += count,
            Err(e) => {
                warn!(target_id, error = %e, "Failed to attach files");
                report.attachment_failures += count;
            }
        }
    }

    /// Pass 1: create every item in order and record source → target IDs.
    pub async fn create_items(&self, items: &[WorkItem], type_map: &TypeMap) -> CreationReport {
        let mut report = CreationReport::default();

        for item in items {
            let Some(source_type) = item.work_item_type() else {
                warn!(source_id = item.id, "Work item has no type; skipping");
                report.failed += 1;
                continue;
            };
            let target_type = type_map.map_type(source_type);
            let patch = self.creation_patch(item, &target_type, type_map);

            let first = self.ops.create_work_item(&self.target.id, &target_type, &patch).await;
            let created = match first {
                // A rejected area or iteration path must not lose the item
                Err(e) if !e.is_transient() && patch.iter().any(is_classification_op) => {
                    debug!(source_id = item.id, error = %e, "Retrying without area and iteration paths");
                    let reduced: Vec<PatchOperation> =
                        patch.into_iter().filter(|op| !is_classification_op(op)).collect();
                    self.ops.create_work_item(&self.target.id, &target_type, &reduced).await
                }
                other => other,
            };
            let created = match created {
                Ok(created) => created,
                Err(e) => {
                    warn!(source_id = item.id, title = item.title(), error = %e, "Failed to create work item");
                    report.failed += 1;
                    continue;
                }
            };

            let url = created
                .url
                .clone()
                .or_else(|| item.url.as_deref().map(|u| with_target_id(u, created.id)))
                .unwrap_or_default();
            if let Err(e) = report.map.insert(item.id, MappedItem { id: created.id, url }) {
                warn!(error = %e, "Duplicate source work item");
                continue;
            }
            report.created += 1;
            debug!(source_id = item.id, target_id = created.id, work_item_type = %target_type, "Created work item");

            self.copy_attachments(item, created.id, &mut report).await;
        }

        report
    }

    /// Both passes. Fails only when items existed and none could be created.
    pub async fn run(&self) -> Result<String> {
        let timer = OperationTimer::new("clone_work_items");

        let items = self.fetch_source_items().await?;
        if items.is_empty() {
            timer.finish();
            return Ok("No work items to clone".to_string());
        }
        let total = items.len();

        let type_map = self.build_type_map().await;
        let ordered = sequencer::order_with(self.options.ordering, items);
        let creation = self.create_items(&ordered, &type_map).await;
        let links: LinkReport = link_work_items(self.ops, &ordered, &creation.map).await;

        info!(
            total,
            created = creation.created,
            failed = creation.failed,
            attachments = creation.attachments_copied,
            links = links.linked,
            "Work items cloned"
        );
        timer.finish();

        if creation.created == 0 {
            anyhow::bail!("None of the {total} work items could be created");
        }

        let mut message = format!(
            "Created {} of {total} work items, linked {} relations",
            creation.created, links.linked
        );
        if creation.attachments_copied > 0 {
            message.push_str(&format!(", copied {} attachments", creation.attachments_copied));
        }
        if creation.failed > 0 {
            message.push_str(&format!(", {} failed", creation.failed));
        }
        Ok(message)
    }
}
