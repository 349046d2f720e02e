//! Second pass of the work item clone: re-creating links between items.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::clone::id_map::IdentifierMap;
use crate::devops::client::DevOpsOps;
use crate::devops::types::{PatchOperation, WorkItem, WorkItemRelation};

pub const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";
pub const HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";
pub const RELATED: &str = "System.LinkTypes.Related";
pub const DEPENDENCY_FORWARD: &str = "System.LinkTypes.Dependency-Forward";
pub const DEPENDENCY_REVERSE: &str = "System.LinkTypes.Dependency-Reverse";
pub const ATTACHED_FILE: &str = "AttachedFile";

/// Target side of a mapped work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedItem {
    pub id: u32,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LinkClass {
    Hierarchy,
    Related,
    Dependency,
}

/// One undirected-equivalent link between two source items.
///
/// A reciprocal pair (A→child B, B→parent A) yields the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LinkKey {
    class: LinkClass,
    first: u32,
    second: u32,
}

impl LinkKey {
    fn of(rel: &str, from: u32, to: u32) -> Option<Self> {
        let (class, first, second) = match rel {
            HIERARCHY_FORWARD => (LinkClass::Hierarchy, from, to),
            HIERARCHY_REVERSE => (LinkClass::Hierarchy, to, from),
            RELATED => (LinkClass::Related, from.min(to), from.max(to)),
            DEPENDENCY_FORWARD => (LinkClass::Dependency, from, to),
            DEPENDENCY_REVERSE => (LinkClass::Dependency, to, from),
            _ => return None,
        };
        Some(Self { class, first, second })
    }
}

/// Relation kinds re-created between cloned items.
pub fn is_link_kind(rel: &str) -> bool {
    matches!(
        rel,
        HIERARCHY_FORWARD | HIERARCHY_REVERSE | RELATED | DEPENDENCY_FORWARD | DEPENDENCY_REVERSE
    )
}

/// Referenced work item ID: the final path segment of the relation URL.
///
/// Anything that is not a plain number yields `None`.
pub fn relation_target_id(url: &str) -> Option<u32> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Replace the trailing ID of a work item URL.
pub fn with_target_id(url: &str, id: u32) -> String {
    match url.trim_end_matches('/').rsplit_once('/') {
        Some((base, _)) => format!("{base}/{id}"),
        None => id.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: usize,
    pub duplicates: usize,
    pub skipped_unmapped: usize,
    pub skipped_unparseable: usize,
    pub failed_updates: usize,
}

fn link_attributes(relation: &WorkItemRelation) -> Option<BTreeMap<String, Value>> {
    let comment = relation.attributes.as_ref()?.get("comment")?.clone();
    Some(BTreeMap::from([("comment".to_string(), comment)]))
}

/// Re-create hierarchy, related and dependency links on the target.
///
/// Every pending relation of one item is applied with a single update.
/// Relations whose other end was not cloned are skipped.
pub async fn link_work_items(
    ops: &dyn DevOpsOps,
    source_items: &[WorkItem],
    map: &IdentifierMap<u32, MappedItem>,
) -> LinkReport {
    let mut report = LinkReport::default();
    let mut seen: HashSet<LinkKey> = HashSet::new();

    for item in source_items {
        let Some(target) = map.get(&item.id) else {
            continue;
        };

        let mut pending = Vec::new();
        let mut keys = Vec::new();
        for relation in item.relations() {
            if !is_link_kind(&relation.rel) {
                continue;
            }
            let Some(other) = relation_target_id(&relation.url) else {
                report.skipped_unparseable += 1;
                continue;
            };
            let Some(other_target) = map.get(&other) else {
                report.skipped_unmapped += 1;
                continue;
            };
            let Some(key) = LinkKey::of(&relation.rel, item.id, other) else {
                continue;
            };
            if seen.contains(&key) || keys.contains(&key) {
                report.duplicates += 1;
                continue;
            }
            keys.push(key);
            pending.push(PatchOperation::add_relation(&WorkItemRelation {
                rel: relation.rel.clone(),
                url: other_target.url.clone(),
                attributes: link_attributes(relation),
            }));
        }

        if pending.is_empty() {
            continue;
        }

        match ops.update_work_item(target.id, &pending).await {
            Ok(_) => {
                debug!(source_id = item.id, target_id = target.id, links = pending.len(), "Linked work item");
                report.linked += pending.len();
                // Only links that landed suppress their reciprocal
                seen.extend(keys);
            }
            Err(e) => {
                warn!(source_id = item.id, target_id = target.id, error = %e, "Failed to link work item");
                report.failed_updates += 1;
            }
        }
    }

    report
}
