//! Work item creation order.
//!
//! Items without a parent reference are always created before items with
//! one, so a parent exists on the target before any child referencing it.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::warn;

use crate::clone::relations::{relation_target_id, HIERARCHY_REVERSE};
use crate::config::WorkItemOrdering;
use crate::devops::types::WorkItem;

const PARENT_FIELD: &str = "System.Parent";

/// Parent ID from a `Hierarchy-Reverse` relation or the `System.Parent` field.
pub fn parent_id(item: &WorkItem) -> Option<u32> {
    item.relations()
        .iter()
        .find(|r| r.rel == HIERARCHY_REVERSE)
        .and_then(|r| relation_target_id(&r.url))
        .or_else(|| {
            item.fields
                .get(PARENT_FIELD)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
        })
}

pub fn has_parent(item: &WorkItem) -> bool {
    item.relations().iter().any(|r| r.rel == HIERARCHY_REVERSE) || item.fields.contains_key(PARENT_FIELD)
}

/// Stable partition: parentless items first, relative order kept in both groups.
pub fn order(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let (roots, children): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| !has_parent(item));
    roots.into_iter().chain(children).collect()
}

/// Roots first, then every child after its in-batch parent.
///
/// Ties are broken by input position. Items caught in a parent cycle are
/// appended in input order.
pub fn order_topologically(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut index_of: HashMap<u32, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        index_of.entry(item.id).or_insert(index);
    }

    let mut emitted: Vec<usize> = Vec::with_capacity(items.len());
    let mut done: HashSet<usize> = HashSet::new();
    let mut waiting_on: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut ready: BTreeSet<usize> = BTreeSet::new();

    for (index, item) in items.iter().enumerate() {
        if !has_parent(item) {
            emitted.push(index);
            done.insert(index);
        }
    }

    for (index, item) in items.iter().enumerate() {
        if done.contains(&index) {
            continue;
        }
        match parent_id(item).and_then(|id| index_of.get(&id).copied()) {
            Some(parent) if parent != index && !done.contains(&parent) => {
                waiting_on.entry(parent).or_default().push(index);
            }
            _ => {
                ready.insert(index);
            }
        }
    }

    while let Some(index) = ready.pop_first() {
        emitted.push(index);
        done.insert(index);
        if let Some(children) = waiting_on.remove(&index) {
            ready.extend(children.into_iter().filter(|c| !done.contains(c)));
        }
    }

    if emitted.len() < items.len() {
        let cyclic: Vec<u32> = (0..items.len())
            .filter(|i| !done.contains(i))
            .map(|i| items[i].id)
            .collect();
        warn!(work_items = ?cyclic, "Parent cycle detected; appending in source order");
        emitted.extend((0..items.len()).filter(|i| !done.contains(i)));
    }

    let mut slots: Vec<Option<WorkItem>> = items.into_iter().map(Some).collect();
    emitted.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Order with the configured strategy.
pub fn order_with(strategy: WorkItemOrdering, items: Vec<WorkItem>) -> Vec<WorkItem> {
    match strategy {
        WorkItemOrdering::Partition => order(items),
        WorkItemOrdering::Topological => order_topologically(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::types::WorkItemRelation;
    use serde_json::json;

    fn item(id: u32, parent: Option<u32>) -> WorkItem {
        WorkItem {
            id,
            relations: parent.map(|p| {
                vec![WorkItemRelation {
                    rel: HIERARCHY_REVERSE.to_string(),
                    url: format!("https://dev.azure.com/org/_apis/wit/workItems/{p}"),
                    attributes: None,
                }]
            }),
            ..Default::default()
        }
    }

    fn ids(items: &[WorkItem]) -> Vec<u32> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn partition_is_stable() {
        let items = vec![item(3, Some(1)), item(1, None), item(4, Some(3)), item(2, None)];
        assert_eq!(ids(&order(items)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn parent_field_counts_as_parent_reference() {
        let mut child = item(5, None);
        child.fields.insert(PARENT_FIELD.to_string(), json!(9));
        assert!(has_parent(&child));
        assert_eq!(parent_id(&child), Some(9));
    }

    #[test]
    fn topological_places_grandchildren_after_children() {
        let items = vec![item(30, Some(20)), item(20, Some(10)), item(10, None), item(40, Some(99))];
        assert_eq!(ids(&order_topologically(items)), vec![10, 20, 30, 40]);
    }

    #[test]
    fn cycles_are_appended_in_input_order() {
        let items = vec![item(2, Some(3)), item(1, None), item(3, Some(2))];
        assert_eq!(ids(&order_topologically(items)), vec![1, 2, 3]);
    }
}
