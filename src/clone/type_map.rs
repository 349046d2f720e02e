use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::devops::types::WorkItemType;

/// Candidate target types for source types the target process lacks.
const TYPE_PRECEDENCE: &[(&str, &[&str])] = &[
    ("User Story", &["Product Backlog Item", "Requirement", "Issue"]),
    ("Product Backlog Item", &["User Story", "Requirement", "Issue"]),
    ("Requirement", &["User Story", "Product Backlog Item", "Issue"]),
    ("Issue", &["User Story", "Product Backlog Item", "Requirement"]),
    ("Bug", &["Issue", "Product Backlog Item", "User Story"]),
    ("Impediment", &["Issue", "Risk"]),
    ("Risk", &["Issue", "Impediment"]),
    ("Change Request", &["Issue", "Requirement"]),
    ("Feature", &["Epic"]),
    ("Review", &["Task"]),
];

/// Fields that carry the same meaning across process templates.
const FIELD_EQUIVALENCE: &[&[&str]] = &[&[
    "Microsoft.VSTS.Scheduling.StoryPoints",
    "Microsoft.VSTS.Scheduling.Effort",
    "Microsoft.VSTS.Scheduling.Size",
]];

/// Source → target work item type and field reconciliation for one run.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    types: HashMap<String, String>,
    fallback: Option<String>,
    /// Declared fields per target type; `None` means unknown, keep everything.
    target_fields: Option<HashMap<String, HashSet<String>>>,
}

impl TypeMap {
    /// Every type maps to itself and every field is kept.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn build(source: &[WorkItemType], target: &[WorkItemType]) -> Self {
        let available: Vec<&WorkItemType> = target.iter().filter(|t| !t.is_disabled).collect();
        if available.is_empty() {
            return Self::identity();
        }

        let find = |name: &str| {
            available
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .map(|t| t.name.clone())
        };

        let mut types = HashMap::new();
        for source_type in source {
            let name = &source_type.name;
            let mapped = find(name.as_str()).or_else(|| {
                TYPE_PRECEDENCE
                    .iter()
                    .find(|(from, _)| from.eq_ignore_ascii_case(name))
                    .and_then(|(_, candidates)| candidates.iter().find_map(|c| find(*c)))
            });
            if let Some(mapped) = mapped {
                if !mapped.eq_ignore_ascii_case(name) {
                    info!(source_type = %name, target_type = %mapped, "Mapping work item type");
                }
                types.insert(name.to_ascii_lowercase(), mapped);
            }
        }

        let target_fields = available
            .iter()
            .map(|t| {
                let fields = t.fields.iter().map(|f| f.reference_name.clone()).collect();
                (t.name.to_ascii_lowercase(), fields)
            })
            .collect();

        Self {
            types,
            fallback: available.first().map(|t| t.name.clone()),
            target_fields: Some(target_fields),
        }
    }

    /// Target type for a source type.
    pub fn map_type(&self, source_type: &str) -> String {
        if let Some(mapped) = self.types.get(&source_type.to_ascii_lowercase()) {
            return mapped.clone();
        }
        match (&self.target_fields, &self.fallback) {
            (Some(_), Some(fallback)) => {
                debug!(source_type, fallback = %fallback, "No matching target type; using fallback");
                fallback.clone()
            }
            _ => source_type.to_string(),
        }
    }

    /// Target field for an allow-listed source field, or `None` to drop it.
    pub fn map_field(&self, target_type: &str, field: &str) -> Option<String> {
        let Some(all_fields) = &self.target_fields else {
            return Some(field.to_string());
        };
        let Some(declared) = all_fields.get(&target_type.to_ascii_lowercase()) else {
            return Some(field.to_string());
        };
        if declared.is_empty() || declared.contains(field) {
            return Some(field.to_string());
        }
        FIELD_EQUIVALENCE
            .iter()
            .find(|group| group.contains(&field))
            .and_then(|group| group.iter().find(|f| declared.contains(**f)))
            .map(|f| f.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::types::WorkItemTypeField;

    fn wit(name: &str, fields: &[&str]) -> WorkItemType {
        WorkItemType {
            name: name.to_string(),
            is_disabled: false,
            fields: fields
                .iter()
                .map(|f| WorkItemTypeField {
                    reference_name: f.to_string(),
                    name: None,
                })
                .collect(),
        }
    }

    fn agile() -> Vec<WorkItemType> {
        vec![
            wit("Epic", &[]),
            wit("User Story", &["System.Title", "Microsoft.VSTS.Scheduling.StoryPoints"]),
            wit("Task", &[]),
        ]
    }

    fn scrum() -> Vec<WorkItemType> {
        vec![
            wit("Product Backlog Item", &["System.Title", "Microsoft.VSTS.Scheduling.Effort"]),
            wit("Task", &["System.Title"]),
            wit("Bug", &[]),
        ]
    }

    #[test]
    fn identical_names_map_directly() {
        let map = TypeMap::build(&agile(), &scrum());
        assert_eq!(map.map_type("Task"), "Task");
        assert_eq!(map.map_type("task"), "Task");
    }

    #[test]
    fn precedence_table_then_fallback() {
        let map = TypeMap::build(&agile(), &scrum());
        assert_eq!(map.map_type("User Story"), "Product Backlog Item");
        assert_eq!(map.map_type("Epic"), "Product Backlog Item");
    }

    #[test]
    fn equivalent_field_substitutes_missing_one() {
        let map = TypeMap::build(&agile(), &scrum());
        assert_eq!(
            map.map_field("Product Backlog Item", "Microsoft.VSTS.Scheduling.StoryPoints").as_deref(),
            Some("Microsoft.VSTS.Scheduling.Effort")
        );
        assert_eq!(map.map_field("Task", "Microsoft.VSTS.Common.ValueArea"), None);
        assert_eq!(map.map_field("Task", "System.Title").as_deref(), Some("System.Title"));
    }

    #[test]
    fn identity_keeps_everything() {
        let map = TypeMap::identity();
        assert_eq!(map.map_type("Custom Thing"), "Custom Thing");
        assert_eq!(map.map_field("Custom Thing", "X.Y").as_deref(), Some("X.Y"));
        assert_eq!(TypeMap::build(&agile(), &[]).map_type("User Story"), "User Story");
    }
}
