//! Wire models for the platform REST API (api-version 7.0).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Envelope used by every list endpoint: `{ "count": n, "value": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: Option<u32>,
    pub value: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub capabilities: Option<ProjectCapabilities>,
    #[serde(default)]
    pub default_team: Option<TeamReference>,
    #[serde(default, rename = "_links")]
    pub links: Option<Links>,
}

impl Project {
    pub fn process_template_id(&self) -> Option<&str> {
        self.capabilities
            .as_ref()
            .and_then(|c| c.process_template.as_ref())
            .and_then(|p| p.template_type_id.as_deref())
    }

    pub fn source_control_type(&self) -> &str {
        self.capabilities
            .as_ref()
            .and_then(|c| c.versioncontrol.as_ref())
            .and_then(|v| v.source_control_type.as_deref())
            .unwrap_or("Git")
    }

    pub fn web_url(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.web.as_ref())
            .map(|w| w.href.as_str())
    }

    /// Name of the team the platform provisions with every project.
    pub fn default_team_name(&self) -> String {
        self.default_team
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("{} Team", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCapabilities {
    #[serde(default)]
    pub versioncontrol: Option<VersionControlCapability>,
    #[serde(default)]
    pub process_template: Option<ProcessTemplateCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionControlCapability {
    #[serde(default)]
    pub source_control_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTemplateCapability {
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub template_type_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Links {
    #[serde(default)]
    pub web: Option<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamReference {
    pub id: String,
    pub name: String,
}

/// Body for `POST _apis/projects`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    pub visibility: String,
    pub capabilities: ProjectCapabilities,
}

impl CreateProjectRequest {
    pub fn new(
        name: &str,
        description: &str,
        source_control_type: &str,
        process_template_id: Option<&str>,
        visibility: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            visibility: visibility.unwrap_or("private").to_string(),
            capabilities: ProjectCapabilities {
                versioncontrol: Some(VersionControlCapability {
                    source_control_type: Some(source_control_type.to_string()),
                }),
                process_template: Some(ProcessTemplateCapability {
                    template_name: None,
                    template_type_id: process_template_id.map(str::to_string),
                }),
            },
        }
    }
}

/// Body for `PATCH _apis/projects/{id}`.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

/// Long-running operation handle returned by project create/update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationReference {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectProperty {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Areas or Iterations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StructureGroup {
    Area,
    Iteration,
}

impl StructureGroup {
    /// Path segment used by the classification node endpoints.
    pub fn path_segment(self) -> &'static str {
        match self {
            StructureGroup::Area => "Areas",
            StructureGroup::Iteration => "Iterations",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationNode {
    #[serde(default)]
    pub id: Option<u32>,
    pub name: String,
    pub structure_type: StructureGroup,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub children: Vec<ClassificationNode>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewClassificationNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub is_disabled: Option<bool>,
}

/// Work item as returned with `$expand=relations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkItem {
    pub id: u32,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub relations: Option<Vec<WorkItemRelation>>,
    #[serde(default)]
    pub url: Option<String>,
}

impl WorkItem {
    pub fn work_item_type(&self) -> Option<&str> {
        self.fields.get("System.WorkItemType").and_then(Value::as_str)
    }

    pub fn title(&self) -> &str {
        self.fields
            .get("System.Title")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn relations(&self) -> &[WorkItemRelation] {
        self.relations.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItemRelation {
    pub rel: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResponse {
    #[serde(default)]
    pub work_items: Vec<WorkItemReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemReference {
    pub id: u32,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub name: String,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub fields: Vec<WorkItemTypeField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemTypeField {
    pub reference_name: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One JSON-patch operation for work item and property endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.into(),
            value,
        }
    }

    pub fn add_field(reference_name: &str, value: Value) -> Self {
        Self::add(format!("/fields/{reference_name}"), value)
    }

    pub fn add_relation(relation: &WorkItemRelation) -> Self {
        Self::add(
            "/relations/-",
            serde_json::to_value(relation).unwrap_or(Value::Null),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentReference {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinitionReference {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// Node of the saved-query hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub wiql: Option<String>,
    #[serde(default)]
    pub children: Vec<QueryItem>,
}

/// Body for `POST _apis/wit/queries/{parent}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewQuery {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wiql: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_folder: bool,
}

impl NewQuery {
    pub fn folder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wiql: None,
            is_folder: true,
        }
    }

    pub fn query(name: &str, wiql: &str) -> Self {
        Self {
            name: name.to_string(),
            wiql: Some(wiql.to_string()),
            is_folder: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub widgets: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Wiki {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub wiki_type: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl Wiki {
    pub fn is_project_wiki(&self) -> bool {
        self.wiki_type.eq_ignore_ascii_case("projectWiki")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WikiPage {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_parent_page: bool,
    #[serde(default)]
    pub sub_pages: Vec<WikiPage>,
}

impl WikiPage {
    /// Last path segment; empty for the root page.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
}

/// Subset of team settings copied by the team configuration step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeamSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_visibilities: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugs_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_days: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub descriptor: String,
    pub display_name: String,
    #[serde(default)]
    pub principal_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub member_descriptor: String,
    pub container_descriptor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphDescriptor {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_exposes_capabilities() {
        let project: Project = serde_json::from_value(json!({
            "id": "p1",
            "name": "Source",
            "capabilities": {
                "versioncontrol": {"sourceControlType": "Git"},
                "processTemplate": {"templateName": "Agile", "templateTypeId": "adcc42ab"}
            },
            "_links": {"web": {"href": "https://dev.azure.com/org/Source"}}
        }))
        .unwrap();

        assert_eq!(project.process_template_id(), Some("adcc42ab"));
        assert_eq!(project.source_control_type(), "Git");
        assert_eq!(project.web_url(), Some("https://dev.azure.com/org/Source"));
        assert_eq!(project.default_team_name(), "Source Team");
    }

    #[test]
    fn create_request_carries_source_capabilities() {
        let request = CreateProjectRequest::new("Copy", "desc", "Git", Some("adcc42ab"), None);
        let expected = CreateProjectRequest {
            name: "Copy".to_string(),
            description: "desc".to_string(),
            visibility: "private".to_string(),
            capabilities: ProjectCapabilities {
                versioncontrol: Some(VersionControlCapability {
                    source_control_type: Some("Git".to_string()),
                }),
                process_template: Some(ProcessTemplateCapability {
                    template_name: None,
                    template_type_id: Some("adcc42ab".to_string()),
                }),
            },
        };
        assert_eq!(request, expected);
        assert_ne!(request, CreateProjectRequest::new("Copy", "desc", "Tfvc", Some("adcc42ab"), None));
    }

    #[test]
    fn new_query_folder_serializes_flag() {
        let body = serde_json::to_value(NewQuery::folder("My Folder")).unwrap();
        assert_eq!(body, json!({"name": "My Folder", "isFolder": true}));
        let body = serde_json::to_value(NewQuery::query("Q", "SELECT 1")).unwrap();
        assert_eq!(body, json!({"name": "Q", "wiql": "SELECT 1"}));
    }

    #[test]
    fn wiki_page_name_is_last_segment() {
        let page = WikiPage {
            path: "/Guides/Setup".to_string(),
            ..Default::default()
        };
        assert_eq!(page.name(), "Setup");
        let root = WikiPage {
            path: "/".to_string(),
            ..Default::default()
        };
        assert_eq!(root.name(), "");
    }
}
