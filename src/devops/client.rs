use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::ClonerConfig;
use crate::devops::errors::DevOpsError;
use crate::devops::types::*;
use crate::http::RateLimitedHttpClient;

const API_VERSION: &str = "7.0";
const PREVIEW_API_VERSION: &str = "7.0-preview.1";
const DASHBOARD_API_VERSION: &str = "7.0-preview.3";
/// `workitems?ids=` accepts at most 200 IDs per call
const WORK_ITEM_BATCH_SIZE: usize = 200;
/// Deepest level the queries endpoint expands in one call
const QUERY_EXPAND_DEPTH: u32 = 2;

/// Platform operations consumed by the clone pipeline.
///
/// `project` arguments accept a project name or ID unless the parameter is
/// named `project_id`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DevOpsOps: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DevOpsError>;
    async fn get_project(&self, project: &str) -> Result<Project, DevOpsError>;
    async fn create_project(&self, request: &CreateProjectRequest) -> Result<OperationReference, DevOpsError>;
    async fn update_project(&self, project_id: &str, update: &ProjectUpdate) -> Result<OperationReference, DevOpsError>;
    async fn get_project_properties(&self, project_id: &str) -> Result<Vec<ProjectProperty>, DevOpsError>;
    async fn set_project_properties(&self, project_id: &str, properties: &[ProjectProperty]) -> Result<(), DevOpsError>;
    async fn list_process_templates(&self) -> Result<Vec<ProcessTemplate>, DevOpsError>;

    /// Area and iteration roots with their full subtrees.
    async fn list_classification_nodes(&self, project: &str) -> Result<Vec<ClassificationNode>, DevOpsError>;
    async fn create_classification_node(
        &self,
        project: &str,
        group: StructureGroup,
        parent_path: &str,
        node: &NewClassificationNode,
    ) -> Result<ClassificationNode, DevOpsError>;

    async fn list_repositories(&self, project: &str) -> Result<Vec<Repository>, DevOpsError>;
    async fn create_repository(&self, project_id: &str, name: &str) -> Result<Repository, DevOpsError>;

    /// Run a WIQL query and return the matching work item IDs.
    async fn query_work_items(&self, project: &str, wiql: &str) -> Result<Vec<u32>, DevOpsError>;
    /// Fetch work items with relations expanded.
    async fn get_work_items(&self, ids: &[u32]) -> Result<Vec<WorkItem>, DevOpsError>;
    async fn list_work_item_types(&self, project: &str) -> Result<Vec<WorkItemType>, DevOpsError>;
    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        patch: &[PatchOperation],
    ) -> Result<WorkItem, DevOpsError>;
    async fn update_work_item(&self, id: u32, patch: &[PatchOperation]) -> Result<WorkItem, DevOpsError>;
    async fn get_attachment(&self, url: &str) -> Result<Vec<u8>, DevOpsError>;
    async fn create_attachment(
        &self,
        project: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<AttachmentReference, DevOpsError>;

    async fn list_build_definitions(&self, project: &str) -> Result<Vec<BuildDefinitionReference>, DevOpsError>;
    async fn get_build_definition(&self, project: &str, id: u32) -> Result<Value, DevOpsError>;
    async fn create_build_definition(
        &self,
        project: &str,
        definition: &Value,
    ) -> Result<BuildDefinitionReference, DevOpsError>;

    /// Root query folders with their complete subtrees.
    async fn list_queries(&self, project: &str) -> Result<Vec<QueryItem>, DevOpsError>;
    async fn create_query(&self, project: &str, parent_path: &str, query: &NewQuery) -> Result<QueryItem, DevOpsError>;

    async fn list_dashboards(&self, project: &str, team: &str) -> Result<Vec<Dashboard>, DevOpsError>;
    async fn create_dashboard(&self, project: &str, team: &str, dashboard: &Dashboard) -> Result<Dashboard, DevOpsError>;

    async fn list_wikis(&self, project: &str) -> Result<Vec<Wiki>, DevOpsError>;
    async fn create_wiki(&self, project_id: &str, name: &str) -> Result<Wiki, DevOpsError>;
    /// Page at `path` with content and the full sub-page tree.
    async fn get_wiki_page(&self, project: &str, wiki_id: &str, path: &str) -> Result<WikiPage, DevOpsError>;
    async fn create_or_update_wiki_page(
        &self,
        project: &str,
        wiki_id: &str,
        path: &str,
        content: &str,
    ) -> Result<WikiPage, DevOpsError>;

    async fn list_teams(&self, project_id: &str) -> Result<Vec<Team>, DevOpsError>;
    async fn create_team(&self, project_id: &str, team: &NewTeam) -> Result<Team, DevOpsError>;
    async fn get_team_settings(&self, project: &str, team: &str) -> Result<TeamSettings, DevOpsError>;
    async fn update_team_settings(
        &self,
        project: &str,
        team: &str,
        settings: &TeamSettings,
    ) -> Result<TeamSettings, DevOpsError>;

    async fn list_groups(&self, project_id: &str) -> Result<Vec<SecurityGroup>, DevOpsError>;
    async fn list_memberships(&self, group_descriptor: &str) -> Result<Vec<Membership>, DevOpsError>;
    async fn add_membership(&self, member_descriptor: &str, group_descriptor: &str) -> Result<(), DevOpsError>;
}

/// REST implementation of [`DevOpsOps`].
#[derive(Debug, Clone)]
pub struct DevOpsClient {
    http: RateLimitedHttpClient,
    endpoint: String,
    graph_endpoint: String,
}

impl DevOpsClient {
    pub fn new(endpoint: &str, credential: &str, config: &ClonerConfig) -> Result<Self, DevOpsError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if Url::parse(endpoint).is_err() {
            return Err(DevOpsError::Configuration {
                message: format!("'{endpoint}' is not a valid organization URL"),
            });
        }
        if credential.trim().is_empty() {
            return Err(DevOpsError::Configuration {
                message: "personal access token is empty".to_string(),
            });
        }

        let http = RateLimitedHttpClient::new(
            credential.trim(),
            &config.rate_limit,
            Duration::from_secs(config.platform.request_timeout_seconds.max(1)),
        )?;

        let mut graph_config = config.clone();
        graph_config.platform.endpoint = endpoint.to_string();

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            graph_endpoint: graph_config.graph_endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build `{base}/{segments...}?api-version=..` with every segment
    /// percent-encoded. Segments containing `/` are split first so that
    /// query and classification paths keep their hierarchy.
    fn url(&self, base: &str, segments: &[&str], api_version: &str) -> Result<Url, DevOpsError> {
        let mut url = Url::parse(base).map_err(|e| DevOpsError::Configuration {
            message: format!("invalid base URL '{base}': {e}"),
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| DevOpsError::Configuration {
                message: format!("base URL '{base}' cannot carry a path"),
            })?;
            path.pop_if_empty();
            for segment in segments {
                for part in segment.split('/').filter(|p| !p.is_empty()) {
                    path.push(part);
                }
            }
        }
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn api(&self, segments: &[&str]) -> Result<Url, DevOpsError> {
        self.url(&self.endpoint, segments, API_VERSION)
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, url: Url, resource: &str) -> Result<Vec<T>, DevOpsError> {
        let response: ListResponse<T> = self.http.send_json(self.http.get(url.as_str()), resource).await?;
        Ok(response.value)
    }

    /// Expand folders the list call left collapsed.
    fn expand_query_children<'a>(
        &'a self,
        project: &'a str,
        item: &'a mut QueryItem,
    ) -> Pin<Box<dyn Future<Output = Result<(), DevOpsError>> + Send + 'a>> {
        Box::pin(async move {
            if item.is_folder && item.has_children && item.children.is_empty() {
                let mut url = self.api(&[project, "_apis/wit/queries", &item.path])?;
                url.query_pairs_mut()
                    .append_pair("$depth", &QUERY_EXPAND_DEPTH.to_string())
                    .append_pair("$expand", "all");
                let expanded: QueryItem = self
                    .http
                    .send_json(self.http.get(url.as_str()), "query folder")
                    .await?;
                item.children = expanded.children;
            }
            for child in item.children.iter_mut() {
                self.expand_query_children(project, child).await?;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl DevOpsOps for DevOpsClient {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DevOpsError> {
        let url = self.api(&["_apis/projects"])?;
        self.list(url, "projects").await
    }

    async fn get_project(&self, project: &str) -> Result<Project, DevOpsError> {
        let mut url = self.api(&["_apis/projects", project])?;
        url.query_pairs_mut().append_pair("includeCapabilities", "true");
        self.http
            .send_json(self.http.get(url.as_str()), &format!("project '{project}'"))
            .await
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<OperationReference, DevOpsError> {
        let url = self.api(&["_apis/projects"])?;
        debug!(project = %request.name, "Queueing project creation");
        self.http
            .send_json(
                self.http.post(url.as_str()).json(request),
                &format!("project '{}'", request.name),
            )
            .await
    }

    async fn update_project(&self, project_id: &str, update: &ProjectUpdate) -> Result<OperationReference, DevOpsError> {
        let url = self.api(&["_apis/projects", project_id])?;
        self.http
            .send_json(self.http.patch(url.as_str()).json(update), "project")
            .await
    }

    async fn get_project_properties(&self, project_id: &str) -> Result<Vec<ProjectProperty>, DevOpsError> {
        let url = self.url(&self.endpoint, &["_apis/projects", project_id, "properties"], PREVIEW_API_VERSION)?;
        self.list(url, "project properties").await
    }

    async fn set_project_properties(&self, project_id: &str, properties: &[ProjectProperty]) -> Result<(), DevOpsError> {
        if properties.is_empty() {
            return Ok(());
        }
        let url = self.url(&self.endpoint, &["_apis/projects", project_id, "properties"], PREVIEW_API_VERSION)?;
        let patch: Vec<PatchOperation> = properties
            .iter()
            .map(|p| PatchOperation::add(format!("/{}", p.name), p.value.clone()))
            .collect();
        let body = serde_json::to_vec(&patch)?;
        let request = self
            .http
            .patch(url.as_str())
            .header(CONTENT_TYPE, "application/json-patch+json")
            .body(body);
        self.http.send_unit(request, "project properties").await
    }

    async fn list_process_templates(&self) -> Result<Vec<ProcessTemplate>, DevOpsError> {
        let url = self.api(&["_apis/process/processes"])?;
        let response: ListResponse<ProcessTemplate> = self.http.get_cached(url.as_str(), "process templates").await?;
        Ok(response.value)
    }

    async fn list_classification_nodes(&self, project: &str) -> Result<Vec<ClassificationNode>, DevOpsError> {
        let mut url = self.api(&[project, "_apis/wit/classificationnodes"])?;
        url.query_pairs_mut().append_pair("$depth", "20");
        self.list(url, "classification nodes").await
    }

    async fn create_classification_node(
        &self,
        project: &str,
        group: StructureGroup,
        parent_path: &str,
        node: &NewClassificationNode,
    ) -> Result<ClassificationNode, DevOpsError> {
        let url = self.api(&[project, "_apis/wit/classificationnodes", group.path_segment(), parent_path])?;
        self.http
            .send_json(
                self.http.post(url.as_str()).json(node),
                &format!("{} node '{}'", group.path_segment(), node.name),
            )
            .await
    }

    async fn list_repositories(&self, project: &str) -> Result<Vec<Repository>, DevOpsError> {
        let url = self.api(&[project, "_apis/git/repositories"])?;
        self.list(url, "repositories").await
    }

    async fn create_repository(&self, project_id: &str, name: &str) -> Result<Repository, DevOpsError> {
        let url = self.api(&[project_id, "_apis/git/repositories"])?;
        let body = json!({ "name": name, "project": { "id": project_id } });
        self.http
            .send_json(self.http.post(url.as_str()).json(&body), &format!("repository '{name}'"))
            .await
    }

    async fn query_work_items(&self, project: &str, wiql: &str) -> Result<Vec<u32>, DevOpsError> {
        let url = self.api(&[project, "_apis/wit/wiql"])?;
        let response: WiqlResponse = self
            .http
            .send_json(self.http.post(url.as_str()).json(&json!({ "query": wiql })), "work item query")
            .await?;
        Ok(response.work_items.into_iter().map(|w| w.id).collect())
    }

    async fn get_work_items(&self, ids: &[u32]) -> Result<Vec<WorkItem>, DevOpsError> {
        let mut items = Vec::with_capacity(ids.len());
        for batch in ids.chunks(WORK_ITEM_BATCH_SIZE) {
            let joined = batch.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            let mut url = self.api(&["_apis/wit/workitems"])?;
            url.query_pairs_mut()
                .append_pair("ids", &joined)
                .append_pair("$expand", "relations");
            let mut page: Vec<WorkItem> = self.list(url, "work items").await?;
            items.append(&mut page);
        }
        Ok(items)
    }

    async fn list_work_item_types(&self, project: &str) -> Result<Vec<WorkItemType>, DevOpsError> {
        let url = self.api(&[project, "_apis/wit/workitemtypes"])?;
        let response: ListResponse<WorkItemType> = self.http.get_cached(url.as_str(), "work item types").await?;
        Ok(response.value)
    }

    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        patch: &[PatchOperation],
    ) -> Result<WorkItem, DevOpsError> {
        let type_segment = format!("${work_item_type}");
        let url = self.api(&[project, "_apis/wit/workitems", &type_segment])?;
        let request = self
            .http
            .post(url.as_str())
            .header(CONTENT_TYPE, "application/json-patch+json")
            .body(serde_json::to_vec(patch)?);
        self.http
            .send_json(request, &format!("{work_item_type} work item"))
            .await
    }

    async fn update_work_item(&self, id: u32, patch: &[PatchOperation]) -> Result<WorkItem, DevOpsError> {
        let url = self.api(&["_apis/wit/workitems", &id.to_string()])?;
        let request = self
            .http
            .patch(url.as_str())
            .header(CONTENT_TYPE, "application/json-patch+json")
            .body(serde_json::to_vec(patch)?);
        self.http.send_json(request, &format!("work item {id}")).await
    }

    async fn get_attachment(&self, url: &str) -> Result<Vec<u8>, DevOpsError> {
        self.http.send_bytes(self.http.get(url), "attachment").await
    }

    async fn create_attachment(
        &self,
        project: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<AttachmentReference, DevOpsError> {
        let mut url = self.api(&[project, "_apis/wit/attachments"])?;
        url.query_pairs_mut().append_pair("fileName", file_name);
        let request = self
            .http
            .post(url.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content);
        self.http
            .send_json(request, &format!("attachment '{file_name}'"))
            .await
    }

    async fn list_build_definitions(&self, project: &str) -> Result<Vec<BuildDefinitionReference>, DevOpsError> {
        let url = self.api(&[project, "_apis/build/definitions"])?;
        self.list(url, "build definitions").await
    }

    async fn get_build_definition(&self, project: &str, id: u32) -> Result<Value, DevOpsError> {
        let url = self.api(&[project, "_apis/build/definitions", &id.to_string()])?;
        self.http
            .send_json(self.http.get(url.as_str()), &format!("build definition {id}"))
            .await
    }

    async fn create_build_definition(
        &self,
        project: &str,
        definition: &Value,
    ) -> Result<BuildDefinitionReference, DevOpsError> {
        let url = self.api(&[project, "_apis/build/definitions"])?;
        self.http
            .send_json(self.http.post(url.as_str()).json(definition), "build definition")
            .await
    }

    async fn list_queries(&self, project: &str) -> Result<Vec<QueryItem>, DevOpsError> {
        let mut url = self.api(&[project, "_apis/wit/queries"])?;
        url.query_pairs_mut()
            .append_pair("$depth", &QUERY_EXPAND_DEPTH.to_string())
            .append_pair("$expand", "all");
        let mut roots: Vec<QueryItem> = self.list(url, "queries").await?;
        for root in roots.iter_mut() {
            self.expand_query_children(project, root).await?;
        }
        Ok(roots)
    }

    async fn create_query(&self, project: &str, parent_path: &str, query: &NewQuery) -> Result<QueryItem, DevOpsError> {
        let url = self.api(&[project, "_apis/wit/queries", parent_path])?;
        self.http
            .send_json(
                self.http.post(url.as_str()).json(query),
                &format!("query '{parent_path}/{}'", query.name),
            )
            .await
    }

    async fn list_dashboards(&self, project: &str, team: &str) -> Result<Vec<Dashboard>, DevOpsError> {
        let url = self.url(&self.endpoint, &[project, team, "_apis/dashboard/dashboards"], DASHBOARD_API_VERSION)?;
        let entries: Vec<Dashboard> = self.list(url, "dashboards").await?;
        let mut dashboards = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(id) = entry.id.as_deref() else {
                continue;
            };
            let url = self.url(
                &self.endpoint,
                &[project, team, "_apis/dashboard/dashboards", id],
                DASHBOARD_API_VERSION,
            )?;
            let full: Dashboard = self
                .http
                .send_json(self.http.get(url.as_str()), &format!("dashboard '{}'", entry.name))
                .await?;
            dashboards.push(full);
        }
        Ok(dashboards)
    }

    async fn create_dashboard(&self, project: &str, team: &str, dashboard: &Dashboard) -> Result<Dashboard, DevOpsError> {
        let url = self.url(&self.endpoint, &[project, team, "_apis/dashboard/dashboards"], DASHBOARD_API_VERSION)?;
        self.http
            .send_json(
                self.http.post(url.as_str()).json(dashboard),
                &format!("dashboard '{}'", dashboard.name),
            )
            .await
    }

    async fn list_wikis(&self, project: &str) -> Result<Vec<Wiki>, DevOpsError> {
        let url = self.api(&[project, "_apis/wiki/wikis"])?;
        self.list(url, "wikis").await
    }

    async fn create_wiki(&self, project_id: &str, name: &str) -> Result<Wiki, DevOpsError> {
        let url = self.api(&[project_id, "_apis/wiki/wikis"])?;
        let body = json!({ "name": name, "projectId": project_id, "type": "projectWiki" });
        self.http
            .send_json(self.http.post(url.as_str()).json(&body), &format!("wiki '{name}'"))
            .await
    }

    async fn get_wiki_page(&self, project: &str, wiki_id: &str, path: &str) -> Result<WikiPage, DevOpsError> {
        let mut url = self.api(&[project, "_apis/wiki/wikis", wiki_id, "pages"])?;
        url.query_pairs_mut()
            .append_pair("path", path)
            .append_pair("recursionLevel", "full")
            .append_pair("includeContent", "true");
        self.http
            .send_json(self.http.get(url.as_str()), &format!("wiki page '{path}'"))
            .await
    }

    async fn create_or_update_wiki_page(
        &self,
        project: &str,
        wiki_id: &str,
        path: &str,
        content: &str,
    ) -> Result<WikiPage, DevOpsError> {
        let mut url = self.api(&[project, "_apis/wiki/wikis", wiki_id, "pages"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.http
            .send_json(
                self.http.put(url.as_str()).json(&json!({ "content": content })),
                &format!("wiki page '{path}'"),
            )
            .await
    }

    async fn list_teams(&self, project_id: &str) -> Result<Vec<Team>, DevOpsError> {
        let url = self.api(&["_apis/projects", project_id, "teams"])?;
        self.list(url, "teams").await
    }

    async fn create_team(&self, project_id: &str, team: &NewTeam) -> Result<Team, DevOpsError> {
        let url = self.api(&["_apis/projects", project_id, "teams"])?;
        self.http
            .send_json(self.http.post(url.as_str()).json(team), &format!("team '{}'", team.name))
            .await
    }

    async fn get_team_settings(&self, project: &str, team: &str) -> Result<TeamSettings, DevOpsError> {
        let url = self.api(&[project, team, "_apis/work/teamsettings"])?;
        self.http
            .send_json(self.http.get(url.as_str()), &format!("team settings '{team}'"))
            .await
    }

    async fn update_team_settings(
        &self,
        project: &str,
        team: &str,
        settings: &TeamSettings,
    ) -> Result<TeamSettings, DevOpsError> {
        let url = self.api(&[project, team, "_apis/work/teamsettings"])?;
        self.http
            .send_json(
                self.http.patch(url.as_str()).json(settings),
                &format!("team settings '{team}'"),
            )
            .await
    }

    async fn list_groups(&self, project_id: &str) -> Result<Vec<SecurityGroup>, DevOpsError> {
        let url = self.url(&self.graph_endpoint, &["_apis/graph/descriptors", project_id], PREVIEW_API_VERSION)?;
        let scope: GraphDescriptor = self
            .http
            .send_json(self.http.get(url.as_str()), "project descriptor")
            .await?;
        let mut url = self.url(&self.graph_endpoint, &["_apis/graph/groups"], PREVIEW_API_VERSION)?;
        url.query_pairs_mut().append_pair("scopeDescriptor", &scope.value);
        self.list(url, "security groups").await
    }

    async fn list_memberships(&self, group_descriptor: &str) -> Result<Vec<Membership>, DevOpsError> {
        let mut url = self.url(
            &self.graph_endpoint,
            &["_apis/graph/Memberships", group_descriptor],
            PREVIEW_API_VERSION,
        )?;
        url.query_pairs_mut().append_pair("direction", "down");
        self.list(url, "memberships").await
    }

    async fn add_membership(&self, member_descriptor: &str, group_descriptor: &str) -> Result<(), DevOpsError> {
        let url = self.url(
            &self.graph_endpoint,
            &["_apis/graph/memberships", member_descriptor, group_descriptor],
            PREVIEW_API_VERSION,
        )?;
        self.http.send_unit(self.http.put(url.as_str()), "membership").await
    }
}
