//! In-memory platform for end-to-end clone tests.
//!
//! Projects resolve by ID or by case-insensitive name, created entities are
//! recorded for assertions, and any operation can be made to fail by name.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

use project_cloner::devops::types::*;
use project_cloner::{DevOpsError, DevOpsOps};

pub const FAKE_ENDPOINT: &str = "https://fake.dev/org";

#[derive(Debug, Clone, Default)]
pub struct FakeProject {
    pub project: Project,
    pub properties: Vec<ProjectProperty>,
    pub work_items: Vec<WorkItem>,
    pub queries: Vec<QueryItem>,
    pub wiki: Option<(Wiki, WikiPage)>,
    pub repositories: Vec<Repository>,
    pub teams: Vec<Team>,
}

#[derive(Debug, Default)]
struct State {
    projects: Vec<FakeProject>,
    next_id: u32,
    failing: HashSet<String>,
    failing_titles: HashSet<String>,
    created_work_items: Vec<String>,
    work_item_updates: Vec<(u32, Vec<PatchOperation>)>,
    created_queries: Vec<(String, String, NewQuery)>,
    wiki_writes: Vec<(String, String)>,
    project_creations: usize,
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

pub fn work_item_url(id: u32) -> String {
    format!("{FAKE_ENDPOINT}/_apis/wit/workItems/{id}")
}

pub fn parent_relation(parent_id: u32) -> WorkItemRelation {
    WorkItemRelation {
        rel: "System.LinkTypes.Hierarchy-Reverse".to_string(),
        url: work_item_url(parent_id),
        attributes: None,
    }
}

pub fn related_relation(other_id: u32) -> WorkItemRelation {
    WorkItemRelation {
        rel: "System.LinkTypes.Related".to_string(),
        url: work_item_url(other_id),
        attributes: None,
    }
}

pub fn work_item(id: u32, title: &str, relations: Vec<WorkItemRelation>) -> WorkItem {
    WorkItem {
        id,
        fields: [
            ("System.Title".to_string(), json!(title)),
            ("System.WorkItemType".to_string(), json!("User Story")),
        ]
        .into_iter()
        .collect(),
        relations: Some(relations),
        url: Some(work_item_url(id)),
    }
}

fn not_found(resource: &str) -> DevOpsError {
    DevOpsError::NotFound {
        resource: resource.to_string(),
    }
}

fn find_page<'a>(page: &'a WikiPage, path: &str) -> Option<&'a WikiPage> {
    if page.path == path {
        return Some(page);
    }
    page.sub_pages.iter().find_map(|p| find_page(p, path))
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Source project with a default team and default repository.
    pub fn with_project(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = format!("{}-id", name.to_lowercase());
            state.projects.push(FakeProject {
                project: Self::project(&id, name, Some("Seeded project")),
                repositories: vec![Repository {
                    id: format!("{id}-repo"),
                    name: name.to_string(),
                    default_branch: Some("refs/heads/main".to_string()),
                    is_disabled: None,
                }],
                teams: vec![Team {
                    id: format!("{id}-team"),
                    name: format!("{name} Team"),
                    description: None,
                }],
                ..Default::default()
            });
        }
        self
    }

    pub fn with_work_items(self, project: &str, items: Vec<WorkItem>) -> Self {
        self.edit(project, |p| p.work_items = items);
        self
    }

    pub fn with_queries(self, project: &str, roots: Vec<QueryItem>) -> Self {
        self.edit(project, |p| p.queries = roots);
        self
    }

    pub fn with_wiki(self, project: &str, root: WikiPage) -> Self {
        self.edit(project, |p| {
            let wiki = Wiki {
                id: format!("{}-wiki", p.project.id),
                name: format!("{}.wiki", p.project.name),
                wiki_type: "projectWiki".to_string(),
                project_id: Some(p.project.id.clone()),
            };
            p.wiki = Some((wiki, root));
        });
        self
    }

    /// Make every call of `operation` fail with a server error.
    pub fn failing(self, operation: &str) -> Self {
        self.state.lock().unwrap().failing.insert(operation.to_string());
        self
    }

    /// Make creation of the work item with `title` fail with a network error.
    pub fn failing_work_item(self, title: &str) -> Self {
        self.state.lock().unwrap().failing_titles.insert(title.to_string());
        self
    }

    pub fn project_named(&self, name: &str) -> Option<FakeProject> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .iter()
            .find(|p| p.project.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Titles of created work items, in creation order.
    pub fn created_work_items(&self) -> Vec<String> {
        self.state.lock().unwrap().created_work_items.clone()
    }

    pub fn work_item_updates(&self) -> Vec<(u32, Vec<PatchOperation>)> {
        self.state.lock().unwrap().work_item_updates.clone()
    }

    /// `(parent path, query)` for every create call.
    pub fn created_queries(&self) -> Vec<(String, NewQuery)> {
        self.state
            .lock()
            .unwrap()
            .created_queries
            .iter()
            .map(|(_, parent, query)| (parent.clone(), query.clone()))
            .collect()
    }

    /// `(path, content)` for every wiki page write.
    pub fn wiki_writes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().wiki_writes.clone()
    }

    pub fn project_creations(&self) -> usize {
        self.state.lock().unwrap().project_creations
    }

    fn project(id: &str, name: &str, description: Option<&str>) -> Project {
        Project {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            url: Some(format!("{FAKE_ENDPOINT}/_apis/projects/{id}")),
            state: Some("wellFormed".to_string()),
            visibility: Some("private".to_string()),
            capabilities: None,
            default_team: Some(TeamReference {
                id: format!("{id}-team"),
                name: format!("{name} Team"),
            }),
            links: Some(Links {
                web: Some(Link {
                    href: format!("{FAKE_ENDPOINT}/{name}"),
                }),
            }),
        }
    }

    fn edit(&self, project: &str, f: impl FnOnce(&mut FakeProject)) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = Self::lookup(&mut state, project) {
            f(p);
        }
    }

    fn lookup<'a>(state: &'a mut State, project: &str) -> Option<&'a mut FakeProject> {
        state
            .projects
            .iter_mut()
            .find(|p| p.project.id == project || p.project.name.eq_ignore_ascii_case(project))
    }

    fn check(&self, operation: &str) -> Result<(), DevOpsError> {
        if self.state.lock().unwrap().failing.contains(operation) {
            return Err(DevOpsError::Server {
                status: 500,
                message: format!("{operation} is unavailable"),
            });
        }
        Ok(())
    }

    fn with<T>(&self, project: &str, f: impl FnOnce(&mut FakeProject) -> T) -> Result<T, DevOpsError> {
        let mut state = self.state.lock().unwrap();
        Self::lookup(&mut state, project)
            .map(f)
            .ok_or_else(|| not_found(&format!("project '{project}'")))
    }

    fn next_id(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl DevOpsOps for FakePlatform {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DevOpsError> {
        self.check("list_projects")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .projects
            .iter()
            .map(|p| ProjectSummary {
                id: p.project.id.clone(),
                name: p.project.name.clone(),
                description: p.project.description.clone(),
                state: p.project.state.clone(),
            })
            .collect())
    }

    async fn get_project(&self, project: &str) -> Result<Project, DevOpsError> {
        self.check("get_project")?;
        self.with(project, |p| p.project.clone())
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<OperationReference, DevOpsError> {
        self.check("create_project")?;
        let id = format!("{}-id", request.name.to_lowercase());
        let mut state = self.state.lock().unwrap();
        state.project_creations += 1;
        let project = Self::project(&id, &request.name, Some(request.description.as_str()));
        state.projects.push(FakeProject {
            teams: vec![Team {
                id: format!("{id}-team"),
                name: format!("{} Team", request.name),
                description: None,
            }],
            repositories: vec![Repository {
                id: format!("{id}-repo"),
                name: request.name.clone(),
                default_branch: None,
                is_disabled: None,
            }],
            project,
            ..Default::default()
        });
        Ok(OperationReference {
            id: format!("op-{id}"),
            status: Some("queued".to_string()),
            url: None,
        })
    }

    async fn update_project(&self, project_id: &str, update: &ProjectUpdate) -> Result<OperationReference, DevOpsError> {
        self.check("update_project")?;
        self.with(project_id, |p| {
            if let Some(description) = &update.description {
                p.project.description = Some(description.clone());
            }
            OperationReference {
                id: "op-update".to_string(),
                status: Some("succeeded".to_string()),
                url: None,
            }
        })
    }

    async fn get_project_properties(&self, project_id: &str) -> Result<Vec<ProjectProperty>, DevOpsError> {
        self.check("get_project_properties")?;
        self.with(project_id, |p| p.properties.clone())
    }

    async fn set_project_properties(&self, project_id: &str, properties: &[ProjectProperty]) -> Result<(), DevOpsError> {
        self.check("set_project_properties")?;
        self.with(project_id, |p| p.properties.extend_from_slice(properties))
    }

    async fn list_process_templates(&self) -> Result<Vec<ProcessTemplate>, DevOpsError> {
        self.check("list_process_templates")?;
        Ok(vec![ProcessTemplate {
            id: "agile-id".to_string(),
            name: "Agile".to_string(),
            is_default: true,
        }])
    }

    async fn list_classification_nodes(&self, project: &str) -> Result<Vec<ClassificationNode>, DevOpsError> {
        self.check("list_classification_nodes")?;
        self.with(project, |_| Vec::new())
    }

    async fn create_classification_node(
        &self,
        _project: &str,
        group: StructureGroup,
        _parent_path: &str,
        node: &NewClassificationNode,
    ) -> Result<ClassificationNode, DevOpsError> {
        self.check("create_classification_node")?;
        Ok(ClassificationNode {
            id: Some(self.next_id()),
            name: node.name.clone(),
            structure_type: group,
            has_children: false,
            attributes: node.attributes.clone(),
            children: Vec::new(),
        })
    }

    async fn list_repositories(&self, project: &str) -> Result<Vec<Repository>, DevOpsError> {
        self.check("list_repositories")?;
        self.with(project, |p| p.repositories.clone())
    }

    async fn create_repository(&self, project_id: &str, name: &str) -> Result<Repository, DevOpsError> {
        self.check("create_repository")?;
        let repo = Repository {
            id: format!("repo-{}", self.next_id()),
            name: name.to_string(),
            default_branch: None,
            is_disabled: None,
        };
        self.with(project_id, |p| p.repositories.push(repo.clone()))?;
        Ok(repo)
    }

    async fn query_work_items(&self, project: &str, _wiql: &str) -> Result<Vec<u32>, DevOpsError> {
        self.check("query_work_items")?;
        self.with(project, |p| p.work_items.iter().map(|w| w.id).collect())
    }

    async fn get_work_items(&self, ids: &[u32]) -> Result<Vec<WorkItem>, DevOpsError> {
        self.check("get_work_items")?;
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .projects
                    .iter()
                    .flat_map(|p| p.work_items.iter())
                    .find(|w| w.id == *id)
                    .cloned()
            })
            .collect())
    }

    async fn list_work_item_types(&self, _project: &str) -> Result<Vec<WorkItemType>, DevOpsError> {
        self.check("list_work_item_types")?;
        Ok(Vec::new())
    }

    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        patch: &[PatchOperation],
    ) -> Result<WorkItem, DevOpsError> {
        self.check("create_work_item")?;
        let mut fields: std::collections::BTreeMap<String, Value> = patch
            .iter()
            .filter_map(|op| op.path.strip_prefix("/fields/").map(|f| (f.to_string(), op.value.clone())))
            .collect();
        fields.insert("System.WorkItemType".to_string(), json!(work_item_type));
        let title = fields
            .get("System.Title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if self.state.lock().unwrap().failing_titles.contains(&title) {
            return Err(DevOpsError::Network {
                message: "connection reset".to_string(),
            });
        }

        let id = self.next_id();
        let item = WorkItem {
            id,
            fields,
            relations: Some(Vec::new()),
            url: Some(work_item_url(id)),
        };
        self.with(project, |p| p.work_items.push(item.clone()))?;
        self.state.lock().unwrap().created_work_items.push(title);
        Ok(item)
    }

    async fn update_work_item(&self, id: u32, patch: &[PatchOperation]) -> Result<WorkItem, DevOpsError> {
        self.check("update_work_item")?;
        let mut state = self.state.lock().unwrap();
        state.work_item_updates.push((id, patch.to_vec()));
        let item = state
            .projects
            .iter_mut()
            .flat_map(|p| p.work_items.iter_mut())
            .find(|w| w.id == id)
            .ok_or_else(|| not_found(&format!("work item {id}")))?;
        let relations = item.relations.get_or_insert_with(Vec::new);
        for op in patch.iter().filter(|op| op.path == "/relations/-") {
            if let Ok(relation) = serde_json::from_value::<WorkItemRelation>(op.value.clone()) {
                relations.push(relation);
            }
        }
        Ok(item.clone())
    }

    async fn get_attachment(&self, url: &str) -> Result<Vec<u8>, DevOpsError> {
        self.check("get_attachment")?;
        Ok(url.as_bytes().to_vec())
    }

    async fn create_attachment(
        &self,
        _project: &str,
        file_name: &str,
        _content: Vec<u8>,
    ) -> Result<AttachmentReference, DevOpsError> {
        self.check("create_attachment")?;
        let id = self.next_id();
        Ok(AttachmentReference {
            id: id.to_string(),
            url: format!("{FAKE_ENDPOINT}/_apis/wit/attachments/{id}?fileName={file_name}"),
        })
    }

    async fn list_build_definitions(&self, project: &str) -> Result<Vec<BuildDefinitionReference>, DevOpsError> {
        self.check("list_build_definitions")?;
        self.with(project, |_| Vec::new())
    }

    async fn get_build_definition(&self, _project: &str, id: u32) -> Result<Value, DevOpsError> {
        self.check("get_build_definition")?;
        Err(not_found(&format!("build definition {id}")))
    }

    async fn create_build_definition(
        &self,
        _project: &str,
        definition: &Value,
    ) -> Result<BuildDefinitionReference, DevOpsError> {
        self.check("create_build_definition")?;
        Ok(BuildDefinitionReference {
            id: self.next_id(),
            name: definition["name"].as_str().unwrap_or_default().to_string(),
            path: None,
        })
    }

    async fn list_queries(&self, project: &str) -> Result<Vec<QueryItem>, DevOpsError> {
        self.check("list_queries")?;
        self.with(project, |p| p.queries.clone())
    }

    async fn create_query(&self, project: &str, parent_path: &str, query: &NewQuery) -> Result<QueryItem, DevOpsError> {
        self.check("create_query")?;
        let mut state = self.state.lock().unwrap();
        let path = format!("{parent_path}/{}", query.name);
        let exists = state
            .created_queries
            .iter()
            .any(|(p, parent, q)| p == project && format!("{parent}/{}", q.name) == path);
        if exists && query.is_folder {
            return Err(DevOpsError::AlreadyExists { resource: path });
        }
        state
            .created_queries
            .push((project.to_string(), parent_path.to_string(), query.clone()));
        Ok(QueryItem {
            id: Some(format!("q-{}", state.created_queries.len())),
            name: query.name.clone(),
            path,
            is_folder: query.is_folder,
            wiql: query.wiql.clone(),
            ..Default::default()
        })
    }

    async fn list_dashboards(&self, project: &str, _team: &str) -> Result<Vec<Dashboard>, DevOpsError> {
        self.check("list_dashboards")?;
        self.with(project, |_| Vec::new())
    }

    async fn create_dashboard(&self, _project: &str, _team: &str, dashboard: &Dashboard) -> Result<Dashboard, DevOpsError> {
        self.check("create_dashboard")?;
        Ok(dashboard.clone())
    }

    async fn list_wikis(&self, project: &str) -> Result<Vec<Wiki>, DevOpsError> {
        self.check("list_wikis")?;
        self.with(project, |p| p.wiki.iter().map(|(w, _)| w.clone()).collect())
    }

    async fn create_wiki(&self, project_id: &str, name: &str) -> Result<Wiki, DevOpsError> {
        self.check("create_wiki")?;
        self.with(project_id, |p| {
            let wiki = Wiki {
                id: format!("{}-wiki", p.project.id),
                name: name.to_string(),
                wiki_type: "projectWiki".to_string(),
                project_id: Some(p.project.id.clone()),
            };
            p.wiki = Some((
                wiki.clone(),
                WikiPage {
                    path: "/".to_string(),
                    ..Default::default()
                },
            ));
            wiki
        })
    }

    async fn get_wiki_page(&self, project: &str, _wiki_id: &str, path: &str) -> Result<WikiPage, DevOpsError> {
        self.check("get_wiki_page")?;
        self.with(project, |p| {
            p.wiki
                .as_ref()
                .and_then(|(_, root)| find_page(root, path))
                .cloned()
        })?
        .ok_or_else(|| not_found(&format!("wiki page '{path}'")))
    }

    async fn create_or_update_wiki_page(
        &self,
        _project: &str,
        _wiki_id: &str,
        path: &str,
        content: &str,
    ) -> Result<WikiPage, DevOpsError> {
        self.check("create_or_update_wiki_page")?;
        self.state
            .lock()
            .unwrap()
            .wiki_writes
            .push((path.to_string(), content.to_string()));
        Ok(WikiPage {
            path: path.to_string(),
            content: Some(content.to_string()),
            ..Default::default()
        })
    }

    async fn list_teams(&self, project_id: &str) -> Result<Vec<Team>, DevOpsError> {
        self.check("list_teams")?;
        self.with(project_id, |p| p.teams.clone())
    }

    async fn create_team(&self, project_id: &str, team: &NewTeam) -> Result<Team, DevOpsError> {
        self.check("create_team")?;
        let created = Team {
            id: format!("team-{}", self.next_id()),
            name: team.name.clone(),
            description: Some(team.description.clone()),
        };
        self.with(project_id, |p| p.teams.push(created.clone()))?;
        Ok(created)
    }

    async fn get_team_settings(&self, _project: &str, _team: &str) -> Result<TeamSettings, DevOpsError> {
        self.check("get_team_settings")?;
        Ok(TeamSettings {
            bugs_behavior: Some("asRequirements".to_string()),
            ..Default::default()
        })
    }

    async fn update_team_settings(
        &self,
        _project: &str,
        _team: &str,
        settings: &TeamSettings,
    ) -> Result<TeamSettings, DevOpsError> {
        self.check("update_team_settings")?;
        Ok(settings.clone())
    }

    async fn list_groups(&self, _project_id: &str) -> Result<Vec<SecurityGroup>, DevOpsError> {
        self.check("list_groups")?;
        Ok(Vec::new())
    }

    async fn list_memberships(&self, _group_descriptor: &str) -> Result<Vec<Membership>, DevOpsError> {
        self.check("list_memberships")?;
        Ok(Vec::new())
    }

    async fn add_membership(&self, _member_descriptor: &str, _group_descriptor: &str) -> Result<(), DevOpsError> {
        self.check("add_membership")?;
        Ok(())
    }
}
