//! REST client behavior against a mock platform server.

use project_cloner::devops::types::{NewQuery, PatchOperation};
use project_cloner::{ClonerConfig, DevOpsClient, DevOpsError, DevOpsOps};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Basic auth with an empty user and the token `pat`
const AUTHORIZATION: &str = "Basic OnBhdA==";

async fn client(server: &MockServer) -> DevOpsClient {
    DevOpsClient::new(&server.uri(), "pat", &ClonerConfig::default()).unwrap()
}

#[tokio::test]
async fn lists_projects_with_token_and_api_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_apis/projects"))
        .and(query_param("api-version", "7.0"))
        .and(header("authorization", AUTHORIZATION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "value": [
                { "id": "p1", "name": "Source", "state": "wellFormed" },
                { "id": "p2", "name": "Other" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let projects = client(&server).await.list_projects().await.unwrap();

    let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Source", "Other"]);
}

#[tokio::test]
async fn missing_project_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_apis/projects/Nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "TF200016: The following project does not exist: Nope."
        })))
        .mount(&server)
        .await;

    let error = client(&server).await.get_project("Nope").await.unwrap_err();

    assert!(error.is_not_found());
}

#[tokio::test]
async fn duplicate_query_folder_maps_to_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Source/_apis/wit/queries/Shared%20Queries"))
        .and(body_json(json!({ "name": "My Folder", "isFolder": true })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "The name My Folder is already in use"
        })))
        .mount(&server)
        .await;

    let error = client(&server)
        .await
        .create_query("Source", "Shared Queries", &NewQuery::folder("My Folder"))
        .await
        .unwrap_err();

    assert!(error.is_already_exists());
}

#[tokio::test]
async fn status_codes_classify_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_apis/projects"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_apis/process/processes"))
        .respond_with(ResponseTemplate::new(401).set_body_string(""))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let server_error = client.list_projects().await.unwrap_err();
    let auth_error = client.list_process_templates().await.unwrap_err();

    assert!(matches!(server_error, DevOpsError::Server { status: 503, .. }));
    assert!(server_error.is_transient());
    assert!(matches!(auth_error, DevOpsError::Authentication { .. }));
    assert!(!auth_error.is_transient());
    assert!(!auth_error.guidance().is_empty());
}

#[tokio::test]
async fn work_item_is_created_from_a_json_patch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Copy/_apis/wit/workitems/$Bug"))
        .and(header("content-type", "application/json-patch+json"))
        .and(body_json(json!([
            { "op": "add", "path": "/fields/System.Title", "value": "Crash on save" }
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 501,
            "fields": { "System.Title": "Crash on save", "System.WorkItemType": "Bug" },
            "url": "https://dev.azure.com/org/_apis/wit/workItems/501"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let patch = vec![PatchOperation::add_field("System.Title", json!("Crash on save"))];
    let created = client(&server)
        .await
        .create_work_item("Copy", "Bug", &patch)
        .await
        .unwrap();

    assert_eq!(created.id, 501);
    assert_eq!(created.work_item_type(), Some("Bug"));
}

#[tokio::test]
async fn work_items_are_fetched_with_relations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Source/_apis/wit/wiql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workItems": [ { "id": 1 }, { "id": 2 } ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_apis/wit/workitems"))
        .and(query_param("ids", "1,2"))
        .and(query_param("$expand", "relations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "value": [
                { "id": 1, "fields": { "System.Title": "Epic" } },
                { "id": 2, "fields": { "System.Title": "Story" }, "relations": [
                    { "rel": "System.LinkTypes.Hierarchy-Reverse", "url": "https://dev.azure.com/org/_apis/wit/workItems/1" }
                ] }
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let ids = client.query_work_items("Source", "SELECT [System.Id] FROM WorkItems").await.unwrap();
    let items = client.get_work_items(&ids).await.unwrap();

    assert_eq!(ids, vec![1, 2]);
    assert_eq!(items[1].relations().len(), 1);
    assert_eq!(items[0].title(), "Epic");
}

#[tokio::test]
async fn collapsed_query_folders_are_expanded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Source/_apis/wit/queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "value": [
                { "name": "Shared Queries", "path": "Shared Queries", "isFolder": true, "hasChildren": true }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Source/_apis/wit/queries/Shared%20Queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Shared Queries",
            "path": "Shared Queries",
            "isFolder": true,
            "hasChildren": true,
            "children": [
                { "name": "Active Bugs", "path": "Shared Queries/Active Bugs", "wiql": "SELECT 1" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let roots = client(&server).await.list_queries("Source").await.unwrap();

    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].children[0].name, "Active Bugs");
    assert_eq!(roots[0].children[0].wiql.as_deref(), Some("SELECT 1"));
}

#[test]
fn invalid_connection_settings_are_rejected() {
    let config = ClonerConfig::default();
    assert!(matches!(
        DevOpsClient::new("not a url", "pat", &config),
        Err(DevOpsError::Configuration { .. })
    ));
    assert!(matches!(
        DevOpsClient::new("https://dev.azure.com/org", "  ", &config),
        Err(DevOpsError::Configuration { .. })
    ));
}
