//! Repositories and the build definitions bound to them.
//!
//! Only empty repositories are created; git content is not transferred.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::clone::id_map::IdentifierMap;
use crate::clone::types::{CloneOptionSet, EntityTally};
use crate::devops::client::DevOpsOps;
use crate::devops::types::{Project, Repository};

/// Source repository ID → target repository ID
pub type RepositoryMap = IdentifierMap<String, String>;

/// Fields owned by the server that must not be posted back.
const SERVER_OWNED_DEFINITION_FIELDS: &[&str] = &[
    "id",
    "url",
    "uri",
    "revision",
    "_links",
    "createdDate",
    "authoredBy",
    "queue",
    "latestBuild",
    "latestCompletedBuild",
    "metrics",
];

/// Create every non-excluded source repository that is missing on the target.
///
/// Entity failures are logged and counted; only listing failures fail the step.
pub async fn clone_repositories(
    ops: &dyn DevOpsOps,
    source: &Project,
    target: &Project,
    options: &CloneOptionSet,
) -> Result<(RepositoryMap, String)> {
    let source_repos = ops
        .list_repositories(&source.id)
        .await
        .context("Failed to list source repositories")?;
    let target_repos = ops
        .list_repositories(&target.id)
        .await
        .context("Failed to list target repositories")?;

    let mut map = RepositoryMap::new();
    let mut tally = EntityTally::default();
    let mut excluded = 0;

    for repo in &source_repos {
        if options.is_repository_excluded(&repo.name) {
            debug!(repository = %repo.name, "Repository excluded");
            excluded += 1;
            continue;
        }

        // The source default repository is named after its project.
        let target_name = if repo.name.eq_ignore_ascii_case(&source.name) {
            target.name.as_str()
        } else {
            repo.name.as_str()
        };

        if let Some(existing) = find_by_name(&target_repos, target_name) {
            record(&mut map, repo, existing);
            tally.existing();
            continue;
        }

        match ops.create_repository(&target.id, target_name).await {
            Ok(created) => {
                info!(repository = %created.name, "Created repository");
                record(&mut map, repo, &created);
                tally.created();
            }
            Err(e) => {
                warn!(repository = %repo.name, error = %e, "Failed to create repository");
                tally.skipped();
            }
        }
    }

    let mut message = tally.summary("repositories");
    if excluded > 0 {
        message.push_str(&format!(", {excluded} excluded"));
    }
    Ok((map, message))
}

fn find_by_name<'a>(repos: &'a [Repository], name: &str) -> Option<&'a Repository> {
    repos.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

fn record(map: &mut RepositoryMap, source: &Repository, target: &Repository) {
    if let Err(e) = map.insert(source.id.clone(), target.id.clone()) {
        warn!(error = %e, "Repository mapped twice");
    }
}

/// Rebind a fetched definition to the target project and repository.
///
/// Returns `None` when a platform-hosted repository has no target counterpart.
pub fn prepare_definition(
    mut definition: Value,
    target: &Project,
    repo_map: &RepositoryMap,
    target_repos: &[Repository],
) -> Option<Value> {
    let object = definition.as_object_mut()?;
    for field in SERVER_OWNED_DEFINITION_FIELDS {
        object.remove(*field);
    }
    object.insert("project".to_string(), json!({ "id": target.id, "name": target.name }));

    if let Some(repository) = object.get_mut("repository").and_then(Value::as_object_mut) {
        let hosted = repository
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("TfsGit"))
            .unwrap_or(true);
        if hosted {
            let source_id = repository.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let source_name = repository.get("name").and_then(Value::as_str).unwrap_or_default().to_string();

            let mapped = repo_map
                .get(&source_id)
                .and_then(|id| target_repos.iter().find(|r| &r.id == id))
                .or_else(|| find_by_name(target_repos, &source_name));
            let Some(target_repo) = mapped else {
                return None;
            };
            repository.insert("id".to_string(), json!(target_repo.id));
            repository.insert("name".to_string(), json!(target_repo.name));
            repository.remove("url");
        }
    }

    Some(definition)
}

/// Copy build definitions. Never fails on entity errors.
pub async fn clone_build_pipelines(
    ops: &dyn DevOpsOps,
    source: &Project,
    target: &Project,
    repo_map: &RepositoryMap,
) -> Result<String> {
    let definitions = ops
        .list_build_definitions(&source.id)
        .await
        .context("Failed to list source build definitions")?;
    let target_repos = ops.list_repositories(&target.id).await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not list target repositories");
        Vec::new()
    });

    let mut tally = EntityTally::default();
    for reference in &definitions {
        let definition = match ops.get_build_definition(&source.id, reference.id).await {
            Ok(definition) => definition,
            Err(e) => {
                warn!(definition = %reference.name, error = %e, "Failed to read build definition");
                tally.skipped();
                continue;
            }
        };
        let Some(prepared) = prepare_definition(definition, target, repo_map, &target_repos) else {
            warn!(definition = %reference.name, "No target repository for build definition");
            tally.skipped();
            continue;
        };
        match ops.create_build_definition(&target.id, &prepared).await {
            Ok(created) => {
                debug!(definition = %created.name, id = created.id, "Created build definition");
                tally.created();
            }
            Err(e) if e.is_already_exists() => tally.existing(),
            Err(e) => {
                warn!(definition = %reference.name, error = %e, "Failed to create build definition");
                tally.skipped();
            }
        }
    }

    Ok(tally.summary("build pipelines"))
}
