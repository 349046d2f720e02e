use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::clone::capabilities::{classify_services, SourceServices};
use crate::clone::classification::clone_classification_nodes;
use crate::clone::errors::CloneError;
use crate::clone::progress::{percent_complete, LogLevel, ProgressSink};
use crate::clone::queries::clone_queries;
use crate::clone::repositories::{clone_build_pipelines, clone_repositories, RepositoryMap};
use crate::clone::settings::clone_project_settings;
use crate::clone::step::StepRunner;
use crate::clone::teams::{clone_dashboards, clone_teams, configure_teams};
use crate::clone::types::{
    CloneRequest, CloneRunBuilder, CloneRunResult, CloneStep, CloneStepResult, CREATE_TARGET_STEP, GET_SOURCE_STEP,
};
use crate::clone::wiki::clone_wiki;
use crate::clone::work_items::{WorkItemCloneOptions, WorkItemCloner};
use crate::config::{CloneConfig, ClonerConfig};
use crate::devops::client::{DevOpsClient, DevOpsOps};
use crate::devops::types::{CreateProjectRequest, Project};
use crate::observability::{api_metrics, ApiStats};
use crate::telemetry::{create_clone_span, generate_correlation_id};

/// Runs clone requests against one platform organization.
///
/// Runs are independent and share no state; only the platform client and the
/// progress sink are reused.
pub struct CloneOrchestrator {
    ops: Arc<dyn DevOpsOps>,
    progress: Arc<dyn ProgressSink>,
    settings: CloneConfig,
}

impl CloneOrchestrator {
    pub fn new(ops: Arc<dyn DevOpsOps>, progress: Arc<dyn ProgressSink>, settings: CloneConfig) -> Self {
        Self {
            ops,
            progress,
            settings,
        }
    }

    /// Execute every enabled step in canonical order.
    ///
    /// Step failures are recorded and never stop the run. Only failing to
    /// resolve the source or create the target ends it early.
    pub async fn run(&self, request: &CloneRequest) -> CloneRunResult {
        let run_id = generate_correlation_id();
        let span = create_clone_span(&request.source_project, &request.target_project_name, &run_id);
        self.run_steps(run_id, request).instrument(span).await
    }

    async fn run_steps(&self, run_id: String, request: &CloneRequest) -> CloneRunResult {
        let options = &request.options;
        let baseline = api_metrics().get_stats();
        let mut run = CloneRunBuilder::start(run_id, options.total_steps());
        let runner = StepRunner::new(self.progress.as_ref());

        info!(total_steps = run.total_steps(), "Starting clone");
        self.progress.log(
            LogLevel::Info,
            &format!(
                "Cloning '{}' into '{}'",
                request.source_project, request.target_project_name
            ),
        );
        self.progress.report_progress(0, "Starting clone");

        let (step, source) = runner
            .execute_with(GET_SOURCE_STEP, self.resolve_source(&request.source_project))
            .await;
        let Some(source) = self.record(&mut run, step, source) else {
            return self.abort(run, &baseline);
        };

        run.set_source_services(self.source_services(&source).await);

        let (step, target) = runner
            .execute_with(CREATE_TARGET_STEP, self.create_target(&source, request))
            .await;
        let Some(target) = self.record(&mut run, step, target) else {
            return self.abort(run, &baseline);
        };
        run.set_target(
            target.id.clone(),
            target
                .web_url()
                .or(target.url.as_deref())
                .unwrap_or_default()
                .to_string(),
        );

        let ops = self.ops.as_ref();
        let mut repo_map = RepositoryMap::new();
        let mut classification_cloned = false;

        for step in options.enabled_steps() {
            let name = step.name();
            let result = match step {
                CloneStep::Settings => {
                    let description = request.target_project_description.as_deref();
                    runner
                        .execute(name, clone_project_settings(ops, &source, &target, description))
                        .await
                }
                CloneStep::ClassificationNodes => {
                    let result = runner
                        .execute(name, clone_classification_nodes(ops, &source, &target))
                        .await;
                    classification_cloned = result.success;
                    result
                }
                CloneStep::Repositories => {
                    let (result, map) = runner
                        .execute_with(name, clone_repositories(ops, &source, &target, options))
                        .await;
                    if let Some(map) = map {
                        repo_map = map;
                    }
                    result
                }
                CloneStep::WorkItems => {
                    let cloner = WorkItemCloner::new(
                        ops,
                        &source,
                        &target,
                        WorkItemCloneOptions {
                            ordering: self.settings.work_item_ordering,
                            copy_classification_paths: classification_cloned,
                        },
                    );
                    runner.execute(name, cloner.run()).await
                }
                CloneStep::BuildPipelines => {
                    runner
                        .execute(name, clone_build_pipelines(ops, &source, &target, &repo_map))
                        .await
                }
                CloneStep::Queries => {
                    runner
                        .execute(
                            name,
                            clone_queries(ops, &source.id, &target.id, self.settings.leaf_retry_delay()),
                        )
                        .await
                }
                CloneStep::Dashboards => runner.execute(name, clone_dashboards(ops, &source, &target)).await,
                CloneStep::Wiki => {
                    runner
                        .execute(name, clone_wiki(ops, &source, &target, self.settings.leaf_retry_delay()))
                        .await
                }
                CloneStep::Teams => runner.execute(name, clone_teams(ops, &source, &target)).await,
                CloneStep::TeamConfiguration => runner.execute(name, configure_teams(ops, &source, &target)).await,
            };
            self.push(&mut run, result);
        }

        let result = run.finish();
        self.finish(&result, &baseline);
        result
    }

    /// Append a step and pass its value through when it succeeded.
    fn record<T>(&self, run: &mut CloneRunBuilder, step: CloneStepResult, value: Option<T>) -> Option<T> {
        let succeeded = step.success;
        self.push(run, step);
        value.filter(|_| succeeded)
    }

    fn push(&self, run: &mut CloneRunBuilder, step: CloneStepResult) {
        if let Some(error) = &step.error {
            self.progress
                .log(LogLevel::Error, &format!("{} failed: {error}", step.name));
        }
        let message = format!("{}: {}", step.name, step.message);
        run.record(step);
        self.progress.report_progress(
            percent_complete(run.completed_steps(), run.total_steps()),
            &message,
        );
    }

    fn abort(&self, run: CloneRunBuilder, baseline: &ApiStats) -> CloneRunResult {
        let error = run
            .steps()
            .last()
            .and_then(|s| s.error.clone())
            .unwrap_or_else(|| "Clone aborted".to_string());
        warn!(error = %error, "Clone aborted");
        let result = run.abort(&error);
        self.finish(&result, baseline);
        result
    }

    fn finish(&self, result: &CloneRunResult, baseline: &ApiStats) {
        api_metrics().get_stats().since(baseline).log();
        info!(
            success = result.success,
            completed_steps = result.completed_steps,
            total_steps = result.total_steps,
            duration_ms = result.duration.as_millis() as u64,
            "Clone finished"
        );
        self.progress.complete(result.success, Some(result));
    }

    async fn resolve_source(&self, project: &str) -> Result<(Project, String)> {
        let source = self.ops.get_project(project).await.map_err(|e| {
            if e.is_not_found() {
                CloneError::SourceNotFound {
                    project: project.to_string(),
                }
            } else {
                CloneError::Platform(e)
            }
        })?;
        let message = format!("Found source project '{}' ({})", source.name, source.id);
        Ok((source, message))
    }

    /// Informational only; unknown when properties cannot be read.
    async fn source_services(&self, source: &Project) -> SourceServices {
        match self.ops.get_project_properties(&source.id).await {
            Ok(properties) => {
                let services = classify_services(&properties);
                debug!(?services, "Classified source services");
                services
            }
            Err(e) => {
                debug!(error = %e, "Could not read source properties");
                SourceServices::default()
            }
        }
    }

    async fn process_template_id(&self, source: &Project) -> Option<String> {
        if let Some(id) = source.process_template_id() {
            return Some(id.to_string());
        }
        match self.ops.list_process_templates().await {
            Ok(templates) => templates
                .iter()
                .find(|t| t.is_default)
                .or(templates.first())
                .map(|t| t.id.clone()),
            Err(e) => {
                warn!(error = %e, "Could not list process templates");
                None
            }
        }
    }

    async fn create_target(&self, source: &Project, request: &CloneRequest) -> Result<(Project, String)> {
        let name = request.target_project_name.trim();
        if name.is_empty() {
            return Err(CloneError::InvalidTargetName {
                name: request.target_project_name.clone(),
                reason: "name is empty".to_string(),
            }
            .into());
        }
        if name.eq_ignore_ascii_case(&source.name) {
            return Err(CloneError::TargetExists { name: name.to_string() }.into());
        }

        let existing = self.ops.list_projects().await.map_err(CloneError::Platform)?;
        if existing.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
            return Err(CloneError::TargetExists { name: name.to_string() }.into());
        }

        let description = request
            .target_project_description
            .clone()
            .or_else(|| source.description.clone())
            .unwrap_or_default();
        let template_id = self.process_template_id(source).await;
        let create = CreateProjectRequest::new(
            name,
            &description,
            source.source_control_type(),
            template_id.as_deref(),
            Some(self.settings.visibility.as_str()),
        );

        let operation = self
            .ops
            .create_project(&create)
            .await
            .map_err(|source| CloneError::TargetCreation {
                name: name.to_string(),
                source,
            })?;
        debug!(operation = %operation.id, "Project creation queued");

        tokio::time::sleep(self.settings.settle_delay()).await;
        let target = match self.ops.get_project(name).await {
            Ok(project) => project,
            Err(e) => {
                debug!(error = %e, "Target not readable yet; retrying once");
                tokio::time::sleep(self.settings.settle_delay()).await;
                self.ops
                    .get_project(name)
                    .await
                    .map_err(|source| CloneError::TargetUnavailable {
                        name: name.to_string(),
                        source,
                    })?
            }
        };

        let message = format!("Created target project '{}' ({})", target.name, target.id);
        Ok((target, message))
    }
}

/// True when the organization answers an authenticated project listing.
pub async fn probe_reachable(ops: &dyn DevOpsOps) -> bool {
    match ops.list_projects().await {
        Ok(projects) => {
            debug!(projects = projects.len(), "Organization reachable");
            true
        }
        Err(e) => {
            warn!(error = %e, "Organization not reachable");
            false
        }
    }
}

/// Process template names, empty when they cannot be listed.
pub async fn process_template_names(ops: &dyn DevOpsOps) -> Vec<String> {
    match ops.list_process_templates().await {
        Ok(templates) => templates.into_iter().map(|t| t.name).collect(),
        Err(e) => {
            warn!(error = %e, "Could not list process templates");
            Vec::new()
        }
    }
}

fn client_for(endpoint: &str, credential: &str) -> Option<DevOpsClient> {
    let config = crate::config::config().cloned().unwrap_or_else(|_| ClonerConfig::default());
    match DevOpsClient::new(endpoint, credential, &config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Invalid connection settings");
            None
        }
    }
}

/// Check that `endpoint` is reachable with `credential`.
pub async fn validate_target_reachable(endpoint: &str, credential: &str) -> bool {
    match client_for(endpoint, credential) {
        Some(client) => probe_reachable(&client).await,
        None => false,
    }
}

pub async fn list_available_process_templates(endpoint: &str, credential: &str) -> Vec<String> {
    match client_for(endpoint, credential) {
        Some(client) => process_template_names(&client).await,
        None => Vec::new(),
    }
}
