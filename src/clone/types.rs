use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clone::capabilities::SourceServices;

/// Input to one clone run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneRequest {
    /// Source project name or ID
    pub source_project: String,
    pub target_project_name: String,
    pub target_project_description: Option<String>,
    pub options: CloneOptionSet,
}

/// Independent toggles, one per entity kind. No toggle implies another.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloneOptionSet {
    pub settings: bool,
    pub classification_nodes: bool,
    pub repositories: bool,
    pub work_items: bool,
    pub build_pipelines: bool,
    pub queries: bool,
    pub dashboards: bool,
    pub wiki: bool,
    pub teams: bool,
    /// Repository names to skip, compared case-insensitively
    pub excluded_repositories: Vec<String>,
}

impl CloneOptionSet {
    pub fn all() -> Self {
        Self {
            settings: true,
            classification_nodes: true,
            repositories: true,
            work_items: true,
            build_pipelines: true,
            queries: true,
            dashboards: true,
            wiki: true,
            teams: true,
            excluded_repositories: Vec::new(),
        }
    }

    pub fn is_enabled(&self, step: CloneStep) -> bool {
        match step {
            CloneStep::Settings => self.settings,
            CloneStep::ClassificationNodes => self.classification_nodes,
            CloneStep::Repositories => self.repositories,
            CloneStep::WorkItems => self.work_items,
            CloneStep::BuildPipelines => self.build_pipelines,
            CloneStep::Queries => self.queries,
            CloneStep::Dashboards => self.dashboards,
            CloneStep::Wiki => self.wiki,
            CloneStep::Teams => self.teams,
            CloneStep::TeamConfiguration => true,
        }
    }

    /// Steps that will run, in canonical order.
    pub fn enabled_steps(&self) -> Vec<CloneStep> {
        CloneStep::CANONICAL_ORDER
            .iter()
            .copied()
            .filter(|step| self.is_enabled(*step))
            .collect()
    }

    /// Always-run project steps plus every enabled clone step.
    pub fn total_steps(&self) -> usize {
        ALWAYS_RUN_PROJECT_STEPS + self.enabled_steps().len()
    }

    pub fn is_repository_excluded(&self, name: &str) -> bool {
        self.excluded_repositories
            .iter()
            .any(|excluded| excluded.trim().eq_ignore_ascii_case(name.trim()))
    }
}

/// "Get source project" and "Create target project"
pub const ALWAYS_RUN_PROJECT_STEPS: usize = 2;

pub const GET_SOURCE_STEP: &str = "Get source project";
pub const CREATE_TARGET_STEP: &str = "Create target project";
pub const ABORTED_STEP: &str = "Clone aborted";

/// Clone steps after project creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloneStep {
    Settings,
    ClassificationNodes,
    Repositories,
    WorkItems,
    BuildPipelines,
    Queries,
    Dashboards,
    Wiki,
    Teams,
    TeamConfiguration,
}

impl CloneStep {
    pub const CANONICAL_ORDER: [CloneStep; 10] = [
        CloneStep::Settings,
        CloneStep::ClassificationNodes,
        CloneStep::Repositories,
        CloneStep::WorkItems,
        CloneStep::BuildPipelines,
        CloneStep::Queries,
        CloneStep::Dashboards,
        CloneStep::Wiki,
        CloneStep::Teams,
        CloneStep::TeamConfiguration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CloneStep::Settings => "Clone project settings",
            CloneStep::ClassificationNodes => "Clone areas and iterations",
            CloneStep::Repositories => "Clone repositories",
            CloneStep::WorkItems => "Clone work items",
            CloneStep::BuildPipelines => "Clone build pipelines",
            CloneStep::Queries => "Clone queries",
            CloneStep::Dashboards => "Clone dashboards",
            CloneStep::Wiki => "Clone wiki",
            CloneStep::Teams => "Clone teams",
            CloneStep::TeamConfiguration => "Configure team settings",
        }
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneStepResult {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

/// Outcome of one clone run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneRunResult {
    pub run_id: String,
    pub steps: Vec<CloneStepResult>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub new_project_id: Option<String>,
    pub new_project_url: Option<String>,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub source_services: Option<SourceServices>,
}

impl CloneRunResult {
    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Owned accumulator for a run result.
///
/// Steps are only ever appended; final fields are set once by
/// [`CloneRunBuilder::finish`] or [`CloneRunBuilder::abort`].
#[derive(Debug)]
pub struct CloneRunBuilder {
    run_id: String,
    total_steps: usize,
    started: DateTime<Utc>,
    steps: Vec<CloneStepResult>,
    new_project_id: Option<String>,
    new_project_url: Option<String>,
    source_services: Option<SourceServices>,
}

impl CloneRunBuilder {
    pub fn start(run_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            run_id: run_id.into(),
            total_steps,
            started: Utc::now(),
            steps: Vec::new(),
            new_project_id: None,
            new_project_url: None,
            source_services: None,
        }
    }

    pub fn record(&mut self, step: CloneStepResult) {
        self.steps.push(step);
    }

    pub fn set_target(&mut self, project_id: String, project_url: String) {
        self.new_project_id = Some(project_id);
        self.new_project_url = Some(project_url);
    }

    pub fn set_source_services(&mut self, services: SourceServices) {
        self.source_services = Some(services);
    }

    pub fn steps(&self) -> &[CloneStepResult] {
        &self.steps
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Success iff every recorded step succeeded.
    pub fn finish(self) -> CloneRunResult {
        let failed: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.name.as_str())
            .collect();
        let success = failed.is_empty();
        let (message, error) = if success {
            ("Project cloned successfully".to_string(), None)
        } else {
            (
                "Project cloned with errors".to_string(),
                Some(failed.join(", ")),
            )
        };
        self.build(success, message, error)
    }

    /// Run-fatal termination: appends one synthetic step carrying the error.
    pub fn abort(mut self, error: &str) -> CloneRunResult {
        let now = Utc::now();
        self.steps.push(CloneStepResult {
            name: ABORTED_STEP.to_string(),
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            success: false,
            message: format!("Failed: {error}"),
            error: Some(error.to_string()),
        });
        self.build(false, "Clone failed".to_string(), Some(error.to_string()))
    }

    fn build(self, success: bool, message: String, error: Option<String>) -> CloneRunResult {
        let duration = (Utc::now() - self.started).to_std().unwrap_or(Duration::ZERO);
        CloneRunResult {
            run_id: self.run_id,
            completed_steps: self.steps.len(),
            steps: self.steps,
            total_steps: self.total_steps,
            new_project_id: self.new_project_id,
            new_project_url: self.new_project_url,
            success,
            message,
            error,
            duration,
            source_services: self.source_services,
        }
    }
}

/// Per-step entity counters (entity-level error tier)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityTally {
    pub attempted: usize,
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
}

impl EntityTally {
    pub fn created(&mut self) {
        self.attempted += 1;
        self.created += 1;
    }

    pub fn existing(&mut self) {
        self.attempted += 1;
        self.existing += 1;
    }

    pub fn skipped(&mut self) {
        self.attempted += 1;
        self.skipped += 1;
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.existing
    }

    /// A step fails only when something was attempted and nothing succeeded.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded() == 0
    }

    pub fn summary(&self, noun: &str) -> String {
        let mut message = format!("Created {} {noun}", self.created);
        if self.existing > 0 {
            message.push_str(&format!(", {} already existed", self.existing));
        }
        if self.skipped > 0 {
            message.push_str(&format!(", {} skipped", self.skipped));
        }
        message
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
