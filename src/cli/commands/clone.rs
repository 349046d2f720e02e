use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::{with_platform, Command};
use crate::clone::{
    BroadcastProgress, CloneOptionSet, CloneOrchestrator, CloneRequest, CloneRunResult, ProgressEvent,
    TracingProgress,
};
use crate::clone::progress::{LogLevel, StepStatus};
use crate::config::{ClonerConfig, PlatformSettings};
use crate::devops::DevOpsClient;

const PROGRESS_CAPACITY: usize = 256;

pub struct CloneCommand {
    request: CloneRequest,
    report_path: Option<PathBuf>,
}

impl CloneCommand {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            request: CloneRequest {
                source_project: source.into(),
                target_project_name: target.into(),
                target_project_description: None,
                options: CloneOptionSet::default(),
            },
            report_path: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.request.target_project_description = description;
        self
    }

    pub fn with_options(mut self, options: CloneOptionSet) -> Self {
        self.request.options = options;
        self
    }

    /// Enable every option, keeping repository exclusions.
    pub fn with_all(mut self, all: bool) -> Self {
        if all {
            let excluded = std::mem::take(&mut self.request.options.excluded_repositories);
            self.request.options = CloneOptionSet {
                excluded_repositories: excluded,
                ..CloneOptionSet::all()
            };
        }
        self
    }

    pub fn with_report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    pub fn request(&self) -> &CloneRequest {
        &self.request
    }

    async fn run(&self, client: DevOpsClient, config: &ClonerConfig, settings: PlatformSettings) -> Result<()> {
        println!(
            "🧬 Cloning '{}' into '{}' ({} steps)",
            self.request.source_project,
            self.request.target_project_name,
            self.request.options.total_steps()
        );
        println!();

        let client = Arc::new(client);
        let result = if config.observability.json_logs {
            // Machine-readable runs report progress as log events only
            CloneOrchestrator::new(client, Arc::new(TracingProgress), config.clone.clone())
                .run(&self.request)
                .await
        } else {
            let sink = BroadcastProgress::new(PROGRESS_CAPACITY);
            let printer = tokio::spawn(print_progress(sink.subscribe()));

            let orchestrator = CloneOrchestrator::new(client, Arc::new(sink), config.clone.clone());
            let result = orchestrator.run(&self.request).await;
            drop(orchestrator);
            if let Err(e) = printer.await {
                debug!(error = %e, "Progress printer stopped");
            }
            result
        };

        let path = self
            .report_path
            .clone()
            .unwrap_or_else(|| default_report_path(&settings.default_local_path, &result.run_id));
        match write_report(&path, &result).await {
            Ok(()) => println!("📄 Run report: {}", path.display()),
            Err(e) => println!("⚠️  Could not write run report: {e:#}"),
        }

        print_summary(&result);
        if result.success {
            Ok(())
        } else {
            Err(anyhow!(
                "{}: {}",
                result.message,
                result.error.as_deref().unwrap_or("unknown error")
            ))
        }
    }
}

impl Command for CloneCommand {
    async fn execute(&self) -> Result<()> {
        with_platform(|client, config, settings| self.run(client, config, settings)).await
    }
}

/// `<storage>/runs/<run id>.json`
pub fn default_report_path(storage: &Path, run_id: &str) -> PathBuf {
    storage.join("runs").join(format!("{run_id}.json"))
}

pub async fn write_report(path: &Path, result: &CloneRunResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

async fn print_progress(mut events: broadcast::Receiver<ProgressEvent>) {
    loop {
        match events.recv().await {
            Ok(ProgressEvent::Step { name, status }) => match status {
                StepStatus::Started => {
                    print!("⏳ {name}... ");
                    let _ = std::io::stdout().flush();
                }
                StepStatus::Completed => println!("✅"),
                StepStatus::Failed => println!("❌"),
            },
            Ok(ProgressEvent::Progress { percent, message }) => println!("   [{percent:>3}%] {message}"),
            Ok(ProgressEvent::Log {
                level: LogLevel::Warning | LogLevel::Error,
                line,
            }) => println!("   ⚠️  {line}"),
            Ok(ProgressEvent::Log { .. }) => {}
            Ok(ProgressEvent::Completed { .. }) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress output lagged"),
        }
    }
}

fn print_summary(result: &CloneRunResult) {
    println!();
    if result.success {
        println!("✅ {}", result.message);
    } else {
        println!("❌ {}", result.message);
    }
    println!("  🆔 Run: {}", result.run_id);
    if let Some(url) = &result.new_project_url {
        println!("  🔗 New project: {url}");
    }
    println!("  📊 Steps: {}/{}", result.completed_steps, result.total_steps);
    for step in result.steps.iter().filter(|s| !s.success) {
        println!(
            "  ❌ {}: {}",
            step.name,
            step.error.as_deref().unwrap_or(&step.message)
        );
    }
}
