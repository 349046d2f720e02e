use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::time::Instant;
use tracing::{info, warn};

use crate::clone::progress::{ProgressSink, StepStatus};
use crate::clone::types::CloneStepResult;

/// Executes one named unit of work and records its outcome.
///
/// This is the only failure boundary of the pipeline: errors returned by the
/// action end up on the step record and never propagate further.
pub struct StepRunner<'a> {
    progress: &'a dyn ProgressSink,
}

impl<'a> StepRunner<'a> {
    pub fn new(progress: &'a dyn ProgressSink) -> Self {
        Self { progress }
    }

    pub async fn execute<F>(&self, name: &str, action: F) -> CloneStepResult
    where
        F: Future<Output = Result<String>>,
    {
        let (result, _) = self
            .execute_with(name, async move { action.await.map(|message| ((), message)) })
            .await;
        result
    }

    /// Like [`StepRunner::execute`] but also hands back the value produced
    /// by a successful action.
    pub async fn execute_with<T, F>(&self, name: &str, action: F) -> (CloneStepResult, Option<T>)
    where
        F: Future<Output = Result<(T, String)>>,
    {
        self.progress.report_step(name, StepStatus::Started);
        info!(step = name, "Step started");

        let start_time = Utc::now();
        let started = Instant::now();
        let outcome = action.await;
        let duration = started.elapsed();
        let end_time = Utc::now();

        match outcome {
            Ok((value, message)) => {
                info!(step = name, duration_ms = duration.as_millis() as u64, %message, "Step completed");
                self.progress.report_step(name, StepStatus::Completed);
                (
                    CloneStepResult {
                        name: name.to_string(),
                        start_time,
                        end_time,
                        duration,
                        success: true,
                        message,
                        error: None,
                    },
                    Some(value),
                )
            }
            Err(e) => {
                let description = format!("{e:#}");
                warn!(step = name, duration_ms = duration.as_millis() as u64, error = %description, "Step failed");
                self.progress.report_step(name, StepStatus::Failed);
                (
                    CloneStepResult {
                        name: name.to_string(),
                        start_time,
                        end_time,
                        duration,
                        success: false,
                        message: format!("Failed: {description}"),
                        error: Some(description),
                    },
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::progress::NullProgress;
    use anyhow::anyhow;

    #[tokio::test]
    async fn success_carries_action_message() {
        let sink = NullProgress;
        let runner = StepRunner::new(&sink);
        let step = runner
            .execute("Clone queries", async { Ok("Created 3 queries".to_string()) })
            .await;

        assert!(step.success);
        assert_eq!(step.name, "Clone queries");
        assert_eq!(step.message, "Created 3 queries");
        assert!(step.error.is_none());
        assert!(step.end_time >= step.start_time);
    }

    #[tokio::test]
    async fn failure_is_captured_not_propagated() {
        let sink = NullProgress;
        let runner = StepRunner::new(&sink);
        let step = runner
            .execute("Clone wiki", async { Err(anyhow!("wiki service unavailable")) })
            .await;

        assert!(!step.success);
        assert_eq!(step.error.as_deref(), Some("wiki service unavailable"));
        assert_eq!(step.message, "Failed: wiki service unavailable");
    }

    #[tokio::test]
    async fn execute_with_returns_value_only_on_success() {
        let sink = NullProgress;
        let runner = StepRunner::new(&sink);
        let (step, value) = runner
            .execute_with("Get source project", async { Ok((42u32, "found".to_string())) })
            .await;
        assert!(step.success);
        assert_eq!(value, Some(42));

        let (step, value) = runner
            .execute_with::<u32, _>("Get source project", async { Err(anyhow!("missing")) })
            .await;
        assert!(!step.success);
        assert_eq!(value, None);
    }
}
