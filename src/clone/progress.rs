//! Progress notifications for a running clone.
//!
//! Sinks are fire-and-forget: none of the methods can fail, and delivery
//! problems are swallowed inside each implementation.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::clone::types::CloneRunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, percent: u8, message: &str);
    fn report_step(&self, name: &str, status: StepStatus);
    fn log(&self, level: LogLevel, line: &str);
    fn complete(&self, success: bool, result: Option<&CloneRunResult>);
}

/// Drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report_progress(&self, _percent: u8, _message: &str) {}
    fn report_step(&self, _name: &str, _status: StepStatus) {}
    fn log(&self, _level: LogLevel, _line: &str) {}
    fn complete(&self, _success: bool, _result: Option<&CloneRunResult>) {}
}

/// Forwards notifications to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report_progress(&self, percent: u8, message: &str) {
        info!(percent, "{message}");
    }

    fn report_step(&self, name: &str, status: StepStatus) {
        match status {
            StepStatus::Failed => warn!(step = name, ?status, "Step status"),
            _ => info!(step = name, ?status, "Step status"),
        }
    }

    fn log(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Debug => debug!("{line}"),
            LogLevel::Info => info!("{line}"),
            LogLevel::Warning => warn!("{line}"),
            LogLevel::Error => error!("{line}"),
        }
    }

    fn complete(&self, success: bool, result: Option<&CloneRunResult>) {
        let failed = result.map(|r| r.failed_steps().join(", ")).unwrap_or_default();
        if success {
            info!("Clone completed");
        } else {
            warn!(failed_steps = %failed, "Clone completed with errors");
        }
    }
}

/// Event published on the broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress { percent: u8, message: String },
    Step { name: String, status: StepStatus },
    Log { level: LogLevel, line: String },
    Completed { success: bool, result: Option<Box<CloneRunResult>> },
}

/// Publish/subscribe sink over a tokio broadcast channel.
///
/// Publishing with no live subscriber, or to a lagging one, is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            debug!("No progress subscribers");
        }
    }
}

impl ProgressSink for BroadcastProgress {
    fn report_progress(&self, percent: u8, message: &str) {
        self.publish(ProgressEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn report_step(&self, name: &str, status: StepStatus) {
        self.publish(ProgressEvent::Step {
            name: name.to_string(),
            status,
        });
    }

    fn log(&self, level: LogLevel, line: &str) {
        self.publish(ProgressEvent::Log {
            level,
            line: line.to_string(),
        });
    }

    fn complete(&self, success: bool, result: Option<&CloneRunResult>) {
        self.publish(ProgressEvent::Completed {
            success,
            result: result.cloned().map(Box::new),
        });
    }
}

/// Percentage of `completed` out of `total`, clamped to 100.
pub fn percent_complete(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}
