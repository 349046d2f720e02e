// Project Cloner Library - replicate a DevOps project into a new sibling project
// This exposes the core components for testing and integration

pub mod cli;
pub mod clone;
pub mod config;
pub mod devops;
pub mod http;
pub mod observability;
pub mod telemetry;

// Re-export key types for easy access
pub use clone::{
    BroadcastProgress, CloneError, CloneOptionSet, CloneOrchestrator, CloneRequest, CloneRunResult, CloneStep,
    CloneStepResult, NullProgress, ProgressEvent, ProgressSink, TracingProgress,
};
pub use config::{config, ClonerConfig, ConfigSettingsProvider, PlatformSettings, SettingsProvider};
pub use devops::{DevOpsClient, DevOpsError, DevOpsOps};
pub use http::RateLimitedHttpClient;
pub use observability::{api_metrics, ApiMetrics, ApiStats, OperationTimer};
pub use telemetry::{create_clone_span, generate_correlation_id, init_telemetry};
