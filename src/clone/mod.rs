//! Clone pipeline: replicates one project into a new sibling project.
//!
//! The orchestrator drives named steps through the step runner; each step
//! module owns the transfer of one entity kind.

pub mod capabilities;
pub mod classification;
pub mod errors;
pub mod id_map;
pub mod orchestrator;
pub mod progress;
pub mod queries;
pub mod relations;
pub mod replicator;
pub mod repositories;
pub mod sequencer;
pub mod settings;
pub mod step;
pub mod teams;
pub mod type_map;
pub mod types;
pub mod wiki;
pub mod work_items;

pub use capabilities::{classify_services, ServiceState, SourceServices};
pub use errors::CloneError;
pub use orchestrator::{list_available_process_templates, validate_target_reachable, CloneOrchestrator};
pub use progress::{BroadcastProgress, LogLevel, NullProgress, ProgressEvent, ProgressSink, StepStatus, TracingProgress};
pub use types::{CloneOptionSet, CloneRequest, CloneRunResult, CloneStep, CloneStepResult};
