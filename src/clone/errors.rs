use thiserror::Error;

use crate::devops::DevOpsError;

/// Errors that terminate a clone run.
#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Source project '{project}' was not found")]
    SourceNotFound { project: String },

    #[error("Target project name '{name}' is invalid: {reason}")]
    InvalidTargetName { name: String, reason: String },

    #[error("A project named '{name}' already exists")]
    TargetExists { name: String },

    #[error("Target project '{name}' could not be created")]
    TargetCreation {
        name: String,
        #[source]
        source: DevOpsError,
    },

    #[error("Target project '{name}' is not available after creation")]
    TargetUnavailable {
        name: String,
        #[source]
        source: DevOpsError,
    },

    #[error(transparent)]
    Platform(#[from] DevOpsError),
}
