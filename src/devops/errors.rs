use thiserror::Error;

/// Errors raised by the remote platform client.
///
/// Classification matters to the clone pipeline: `AlreadyExists` drives the
/// idempotent-on-exists handling of tree containers, and `is_transient`
/// decides whether a leaf creation gets its single retry.
#[derive(Debug, Error)]
pub enum DevOpsError {
    #[error("authentication failed: {message}")]
    Authentication { message: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },
    #[error("rate limit exceeded: {message}")]
    RateLimited { message: String },
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("network error: {message}")]
    Network { message: String },
    #[error("invalid response from platform: {message}")]
    InvalidResponse { message: String },
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl DevOpsError {
    /// Map a non-success HTTP response onto an error variant.
    pub fn from_status(status: u16, resource: &str, body: &str) -> Self {
        let message = summarize_body(body);
        let lowered = body.to_ascii_lowercase();
        if lowered.contains("already exists") || lowered.contains("tf237018") {
            return DevOpsError::AlreadyExists {
                resource: resource.to_string(),
            };
        }
        match status {
            401 => DevOpsError::Authentication { message },
            403 => DevOpsError::PermissionDenied { message },
            404 => DevOpsError::NotFound {
                resource: resource.to_string(),
            },
            409 | 412 => DevOpsError::AlreadyExists {
                resource: resource.to_string(),
            },
            429 => DevOpsError::RateLimited { message },
            500..=599 => DevOpsError::Server { status, message },
            _ => DevOpsError::Rejected { status, message },
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, DevOpsError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DevOpsError::NotFound { .. })
    }

    /// Failures worth a single retry: permission propagation lag on freshly
    /// created projects, throttling, server hiccups and dropped connections.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DevOpsError::PermissionDenied { .. }
                | DevOpsError::RateLimited { .. }
                | DevOpsError::Server { .. }
                | DevOpsError::Network { .. }
        )
    }

    /// Operator-facing hints printed by the CLI for run-fatal failures.
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            DevOpsError::Authentication { .. } => &[
                "Personal access token is invalid or expired",
                "Set PROJECT_CLONER_PLATFORM__CREDENTIAL or AZURE_DEVOPS_EXT_PAT",
                "Token needs Project & Team (read, write & manage) scope",
            ],
            DevOpsError::PermissionDenied { .. } => &[
                "Token lacks permission for this operation",
                "Project creation requires Project Collection Administrator rights",
            ],
            DevOpsError::NotFound { .. } => &[
                "Check the organization URL and the project name or ID",
                "Run: project-cloner validate",
            ],
            DevOpsError::RateLimited { .. } => &[
                "Lower rate_limit.requests_per_second in project-cloner.toml",
                "Retry the clone later",
            ],
            DevOpsError::Network { .. } => &[
                "Check connectivity to the organization URL",
                "Check proxy settings (HTTPS_PROXY)",
            ],
            _ => &[],
        }
    }
}

impl From<reqwest::Error> for DevOpsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DevOpsError::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            DevOpsError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for DevOpsError {
    fn from(err: serde_json::Error) -> Self {
        DevOpsError::InvalidResponse {
            message: err.to_string(),
        }
    }
}

/// Platform error bodies are JSON with a `message` field; fall back to the
/// raw text, truncated.
fn summarize_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 300 {
        let cut: String = trimmed.chars().take(300).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
