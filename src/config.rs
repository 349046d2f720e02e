use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the project cloner
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClonerConfig {
    /// Platform connection settings
    pub platform: PlatformConfig,
    /// Client-side rate limiting
    pub rate_limit: RateLimitConfig,
    /// Clone pipeline tuning
    pub clone: CloneConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Local storage for run reports
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    /// Organization URL, e.g. https://dev.azure.com/contoso
    pub endpoint: String,
    /// Personal access token (can be set via env var)
    pub credential: Option<String>,
    /// Graph (identity) endpoint; derived from `endpoint` when unset
    pub graph_endpoint: Option<String>,
    /// Per-request timeout
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemOrdering {
    /// Items without a parent first, input order otherwise
    Partition,
    /// Parents strictly before children; cycles logged
    Topological,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CloneConfig {
    /// Wait after project creation before reading the project back
    pub settle_delay_ms: u64,
    /// Delay before the single retry of a failed tree leaf
    pub leaf_retry_delay_ms: u64,
    /// Work item creation order
    pub work_item_ordering: WorkItemOrdering,
    /// Visibility for the new project (private/public)
    pub visibility: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (overridden by RUST_LOG)
    pub log_level: String,
    /// Emit JSON log lines instead of human readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Default local path for run reports
    pub default_local_path: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credential: None, // Read from env var or .project-cloner-rc
            graph_endpoint: None,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_capacity: 20,
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 5_000,
            leaf_retry_delay_ms: 1_000,
            work_item_ordering: WorkItemOrdering::Topological,
            visibility: "private".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_local_path: ".project-cloner".to_string(),
        }
    }
}

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            rate_limit: RateLimitConfig::default(),
            clone: CloneConfig::default(),
            observability: ObservabilityConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl CloneConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn leaf_retry_delay(&self) -> Duration {
        Duration::from_millis(self.leaf_retry_delay_ms)
    }
}

impl ClonerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (project-cloner.toml, .project-cloner-rc)
    /// 3. Environment variables (prefixed with PROJECT_CLONER_, `__` between sections)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let toml_path = dir.join("project-cloner.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".project-cloner-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("PROJECT_CLONER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut cloner_config: ClonerConfig = builder.build()?.try_deserialize()?;

        // Credential fallbacks used by the platform's own CLI tooling
        if cloner_config.platform.credential.is_none() {
            if let Ok(token) = std::env::var("AZURE_DEVOPS_EXT_PAT") {
                cloner_config.platform.credential = Some(token);
            } else if let Ok(token) = std::env::var("PROJECT_CLONER_PAT") {
                cloner_config.platform.credential = Some(token);
            }
        }

        Ok(cloner_config)
    }

    /// Save configuration to file; the credential is never written out
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut redacted = self.clone();
        redacted.platform.credential = None;
        let toml_content = toml::to_string_pretty(&redacted)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Graph endpoint for group membership calls.
    ///
    /// `https://dev.azure.com/org` → `https://vssps.dev.azure.com/org`
    pub fn graph_endpoint(&self) -> String {
        if let Some(explicit) = &self.platform.graph_endpoint {
            return explicit.trim_end_matches('/').to_string();
        }
        let endpoint = self.platform.endpoint.trim_end_matches('/');
        match endpoint.strip_prefix("https://dev.azure.com/") {
            Some(org) => format!("https://vssps.dev.azure.com/{org}"),
            None => endpoint.to_string(),
        }
    }
}

/// Connection tuple handed to the client factory
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSettings {
    pub endpoint: String,
    pub credential: String,
    pub default_local_path: PathBuf,
}

/// Read-only source of platform settings
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Result<PlatformSettings>;
}

/// Settings backed by a loaded [`ClonerConfig`]
pub struct ConfigSettingsProvider {
    config: ClonerConfig,
}

impl ConfigSettingsProvider {
    pub fn new(config: ClonerConfig) -> Self {
        Self { config }
    }
}

impl SettingsProvider for ConfigSettingsProvider {
    fn settings(&self) -> Result<PlatformSettings> {
        let endpoint = self.config.platform.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(anyhow!(
                "Platform endpoint is not set. Set platform.endpoint in project-cloner.toml \
                 or export PROJECT_CLONER_PLATFORM__ENDPOINT"
            ));
        }
        let credential = self
            .config
            .platform
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Personal access token not found. Export AZURE_DEVOPS_EXT_PAT \
                     or PROJECT_CLONER_PLATFORM__CREDENTIAL"
                )
            })?;

        Ok(PlatformSettings {
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
            default_local_path: PathBuf::from(&self.config.storage.default_local_path),
        })
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ClonerConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = ClonerConfig::load_env_file();
        ClonerConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ClonerConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))
}
