//! Docspace configuration management

use crate::error::{Error, Result};
use crate::persistence::FilePersistence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Docspace configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocspaceConfig {
    /// Where revisions and baselines are stored
    pub storage: StorageConfig,

    /// Generation backend
    pub generation: GenerationConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl DocspaceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }
}

/// Persistence backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, lost on exit
    Memory,
    /// JSON files under the project directory
    #[default]
    File,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Project directory; defaults to `~/.docspace/projects/<project_id>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Project (source document workspace) identifier
    pub project_id: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            base_dir: None,
            project_id: "default".to_string(),
        }
    }
}

impl StorageConfig {
    /// Directory the file backend reads and writes
    pub fn resolved_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(|| FilePersistence::default_dir(&self.project_id))
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the generation service
    pub endpoint: String,

    /// Source document id sent with each request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    /// Per-request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,

    /// Fixed prefix for auto labels; the module title when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_prefix: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000".to_string(),
            file_id: None,
            timeout_secs: 120,
            label_prefix: None,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level for the `docspace` target
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
