//! Host configuration

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default fuel granted per instantiation and per handler call
pub const DEFAULT_FUEL: u64 = 10_000_000;

/// Configuration for [`crate::WasmRegistry`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Fuel limit for start functions, metadata export and handler calls
    pub fuel: u64,
    /// Directories searched for dependency modules after the plugin's own directory
    pub library_dirs: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fuel: DEFAULT_FUEL,
            library_dirs: Vec::new(),
        }
    }
}

/// Configuration for [`crate::PluginFileWatcher`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Debounce duration for file events, in milliseconds
    pub debounce_ms: u64,
    /// File extensions treated as plugin files
    pub extensions: Vec<String>,
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether `path` has one of the configured extensions
    pub fn is_plugin_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            extensions: hotplug_api::MODULE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Top-level host configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub registry: RegistryConfig,
    pub watcher: WatcherConfig,
}

/// Errors that can occur while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl HostConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
