//! Error types for plugin lifecycle, loading and handler calls

use crate::state::PluginState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by lifecycle operations
#[derive(Debug, Error)]
pub enum PluginError {
    /// Lifecycle method called in a state that does not permit it
    #[error("Illegal call: {message}")]
    IllegalCall { message: String },

    /// The code unit could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Plugin file exists but could not be hashed
    #[error("Failed to hash plugin file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    pub fn illegal_call(message: impl Into<String>) -> Self {
        Self::IllegalCall {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_state(
        owner: &dyn std::fmt::Display,
        state: PluginState,
        allowed: &[PluginState],
    ) -> Self {
        let allowed = allowed
            .iter()
            .map(PluginState::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self::illegal_call(format!(
            "{owner} is in state {state}, expected one of [{allowed}]"
        ))
    }

    /// Check if this error is a caller contract violation
    pub fn is_illegal_call(&self) -> bool {
        matches!(self, Self::IllegalCall { .. })
    }
}

/// Errors raised by a code registry while loading a unit
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Engine creation failed: {0}")]
    Engine(#[source] anyhow::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Module compilation failed for {path}: {source}")]
    Compile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Dependency '{name}' imported by {importer} not found")]
    DependencyNotFound { name: String, importer: PathBuf },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Instantiation failed for {path}: {source}")]
    Instantiation {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("API version mismatch: expected {expected}, got {actual}")]
    ApiVersionMismatch { expected: u32, actual: u32 },

    #[error("Invalid metadata in {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Loader panicked: {0}")]
    Panicked(String),
}

/// Errors raised when invoking a bound handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler {handler} trapped: {source}")]
    Trap {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Handler {0} exhausted its fuel (CPU limit exceeded)")]
    FuelExhausted(String),
}
