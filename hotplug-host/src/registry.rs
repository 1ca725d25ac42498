//! Code registry abstraction
//!
//! The registry is the process-wide table of loaded code units, keyed by
//! identifier. Loading one plugin may insert many entries (everything it
//! pulls in transitively) and an entry introduced by one plugin can be used
//! by another, so eviction always targets identifiers.
//!
//! Callers that need a consistent before/after view of the keys must hold
//! [`crate::lock::global_load_lock`] around the whole sequence.

use crate::error::{HandlerError, LoadError};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Callable bound to an event
pub type Handler = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// A loaded code unit
pub trait CodeUnit: Send + Sync {
    /// Raw metadata the unit declares, if any
    fn metadata(&self) -> Option<Value>;

    /// Handler exported under exactly `name`, if any
    fn handler(&self, name: &str) -> Option<Handler>;

    /// Names of every handler the unit exports
    fn handler_names(&self) -> Vec<String>;

    /// Access to the concrete unit type
    fn as_any(&self) -> &dyn Any;
}

/// Shared identifier -> unit table
pub trait CodeRegistry: Send + Sync {
    /// Identifiers currently present, in insertion order
    fn keys(&self) -> Vec<String>;

    fn contains(&self, id: &str) -> bool {
        self.keys().iter().any(|key| key == id)
    }

    /// Load the unit at `path`, registering whatever it pulls in
    ///
    /// Entries registered before a failure stay registered.
    fn load(&self, path: &Path) -> Result<Arc<dyn CodeUnit>, LoadError>;

    /// Remove an entry; `false` if it was not present
    fn remove(&self, id: &str) -> bool;
}

/// Identifiers of `after` missing from `baseline`, keeping `after`'s order
pub fn introduced_keys(baseline: &HashSet<String>, after: Vec<String>) -> Vec<String> {
    after
        .into_iter()
        .filter(|key| !baseline.contains(key))
        .collect()
}
