//! hotplug-host: load/reload/unload lifecycle for hot-pluggable Wasm plugins
//!
//! A [`RegularPlugin`] loads its file through a shared [`CodeRegistry`],
//! remembers exactly which registry entries each load introduced, and evicts
//! them on unload. All registry-mutating sections across all plugins are
//! serialized by the reentrant [`lock::global_load_lock`].
//!
//! ```rust,ignore
//! use hotplug_host::{Plugin, RegistryConfig, RegularPlugin, WasmRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(WasmRegistry::new(RegistryConfig::default())?);
//! let mut plugin = RegularPlugin::new("plugins/backup.wasm", registry);
//! plugin.load()?;
//! plugin.ready()?;
//! if plugin.file_changed()? {
//!     plugin.reload()?;
//! }
//! plugin.unload()?;
//! plugin.remove()?;
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod listener;
pub mod lock;
pub mod plugin;
pub mod registry;
pub mod state;
pub mod tracing_support;
pub mod wasm;
pub mod watcher;

pub use config::{HostConfig, RegistryConfig, WatcherConfig};
pub use error::{HandlerError, LoadError, PluginError};
pub use identity::FileHash;
pub use listener::{EventListener, ListenerCollection};
pub use plugin::RegularPlugin;
pub use registry::{CodeRegistry, CodeUnit, Handler};
pub use state::{Plugin, PluginState, StateMachine};
pub use wasm::{WasmRegistry, WasmUnit};
pub use watcher::{FileChange, FileChangeKind, PluginFileWatcher, WatcherError};

pub use hotplug_api::{
    EventCatalog, HostEvents, PluginEvent, PluginMetadata, DEFAULT_LISTENER_PRIORITY,
};
