//! File-backed plugin lifecycle
//!
//! A [`RegularPlugin`] owns one plugin file. Loading it goes through the
//! shared [`CodeRegistry`]; the plugin records exactly which registry entries
//! each load introduced so that `unload` evicts those and nothing else.

use crate::error::{LoadError, PluginError};
use crate::identity::{self, FileHash};
use crate::listener::{EventListener, ListenerCollection};
use crate::lock;
use crate::registry::{self, CodeRegistry, CodeUnit};
use crate::state::{Plugin, PluginState, StateMachine};
use hotplug_api::{EventCatalog, HostEvents, PluginMetadata, DEFAULT_LISTENER_PRIORITY};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A plugin loaded from a file through a code registry
pub struct RegularPlugin {
    file_path: PathBuf,
    file_name: String,
    file_hash: Option<FileHash>,
    current_unit: Option<Arc<dyn CodeUnit>>,
    previous_unit: Option<Arc<dyn CodeUnit>>,
    /// Registry entries introduced by the most recent load
    introduced_keys: Vec<String>,
    /// Entries introduced by earlier loads and displaced by a reload
    retired_keys: Vec<String>,
    metadata: Option<PluginMetadata>,
    listeners: ListenerCollection,
    state: StateMachine,
    registry: Arc<dyn CodeRegistry>,
    catalog: Arc<dyn EventCatalog>,
}

impl RegularPlugin {
    /// Create an uninitialized plugin for the file at `file_path`
    pub fn new(file_path: impl Into<PathBuf>, registry: Arc<dyn CodeRegistry>) -> Self {
        let file_path = file_path.into();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file_path,
            file_name,
            file_hash: None,
            current_unit: None,
            previous_unit: None,
            introduced_keys: Vec::new(),
            retired_keys: Vec::new(),
            metadata: None,
            listeners: ListenerCollection::new(),
            state: StateMachine::new(),
            registry,
            catalog: Arc::new(HostEvents),
        }
    }

    /// Use a different event catalog for default listener binding
    pub fn with_catalog(mut self, catalog: Arc<dyn EventCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Digest captured by the last successful load
    pub fn file_hash(&self) -> Option<&FileHash> {
        self.file_hash.as_ref()
    }

    pub fn current_unit(&self) -> Option<&Arc<dyn CodeUnit>> {
        self.current_unit.as_ref()
    }

    /// Unit displaced by the last load attempt
    pub fn previous_unit(&self) -> Option<&Arc<dyn CodeUnit>> {
        self.previous_unit.as_ref()
    }

    /// Registry entries introduced by the most recent load
    pub fn introduced_keys(&self) -> &[String] {
        &self.introduced_keys
    }

    /// Entries from earlier loads still awaiting eviction
    pub fn retired_keys(&self) -> &[String] {
        &self.retired_keys
    }

    pub fn listeners(&self) -> &ListenerCollection {
        &self.listeners
    }

    /// Plugin id used when the unit declares none: the file name without extension
    pub fn fallback_metadata_id(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    // ---------------
    //   Plugin File
    // ---------------

    pub fn file_exists(&self) -> bool {
        identity::file_exists(&self.file_path)
    }

    /// Current digest of the plugin file; `None` if the file is absent
    pub fn compute_hash(&self) -> Result<Option<FileHash>, PluginError> {
        identity::compute_hash(&self.file_path).map_err(|source| PluginError::Io {
            path: self.file_path.clone(),
            source,
        })
    }

    /// Whether the file differs from what was last loaded
    pub fn file_changed(&self) -> Result<bool, PluginError> {
        Ok(self.compute_hash()? != self.file_hash)
    }

    // --------------
    //   Life Cycle
    // --------------

    fn load_instance(&mut self) -> Result<(), PluginError> {
        let staged_hash = self.compute_hash()?;
        let registry = Arc::clone(&self.registry);

        let loaded = {
            let _guard = lock::global_load_lock();
            let baseline: HashSet<String> = registry.keys().into_iter().collect();
            self.previous_unit = self.current_unit.clone();

            let result = panic::catch_unwind(AssertUnwindSafe(|| registry.load(&self.file_path)))
                .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(payload))));

            let introduced = registry::introduced_keys(&baseline, registry.keys());
            self.record_introduced(introduced);
            result
        };

        let unit = loaded?;
        self.metadata = Some(PluginMetadata::parse(
            unit.metadata().as_ref(),
            &self.fallback_metadata_id(),
        ));
        self.current_unit = Some(unit);
        self.listeners.clear();
        self.file_hash = staged_hash;
        Ok(())
    }

    fn record_introduced(&mut self, introduced: Vec<String>) {
        // Each identifier is tracked in exactly one list
        self.retired_keys.retain(|key| !introduced.contains(key));
        for key in std::mem::take(&mut self.introduced_keys) {
            if !introduced.contains(&key) && !self.retired_keys.contains(&key) {
                self.retired_keys.push(key);
            }
        }
        self.introduced_keys = introduced;
    }

    fn register_default_listeners(&mut self) {
        let Some(unit) = self.current_unit.clone() else {
            return;
        };
        let catalog = Arc::clone(&self.catalog);
        let owner = self.owner_id();

        for event in catalog.events() {
            let Some(name) = event.default_handler else {
                continue;
            };
            if self.listeners.has_default(event.id, name) {
                tracing::trace!(plugin = %owner, event = event.id, "Default listener already bound");
                continue;
            }
            if let Some(handler) = unit.handler(name) {
                self.listeners.add(
                    event.id,
                    EventListener::new(owner.clone(), handler, DEFAULT_LISTENER_PRIORITY)
                        .with_handler_name(name),
                );
            }
        }
    }

    /// Identity recorded on listeners: the declared plugin id, else the fallback id
    pub fn owner_id(&self) -> String {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.id.clone())
            .unwrap_or_else(|| self.fallback_metadata_id())
    }

    fn hash_for_log(&self) -> &str {
        self.file_hash
            .as_ref()
            .map(FileHash::as_str)
            .unwrap_or("none")
    }
}

impl Plugin for RegularPlugin {
    fn state(&self) -> PluginState {
        self.state.state()
    }

    fn is_regular(&self) -> bool {
        true
    }

    fn metadata(&self) -> Result<&PluginMetadata, PluginError> {
        self.metadata.as_ref().ok_or_else(|| {
            PluginError::illegal_call(format!(
                "Metadata of plugin {} is not loaded. Plugin state = {}",
                self,
                self.state()
            ))
        })
    }

    fn load(&mut self) -> Result<(), PluginError> {
        self.state.assert_state(&[PluginState::Uninitialized], &*self)?;
        self.load_instance()?;
        tracing::debug!(
            plugin = %self,
            path = %self.file_path.display(),
            sha256 = self.hash_for_log(),
            "Plugin loaded"
        );
        self.state.set_state(PluginState::Loaded);
        Ok(())
    }

    /// Register default listeners
    fn ready(&mut self) -> Result<(), PluginError> {
        self.state
            .assert_state(&[PluginState::Loaded, PluginState::Ready], &*self)?;
        self.register_default_listeners();
        self.state.set_state(PluginState::Ready);
        Ok(())
    }

    fn reload(&mut self) -> Result<(), PluginError> {
        self.state
            .assert_state(&[PluginState::Loaded, PluginState::Ready], &*self)?;
        self.load_instance()?;
        tracing::debug!(plugin = %self, sha256 = self.hash_for_log(), "Plugin reloaded");
        Ok(())
    }

    fn unload(&mut self) -> Result<(), PluginError> {
        self.state.assert_state(
            &[
                PluginState::Uninitialized,
                PluginState::Loaded,
                PluginState::Ready,
            ],
            &*self,
        )?;

        {
            let _guard = lock::global_load_lock();
            let retired = std::mem::take(&mut self.retired_keys);
            let introduced = std::mem::take(&mut self.introduced_keys);
            for key in retired.iter().chain(introduced.iter()) {
                if self.registry.remove(key) {
                    tracing::debug!(module = %key, plugin = %self, "Removed module when unloading plugin");
                } else {
                    tracing::error!(
                        critical = true,
                        module = %key,
                        plugin = %self,
                        "Module not found when unloading plugin"
                    );
                }
            }
        }

        self.state.set_state(PluginState::Unloading);
        Ok(())
    }

    fn remove(&mut self) -> Result<(), PluginError> {
        self.state.assert_state(&[PluginState::Unloading], &*self)?;
        self.state.set_state(PluginState::Unloaded);
        Ok(())
    }
}

impl fmt::Display for RegularPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegularPlugin[file={},path={},state={}]",
            self.file_name,
            self.file_path.display(),
            self.state.state()
        )
    }
}

impl fmt::Debug for RegularPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegularPlugin")
            .field("file_path", &self.file_path)
            .field("file_hash", &self.file_hash)
            .field("state", &self.state.state())
            .field("introduced_keys", &self.introduced_keys)
            .field("retired_keys", &self.retired_keys)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}
