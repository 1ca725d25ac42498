//! Shared helpers for lifecycle tests
//!
//! [`ScriptedRegistry`] is an in-memory registry whose `load` follows a
//! per-file script: which identifiers to register, whether to fail after
//! registering them, and what the resulting unit exports.

#![allow(dead_code)]

use hotplug_host::{CodeRegistry, CodeUnit, Handler, HandlerError, LoadError};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// What loading one file does
#[derive(Clone, Default)]
pub struct Script {
    pub registers: Vec<String>,
    pub fail: Option<String>,
    pub metadata: Option<Value>,
    pub handlers: Vec<String>,
    pub pause: Option<Duration>,
    pub hook: Option<Hook>,
}

impl Script {
    pub fn registering<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registers: keys.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Fail after the identifiers are registered
    pub fn failing(mut self, reason: &str) -> Self {
        self.fail = Some(reason.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_handlers(mut self, names: &[&str]) -> Self {
        self.handlers = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Sleep after each registered identifier
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Run `hook` after registering, before returning
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }
}

#[derive(Default)]
pub struct ScriptedRegistry {
    entries: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<PathBuf, Script>>,
    loads: AtomicUsize,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_entries(keys: &[&str]) -> Arc<Self> {
        let registry = Self::default();
        registry
            .entries
            .lock()
            .extend(keys.iter().map(|key| key.to_string()));
        Arc::new(registry)
    }

    pub fn script(&self, path: &Path, script: Script) {
        self.scripts.lock().insert(path.to_path_buf(), script);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Handler invocations so far, as `name#generation`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl CodeRegistry for ScriptedRegistry {
    fn keys(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn CodeUnit>, LoadError> {
        let generation = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if !path.is_file() {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            });
        }

        let script = self.scripts.lock().get(path).cloned().unwrap_or_default();
        for key in &script.registers {
            {
                let mut entries = self.entries.lock();
                if !entries.contains(key) {
                    entries.push(key.clone());
                }
            }
            if let Some(pause) = script.pause {
                std::thread::sleep(pause);
            }
        }

        if let Some(hook) = &script.hook {
            hook();
        }

        if let Some(reason) = script.fail {
            return Err(LoadError::Instantiation {
                path: path.to_path_buf(),
                source: anyhow::anyhow!(reason),
            });
        }

        Ok(Arc::new(ScriptedUnit {
            generation,
            metadata: script.metadata,
            handlers: script.handlers,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|key| key == id) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }
}

pub struct ScriptedUnit {
    pub generation: usize,
    metadata: Option<Value>,
    handlers: Vec<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl CodeUnit for ScriptedUnit {
    fn metadata(&self) -> Option<Value> {
        self.metadata.clone()
    }

    fn handler(&self, name: &str) -> Option<Handler> {
        if !self.handlers.iter().any(|handler| handler == name) {
            return None;
        }
        let calls = Arc::clone(&self.calls);
        let call = format!("{}#{}", name, self.generation);
        Some(Arc::new(move || -> Result<(), HandlerError> {
            calls.lock().push(call.clone());
            Ok(())
        }))
    }

    fn handler_names(&self) -> Vec<String> {
        self.handlers.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Whether both handles point at the same unit
pub fn same_unit(a: &Arc<dyn CodeUnit>, b: &Arc<dyn CodeUnit>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Collects the `module` field of every error event flagged `critical`
#[derive(Clone, Default)]
struct CriticalLayer {
    modules: Arc<Mutex<Vec<String>>>,
}

#[derive(Default)]
struct CriticalVisitor {
    critical: bool,
    module: Option<String>,
}

impl Visit for CriticalVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "module" {
            self.module = Some(format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for CriticalLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = CriticalVisitor::default();
        event.record(&mut visitor);
        if visitor.critical {
            self.modules
                .lock()
                .push(visitor.module.unwrap_or_default());
        }
    }
}

/// Run `f` and return the modules reported in critical diagnostics meanwhile
pub fn capture_critical<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let layer = CriticalLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    let modules = layer.modules.lock().clone();
    (result, modules)
}
