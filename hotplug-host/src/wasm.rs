//! Code registry backed by wasmtime
//!
//! A plugin file is a Wasm module, binary (`.wasm`) or text (`.wat`). Each
//! module name it imports from is a dependency: the dependency file
//! `<name>.wasm` / `<name>.wat` is looked up next to the importing file and
//! then in the configured library directories, compiled, and registered under
//! `<name>`. Dependencies are resolved depth-first, so a dependency is only
//! registered once everything it imports is registered. Registered modules
//! are reused by later loads, whichever plugin pulled them in.
//!
//! The plugin module itself is not registered, it is the returned unit.
//!
//! Guest exports the host understands (see `hotplug_api`):
//!
//! | Export               | Signature   | Purpose                              |
//! |----------------------|-------------|--------------------------------------|
//! | `plugin_api_version` | `() -> i32` | optional, must equal `API_VERSION`   |
//! | `plugin_metadata`    | `() -> i64` | optional, packed ptr/len to JSON     |
//! | `memory`             | memory      | required with `plugin_metadata`      |
//! | any other name       | `() -> ()`  | handler, bound by name               |

use crate::config::RegistryConfig;
use crate::error::{HandlerError, LoadError};
use crate::registry::{CodeRegistry, CodeUnit, Handler};
use hotplug_api::{
    unpack_ptr_len, API_VERSION, API_VERSION_EXPORT, MEMORY_EXPORT, METADATA_EXPORT,
    MODULE_EXTENSIONS,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wasmtime::{Config, Engine, ExternType, Instance, Linker, Memory, Module, Store, Trap};

/// Shared table of compiled dependency modules
pub struct WasmRegistry {
    engine: Engine,
    config: RegistryConfig,
    entries: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    modules: HashMap<String, LibraryEntry>,
    next_seq: u64,
}

struct LibraryEntry {
    seq: u64,
    module: Module,
    path: PathBuf,
}

/// A dependency ready to be instantiated
#[derive(Clone)]
struct Dependency {
    name: String,
    module: Module,
    path: PathBuf,
}

impl WasmRegistry {
    /// Create an empty registry
    pub fn new(config: RegistryConfig) -> Result<Self, LoadError> {
        let mut wasm_config = Config::new();
        wasm_config.consume_fuel(true);
        wasm_config.wasm_memory64(false);

        let engine = Engine::new(&wasm_config).map_err(LoadError::Engine)?;

        Ok(Self {
            engine,
            config,
            entries: RwLock::new(Entries::default()),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Source file of a registered module
    pub fn entry_path(&self, id: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .modules
            .get(id)
            .map(|entry| entry.path.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compile(&self, path: &Path) -> Result<Module, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Module::new(&self.engine, &bytes).map_err(|source| LoadError::Compile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve every module `module` imports from, appending to `order`
    fn resolve_imports(
        &self,
        module: &Module,
        importer: &Path,
        stack: &mut Vec<String>,
        order: &mut Vec<Dependency>,
    ) -> Result<(), LoadError> {
        let mut names: Vec<&str> = Vec::new();
        for import in module.imports() {
            if !names.contains(&import.module()) {
                names.push(import.module());
            }
        }
        for name in names {
            self.resolve(name, importer, stack, order)?;
        }
        Ok(())
    }

    fn resolve(
        &self,
        name: &str,
        importer: &Path,
        stack: &mut Vec<String>,
        order: &mut Vec<Dependency>,
    ) -> Result<(), LoadError> {
        if order.iter().any(|dep| dep.name == name) {
            return Ok(());
        }
        if stack.iter().any(|entry| entry == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(LoadError::DependencyCycle(cycle));
        }

        let cached = self
            .entries
            .read()
            .modules
            .get(name)
            .map(|entry| (entry.module.clone(), entry.path.clone()));

        stack.push(name.to_string());
        let resolved = match cached {
            Some((module, path)) => self
                .resolve_imports(&module, &path, stack, order)
                .map(|()| Dependency {
                    name: name.to_string(),
                    module,
                    path,
                }),
            None => self.load_dependency(name, importer, stack, order),
        };
        stack.pop();

        order.push(resolved?);
        Ok(())
    }

    fn load_dependency(
        &self,
        name: &str,
        importer: &Path,
        stack: &mut Vec<String>,
        order: &mut Vec<Dependency>,
    ) -> Result<Dependency, LoadError> {
        let path = self
            .find_dependency(name, importer)
            .ok_or_else(|| LoadError::DependencyNotFound {
                name: name.to_string(),
                importer: importer.to_path_buf(),
            })?;

        let module = self.compile(&path)?;
        self.resolve_imports(&module, &path, stack, order)?;

        let module = self.register(name, module, &path);
        Ok(Dependency {
            name: name.to_string(),
            module,
            path,
        })
    }

    /// Insert unless present; returns the module now registered under `name`
    fn register(&self, name: &str, module: Module, path: &Path) -> Module {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.modules.get(name) {
            return existing.module.clone();
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.modules.insert(
            name.to_string(),
            LibraryEntry {
                seq,
                module: module.clone(),
                path: path.to_path_buf(),
            },
        );
        tracing::debug!(module = %name, path = %path.display(), "Registered dependency module");
        module
    }

    fn find_dependency(&self, name: &str, importer: &Path) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }

        importer
            .parent()
            .into_iter()
            .chain(self.config.library_dirs.iter().map(PathBuf::as_path))
            .flat_map(|dir| {
                MODULE_EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{name}.{ext}")))
            })
            .find(|candidate| candidate.is_file())
    }

    fn instantiate(
        &self,
        path: &Path,
        module: &Module,
        dependencies: &[Dependency],
    ) -> Result<WasmUnit, LoadError> {
        let mut store = Store::new(&self.engine, ());
        store.set_fuel(self.config.fuel).map_err(LoadError::Engine)?;

        let mut linker = Linker::new(&self.engine);
        for dep in dependencies {
            let instance = linker
                .instantiate(&mut store, &dep.module)
                .map_err(|source| LoadError::Instantiation {
                    path: dep.path.clone(),
                    source,
                })?;
            linker
                .instance(&mut store, &dep.name, instance)
                .map_err(|source| LoadError::Instantiation {
                    path: dep.path.clone(),
                    source,
                })?;
        }

        let instance =
            linker
                .instantiate(&mut store, module)
                .map_err(|source| LoadError::Instantiation {
                    path: path.to_path_buf(),
                    source,
                })?;

        check_api_version(&mut store, &instance, path)?;
        let metadata = read_metadata(&mut store, &instance, path)?;

        let handler_names = module
            .exports()
            .filter_map(|export| match export.ty() {
                ExternType::Func(ty) if ty.params().len() == 0 && ty.results().len() == 0 => {
                    Some(export.name().to_string())
                }
                _ => None,
            })
            .collect();

        Ok(WasmUnit {
            path: path.to_path_buf(),
            fuel: self.config.fuel,
            metadata,
            handler_names,
            runtime: Arc::new(Mutex::new(UnitRuntime { store, instance })),
        })
    }
}

impl CodeRegistry for WasmRegistry {
    fn keys(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut keys: Vec<(u64, &String)> = entries
            .modules
            .iter()
            .map(|(name, entry)| (entry.seq, name))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, name)| name.clone()).collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.read().modules.contains_key(id)
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn CodeUnit>, LoadError> {
        let module = self.compile(path)?;

        let mut order = Vec::new();
        self.resolve_imports(&module, path, &mut Vec::new(), &mut order)?;

        let unit = self.instantiate(path, &module, &order)?;
        Ok(Arc::new(unit))
    }

    fn remove(&self, id: &str) -> bool {
        self.entries.write().modules.remove(id).is_some()
    }
}

fn check_api_version(
    store: &mut Store<()>,
    instance: &Instance,
    path: &Path,
) -> Result<(), LoadError> {
    let Some(func) = instance.get_func(&mut *store, API_VERSION_EXPORT) else {
        return Ok(());
    };
    let version = func
        .typed::<(), i32>(&*store)
        .and_then(|func| func.call(&mut *store, ()))
        .map_err(|e| LoadError::Metadata {
            path: path.to_path_buf(),
            reason: format!("{API_VERSION_EXPORT}: {e}"),
        })?;

    if version as u32 != API_VERSION {
        return Err(LoadError::ApiVersionMismatch {
            expected: API_VERSION,
            actual: version as u32,
        });
    }
    Ok(())
}

fn read_metadata(
    store: &mut Store<()>,
    instance: &Instance,
    path: &Path,
) -> Result<Option<Value>, LoadError> {
    let Some(func) = instance.get_func(&mut *store, METADATA_EXPORT) else {
        return Ok(None);
    };
    let invalid = |reason: String| LoadError::Metadata {
        path: path.to_path_buf(),
        reason,
    };

    let packed = func
        .typed::<(), i64>(&*store)
        .and_then(|func| func.call(&mut *store, ()))
        .map_err(|e| invalid(format!("{METADATA_EXPORT}: {e}")))?;
    let (ptr, len) = unpack_ptr_len(packed);

    let memory = instance
        .get_memory(&mut *store, MEMORY_EXPORT)
        .ok_or_else(|| invalid(format!("missing '{MEMORY_EXPORT}' export")))?;
    let bytes = read_memory(store, &memory, ptr, len).map_err(invalid)?;

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| invalid(format!("metadata is not valid JSON: {e}")))
}

fn read_memory(store: &Store<()>, memory: &Memory, ptr: i32, len: i32) -> Result<Vec<u8>, String> {
    let data = memory.data(store);
    let (ptr, len) = (ptr as u32 as usize, len as u32 as usize);
    match ptr.checked_add(len) {
        Some(end) if end <= data.len() => Ok(data[ptr..end].to_vec()),
        _ => Err(format!(
            "Out of bounds: ptr={}, len={}, memory_size={}",
            ptr,
            len,
            data.len()
        )),
    }
}

struct UnitRuntime {
    store: Store<()>,
    instance: Instance,
}

/// An instantiated plugin module
pub struct WasmUnit {
    path: PathBuf,
    fuel: u64,
    metadata: Option<Value>,
    handler_names: Vec<String>,
    runtime: Arc<Mutex<UnitRuntime>>,
}

impl WasmUnit {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value of an exported i32 global
    pub fn global_i32(&self, name: &str) -> Option<i32> {
        let mut runtime = self.runtime.lock();
        let instance = runtime.instance;
        let global = instance.get_global(&mut runtime.store, name)?;
        global.get(&mut runtime.store).i32()
    }
}

impl CodeUnit for WasmUnit {
    fn metadata(&self) -> Option<Value> {
        self.metadata.clone()
    }

    fn handler(&self, name: &str) -> Option<Handler> {
        if !self.handler_names.iter().any(|n| n == name) {
            return None;
        }

        let runtime = Arc::clone(&self.runtime);
        let fuel = self.fuel;
        let name = name.to_string();
        Some(Arc::new(move || -> Result<(), HandlerError> {
            let trap = |source: anyhow::Error| HandlerError::Trap {
                handler: name.clone(),
                source,
            };

            let mut runtime = runtime.lock();
            let instance = runtime.instance;
            let func = instance
                .get_typed_func::<(), ()>(&mut runtime.store, &name)
                .map_err(trap)?;
            runtime.store.set_fuel(fuel).map_err(trap)?;

            func.call(&mut runtime.store, ()).map_err(|e| {
                if matches!(e.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) {
                    HandlerError::FuelExhausted(name.clone())
                } else {
                    trap(e)
                }
            })
        }))
    }

    fn handler_names(&self) -> Vec<String> {
        self.handler_names.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
