//! # Plugin Registry
//!
//! Maps a canonical plugin name to the factory/destructor pair exported by a
//! dynamically loaded adapter module.
//!
//! ## Module ABI
//!
//! A loadable module exports two C-linkage symbols:
//!
//! | Symbol | Signature |
//! |--------|-----------|
//! | `create_adapter` | `extern "C" fn() -> *mut AdapterBox` |
//! | `destroy_adapter` | `unsafe extern "C" fn(*mut AdapterBox)` |
//!
//! [`export_adapter!`](crate::export_adapter) generates both for any
//! `Adapter + Default` type. Modules must be built with the same compiler and
//! `southbound` version as the host, since [`AdapterBox`] holds a Rust trait
//! object.
//!
//! ## Ownership
//!
//! Instances come out of [`PluginRegistry::create_adapter_instance`] as
//! [`AdapterInstance`] handles. A handle keeps its originating module mapped
//! and calls that module's destructor when dropped, so an instance can never
//! be freed by another plugin's destructor or outlive its code.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::error::PluginError;

// ============================================================================
// ABI
// ============================================================================

/// Exported factory symbol.
pub const CREATE_SYMBOL: &str = "create_adapter";
/// Exported destructor symbol.
pub const DESTROY_SYMBOL: &str = "destroy_adapter";

/// Thin, FFI-transportable box around an adapter trait object.
pub struct AdapterBox(Box<dyn Adapter>);

impl AdapterBox {
    pub fn new<A: Adapter + 'static>(adapter: A) -> Self {
        Self(Box::new(adapter))
    }
}

/// Signature of `create_adapter`. Returns null on failure.
pub type CreateFn = unsafe extern "C" fn() -> *mut AdapterBox;
/// Signature of `destroy_adapter`. Must accept null.
pub type DestroyFn = unsafe extern "C" fn(*mut AdapterBox);

/// Factory for any default-constructible adapter.
///
/// Panics during construction are caught and reported as null.
#[allow(improper_ctypes_definitions)]
pub extern "C" fn create_default<A: Adapter + Default + 'static>() -> *mut AdapterBox {
    match std::panic::catch_unwind(|| AdapterBox::new(A::default())) {
        Ok(adapter) => Box::into_raw(Box::new(adapter)),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destructor paired with [`create_default`].
///
/// # Safety
///
/// `instance` must be null or a pointer returned by a factory of the same
/// module that has not been destroyed yet.
#[allow(improper_ctypes_definitions)]
pub unsafe extern "C" fn destroy_boxed(instance: *mut AdapterBox) {
    if instance.is_null() {
        return;
    }
    let boxed = unsafe { Box::from_raw(instance) };
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || drop(boxed)));
}

/// Export `create_adapter` / `destroy_adapter` for an adapter type.
///
/// ```rust,ignore
/// southbound::export_adapter!(southbound::modbus::ModbusAdapter);
/// ```
///
/// # Logging
///
/// A `cdylib` links its own copy of `tracing`, with its own global
/// dispatcher. The subscriber installed by the host process is not visible
/// inside a loaded module, so `tracing` events emitted by a plugin adapter
/// are dropped unless the module installs a subscriber of its own. Errors
/// still reach the host through the [`StatusCode`](crate::StatusCode) values
/// the adapter returns.
#[macro_export]
macro_rules! export_adapter {
    ($adapter:ty) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn create_adapter() -> *mut $crate::plugin::AdapterBox {
            $crate::plugin::create_default::<$adapter>()
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn destroy_adapter(instance: *mut $crate::plugin::AdapterBox) {
            unsafe { $crate::plugin::destroy_boxed(instance) }
        }
    };
}

// ============================================================================
// Name canonicalization
// ============================================================================

/// Canonical plugin name for a module path, using the platform library
/// suffix (`.so` on Linux).
///
/// `/usr/lib/plugins/libmodbus-adapter.so.1.0.0` becomes `modbus-adapter`.
pub fn canonical_plugin_name(path: &Path) -> Option<String> {
    canonical_plugin_name_with(path, std::env::consts::DLL_SUFFIX)
}

/// Canonical plugin name with an explicit suffix marker: cut the filename at
/// the first occurrence of `marker` and strip a leading `lib`.
pub fn canonical_plugin_name_with(path: &Path, marker: &str) -> Option<String> {
    let file_name = path.file_name().and_then(OsStr::to_str)?;
    let stem = &file_name[..file_name.find(marker)?];
    let name = stem.strip_prefix("lib").unwrap_or(stem);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Whether a path looks like a loadable module.
pub fn is_plugin_candidate(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.contains(std::env::consts::DLL_SUFFIX))
}

// ============================================================================
// Modules and instances
// ============================================================================

enum Origin {
    Library { path: PathBuf, _library: Library },
    Builtin,
}

/// A registered plugin: its name and validated entry points.
struct PluginModule {
    name: String,
    create: CreateFn,
    destroy: DestroyFn,
    // Dropped last: unmaps the library.
    origin: Origin,
}

impl PluginModule {
    fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Library { path, .. } => Some(path),
            Origin::Builtin => None,
        }
    }
}

/// A live adapter created by a plugin factory.
///
/// Dereferences to `dyn Adapter`. Dropping the handle returns the instance
/// to the destructor of the module that created it.
pub struct AdapterInstance {
    raw: NonNull<AdapterBox>,
    module: Arc<PluginModule>,
}

// SAFETY: the pointee is a `Box<dyn Adapter>` and `Adapter: Send + Sync`;
// the module handle is only used to call the paired destructor.
unsafe impl Send for AdapterInstance {}
unsafe impl Sync for AdapterInstance {}

impl AdapterInstance {
    /// Name of the plugin that created this instance.
    pub fn plugin_name(&self) -> &str {
        &self.module.name
    }
}

impl Deref for AdapterInstance {
    type Target = dyn Adapter;

    fn deref(&self) -> &Self::Target {
        // SAFETY: `raw` came from the module factory and stays valid until drop.
        unsafe { self.raw.as_ref() }.0.as_ref()
    }
}

impl Drop for AdapterInstance {
    fn drop(&mut self) {
        // SAFETY: created by `self.module.create`, destroyed exactly once here
        // while `self.module` still keeps the code mapped.
        unsafe { (self.module.destroy)(self.raw.as_ptr()) };
        debug!(plugin = %self.module.name, "adapter instance destroyed");
    }
}

impl fmt::Debug for AdapterInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterInstance")
            .field("plugin", &self.module.name)
            .field("status", &self.status())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of adapter plugins keyed by canonical name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<PluginModule>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every candidate module in `dir`; returns how many are loaded.
    ///
    /// A candidate that fails to load is logged and skipped. Already-loaded
    /// plugins count as loaded.
    pub fn load_plugins(&mut self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot read plugin directory");
                return 0;
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_plugin_candidate(path))
            .collect();
        candidates.sort();

        let loaded = candidates
            .iter()
            .filter(|path| self.load_plugin(path).is_ok())
            .count();

        info!(dir = %dir.display(), loaded, candidates = candidates.len(), "plugin scan finished");
        loaded
    }

    /// Load one module and register it under its canonical name.
    ///
    /// Loading a name that is already registered succeeds without reopening
    /// the file. A module missing either entry point is released and
    /// rejected.
    pub fn load_plugin(&mut self, path: impl AsRef<Path>) -> Result<String, PluginError> {
        let path = path.as_ref();
        self.open_module(path).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to load plugin");
        })
    }

    fn open_module(&mut self, path: &Path) -> Result<String, PluginError> {
        if !path.exists() {
            return Err(PluginError::NotFound(path.to_path_buf()));
        }
        let name = canonical_plugin_name(path)
            .ok_or_else(|| PluginError::InvalidName(path.to_path_buf()))?;

        if self.plugins.contains_key(&name) {
            debug!(plugin = %name, "plugin already loaded");
            return Ok(name);
        }

        // SAFETY: loading runs the module's initializers; plugin directories
        // are trusted deployment content.
        let library = unsafe { Library::new(path) }.map_err(|source| PluginError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let missing = |symbol| PluginError::MissingSymbol {
            path: path.to_path_buf(),
            symbol,
        };
        // SAFETY: symbol types follow the module ABI documented above. The
        // copied fn pointers live in the same module record as `library`.
        let create: CreateFn = *unsafe { library.get::<CreateFn>(CREATE_SYMBOL.as_bytes()) }
            .map_err(|_| missing(CREATE_SYMBOL))?;
        let destroy: DestroyFn = *unsafe { library.get::<DestroyFn>(DESTROY_SYMBOL.as_bytes()) }
            .map_err(|_| missing(DESTROY_SYMBOL))?;

        let module = PluginModule {
            name: name.clone(),
            create,
            destroy,
            origin: Origin::Library {
                path: path.to_path_buf(),
                _library: library,
            },
        };
        self.plugins.insert(name.clone(), Arc::new(module));

        info!(plugin = %name, path = %path.display(), "plugin loaded");
        Ok(name)
    }

    /// Register a statically linked factory pair.
    pub fn register_builtin(
        &mut self,
        name: impl Into<String>,
        create: CreateFn,
        destroy: DestroyFn,
    ) -> Result<(), PluginError> {
        let name = name.into();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyRegistered(name));
        }
        let module = PluginModule {
            name: name.clone(),
            create,
            destroy,
            origin: Origin::Builtin,
        };
        self.plugins.insert(name.clone(), Arc::new(module));
        info!(plugin = %name, "registered builtin adapter");
        Ok(())
    }

    /// Register a default-constructible adapter type as a builtin.
    pub fn register_builtin_type<A: Adapter + Default + 'static>(
        &mut self,
        name: impl Into<String>,
    ) -> Result<(), PluginError> {
        self.register_builtin(name, create_default::<A>, destroy_boxed)
    }

    /// Create an adapter from the named plugin. `None` if the name is unknown
    /// or the factory fails.
    pub fn create_adapter_instance(&self, name: &str) -> Option<AdapterInstance> {
        let module = self.plugins.get(name)?;
        // SAFETY: `create` was resolved from (or registered with) this module.
        let raw = unsafe { (module.create)() };
        match NonNull::new(raw) {
            Some(raw) => {
                debug!(plugin = %name, "adapter instance created");
                Some(AdapterInstance {
                    raw,
                    module: Arc::clone(module),
                })
            }
            None => {
                warn!(plugin = %name, "adapter factory returned null");
                None
            }
        }
    }

    /// Return an instance to its module's destructor.
    pub fn destroy_adapter_instance(&self, instance: AdapterInstance) {
        drop(instance);
    }

    /// Release a plugin. Returns `false` if it was not loaded.
    ///
    /// Live instances keep the module mapped until they are destroyed.
    pub fn unload_plugin(&mut self, name: &str) -> bool {
        let Some(module) = self.plugins.remove(name) else {
            return false;
        };
        let live = Arc::strong_count(&module) - 1;
        if live > 0 {
            warn!(plugin = %name, live, "unloading plugin with live instances");
        }
        info!(plugin = %name, "plugin unloaded");
        true
    }

    pub fn unload_all_plugins(&mut self) {
        let names: Vec<String> = self.plugins.keys().cloned().collect();
        for name in names {
            self.unload_plugin(&name);
        }
    }

    /// Names of registered plugins, sorted.
    pub fn loaded_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// File a plugin was loaded from; `None` for builtins and unknown names.
    pub fn plugin_path(&self, name: &str) -> Option<&Path> {
        self.plugins.get(name).and_then(|m| m.path())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.unload_all_plugins();
    }
}
