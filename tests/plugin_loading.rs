//! Plugin directory scanning and loading against real files.

mod common;

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use southbound::plugin::{canonical_plugin_name, is_plugin_candidate};
use southbound::{PluginError, PluginRegistry, StatusCode};

fn dll(stem: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        stem,
        std::env::consts::DLL_SUFFIX
    )
}

#[test]
fn test_scan_skips_bogus_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(dll("bogus")), b"not a shared object").unwrap();
    fs::write(dir.path().join("README.md"), b"# plugins").unwrap();
    fs::create_dir(dir.path().join(dll("subdir"))).unwrap();

    let mut registry = PluginRegistry::new();
    assert_eq!(registry.load_plugins(dir.path()), 0);
    assert!(registry.is_empty());

    let err = registry
        .load_plugin(dir.path().join(dll("bogus")))
        .unwrap_err();
    assert!(matches!(err, PluginError::Open { .. }), "{err}");
}

#[test]
fn test_scan_missing_directory() {
    let mut registry = PluginRegistry::new();
    assert_eq!(
        registry.load_plugins("/nonexistent/southbound/plugins"),
        0
    );
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = PluginRegistry::new();
    let err = registry
        .load_plugin(dir.path().join(dll("absent")))
        .unwrap_err();
    assert!(matches!(err, PluginError::NotFound(_)));
}

#[test]
fn test_candidate_names() {
    let path = PathBuf::from(format!("/opt/plugins/{}", dll("modbus_adapter")));
    assert!(is_plugin_candidate(&path));
    assert_eq!(canonical_plugin_name(&path).as_deref(), Some("modbus_adapter"));
    assert!(!is_plugin_candidate(&PathBuf::from("/opt/plugins/notes.txt")));
}

#[test]
fn test_builtin_name_collision() {
    let mut registry = PluginRegistry::new();
    registry
        .register_builtin_type::<common::MockAdapter>("mock-adapter")
        .unwrap();
    let err = registry
        .register_builtin_type::<common::MockAdapter>("mock-adapter")
        .unwrap_err();
    assert!(matches!(err, PluginError::AlreadyRegistered(ref name) if name == "mock-adapter"));
}

/// A system shared object that exports neither entry point.
#[cfg(target_os = "linux")]
fn symbolless_library() -> Option<PathBuf> {
    [
        "/lib/x86_64-linux-gnu/libm.so.6",
        "/usr/lib/x86_64-linux-gnu/libm.so.6",
        "/lib/aarch64-linux-gnu/libm.so.6",
        "/usr/lib/aarch64-linux-gnu/libm.so.6",
        "/lib64/libm.so.6",
        "/usr/lib64/libm.so.6",
        "/lib/libm.so.6",
        "/usr/lib/libm.so.6",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|path| path.is_file())
}

#[cfg(target_os = "linux")]
#[test]
fn test_module_without_entry_points_is_rejected() {
    let Some(libm) = symbolless_library() else {
        eprintln!("no glibc libm found, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(dll("nosyms"));
    fs::copy(&libm, &path).unwrap();

    let mut registry = PluginRegistry::new();
    let err = registry.load_plugin(&path).unwrap_err();
    assert!(
        matches!(err, PluginError::MissingSymbol { symbol: "create_adapter", .. }),
        "{err}"
    );
    assert!(!registry.is_plugin_loaded("nosyms"));
    assert!(registry.is_empty());

    // Directory scans skip it the same way.
    assert_eq!(registry.load_plugins(dir.path()), 0);
    assert!(!registry.is_plugin_loaded("nosyms"));
}

/// The `modbus-adapter` module, building it when the workspace build has
/// not produced it yet.
fn modbus_plugin() -> PathBuf {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("target"));
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };

    let built = target.join(profile).join(dll("modbus_adapter"));
    if built.is_file() {
        return built;
    }

    // The running `cargo test` holds the lock on the main target dir.
    let private = target.join("plugin-tests");
    let mut cargo = Command::new(env!("CARGO"));
    cargo
        .current_dir(&root)
        .args(["build", "-p", "modbus-adapter", "--target-dir"])
        .arg(&private);
    if !cfg!(debug_assertions) {
        cargo.arg("--release");
    }
    let status = cargo.status().unwrap();
    assert!(status.success(), "building modbus-adapter failed: {status}");

    let path = private.join(profile).join(dll("modbus_adapter"));
    assert!(path.is_file(), "{} missing after build", path.display());
    path
}

#[test]
fn test_load_built_modbus_plugin() {
    let path = modbus_plugin();
    let dir = tempfile::tempdir().unwrap();
    fs::copy(&path, dir.path().join(dll("modbus_adapter"))).unwrap();

    let mut registry = PluginRegistry::new();
    assert_eq!(registry.load_plugins(dir.path()), 1);
    assert!(registry.is_plugin_loaded("modbus_adapter"));
    // Loading the same name again is not an error.
    assert_eq!(
        registry
            .load_plugin(dir.path().join(dll("modbus_adapter")))
            .unwrap(),
        "modbus_adapter"
    );

    let instance = registry.create_adapter_instance("modbus_adapter").unwrap();
    assert_eq!(instance.plugin_name(), "modbus_adapter");
    assert_eq!(instance.status(), StatusCode::NotInitialized);

    // Instances keep their module mapped after unload.
    assert!(registry.unload_plugin("modbus_adapter"));
    assert_eq!(instance.status(), StatusCode::NotInitialized);
    drop(instance);
    assert!(!registry.unload_plugin("modbus_adapter"));
}
