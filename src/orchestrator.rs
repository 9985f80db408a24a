//! # Device Orchestrator
//!
//! Binds configured devices to adapter instances, owns their
//! connect/disconnect lifecycle and forwards read/write/subscribe calls by
//! device name.
//!
//! ```text
//! Uninitialized --initialize--> Initialized --start--> Running --stop--> Stopped
//!                                    ^                                      |
//!                                    +--------------initialize--------------+
//! ```
//!
//! All state transitions and device-map mutations happen under one lock.
//! Foreground calls clone the device's adapter handle under that lock and
//! release it before calling into the adapter, so a slow device never blocks
//! lookups for the others.
//!
//! ```rust,no_run
//! use southbound::{GatewayConfig, Orchestrator};
//!
//! let config = GatewayConfig::load("/etc/southbound/southbound.toml")?;
//! let orchestrator = Orchestrator::new();
//! orchestrator.initialize(&config)?;
//! orchestrator.start()?;
//! println!("{}", orchestrator.status_report());
//! orchestrator.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::adapter::{DataHandler, TagValues};
use crate::config::{DeviceDescriptor, GatewayConfig};
use crate::error::{AdapterError, AdapterResult, OrchestratorError, StatusCode};
use crate::plugin::{AdapterInstance, PluginRegistry};
use crate::tag::DeviceTag;
use crate::value::DataValue;
use crate::worker::Worker;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrchestratorState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

struct DeviceEntry {
    descriptor: DeviceDescriptor,
    adapter: Arc<AdapterInstance>,
}

type DeviceMap = IndexMap<String, DeviceEntry>;

struct Inner {
    state: OrchestratorState,
    registry: PluginRegistry,
    devices: DeviceMap,
    health_interval: Duration,
    health: Option<Worker>,
}

/// Owns every adapter instance and its lifecycle.
pub struct Orchestrator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_registry(PluginRegistry::new())
    }

    /// Start from a registry that may already hold builtin adapters.
    pub fn with_registry(registry: PluginRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: OrchestratorState::Uninitialized,
                registry,
                devices: DeviceMap::new(),
                health_interval: Duration::from_millis(
                    crate::config::DEFAULT_HEALTH_CHECK_INTERVAL_MS,
                ),
                health: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load plugins and create, then `init`, one adapter per device.
    ///
    /// Any failure destroys every instance created by this call. A no-op when
    /// already initialized or running.
    pub fn initialize(&self, config: &GatewayConfig) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        if matches!(
            inner.state,
            OrchestratorState::Initialized | OrchestratorState::Running
        ) {
            debug!("orchestrator already initialized");
            return Ok(());
        }

        config.validate()?;

        let loaded = inner.registry.load_plugins(&config.plugin_dir);
        info!(
            plugin_dir = %config.plugin_dir.display(),
            loaded,
            available = inner.registry.len(),
            "plugins loaded"
        );

        // Dropping `devices` on an early return destroys what was created.
        let mut devices = DeviceMap::with_capacity(config.devices.len());
        for descriptor in &config.devices {
            let adapter = inner
                .registry
                .create_adapter_instance(&descriptor.adapter_type)
                .ok_or_else(|| {
                    error!(
                        device = %descriptor.name,
                        adapter_type = %descriptor.adapter_type,
                        "no plugin provides adapter type"
                    );
                    OrchestratorError::UnknownAdapterType {
                        device: descriptor.name.clone(),
                        adapter_type: descriptor.adapter_type.clone(),
                    }
                })?;

            if let Err(e) = adapter.init(&descriptor.config) {
                let status = StatusCode::from(e);
                error!(device = %descriptor.name, %status, "adapter init failed");
                return Err(OrchestratorError::AdapterInit {
                    device: descriptor.name.clone(),
                    status,
                });
            }

            debug!(device = %descriptor.name, plugin = %adapter.plugin_name(), "device registered");
            devices.insert(
                descriptor.name.clone(),
                DeviceEntry {
                    descriptor: descriptor.clone(),
                    adapter: Arc::new(adapter),
                },
            );
        }

        inner.devices = devices;
        inner.health_interval = Duration::from_millis(config.health_check_interval_ms.max(1));
        inner.state = OrchestratorState::Initialized;
        info!(devices = inner.devices.len(), "orchestrator initialized");
        Ok(())
    }

    /// Connect every device in configuration order, then start the health
    /// check loop.
    ///
    /// The first connect failure aborts start; devices connected before it
    /// stay connected.
    pub fn start(&self) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        match inner.state {
            OrchestratorState::Initialized => {}
            OrchestratorState::Running => return Ok(()),
            _ => return Err(OrchestratorError::NotInitialized),
        }

        for (name, entry) in &inner.devices {
            if let Err(e) = entry.adapter.connect() {
                let status = StatusCode::from(e);
                error!(device = %name, %status, "device connect failed");
                return Err(OrchestratorError::Connect {
                    device: name.clone(),
                    status,
                });
            }
            info!(device = %name, "device connected");
        }

        let shared = Arc::downgrade(&self.inner);
        let worker = Worker::spawn("southbound-health", inner.health_interval, move || {
            health_check(&shared)
        })?;
        inner.health = Some(worker);
        inner.state = OrchestratorState::Running;
        info!(devices = inner.devices.len(), "orchestrator running");
        Ok(())
    }

    /// Join the health loop, then disconnect and destroy every device.
    ///
    /// A no-op unless running.
    pub fn stop(&self) {
        let (health, devices) = {
            let mut inner = self.lock();
            if inner.state != OrchestratorState::Running {
                debug!(state = ?inner.state, "stop ignored, not running");
                return;
            }
            inner.state = OrchestratorState::Stopped;
            (inner.health.take(), std::mem::take(&mut inner.devices))
        };

        if let Some(mut worker) = health {
            worker.stop();
        }
        teardown(devices);
        info!("orchestrator stopped");
    }

    pub fn state(&self) -> OrchestratorState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == OrchestratorState::Running
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state(),
            OrchestratorState::Initialized | OrchestratorState::Running
        )
    }

    // ========================================================================
    // Device API
    // ========================================================================

    fn adapter(&self, device: &str) -> AdapterResult<Arc<AdapterInstance>> {
        self.lock()
            .devices
            .get(device)
            .map(|entry| Arc::clone(&entry.adapter))
            .ok_or_else(|| {
                debug!(device, "unknown device");
                AdapterError::NotConnected
            })
    }

    pub fn read_device_data(&self, device: &str, tags: &[DeviceTag]) -> AdapterResult<Vec<DataValue>> {
        self.adapter(device)?.read(tags)
    }

    pub fn write_device_data(&self, device: &str, values: &TagValues) -> AdapterResult<()> {
        self.adapter(device)?.write(values)
    }

    /// Subscribe to `tags`; `handler` runs on the device's polling thread.
    pub fn subscribe_device_data<H>(&self, device: &str, tags: &[DeviceTag], handler: H) -> AdapterResult<()>
    where
        H: DataHandler,
    {
        self.adapter(device)?.subscribe(tags, Box::new(handler))
    }

    pub fn unsubscribe_device_data(&self, device: &str) -> AdapterResult<()> {
        self.adapter(device)?.unsubscribe()
    }

    /// Adapter status, or `NotConnected` for unknown devices.
    pub fn device_status(&self, device: &str) -> StatusCode {
        match self.adapter(device) {
            Ok(adapter) => adapter.status(),
            Err(e) => e.into(),
        }
    }

    /// Registered device names in configuration order.
    pub fn device_names(&self) -> Vec<String> {
        self.lock().devices.keys().cloned().collect()
    }

    /// Tags configured for a device.
    pub fn device_tags(&self, device: &str) -> Option<Vec<DeviceTag>> {
        self.lock()
            .devices
            .get(device)
            .map(|entry| entry.descriptor.tags.clone())
    }

    pub fn loaded_plugins(&self) -> Vec<String> {
        self.lock().registry.loaded_plugins()
    }

    pub fn status_report(&self) -> ServiceStatus {
        let inner = self.lock();
        ServiceStatus {
            running: inner.state == OrchestratorState::Running,
            initialized: matches!(
                inner.state,
                OrchestratorState::Initialized | OrchestratorState::Running
            ),
            loaded_plugins: inner.registry.len(),
            devices: inner.devices.len(),
        }
    }

    /// Multi-line status string, see [`ServiceStatus`].
    pub fn service_status(&self) -> String {
        self.status_report().to_string()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
        let devices = std::mem::take(&mut self.lock().devices);
        teardown(devices);
        // Instances are gone; modules can be released.
        self.lock().registry.unload_all_plugins();
    }
}

fn health_check(shared: &Weak<Mutex<Inner>>) {
    let Some(inner) = shared.upgrade() else {
        return;
    };
    let adapters: Vec<(String, Arc<AdapterInstance>)> = {
        let inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .devices
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.adapter)))
            .collect()
    };

    for (device, adapter) in adapters {
        let status = adapter.status();
        if !status.is_ok() {
            warn!(%device, %status, "device health check failed");
        }
    }
}

/// Best-effort disconnect of every device, then destroy the instances.
fn teardown(devices: DeviceMap) {
    for (name, entry) in devices {
        if let Err(e) = entry.adapter.disconnect() {
            warn!(device = %name, error = %e, "disconnect failed");
        }
        if Arc::strong_count(&entry.adapter) > 1 {
            debug!(device = %name, "adapter still in use, destroyed after last call returns");
        }
        drop(entry);
        debug!(device = %name, "device removed");
    }
}

// ============================================================================
// Status report
// ============================================================================

/// Snapshot of the orchestrator for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub initialized: bool,
    pub loaded_plugins: usize,
    pub devices: usize,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        writeln!(f, "Service Status:")?;
        writeln!(f, "  Running: {}", yes_no(self.running))?;
        writeln!(f, "  Initialized: {}", yes_no(self.initialized))?;
        writeln!(f, "  Loaded Plugins: {}", self.loaded_plugins)?;
        writeln!(f, "  Connected Devices: {}", self.devices)
    }
}
