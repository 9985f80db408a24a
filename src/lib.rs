//! # Southbound - Industrial Device Gateway
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! The device-facing half of an industrial gateway: field devices are
//! described in configuration, bound to protocol adapters that are loaded as
//! plugins at runtime, and driven through one orchestrator that owns their
//! connection lifecycle and health monitoring.
//!
//! ## Features
//!
//! - **Uniform data model**: attribute-set tags and timestamped values with
//!   quality, independent of the field protocol
//! - **Adapter contract**: one state machine for every protocol
//!   (init, connect, read/write, subscribe, disconnect)
//! - **Runtime plugins**: adapters loaded from shared libraries exporting
//!   `create_adapter` / `destroy_adapter`, or registered as builtins
//! - **Orchestration**: per-device routing, ordered connect, background
//!   health checks
//! - **Modbus reference adapter**: TCP and RTU (feature `rtu`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use southbound::modbus::{ModbusAdapter, ADAPTER_TYPE};
//! use southbound::{DeviceDescriptor, DeviceTag, GatewayConfig, Orchestrator, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register_builtin_type::<ModbusAdapter>(ADAPTER_TYPE)?;
//!
//! let tag = DeviceTag::parse("register_address:100,data_type:uint16").unwrap();
//! let mut config = GatewayConfig::default();
//! config.devices.push(
//!     DeviceDescriptor::new("pump1", ADAPTER_TYPE)
//!         .with_config("connection_type", "tcp")
//!         .with_config("ip_address", "192.168.1.10")
//!         .with_tag(tag.clone()),
//! );
//!
//! let orchestrator = Orchestrator::with_registry(registry);
//! orchestrator.initialize(&config)?;
//! orchestrator.start()?;
//! let values = orchestrator.read_device_data("pump1", &[tag]);
//! println!("{:?}", values);
//! orchestrator.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Status codes and error types
pub mod error;

/// Device tags
pub mod tag;

/// Values, quality and timestamps
pub mod value;

/// Gateway and device configuration
pub mod config;

/// Logging setup
pub mod logging;

// ============================================================================
// Runtime
// ============================================================================

/// Periodic background threads
pub mod worker;

/// Adapter contract
pub mod adapter;

/// Dynamic adapter loading
pub mod plugin;

/// Device orchestration
pub mod orchestrator;

// ============================================================================
// Protocol adapters
// ============================================================================

/// Modbus TCP/RTU reference adapter
pub mod modbus;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Data model ===
pub use tag::DeviceTag;
pub use value::{DataValue, Quality, Value};

// === Adapter contract ===
pub use adapter::{Adapter, AdapterState, ChannelHandler, DataHandler, Subscription, TagValues};

// === Error handling ===
pub use error::{
    AdapterError, AdapterResult, ConfigError, ModbusError, ModbusResult, OrchestratorError,
    PluginError, StatusCode,
};

// === Configuration ===
pub use config::{AdapterConfig, DeviceDescriptor, GatewayConfig};

// === Runtime ===
pub use orchestrator::{Orchestrator, OrchestratorState, ServiceStatus};
pub use plugin::{AdapterInstance, PluginRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
