//! # Error Types
//!
//! Status codes and error types shared by adapters, the plugin registry and
//! the device orchestrator.
//!
//! Adapter operations report one of the flat [`StatusCode`] values. Inside
//! Rust they are carried as `Result<T, AdapterError>` so `?` works; the two
//! convert losslessly into each other.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Status codes
// ============================================================================

/// Flat status taxonomy reported by every adapter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    /// Generic transport or decode failure
    Error,
    Timeout,
    BadConfig,
    NotConnected,
    AlreadyConnected,
    NotInitialized,
    /// Malformed tag addressing or type-size mismatch
    InvalidParam,
    /// Unrecognized function code or operation
    NotSupported,
}

impl StatusCode {
    /// Numeric code in declaration order, `Ok` = 0.
    pub const fn code(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Error => 1,
            StatusCode::Timeout => 2,
            StatusCode::BadConfig => 3,
            StatusCode::NotConnected => 4,
            StatusCode::AlreadyConnected => 5,
            StatusCode::NotInitialized => 6,
            StatusCode::InvalidParam => 7,
            StatusCode::NotSupported => 8,
        }
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Collapse an adapter result into its status code.
    pub fn from_result<T>(result: &AdapterResult<T>) -> Self {
        match result {
            Ok(_) => StatusCode::Ok,
            Err(e) => (*e).into(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
            StatusCode::Timeout => "TIMEOUT",
            StatusCode::BadConfig => "BAD_CONFIG",
            StatusCode::NotConnected => "NOT_CONNECTED",
            StatusCode::AlreadyConnected => "ALREADY_CONNECTED",
            StatusCode::NotInitialized => "NOT_INITIALIZED",
            StatusCode::InvalidParam => "INVALID_PARAM",
            StatusCode::NotSupported => "NOT_SUPPORTED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Adapter errors
// ============================================================================

/// Failure codes of the adapter contract.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterError {
    #[error("transport or decode failure")]
    Error,

    #[error("operation timed out")]
    Timeout,

    #[error("missing or invalid configuration")]
    BadConfig,

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("not initialized")]
    NotInitialized,

    #[error("invalid parameter")]
    InvalidParam,

    #[error("operation not supported")]
    NotSupported,
}

/// Result type for adapter contract operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<AdapterError> for StatusCode {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Error => StatusCode::Error,
            AdapterError::Timeout => StatusCode::Timeout,
            AdapterError::BadConfig => StatusCode::BadConfig,
            AdapterError::NotConnected => StatusCode::NotConnected,
            AdapterError::AlreadyConnected => StatusCode::AlreadyConnected,
            AdapterError::NotInitialized => StatusCode::NotInitialized,
            AdapterError::InvalidParam => StatusCode::InvalidParam,
            AdapterError::NotSupported => StatusCode::NotSupported,
        }
    }
}

// ============================================================================
// Modbus transport errors
// ============================================================================

/// Errors raised by the reference Modbus transport and frame codec.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("exception response: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    #[error("invalid data: {message}")]
    InvalidData { message: String },

    #[error("connection error: {message}")]
    Connection { message: String },
}

/// Result type for Modbus transport operations.
pub type ModbusResult<T> = Result<T, ModbusError>;

impl ModbusError {
    pub fn protocol(message: impl Into<String>) -> Self {
        ModbusError::Protocol {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        ModbusError::InvalidData {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        ModbusError::Connection {
            message: message.into(),
        }
    }
}

impl From<ModbusError> for AdapterError {
    fn from(err: ModbusError) -> Self {
        match err {
            ModbusError::Timeout { .. } => AdapterError::Timeout,
            ModbusError::InvalidData { .. } => AdapterError::InvalidParam,
            _ => AdapterError::Error,
        }
    }
}

// ============================================================================
// Plugin registry errors
// ============================================================================

/// Reasons a plugin candidate was not registered.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot derive a plugin name from {}", .0.display())]
    InvalidName(PathBuf),

    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{} does not export `{symbol}`", .path.display())]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("plugin `{0}` is already registered")]
    AlreadyRegistered(String),
}

// ============================================================================
// Configuration errors
// ============================================================================

/// Configuration validation and loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("plugin directory must not be empty")]
    EmptyPluginDir,

    #[error("device #{index} has an empty name")]
    EmptyDeviceName { index: usize },

    #[error("device `{0}` is declared more than once")]
    DuplicateDevice(String),

    #[error("device `{0}` has no adapter type")]
    MissingAdapterType(String),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Orchestrator errors
// ============================================================================

/// Lifecycle failures of the device orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("device `{device}`: no plugin provides adapter type `{adapter_type}`")]
    UnknownAdapterType {
        device: String,
        adapter_type: String,
    },

    #[error("device `{device}`: init failed with {status}")]
    AdapterInit { device: String, status: StatusCode },

    #[error("orchestrator is not initialized")]
    NotInitialized,

    #[error("device `{device}`: connect failed with {status}")]
    Connect { device: String, status: StatusCode },

    #[error("failed to spawn health check thread: {0}")]
    Spawn(#[from] std::io::Error),
}
