//! # Modbus Reference Adapter
//!
//! Modbus TCP and RTU (feature `rtu`) support for the gateway. The adapter is
//! exported as a plugin by the `modbus-adapter` crate and can also be
//! registered as a builtin type.
//!
//! ## Layers
//!
//! - [`address`]: tag attributes to function code, address and count
//! - [`codec`]: registers to typed values and back
//! - [`frame`]: PDU and MBAP/RTU framing
//! - [`transport`]: async request/response over a byte stream, and the
//!   blocking [`ModbusDriver`] the adapter talks to
//! - [`adapter`]: the [`Adapter`](crate::Adapter) implementation

pub mod adapter;
pub mod address;
pub mod codec;
pub mod constants;
pub mod frame;
pub mod settings;
pub mod transport;

pub use adapter::ModbusAdapter;
pub use address::{FunctionCode, TagAddress};
pub use codec::{decode_registers, DataType};
pub use settings::{Connection, ModbusConfig, Parity};
pub use transport::{ClientDriver, ModbusDriver};

/// Type name under which the daemon registers the builtin Modbus adapter.
pub const ADAPTER_TYPE: &str = "modbus";
