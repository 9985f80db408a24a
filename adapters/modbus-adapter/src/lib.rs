//! Loadable Modbus adapter module.
//!
//! Builds `libmodbus_adapter.so`, registered by the gateway under the
//! canonical plugin name `modbus_adapter`.
//!
//! The module carries its own `tracing` dispatcher; adapter log events are
//! not forwarded to the host's subscriber.

southbound::export_adapter!(southbound::modbus::ModbusAdapter);
