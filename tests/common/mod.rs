//! Shared fixtures: a `mock-adapter` builtin that runs the Modbus adapter
//! against an in-memory register bank.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use southbound::adapter::{DataHandler, TagValues};
use southbound::modbus::{Connection, ModbusAdapter, ModbusConfig, ModbusDriver};
use southbound::{
    Adapter, AdapterConfig, AdapterResult, DataValue, DeviceDescriptor, DeviceTag, GatewayConfig,
    ModbusError, ModbusResult, Orchestrator, PluginRegistry, StatusCode,
};

pub const MOCK_ADAPTER: &str = "mock-adapter";

/// Content of holding register 100 in every fresh bank.
pub const REGISTER_100: u16 = 1234;

/// Devices configured with this address refuse to connect.
pub const UNREACHABLE: &str = "192.0.2.1";

/// In-memory Modbus slave.
#[derive(Default)]
pub struct MemoryDriver {
    registers: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    refuse: bool,
    connected: bool,
}

impl MemoryDriver {
    pub fn for_config(config: &ModbusConfig) -> Self {
        let refuse = matches!(
            &config.connection,
            Connection::Tcp { ip_address, .. } if ip_address == UNREACHABLE
        );
        let mut driver = Self {
            refuse,
            ..Self::default()
        };
        driver.registers.insert(100, REGISTER_100);
        driver.registers.insert(101, 7);
        driver
    }

    fn ensure_connected(&self) -> ModbusResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ModbusError::connection("not connected"))
        }
    }
}

impl ModbusDriver for MemoryDriver {
    fn connect(&mut self) -> ModbusResult<()> {
        if self.refuse {
            return Err(ModbusError::connection("connection refused"));
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn read_coils(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.ensure_connected()?;
        Ok((address..address + count)
            .map(|a| self.coils.get(&a).copied().unwrap_or(false))
            .collect())
    }

    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_coils(address, count)
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        self.ensure_connected()?;
        Ok((address..address + count)
            .map(|a| self.registers.get(&a).copied().unwrap_or(0))
            .collect())
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        self.read_holding_registers(address, count)
    }

    fn write_single_coil(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        self.ensure_connected()?;
        self.coils.insert(address, value);
        Ok(())
    }

    fn write_single_register(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        self.ensure_connected()?;
        self.registers.insert(address, value);
        Ok(())
    }
}

/// Modbus adapter bound to a [`MemoryDriver`].
pub struct MockAdapter(ModbusAdapter);

impl Default for MockAdapter {
    fn default() -> Self {
        Self(ModbusAdapter::with_connector(|config| {
            Ok(Box::new(MemoryDriver::for_config(config)) as Box<dyn ModbusDriver>)
        }))
    }
}

impl Adapter for MockAdapter {
    fn init(&self, config: &AdapterConfig) -> AdapterResult<()> {
        self.0.init(config)
    }
    fn connect(&self) -> AdapterResult<()> {
        self.0.connect()
    }
    fn disconnect(&self) -> AdapterResult<()> {
        self.0.disconnect()
    }
    fn read(&self, tags: &[DeviceTag]) -> AdapterResult<Vec<DataValue>> {
        self.0.read(tags)
    }
    fn write(&self, values: &TagValues) -> AdapterResult<()> {
        self.0.write(values)
    }
    fn subscribe(&self, tags: &[DeviceTag], handler: Box<dyn DataHandler>) -> AdapterResult<()> {
        self.0.subscribe(tags, handler)
    }
    fn unsubscribe(&self) -> AdapterResult<()> {
        self.0.unsubscribe()
    }
    fn status(&self) -> StatusCode {
        self.0.status()
    }
}

pub fn orchestrator() -> Orchestrator {
    let mut registry = PluginRegistry::new();
    registry
        .register_builtin_type::<MockAdapter>(MOCK_ADAPTER)
        .unwrap();
    Orchestrator::with_registry(registry)
}

pub fn device(name: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(name, MOCK_ADAPTER)
        .with_config("connection_type", "tcp")
        .with_config("ip_address", "127.0.0.1")
        .with_config("poll_interval_ms", "10")
}

pub fn gateway(plugin_dir: &Path, devices: Vec<DeviceDescriptor>) -> GatewayConfig {
    GatewayConfig {
        plugin_dir: plugin_dir.to_path_buf(),
        health_check_interval_ms: 20,
        devices,
        ..GatewayConfig::default()
    }
}

pub fn tag(spec: &str) -> DeviceTag {
    DeviceTag::parse(spec).unwrap()
}
