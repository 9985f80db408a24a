//! # Modbus Adapter
//!
//! Reference implementation of the [`Adapter`] contract for Modbus TCP/RTU.
//!
//! | Function code | Operation | Value |
//! |---------------|-----------|-------|
//! | 1, 2 | read coils / discrete inputs | first bit as `Bool` |
//! | 3, 4 | read holding / input registers | decoded per `data_type` |
//! | 5, 15 | write one coil | `Bool` |
//! | 6, 16 | write one register | low 16 bits of `I32`/`U32` |
//!
//! Function codes 15 and 16 write a single element only.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::adapter::{poll_tags, Adapter, AdapterState, DataHandler, Subscription, TagValues};
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult, ModbusResult, StatusCode};
use crate::tag::DeviceTag;
use crate::value::DataValue;

use super::address::{FunctionCode, TagAddress};
use super::codec::{decode_registers, encode_coil, encode_register};
use super::settings::ModbusConfig;
use super::transport::{ClientDriver, ModbusDriver};

/// Builds the driver for a parsed configuration.
pub type Connector = dyn Fn(&ModbusConfig) -> ModbusResult<Box<dyn ModbusDriver>> + Send + Sync;

#[derive(Default)]
struct Session {
    state: AdapterState,
    config: Option<ModbusConfig>,
    driver: Option<Box<dyn ModbusDriver>>,
}

impl Session {
    fn driver(&mut self) -> AdapterResult<&mut Box<dyn ModbusDriver>> {
        self.state.require_connected()?;
        self.driver.as_mut().ok_or(AdapterError::NotConnected)
    }

    fn read_tag(&mut self, tag: &DeviceTag) -> AdapterResult<DataValue> {
        let addr = TagAddress::for_read(tag)?;
        let driver = self.driver()?;

        match addr.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                let bits = if addr.function == FunctionCode::ReadCoils {
                    driver.read_coils(addr.address, addr.count)?
                } else {
                    driver.read_discrete_inputs(addr.address, addr.count)?
                };
                if bits.len() != addr.count as usize {
                    debug!(tag = %tag, expected = addr.count, got = bits.len(), "short bit read");
                    return Err(AdapterError::Error);
                }
                Ok(DataValue::sampled(bits[0]))
            }
            _ => {
                if (addr.count as usize) < addr.data_type.register_count() {
                    return Err(AdapterError::InvalidParam);
                }
                let registers = if addr.function == FunctionCode::ReadHoldingRegisters {
                    driver.read_holding_registers(addr.address, addr.count)?
                } else {
                    driver.read_input_registers(addr.address, addr.count)?
                };
                if registers.len() != addr.count as usize {
                    debug!(tag = %tag, expected = addr.count, got = registers.len(), "short register read");
                    return Err(AdapterError::Error);
                }
                Ok(DataValue::sampled(decode_registers(&registers, addr.data_type)?))
            }
        }
    }

    fn write_tag(&mut self, tag: &DeviceTag, value: &DataValue) -> AdapterResult<()> {
        let addr = TagAddress::for_write(tag)?;
        let driver = self.driver()?;

        if addr.function.is_bit_access() {
            let on = encode_coil(&value.value)?;
            driver.write_single_coil(addr.address, on)?;
        } else {
            let register = encode_register(&value.value)?;
            driver.write_single_register(addr.address, register)?;
        }
        Ok(())
    }
}

/// Modbus TCP/RTU adapter.
pub struct ModbusAdapter {
    session: Arc<Mutex<Session>>,
    subscription: Subscription,
    connector: Arc<Connector>,
}

impl Default for ModbusAdapter {
    fn default() -> Self {
        Self::with_connector(|config: &ModbusConfig| {
            let driver = ClientDriver::new(config.clone())?;
            Ok(Box::new(driver) as Box<dyn ModbusDriver>)
        })
    }
}

impl ModbusAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom driver factory, e.g. an in-memory driver.
    pub fn with_connector<F>(connector: F) -> Self
    where
        F: Fn(&ModbusConfig) -> ModbusResult<Box<dyn ModbusDriver>> + Send + Sync + 'static,
    {
        Self {
            session: Arc::new(Mutex::new(Session::default())),
            subscription: Subscription::new(),
            connector: Arc::new(connector),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Adapter for ModbusAdapter {
    fn init(&self, config: &AdapterConfig) -> AdapterResult<()> {
        let mut session = self.session();
        if session.state != AdapterState::Uninitialized {
            return Err(AdapterError::AlreadyConnected);
        }

        let parsed = ModbusConfig::from_adapter_config(config)?;
        let driver = (self.connector)(&parsed).map_err(|e| {
            warn!(error = %e, "failed to create modbus driver");
            AdapterError::Error
        })?;

        debug!(connection = ?parsed.connection, slave_id = parsed.slave_id, "modbus adapter initialized");
        session.config = Some(parsed);
        session.driver = Some(driver);
        session.state = AdapterState::Initialized;
        Ok(())
    }

    fn connect(&self) -> AdapterResult<()> {
        let mut session = self.session();
        session.state.require_connectable()?;
        let driver = session.driver.as_mut().ok_or(AdapterError::NotInitialized)?;

        if let Err(e) = driver.connect() {
            warn!(error = %e, "modbus connect failed");
            return Err(AdapterError::Error);
        }
        session.state = AdapterState::Connected;
        info!("modbus device connected");
        Ok(())
    }

    fn disconnect(&self) -> AdapterResult<()> {
        // The poller takes the session lock, so join it before taking ours.
        self.subscription.clear();

        let mut session = self.session();
        if session.state == AdapterState::Connected {
            if let Some(driver) = session.driver.as_mut() {
                driver.close();
            }
            session.state = AdapterState::Disconnected;
            info!("modbus device disconnected");
        }
        Ok(())
    }

    fn read(&self, tags: &[DeviceTag]) -> AdapterResult<Vec<DataValue>> {
        let mut session = self.session();
        session.state.require_connected()?;
        tags.iter().map(|tag| session.read_tag(tag)).collect()
    }

    fn write(&self, values: &TagValues) -> AdapterResult<()> {
        let mut session = self.session();
        session.state.require_connected()?;
        for (tag, value) in values {
            session.write_tag(tag, value)?;
        }
        Ok(())
    }

    fn subscribe(&self, tags: &[DeviceTag], handler: Box<dyn DataHandler>) -> AdapterResult<()> {
        let interval = {
            let session = self.session();
            session.state.require_connected()?;
            session
                .config
                .as_ref()
                .map(|c| c.poll_interval)
                .ok_or(AdapterError::NotInitialized)?
        };

        let session = Arc::clone(&self.session);
        let tags = tags.to_vec();
        self.subscription.replace("modbus-poll", interval, move || {
            let values = {
                let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
                if session.state != AdapterState::Connected {
                    return;
                }
                poll_tags(&tags, |tag| session.read_tag(tag))
            };
            if !values.is_empty() {
                handler.on_data(&values);
            }
        })
    }

    fn unsubscribe(&self) -> AdapterResult<()> {
        self.subscription.clear();
        Ok(())
    }

    fn status(&self) -> StatusCode {
        self.session().state.status()
    }
}

impl Drop for ModbusAdapter {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
