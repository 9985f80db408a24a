//! Adapter configuration keys for the Modbus adapter.
//!
//! | Key | Applies to | Default |
//! |-----|-----------|---------|
//! | `connection_type` | all | required, `tcp` or `rtu` |
//! | `ip_address` | tcp | required |
//! | `port` | tcp | 502 |
//! | `device_path` | rtu | required |
//! | `baudrate` | rtu | 9600 |
//! | `parity` | rtu | `N` |
//! | `data_bits` | rtu | 8 |
//! | `stop_bits` | rtu | 1 |
//! | `slave_id` | all | 1 |
//! | `timeout_ms` | all | 1000 |
//! | `poll_interval_ms` | all | 1000 |

use std::str::FromStr;
use std::time::Duration;

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};

pub const DEFAULT_TCP_PORT: u16 = 502;
pub const DEFAULT_SLAVE_ID: u8 = 1;
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "N" | "n" => Some(Parity::None),
            "E" | "e" => Some(Parity::Even),
            "O" | "o" => Some(Parity::Odd),
            _ => None,
        }
    }
}

/// Physical connection of a Modbus device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Tcp {
        ip_address: String,
        port: u16,
    },
    Rtu {
        device_path: String,
        baudrate: u32,
        parity: Parity,
        data_bits: u8,
        stop_bits: u8,
    },
}

/// Parsed adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusConfig {
    pub connection: Connection,
    pub slave_id: u8,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

fn required<'a>(config: &'a AdapterConfig, key: &str) -> AdapterResult<&'a str> {
    match config.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => {
            tracing::warn!(key, "missing required modbus setting");
            Err(AdapterError::BadConfig)
        }
    }
}

fn optional<T: FromStr>(config: &AdapterConfig, key: &str, default: T) -> AdapterResult<T> {
    match config.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            tracing::warn!(key, value = %raw, "invalid modbus setting");
            AdapterError::BadConfig
        }),
    }
}

impl ModbusConfig {
    pub fn from_adapter_config(config: &AdapterConfig) -> AdapterResult<Self> {
        let connection = match required(config, "connection_type")? {
            "tcp" => Connection::Tcp {
                ip_address: required(config, "ip_address")?.to_string(),
                port: optional(config, "port", DEFAULT_TCP_PORT)?,
            },
            "rtu" => {
                let parity = match config.get("parity") {
                    None => Parity::None,
                    Some(raw) => Parity::parse(raw).ok_or(AdapterError::BadConfig)?,
                };
                let data_bits = optional(config, "data_bits", 8u8)?;
                let stop_bits = optional(config, "stop_bits", 1u8)?;
                if !(5..=8).contains(&data_bits) || !(1..=2).contains(&stop_bits) {
                    return Err(AdapterError::BadConfig);
                }
                Connection::Rtu {
                    device_path: required(config, "device_path")?.to_string(),
                    baudrate: optional(config, "baudrate", DEFAULT_BAUDRATE)?,
                    parity,
                    data_bits,
                    stop_bits,
                }
            }
            other => {
                tracing::warn!(connection_type = other, "unknown connection type");
                return Err(AdapterError::BadConfig);
            }
        };

        Ok(Self {
            connection,
            slave_id: optional(config, "slave_id", DEFAULT_SLAVE_ID)?,
            timeout: Duration::from_millis(optional(config, "timeout_ms", DEFAULT_TIMEOUT_MS)?),
            poll_interval: Duration::from_millis(
                optional(config, "poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)?.max(1),
            ),
        })
    }
}
