//! # Register Codec
//!
//! Conversion between raw 16-bit registers and typed [`Value`]s.
//!
//! ## Supported Data Types
//!
//! | Type | Registers | Aliases | Decoded as |
//! |------|-----------|---------|------------|
//! | int16 | 1 | i16, short | I32, sign-extended |
//! | uint16 | 1 | u16, word | U32, zero-extended |
//! | int32 | 2 | i32, long | I32 |
//! | uint32 | 2 | u32, dword | U32 |
//! | float32 | 2 | f32, float, real | F32 |
//! | raw | 1 | anything else | I32 of the first register |
//!
//! Two-register types are composed high word first:
//! `(registers[0] << 16) | registers[1]`.

use std::fmt;

use crate::error::{ModbusError, ModbusResult};
use crate::value::Value;

/// Declared type of a register tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    /// First register, reinterpreted as signed 16-bit and widened.
    #[default]
    Raw,
}

impl DataType {
    /// Parse a `data_type` attribute. Unknown names fall back to `Raw`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "int16" | "i16" | "short" => DataType::Int16,
            "uint16" | "u16" | "word" => DataType::Uint16,
            "int32" | "i32" | "long" => DataType::Int32,
            "uint32" | "u32" | "dword" => DataType::Uint32,
            "float32" | "f32" | "float" | "real" => DataType::Float32,
            _ => DataType::Raw,
        }
    }

    /// Registers needed to decode one value.
    #[inline]
    pub const fn register_count(self) -> usize {
        match self {
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 2,
            _ => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Raw => "raw",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode registers according to `data_type`.
///
/// Wide types with fewer than two registers fail with `InvalidData` rather
/// than decoding a truncated value.
///
/// # Example
///
/// ```rust
/// use southbound::modbus::{decode_registers, DataType};
/// use southbound::Value;
///
/// let value = decode_registers(&[0x1234, 0x5678], DataType::Uint32).unwrap();
/// assert_eq!(value, Value::U32(0x12345678));
///
/// assert!(decode_registers(&[0x1234], DataType::Float32).is_err());
/// ```
pub fn decode_registers(registers: &[u16], data_type: DataType) -> ModbusResult<Value> {
    if registers.len() < data_type.register_count() {
        return Err(ModbusError::invalid_data(format!(
            "{} needs {} registers, got {}",
            data_type,
            data_type.register_count(),
            registers.len()
        )));
    }

    let value = match data_type {
        DataType::Int16 | DataType::Raw => Value::I32(i32::from(registers[0] as i16)),
        DataType::Uint16 => Value::U32(u32::from(registers[0])),
        DataType::Int32 => Value::I32(regs_to_u32([registers[0], registers[1]]) as i32),
        DataType::Uint32 => Value::U32(regs_to_u32([registers[0], registers[1]])),
        DataType::Float32 => Value::F32(f32::from_bits(regs_to_u32([registers[0], registers[1]]))),
    };
    Ok(value)
}

/// Compose two registers, high word first.
#[inline]
pub fn regs_to_u32(regs: [u16; 2]) -> u32 {
    (u32::from(regs[0]) << 16) | u32::from(regs[1])
}

// ============================================================================
// Encoding
// ============================================================================

/// Value for a single-register write: the low 16 bits of an integer.
pub fn encode_register(value: &Value) -> ModbusResult<u16> {
    match value {
        Value::I32(v) => Ok(*v as u16),
        Value::U32(v) => Ok(*v as u16),
        other => Err(ModbusError::invalid_data(format!(
            "register write needs an integer, got {}",
            other.type_name()
        ))),
    }
}

/// Value for a single-coil write.
pub fn encode_coil(value: &Value) -> ModbusResult<bool> {
    value.as_bool().ok_or_else(|| {
        ModbusError::invalid_data(format!(
            "coil write needs a bool, got {}",
            value.type_name()
        ))
    })
}
