//! Tag addressing for the Modbus adapter.
//!
//! | Attribute | Required | Default |
//! |-----------|----------|---------|
//! | `register_address` | yes | |
//! | `register_count` | no | 1 |
//! | `function_code` | no | 3 |
//! | `data_type` | no | raw |

use std::str::FromStr;

use crate::error::{AdapterError, AdapterResult};
use crate::tag::DeviceTag;

use super::codec::DataType;
use super::constants::*;

pub const ATTR_ADDRESS: &str = "register_address";
pub const ATTR_COUNT: &str = "register_count";
pub const ATTR_FUNCTION: &str = "function_code";
pub const ATTR_DATA_TYPE: &str = "data_type";

/// Modbus function codes understood by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    /// Narrowed to a single-coil write.
    WriteMultipleCoils,
    /// Narrowed to a single-register write.
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            FC_READ_COILS => Some(FunctionCode::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Some(FunctionCode::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Some(FunctionCode::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Some(FunctionCode::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Some(FunctionCode::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Some(FunctionCode::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Some(FunctionCode::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => FC_READ_COILS,
            FunctionCode::ReadDiscreteInputs => FC_READ_DISCRETE_INPUTS,
            FunctionCode::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            FunctionCode::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            FunctionCode::WriteSingleCoil => FC_WRITE_SINGLE_COIL,
            FunctionCode::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
            FunctionCode::WriteMultipleCoils => FC_WRITE_MULTIPLE_COILS,
            FunctionCode::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    pub const fn is_read(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
        )
    }

    /// Coil and discrete-input codes, as opposed to register codes.
    pub const fn is_bit_access(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::WriteSingleCoil
                | FunctionCode::WriteMultipleCoils
        )
    }
}

/// Resolved addressing of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAddress {
    pub address: u16,
    pub count: u16,
    pub function: FunctionCode,
    pub data_type: DataType,
}

fn parse_attr<T: FromStr>(tag: &DeviceTag, key: &str) -> AdapterResult<Option<T>> {
    match tag.attribute(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AdapterError::InvalidParam),
    }
}

impl TagAddress {
    /// Resolve a tag's attributes.
    ///
    /// Missing or non-numeric address, non-numeric count or function code,
    /// and counts outside the protocol limits are `InvalidParam`; an unknown
    /// function code is `NotSupported`.
    pub fn from_tag(tag: &DeviceTag) -> AdapterResult<Self> {
        let address = parse_attr::<u16>(tag, ATTR_ADDRESS)?.ok_or(AdapterError::InvalidParam)?;
        let count = parse_attr::<u16>(tag, ATTR_COUNT)?.unwrap_or(1);
        let code = parse_attr::<u8>(tag, ATTR_FUNCTION)?.unwrap_or(FC_READ_HOLDING_REGISTERS);
        let function = FunctionCode::from_u8(code).ok_or(AdapterError::NotSupported)?;
        let data_type = tag
            .attribute(ATTR_DATA_TYPE)
            .map(DataType::parse)
            .unwrap_or_default();

        let limit = if function.is_bit_access() {
            MAX_READ_COILS
        } else {
            MAX_READ_REGISTERS
        };
        if count == 0 || count > limit {
            return Err(AdapterError::InvalidParam);
        }

        Ok(Self {
            address,
            count,
            function,
            data_type,
        })
    }

    /// Resolve a tag used with `read`.
    pub fn for_read(tag: &DeviceTag) -> AdapterResult<Self> {
        let addr = Self::from_tag(tag)?;
        if !addr.function.is_read() {
            return Err(AdapterError::NotSupported);
        }
        Ok(addr)
    }

    /// Resolve a tag used with `write`.
    pub fn for_write(tag: &DeviceTag) -> AdapterResult<Self> {
        let addr = Self::from_tag(tag)?;
        if addr.function.is_read() {
            return Err(AdapterError::NotSupported);
        }
        Ok(addr)
    }
}
