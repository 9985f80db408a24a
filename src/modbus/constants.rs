//! Modbus protocol constants
//!
//! Limits follow from the 253-byte PDU inherited from the RS485 ADU
//! (256 bytes - slave address - CRC).

// ============================================================================
// Frame sizes
// ============================================================================

/// MBAP header bytes preceding the unit id: transaction(2) + protocol(2) + length(2)
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU size
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (unit id + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Maximum RTU ADU size: slave(1) + PDU + CRC(2)
pub const MAX_RTU_FRAME: usize = 1 + MAX_PDU_SIZE + 2;

// ============================================================================
// Quantity limits
// ============================================================================

/// FC03/FC04: 1 + 1 + 2N <= 253
pub const MAX_READ_REGISTERS: u16 = 125;

/// FC01/FC02
pub const MAX_READ_COILS: u16 = 2000;

// ============================================================================
// Function codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Coil ON value for FC05
pub const COIL_ON: u16 = 0xFF00;
/// Coil OFF value for FC05
pub const COIL_OFF: u16 = 0x0000;
