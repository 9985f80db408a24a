//! # Modbus Framing
//!
//! Request PDU construction, response PDU parsing, and the two transport
//! envelopes:
//!
//! ```text
//! TCP:  | transaction(2) | protocol=0(2) | length(2) | unit(1) | PDU |
//! RTU:  | slave(1) | PDU | CRC-16/MODBUS (2, little-endian) |
//! ```

use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_16_MODBUS};
use tracing::trace;

use crate::error::{ModbusError, ModbusResult};

use super::constants::*;

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

// ============================================================================
// Request PDUs
// ============================================================================

/// FC01-FC04: function, start address, quantity.
pub fn build_read_pdu(function: u8, address: u16, quantity: u16) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(5);
    pdu.put_u8(function);
    pdu.put_u16(address);
    pdu.put_u16(quantity);
    pdu
}

/// FC05 with the standard ON/OFF encoding.
pub fn build_write_single_coil_pdu(address: u16, value: bool) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(5);
    pdu.put_u8(FC_WRITE_SINGLE_COIL);
    pdu.put_u16(address);
    pdu.put_u16(if value { COIL_ON } else { COIL_OFF });
    pdu
}

/// FC06.
pub fn build_write_single_register_pdu(address: u16, value: u16) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(5);
    pdu.put_u8(FC_WRITE_SINGLE_REGISTER);
    pdu.put_u16(address);
    pdu.put_u16(value);
    pdu
}

// ============================================================================
// Response PDUs
// ============================================================================

/// Fail on an exception response or an unexpected function code.
fn check_function(pdu: &[u8], function: u8) -> ModbusResult<()> {
    let Some(&code) = pdu.first() else {
        return Err(ModbusError::protocol("empty response PDU"));
    };
    if code == function | EXCEPTION_FLAG {
        let exception = pdu.get(1).copied().unwrap_or(0);
        return Err(ModbusError::Exception {
            function,
            code: exception,
        });
    }
    if code != function {
        return Err(ModbusError::protocol(format!(
            "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
            function, code
        )));
    }
    Ok(())
}

/// Payload of a read response after validating the byte count.
fn read_payload(pdu: &[u8], function: u8) -> ModbusResult<&[u8]> {
    check_function(pdu, function)?;
    let byte_count = *pdu
        .get(1)
        .ok_or_else(|| ModbusError::protocol("response missing byte count"))? as usize;
    let payload = &pdu[2..];
    if payload.len() != byte_count {
        return Err(ModbusError::protocol(format!(
            "byte count {} does not match payload length {}",
            byte_count,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Registers of an FC03/FC04 response.
pub fn parse_register_response(pdu: &[u8], function: u8) -> ModbusResult<Vec<u16>> {
    let payload = read_payload(pdu, function)?;
    if payload.len() % 2 != 0 {
        return Err(ModbusError::protocol("odd register payload length"));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Bits of an FC01/FC02 response, LSB of the first byte first, truncated to
/// `quantity`.
pub fn parse_bit_response(pdu: &[u8], function: u8, quantity: u16) -> ModbusResult<Vec<bool>> {
    let payload = read_payload(pdu, function)?;
    let expected = (quantity as usize).div_ceil(8);
    if payload.len() != expected {
        return Err(ModbusError::protocol(format!(
            "expected {} bytes for {} bits, got {}",
            expected,
            quantity,
            payload.len()
        )));
    }
    Ok((0..quantity as usize)
        .map(|i| payload[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

/// FC05/FC06 responses echo the request.
pub fn check_write_echo(pdu: &[u8], request: &[u8]) -> ModbusResult<()> {
    let function = request
        .first()
        .copied()
        .ok_or_else(|| ModbusError::protocol("empty request PDU"))?;
    check_function(pdu, function)?;
    if pdu != request {
        return Err(ModbusError::protocol("write response does not echo request"));
    }
    Ok(())
}

// ============================================================================
// TCP envelope
// ============================================================================

/// Decoded MBAP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id plus PDU length
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Bytes following the header (PDU only).
    #[inline]
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }
}

/// Wrap a PDU into an MBAP frame.
pub fn encode_tcp_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.put_u16(transaction_id);
    frame.put_u16(0);
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(unit_id);
    frame.put_slice(pdu);
    frame
}

/// Parse and validate the 7-byte MBAP header of a response.
pub fn decode_tcp_header(header: &[u8; MBAP_HEADER_LEN + 1]) -> ModbusResult<MbapHeader> {
    let parsed = MbapHeader {
        transaction_id: u16::from_be_bytes([header[0], header[1]]),
        protocol_id: u16::from_be_bytes([header[2], header[3]]),
        length: u16::from_be_bytes([header[4], header[5]]),
        unit_id: header[6],
    };
    if parsed.protocol_id != 0 {
        return Err(ModbusError::protocol(format!(
            "invalid protocol id {}",
            parsed.protocol_id
        )));
    }
    if parsed.length < 2 || parsed.length as usize > MAX_MBAP_LENGTH {
        return Err(ModbusError::protocol(format!(
            "invalid MBAP length {}",
            parsed.length
        )));
    }
    trace!(?parsed, "MBAP header");
    Ok(parsed)
}

// ============================================================================
// RTU envelope
// ============================================================================

/// CRC-16/MODBUS of `data`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Wrap a PDU into an RTU frame.
pub fn encode_rtu_frame(slave_id: u8, pdu: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(1 + pdu.len() + 2);
    frame.put_u8(slave_id);
    frame.put_slice(pdu);
    let crc = crc16(&frame);
    frame.put_u16_le(crc);
    frame
}

/// Total RTU response length, given at least the first three bytes
/// (slave, function, byte count or address high).
pub fn rtu_response_len(prefix: &[u8]) -> ModbusResult<usize> {
    if prefix.len() < 3 {
        return Err(ModbusError::protocol("RTU prefix too short"));
    }
    let function = prefix[1];
    let len = if function & EXCEPTION_FLAG != 0 {
        5
    } else {
        match function {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS | FC_READ_HOLDING_REGISTERS
            | FC_READ_INPUT_REGISTERS => 3 + prefix[2] as usize + 2,
            FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS => 8,
            other => {
                return Err(ModbusError::protocol(format!(
                    "unsupported function code 0x{:02X} in RTU response",
                    other
                )))
            }
        }
    };
    if len > MAX_RTU_FRAME {
        return Err(ModbusError::protocol(format!("RTU frame too long: {}", len)));
    }
    Ok(len)
}

/// Validate CRC and slave id of an RTU frame, returning its PDU.
pub fn decode_rtu_frame(frame: &[u8], slave_id: u8) -> ModbusResult<&[u8]> {
    if frame.len() < 4 {
        return Err(ModbusError::protocol("RTU frame too short"));
    }
    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed = crc16(body);
    if received != computed {
        return Err(ModbusError::protocol(format!(
            "CRC mismatch: received 0x{:04X}, computed 0x{:04X}",
            received, computed
        )));
    }
    if body[0] != slave_id {
        return Err(ModbusError::protocol(format!(
            "slave id mismatch: expected {}, got {}",
            slave_id, body[0]
        )));
    }
    Ok(&body[1..])
}
