#![no_main]

use libfuzzer_sys::fuzz_target;
use southbound::modbus::constants::FC_READ_HOLDING_REGISTERS;
use southbound::modbus::frame::{
    decode_rtu_frame, decode_tcp_header, parse_bit_response, parse_register_response,
    rtu_response_len,
};

// Response parsing must reject malformed input with an error, never panic.
fuzz_target!(|data: &[u8]| {
    if data.len() >= 7 {
        let mut header = [0u8; 7];
        header.copy_from_slice(&data[..7]);
        if let Ok(mbap) = decode_tcp_header(&header) {
            let _ = mbap.pdu_len();
        }
    }

    let _ = rtu_response_len(data);
    if let Ok(pdu) = decode_rtu_frame(data, 1) {
        let _ = parse_register_response(pdu, FC_READ_HOLDING_REGISTERS);
    }

    let _ = parse_register_response(data, FC_READ_HOLDING_REGISTERS);
    if let Some((&quantity, pdu)) = data.split_first() {
        let _ = parse_bit_response(pdu, 0x01, u16::from(quantity));
    }
});
