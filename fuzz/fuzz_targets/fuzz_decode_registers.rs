#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use southbound::modbus::{decode_registers, DataType};

#[derive(Debug, Arbitrary)]
struct Input {
    registers: Vec<u16>,
    data_type: String,
}

fuzz_target!(|input: Input| {
    let data_type = DataType::parse(&input.data_type);
    let result = decode_registers(&input.registers, data_type);
    if input.registers.len() >= data_type.register_count() {
        assert!(result.is_ok());
    } else {
        assert!(result.is_err());
    }
});
