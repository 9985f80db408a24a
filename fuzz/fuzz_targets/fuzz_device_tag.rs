#![no_main]

use libfuzzer_sys::fuzz_target;
use southbound::modbus::TagAddress;
use southbound::DeviceTag;

fuzz_target!(|text: &str| {
    if let Some(tag) = DeviceTag::parse(text) {
        let _ = TagAddress::from_tag(&tag);
        assert_eq!(tag.cmp(&tag), std::cmp::Ordering::Equal);
    }
});
