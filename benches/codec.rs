//! Hot paths of a polling cycle: tag resolution, register decoding, frame
//! handling and keying results by tag.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use southbound::modbus::frame::{crc16, decode_rtu_frame, encode_rtu_frame};
use southbound::modbus::{decode_registers, DataType, TagAddress};
use southbound::{DataValue, DeviceTag, TagValues};

fn tags(count: usize) -> Vec<DeviceTag> {
    (0..count)
        .map(|i| {
            DeviceTag::new()
                .with("register_address", (i * 2).to_string())
                .with("register_count", "2")
                .with("data_type", "float32")
        })
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_registers");
    let registers = [0x41C8u16, 0x0000];
    for data_type in [DataType::Uint16, DataType::Int32, DataType::Float32] {
        group.bench_function(data_type.as_str(), |b| {
            b.iter(|| decode_registers(black_box(&registers), black_box(data_type)))
        });
    }
    group.finish();
}

fn bench_tag_address(c: &mut Criterion) {
    let tag = DeviceTag::parse("register_address:100,function_code:3,data_type:uint16").unwrap();
    c.bench_function("tag_address_from_tag", |b| {
        b.iter(|| TagAddress::from_tag(black_box(&tag)))
    });
    c.bench_function("tag_parse", |b| {
        b.iter(|| DeviceTag::parse(black_box("register_address:100,function_code:3,data_type:uint16")))
    });
}

fn bench_rtu_frame(c: &mut Criterion) {
    let pdu = [0x03u8, 0x02, 0x12, 0x34];
    let frame = encode_rtu_frame(1, &pdu);

    c.bench_function("crc16_256", |b| {
        let data = [0xA5u8; 256];
        b.iter(|| crc16(black_box(&data)))
    });
    c.bench_function("rtu_decode", |b| {
        b.iter(|| decode_rtu_frame(black_box(&frame), 1).map(|pdu| pdu.len()))
    });
}

fn bench_tag_values(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_values");
    for size in [10usize, 100, 1000] {
        let tags = tags(size);
        group.bench_function(format!("insert_{}", size), |b| {
            b.iter_batched(
                || tags.clone(),
                |tags| {
                    let mut values = TagValues::new();
                    for tag in tags {
                        values.insert(tag, DataValue::sampled(1.0f32));
                    }
                    values
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_tag_address,
    bench_rtu_frame,
    bench_tag_values
);
criterion_main!(benches);
