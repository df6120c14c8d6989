use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use quipu_store::codec::{
    decode_descriptions, encode_descriptions, encode_values, parse_values, values_checksum,
};

fn full_chunk_values() -> Vec<String> {
    (0..8)
        .map(|i| format!(r#"{{"left":"entry {i} with some text","right":"notes, more notes"}}"#))
        .collect()
}

fn full_chunk_descriptions() -> Vec<Option<String>> {
    (0..8)
        .map(|i| if i % 3 == 1 { None } else { Some(format!("17120000{i:05}")) })
        .collect()
}

fn bench_encode_values(c: &mut Criterion) {
    let values = full_chunk_values();
    c.bench_function("values_encode_8_slots", |b| {
        b.iter(|| black_box(encode_values(black_box(&values))))
    });
}

fn bench_parse_values(c: &mut Criterion) {
    let encoded = encode_values(&full_chunk_values()).unwrap();
    c.bench_function("values_parse_8_slots", |b| {
        b.iter(|| black_box(parse_values(black_box(Some(encoded.as_str())), 8)))
    });
}

fn bench_checksum(c: &mut Criterion) {
    let values = full_chunk_values();
    c.bench_function("values_checksum_8_slots", |b| {
        b.iter(|| black_box(values_checksum(black_box(&values))))
    });
}

fn bench_descriptions_roundtrip(c: &mut Criterion) {
    let descriptions = full_chunk_descriptions();
    c.bench_function("descriptions_roundtrip_8_slots", |b| {
        b.iter(|| {
            let encoded = encode_descriptions(black_box(&descriptions));
            black_box(decode_descriptions(Some(&encoded)))
        })
    });
}

criterion_group!(
    benches,
    bench_encode_values,
    bench_parse_values,
    bench_checksum,
    bench_descriptions_roundtrip,
);
criterion_main!(benches);
