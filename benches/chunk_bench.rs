use apack::chunk::{decode_chunk, encode_chunk, DecodeOptions, EncodeOptions};
use apack::providers::checksum::Xxh3_64Provider;
use apack::providers::compression::ZstdProvider;
use apack::providers::encryption::Aes256GcmProvider;
use apack::SecurityLimits;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_chunk_pipeline(c: &mut Criterion) {
    let checksum = Xxh3_64Provider;
    let compression = ZstdProvider;
    let encryption = Aes256GcmProvider;
    let key = [0u8; 32];
    let data = vec![0x5au8; 1024 * 1024];
    let limits = SecurityLimits::default();

    c.bench_function("encode_chunk_zstd3_aesgcm_1mb", |b| {
        b.iter(|| {
            let opts = EncodeOptions {
                chunk_index: 0,
                is_last: true,
                checksum: &checksum,
                compression: Some((&compression, 3)),
                encryption: Some((&encryption, &key)),
            };
            encode_chunk(black_box(&data), &opts).unwrap()
        })
    });

    let opts = EncodeOptions {
        chunk_index: 0,
        is_last: true,
        checksum: &checksum,
        compression: Some((&compression, 3)),
        encryption: Some((&encryption, &key)),
    };
    let (header, body) = encode_chunk(&data, &opts).unwrap();

    c.bench_function("decode_chunk_zstd3_aesgcm_1mb", |b| {
        b.iter(|| {
            let decode_opts = DecodeOptions {
                checksum: &checksum,
                compression: Some(&compression),
                encryption: Some((&encryption, &key)),
                limits: &limits,
            };
            decode_chunk(&header, black_box(&body), &decode_opts).unwrap()
        })
    });
}

criterion_group!(benches, bench_chunk_pipeline);
criterion_main!(benches);
