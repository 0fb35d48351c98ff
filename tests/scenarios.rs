//! End-to-end scenario tests (spec §8 S1–S6).

use apack::archive::Archive;
use apack::error::ApackError;
use apack::options::WriterOptions;
use tempfile::NamedTempFile;

fn temp_path() -> std::path::PathBuf {
    NamedTempFile::new().unwrap().path().to_path_buf()
}

#[test]
fn s1_plain_store() {
    let path = temp_path();
    let opts = WriterOptions { compression_algo: "none".into(), chunk_size: 1024, ..Default::default() };
    let mut ar = Archive::create(&path, opts).unwrap();
    ar.add_entry("hello.txt", "text/plain", vec![], b"Hello, APACK\n").unwrap();
    ar.finalize().unwrap();

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hello.txt");
    assert_eq!(entries[0].original_size, 14);
    assert_eq!(entries[0].stored_size, 14);
    assert!(!entries[0].is_compressed);

    let data = ar.read_entry_by_name("hello.txt").unwrap();
    assert_eq!(data, b"Hello, APACK\n");
}

#[test]
fn s2_zstd_compresses() {
    let path = temp_path();
    let opts = WriterOptions {
        compression_algo: "zstd".into(),
        compression_level: 3,
        chunk_size: 64 * 1024,
        ..Default::default()
    };
    let mut ar = Archive::create(&path, opts).unwrap();
    let data = vec![b'A'; 10_000];
    ar.add_entry("a.txt", "text/plain", vec![], &data).unwrap();
    ar.finalize().unwrap();

    let mut ar = Archive::open(&path).unwrap();
    let info = ar.get_entry_by_name("a.txt").unwrap();
    assert!(info.is_compressed);
    assert!(info.stored_size < info.original_size);
    let read_back = ar.read_entry_by_name("a.txt").unwrap();
    assert_eq!(read_back, data);
}

#[test]
fn s3_incompressible_falls_back_to_store() {
    let path = temp_path();
    let opts = WriterOptions {
        compression_algo: "zstd".into(),
        compression_level: 3,
        chunk_size: 64 * 1024,
        ..Default::default()
    };
    let mut ar = Archive::create(&path, opts).unwrap();
    // Deterministic pseudo-random bytes: rarely compress smaller than themselves.
    let data: Vec<u8> = (0..16 * 1024u32).map(|i| (i.wrapping_mul(2654435761)) as u8).collect();
    ar.add_entry("r.bin", "application/octet-stream", vec![], &data).unwrap();
    ar.finalize().unwrap();

    let mut ar = Archive::open(&path).unwrap();
    let info = ar.get_entry_by_name("r.bin").unwrap();
    assert_eq!(info.stored_size, info.original_size);
    assert_eq!(ar.read_entry_by_name("r.bin").unwrap(), data);
}

#[test]
fn s4_aes_gcm_with_password() {
    let path = temp_path();
    let opts = WriterOptions {
        compression_algo: "none".into(),
        encryption_algo: Some("aes-256-gcm".into()),
        password: Some("correct horse battery staple".into()),
        kdf_algo: "argon2id".into(),
        // Spec S4 names m=65536 KiB, t=3, p=4; this test uses a lighter
        // Argon2id profile so the suite stays fast, exercising the same
        // KDF-params wiring without the multi-second real-world cost.
        kdf_options: apack::KdfOptions {
            argon2_memory_kib: 8 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            ..Default::default()
        },
        chunk_size: 256 * 1024,
        ..Default::default()
    };
    let mut ar = Archive::create(&path, opts).unwrap();
    let data: Vec<u8> = (0..1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    ar.add_entry("big.bin", "application/octet-stream", vec![], &data).unwrap();
    ar.finalize().unwrap();

    let mut ar = Archive::open_encrypted(&path, "correct horse battery staple").unwrap();
    let info = ar.get_entry_by_name("big.bin").unwrap();
    assert_eq!(info.chunk_count, 4);
    assert_eq!(ar.read_entry_by_name("big.bin").unwrap(), data);

    match Archive::open_encrypted(&path, "wrong password") {
        Err(ApackError::Crypto) => {}
        Err(other) => panic!("expected a single CryptoError, got {other:?}"),
        Ok(_) => panic!("expected wrong password to be rejected"),
    }
}

#[test]
fn s5_random_access_by_name() {
    let path = temp_path();
    let opts = WriterOptions { compression_algo: "none".into(), ..Default::default() };
    let mut ar = Archive::create(&path, opts).unwrap();
    for i in 0..1000u32 {
        let name = format!("file_{i:04}");
        let body = vec![(i % 256) as u8; 100];
        ar.add_entry(&name, "", vec![], &body).unwrap();
    }
    ar.finalize().unwrap();

    let mut ar = Archive::open(&path).unwrap();
    let info = ar.get_entry_by_name("file_0777").unwrap();
    let data = ar.read_entry_by_id(info.id).unwrap();
    assert_eq!(data, vec![(777u32 % 256) as u8; 100]);
}

#[test]
fn s6_corruption_is_localized() {
    let path = temp_path();
    let opts = WriterOptions { compression_algo: "none".into(), ..Default::default() };
    let mut ar = Archive::create(&path, opts).unwrap();
    for i in 0..10u32 {
        let name = format!("entry_{i}");
        ar.add_entry(&name, "", vec![], format!("payload {i}").as_bytes()).unwrap();
    }
    ar.finalize().unwrap();

    // Flip one byte inside entry #5's body by locating its plaintext marker.
    let mut bytes = std::fs::read(&path).unwrap();
    let needle = b"payload 5";
    let pos = bytes.windows(needle.len()).position(|w| w == needle).unwrap();
    bytes[pos] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut ar = Archive::open(&path).unwrap();
    let results = ar.verify_all().unwrap();
    let failed_ids: Vec<u64> = results.iter().filter(|(_, e)| e.is_some()).map(|(id, _)| *id).collect();
    assert_eq!(failed_ids.len(), 1);

    for (id, err) in &results {
        if *id != failed_ids[0] {
            assert!(err.is_none(), "entry {id} unexpectedly failed: {err:?}");
        }
    }
}

#[test]
fn stream_mode_has_no_toc_and_zero_entry_count() {
    let path = temp_path();
    let opts = WriterOptions { stream_mode: true, random_access: false, compression_algo: "none".into(), ..Default::default() };
    let mut ar = Archive::create(&path, opts).unwrap();
    ar.add_entry("only.txt", "text/plain", vec![], b"solo entry").unwrap();
    ar.finalize().unwrap();

    let raw = std::fs::read(&path).unwrap();
    let header = apack::FileHeader::read(&mut std::io::Cursor::new(&raw)).unwrap();
    assert_eq!(header.entry_count, 0);
    assert!(header.is_stream());
    assert!(!header.is_random_access());

    let mut ar = Archive::open(&path).unwrap();
    assert_eq!(ar.list().len(), 1);
    assert_eq!(ar.read_entry_by_name("only.txt").unwrap(), b"solo entry");
}

#[test]
fn header_tamper_is_rejected() {
    let path = temp_path();
    let opts = WriterOptions::default();
    let mut ar = Archive::create(&path, opts).unwrap();
    ar.add_entry("x", "", vec![], b"hi").unwrap();
    ar.finalize().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[6] ^= 0xFF; // inside the first 16 CRC-covered bytes
    std::fs::write(&path, &bytes).unwrap();

    let err = Archive::open(&path).unwrap_err();
    assert!(matches!(err, ApackError::Format(_)));
}
