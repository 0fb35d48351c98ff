//! Property-based round-trip and corruption tests (spec §8, properties #1–#2).

use apack::archive::Archive;
use apack::error::ApackError;
use apack::options::WriterOptions;
use proptest::prelude::*;
use tempfile::NamedTempFile;

fn writer_options(compression: &str, level: i32, encryption: Option<&str>) -> WriterOptions {
    WriterOptions {
        compression_algo: compression.to_owned(),
        compression_level: level,
        encryption_algo: encryption.map(|s| s.to_owned()),
        password: encryption.map(|_| "proptest-password".to_owned()),
        chunk_size: 8 * 1024,
        ..Default::default()
    }
}

fn round_trip_one(name: &str, mime: &str, data: &[u8], opts: WriterOptions) {
    let path = NamedTempFile::new().unwrap().path().to_path_buf();
    let has_password = opts.password.clone();
    let mut ar = Archive::create(&path, opts).unwrap();
    ar.add_entry(name, mime, vec![], data).unwrap();
    ar.finalize().unwrap();

    let mut ar = match &has_password {
        Some(pw) => Archive::open_encrypted(&path, pw).unwrap(),
        None => Archive::open(&path).unwrap(),
    };
    let read_back = ar.read_entry_by_name(name).unwrap();
    assert_eq!(read_back, data);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn round_trip_matrix(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        compression_idx in 0..3u8,
        encryption_idx in 0..3u8,
    ) {
        let (compression, level) = match compression_idx {
            0 => ("none", 0),
            1 => ("zstd", 3),
            _ => ("lz4", 0),
        };
        let encryption = match encryption_idx {
            0 => None,
            1 => Some("aes-256-gcm"),
            _ => Some("chacha20poly1305"),
        };
        round_trip_one("entry.bin", "application/octet-stream", &data, writer_options(compression, level, encryption));
    }

    #[test]
    fn single_byte_body_corruption_is_detected(
        body in proptest::collection::vec(any::<u8>(), 16..4096),
        flip_index in 0..4096usize,
    ) {
        // A fixed marker (never itself mutated) locates the plaintext body
        // inside the written file without assuming anything about header or
        // trailer sizes.
        const MARKER: &[u8; 16] = b"PROPTEST-MARKER!";
        let flip_index = flip_index % body.len();
        let mut data = MARKER.to_vec();
        data.extend_from_slice(&body);

        let path = NamedTempFile::new().unwrap().path().to_path_buf();
        let opts = writer_options("none", 0, None);
        let mut ar = Archive::create(&path, opts).unwrap();
        ar.add_entry("x", "", vec![], &data).unwrap();
        ar.finalize().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let marker_pos = bytes.windows(MARKER.len()).position(|w| w == MARKER).unwrap();
        let target = marker_pos + MARKER.len() + flip_index;
        bytes[target] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut ar = Archive::open(&path).unwrap();
        let err = ar.read_entry_by_name("x").unwrap_err();
        prop_assert!(matches!(err, ApackError::Checksum { .. } | ApackError::Format(_)));
    }
}
