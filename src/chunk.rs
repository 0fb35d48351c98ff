//! Chunk pipeline: checksum, compress, encrypt on write; decrypt,
//! decompress, checksum-verify on read. The write-side order is fixed
//! because the checksum always covers plaintext — the only bytes that are
//! stable across different compression levels or cipher choices.
//!
//! Read-side order undoes the pipeline in reverse: ciphertext must be
//! authenticated and decrypted before anything is decompressed, and the
//! checksum is only ever computed over whatever the decompressor actually
//! produced, so a decompressor bug shows up as a checksum mismatch rather
//! than silently validating garbage.

use crate::error::{ApackError, Result};
use crate::format::{ChunkHeader, CHUNK_FLAG_HAS_ECC, CHUNK_FLAG_LAST, CHUNK_FLAG_UNCOMPRESSED};
use crate::limits::SecurityLimits;
use crate::providers::checksum::ChecksumProvider;
use crate::providers::compression::CompressionProvider;
use crate::providers::encryption::EncryptionProvider;

pub struct EncodeOptions<'a> {
    pub chunk_index: u32,
    pub is_last: bool,
    pub checksum: &'a dyn ChecksumProvider,
    pub compression: Option<(&'a dyn CompressionProvider, i32)>,
    pub encryption: Option<(&'a dyn EncryptionProvider, &'a [u8])>,
}

/// Encodes one chunk of plaintext, returning its header and the exact bytes
/// to write to disk immediately after that header.
pub fn encode_chunk(data: &[u8], opts: &EncodeOptions) -> Result<(ChunkHeader, Vec<u8>)> {
    if data.len() > u32::MAX as usize {
        return Err(ApackError::format("chunk exceeds the 32-bit original-size field"));
    }
    let original_size = data.len() as u32;
    let checksum = opts.checksum.compute(data);

    let mut flags = 0u32;
    if opts.is_last {
        flags |= CHUNK_FLAG_LAST;
    }

    let mut body = match opts.compression {
        Some((provider, level)) => {
            let compressed = provider.compress_block(data, level)?;
            if compressed.len() < data.len() {
                compressed
            } else {
                flags |= CHUNK_FLAG_UNCOMPRESSED;
                data.to_vec()
            }
        }
        None => {
            flags |= CHUNK_FLAG_UNCOMPRESSED;
            data.to_vec()
        }
    };

    if let Some((provider, key)) = opts.encryption {
        body = provider.encrypt_block(key, &body)?;
    }

    if body.len() > u32::MAX as usize {
        return Err(ApackError::format("encoded chunk exceeds the 32-bit stored-size field"));
    }

    let header = ChunkHeader {
        chunk_index: opts.chunk_index,
        original_size,
        stored_size: body.len() as u32,
        checksum,
        flags,
    };
    Ok((header, body))
}

pub struct DecodeOptions<'a> {
    pub checksum: &'a dyn ChecksumProvider,
    pub compression: Option<&'a dyn CompressionProvider>,
    pub encryption: Option<(&'a dyn EncryptionProvider, &'a [u8])>,
    pub limits: &'a SecurityLimits,
}

/// Decodes one chunk body against its header, verifying the plaintext
/// checksum last so any corruption anywhere upstream is caught uniformly.
pub fn decode_chunk(header: &ChunkHeader, body: &[u8], opts: &DecodeOptions) -> Result<Vec<u8>> {
    if header.stored_size as usize != body.len() {
        return Err(ApackError::format(format!(
            "chunk body length {} does not match header stored_size {}",
            body.len(),
            header.stored_size
        )));
    }

    let decrypted = match opts.encryption {
        Some((provider, key)) => provider.decrypt_block(key, body)?,
        None => body.to_vec(),
    };

    opts.limits
        .check_chunk_claim(header.original_size as u64, decrypted.len() as u64)?;

    let plaintext = if header.is_uncompressed() {
        if decrypted.len() as u32 != header.original_size {
            return Err(ApackError::format(
                "uncompressed chunk body length does not match its declared original size",
            ));
        }
        decrypted
    } else {
        let provider = opts
            .compression
            .ok_or_else(|| ApackError::format("chunk is compressed but no compression provider was given"))?;
        provider.decompress_block(&decrypted, header.original_size as u64, opts.limits)?
    };

    let computed = opts.checksum.compute(&plaintext);
    if computed != header.checksum {
        return Err(ApackError::Checksum { expected: header.checksum, computed });
    }

    Ok(plaintext)
}

pub fn has_ecc(header: &ChunkHeader) -> bool {
    header.flags & CHUNK_FLAG_HAS_ECC != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::checksum::Xxh3_64Provider;
    use crate::providers::compression::ZstdProvider;
    use crate::providers::encryption::Aes256GcmProvider;

    #[test]
    fn round_trips_plain() {
        let checksum = Xxh3_64Provider;
        let data = b"plain chunk, no compression, no encryption".to_vec();
        let opts = EncodeOptions {
            chunk_index: 0,
            is_last: true,
            checksum: &checksum,
            compression: None,
            encryption: None,
        };
        let (header, body) = encode_chunk(&data, &opts).unwrap();
        assert!(header.is_uncompressed());
        assert!(header.is_last());

        let limits = SecurityLimits::default();
        let decode_opts =
            DecodeOptions { checksum: &checksum, compression: None, encryption: None, limits: &limits };
        let out = decode_chunk(&header, &body, &decode_opts).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn round_trips_compressed_and_encrypted() {
        let checksum = Xxh3_64Provider;
        let compression = ZstdProvider;
        let encryption = Aes256GcmProvider;
        let key = [4u8; 32];
        let data = b"repeated repeated repeated repeated data compresses well".repeat(4);

        let encode_opts = EncodeOptions {
            chunk_index: 3,
            is_last: false,
            checksum: &checksum,
            compression: Some((&compression, 3)),
            encryption: Some((&encryption, &key)),
        };
        let (header, body) = encode_chunk(&data, &encode_opts).unwrap();
        assert!(!header.is_last());

        let limits = SecurityLimits::default();
        let decode_opts = DecodeOptions {
            checksum: &checksum,
            compression: Some(&compression),
            encryption: Some((&encryption, &key)),
            limits: &limits,
        };
        let out = decode_chunk(&header, &body, &decode_opts).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn incompressible_data_falls_back_to_uncompressed() {
        let checksum = Xxh3_64Provider;
        let compression = ZstdProvider;
        // Random-looking bytes rarely compress smaller than themselves.
        let data: Vec<u8> = (0..256u32).map(|i| (i * 2654435761u32) as u8).collect();
        let encode_opts = EncodeOptions {
            chunk_index: 0,
            is_last: true,
            checksum: &checksum,
            compression: Some((&compression, 19)),
            encryption: None,
        };
        let (header, body) = encode_chunk(&data, &encode_opts).unwrap();
        assert!(header.is_uncompressed());
        assert_eq!(body, data);
    }

    #[test]
    fn tampered_plaintext_is_rejected() {
        let checksum = Xxh3_64Provider;
        let data = b"tamper me".to_vec();
        let encode_opts = EncodeOptions {
            chunk_index: 0,
            is_last: true,
            checksum: &checksum,
            compression: None,
            encryption: None,
        };
        let (header, mut body) = encode_chunk(&data, &encode_opts).unwrap();
        body[0] ^= 0xFF;

        let limits = SecurityLimits::default();
        let decode_opts =
            DecodeOptions { checksum: &checksum, compression: None, encryption: None, limits: &limits };
        let err = decode_chunk(&header, &body, &decode_opts).unwrap_err();
        assert!(matches!(err, ApackError::Checksum { .. }));
    }
}
