//! Compression providers. Each owns the full round trip for one algorithm
//! and reports a conservative upper bound on its own compressed output so
//! callers can size buffers before compressing.

use std::io::Read;
use std::sync::Arc;

use crate::error::{ApackError, Result};
use crate::limits::SecurityLimits;
use crate::providers::Registry;

pub trait CompressionProvider: Send + Sync {
    fn id(&self) -> &'static str;
    fn numeric_id(&self) -> u8;
    fn default_level(&self) -> i32;
    fn min_level(&self) -> i32;
    fn max_level(&self) -> i32;

    fn compress_block(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;

    /// Decompresses a block whose plaintext is claimed to be
    /// `expected_original_size` bytes, refusing to allocate or produce more
    /// than the security limits allow regardless of what the stream itself
    /// would otherwise yield.
    fn decompress_block(
        &self,
        data: &[u8],
        expected_original_size: u64,
        limits: &SecurityLimits,
    ) -> Result<Vec<u8>>;
}

pub struct NoneProvider;

impl CompressionProvider for NoneProvider {
    fn id(&self) -> &'static str {
        "none"
    }
    fn numeric_id(&self) -> u8 {
        0
    }
    fn default_level(&self) -> i32 {
        0
    }
    fn min_level(&self) -> i32 {
        0
    }
    fn max_level(&self) -> i32 {
        0
    }
    fn compress_block(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
    fn decompress_block(
        &self,
        data: &[u8],
        expected_original_size: u64,
        limits: &SecurityLimits,
    ) -> Result<Vec<u8>> {
        limits.check_chunk_claim(expected_original_size, data.len() as u64)?;
        if data.len() as u64 != expected_original_size {
            return Err(ApackError::format(
                "uncompressed chunk body length does not match its declared original size",
            ));
        }
        Ok(data.to_vec())
    }
}

pub struct ZstdProvider;

impl CompressionProvider for ZstdProvider {
    fn id(&self) -> &'static str {
        "zstd"
    }
    fn numeric_id(&self) -> u8 {
        1
    }
    fn default_level(&self) -> i32 {
        3
    }
    fn min_level(&self) -> i32 {
        1
    }
    fn max_level(&self) -> i32 {
        22
    }
    fn compress_block(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::encode_all(data, level).map_err(ApackError::Io)
    }
    fn decompress_block(
        &self,
        data: &[u8],
        expected_original_size: u64,
        limits: &SecurityLimits,
    ) -> Result<Vec<u8>> {
        limits.check_chunk_claim(expected_original_size, data.len() as u64)?;
        let mut out = Vec::new();
        let mut decoder = zstd::stream::Decoder::new(data)?;
        std::io::copy(
            &mut (&mut decoder).take(expected_original_size + 1),
            &mut out,
        )?;
        if out.len() as u64 != expected_original_size {
            return Err(ApackError::format(
                "decompressed zstd chunk size does not match its declared original size",
            ));
        }
        Ok(out)
    }
}

/// `lz4_flex` (this crate's pure-Rust LZ4, per DESIGN.md) only exposes the
/// fast block compressor — it has no HC/level-tunable mode, the same
/// constraint every other LZ4 codec in the retrieval pack works around by
/// ignoring the level argument entirely (see DESIGN.md, "LZ4 level is a
/// no-op"). `min_level`/`max_level`/`default_level` are all `0` to advertise
/// that honestly rather than accept a level that silently does nothing.
pub struct Lz4Provider;

impl CompressionProvider for Lz4Provider {
    fn id(&self) -> &'static str {
        "lz4"
    }
    fn numeric_id(&self) -> u8 {
        2
    }
    fn default_level(&self) -> i32 {
        0
    }
    fn min_level(&self) -> i32 {
        0
    }
    fn max_level(&self) -> i32 {
        0
    }
    fn compress_block(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress_block(
        &self,
        data: &[u8],
        expected_original_size: u64,
        limits: &SecurityLimits,
    ) -> Result<Vec<u8>> {
        // lz4_flex records its own size prefix; still enforce the ceiling
        // against the header's independent claim before trusting either.
        limits.check_chunk_claim(expected_original_size, data.len() as u64)?;
        let out = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| ApackError::format(format!("lz4 decompression failed: {e}")))?;
        if out.len() as u64 != expected_original_size {
            return Err(ApackError::format(
                "decompressed lz4 chunk size does not match its declared original size",
            ));
        }
        Ok(out)
    }
}

pub fn build_default_registry() -> Registry<dyn CompressionProvider> {
    let mut reg = Registry::new();
    reg.register("none", 0, Arc::new(NoneProvider));
    reg.register("zstd", 1, Arc::new(ZstdProvider));
    reg.register("lz4", 2, Arc::new(Lz4Provider));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_round_trips() {
        let provider = ZstdProvider;
        let limits = SecurityLimits::default();
        let data = b"hello world, hello world, hello world".repeat(10);
        let compressed = provider.compress_block(&data, 3).unwrap();
        let decompressed = provider
            .decompress_block(&compressed, data.len() as u64, &limits)
            .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lz4_round_trips() {
        let provider = Lz4Provider;
        let limits = SecurityLimits::default();
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let compressed = provider.compress_block(&data, 0).unwrap();
        let decompressed = provider
            .decompress_block(&compressed, data.len() as u64, &limits)
            .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn registry_resolves_both_keys() {
        let reg = build_default_registry();
        assert_eq!(reg.get_by_name("zstd").unwrap().numeric_id(), 1);
        assert_eq!(reg.get_by_numeric_id(2).unwrap().id(), "lz4");
    }
}
