//! Security ceilings enforced by the chunk pipeline. These guard against a
//! crafted header driving an unbounded allocation or an unbounded
//! decompression ("zip bomb" shape) before any byte of the body is trusted.

use crate::error::{ApackError, Result};
use crate::format::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Default ceiling on a single chunk's claimed decompressed size. Set well
/// above `MAX_CHUNK_SIZE` so an honest writer using a larger-than-default
/// chunk size is never rejected by its own output, while still bounding a
/// hostile header's claim.
pub const DEFAULT_MAX_CHUNK_ORIGINAL_SIZE: u64 = 256 * 1024 * 1024; // 256 MiB

/// Default ceiling on original_size / stored_size for one chunk. A ratio
/// above this is treated as a decompression bomb even if the claimed
/// original size itself is under the chunk-size ceiling.
pub const DEFAULT_MAX_DECOMPRESSION_RATIO: u64 = 1024;

/// Default ceiling on a wrapped-CEK byte string length (AES key wrap of a
/// 256-bit key produces 40 bytes; this leaves generous headroom for other
/// registered key sizes without accepting an unbounded allocation).
pub const DEFAULT_MAX_WRAPPED_KEY_LEN: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct SecurityLimits {
    pub max_chunk_original_size: u64,
    pub max_decompression_ratio: u64,
    pub max_wrapped_key_len: usize,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_chunk_original_size: DEFAULT_MAX_CHUNK_ORIGINAL_SIZE,
            max_decompression_ratio: DEFAULT_MAX_DECOMPRESSION_RATIO,
            max_wrapped_key_len: DEFAULT_MAX_WRAPPED_KEY_LEN,
        }
    }
}

impl SecurityLimits {
    /// Validates a claimed chunk original size against both the absolute
    /// ceiling and the ratio to its stored size, before any allocation sized
    /// off that claim is made.
    pub fn check_chunk_claim(&self, original_size: u64, stored_size: u64) -> Result<()> {
        if original_size > self.max_chunk_original_size {
            return Err(ApackError::security_limit(format!(
                "chunk claims {original_size} bytes decompressed, exceeding ceiling of {}",
                self.max_chunk_original_size
            )));
        }
        if stored_size > 0 {
            let ratio = original_size / stored_size.max(1);
            if ratio > self.max_decompression_ratio {
                return Err(ApackError::security_limit(format!(
                    "chunk decompression ratio {ratio}:1 exceeds ceiling of {}:1",
                    self.max_decompression_ratio
                )));
            }
        }
        Ok(())
    }

    pub fn check_wrapped_key_len(&self, len: usize) -> Result<()> {
        if len > self.max_wrapped_key_len {
            return Err(ApackError::security_limit(format!(
                "wrapped key of {len} bytes exceeds ceiling of {}",
                self.max_wrapped_key_len
            )));
        }
        Ok(())
    }
}

/// Clamps a requested chunk size into the supported range, matching
/// `FileHeader::new`'s clamp so callers never silently write an
/// out-of-range header.
pub fn clamp_chunk_size(requested: u32) -> u32 {
    requested.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_chunk_claim() {
        let limits = SecurityLimits::default();
        let err = limits
            .check_chunk_claim(limits.max_chunk_original_size + 1, 1024)
            .unwrap_err();
        assert!(matches!(err, ApackError::SecurityLimit(_)));
    }

    #[test]
    fn rejects_bomb_ratio() {
        let limits = SecurityLimits::default();
        let stored = 10u64;
        let original = stored * (limits.max_decompression_ratio + 1);
        let err = limits.check_chunk_claim(original, stored).unwrap_err();
        assert!(matches!(err, ApackError::SecurityLimit(_)));
    }

    #[test]
    fn accepts_reasonable_claim() {
        let limits = SecurityLimits::default();
        assert!(limits.check_chunk_claim(4096, 1024).is_ok());
    }
}
