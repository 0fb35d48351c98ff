//! # apack — self-describing binary archive container
//!
//! Format guarantees:
//! - All numeric fields are little-endian; never negotiated.
//! - The file header is exactly 64 bytes and covers itself with a CRC32
//!   over its first 16 bytes; magic and header checksum must both validate
//!   before any other field is trusted.
//! - Every chunk is checksummed over its **plaintext**, before compression
//!   and encryption, so the integrity check is independent of which codecs
//!   were configured.
//! - Algorithm identity is a small registered numeric ID; readers refuse
//!   archives naming an ID they have no provider for — no partial decode,
//!   no silent fallback.
//! - The TOC (when present) is at the end; a `STREAM`-mode archive carries
//!   no TOC and is reconstructed by walking chunk headers forward.
//! - Every stored offset or size is checked against the file's actual
//!   length before it is trusted for a seek or a read (see `reader.rs`).

pub mod archive;
pub mod bincodec;
pub mod chunk;
pub mod crypto_envelope;
pub mod error;
pub mod format;
pub mod limits;
pub mod options;
pub mod providers;
pub mod reader;
pub mod writer;

// Flat re-exports for the most common types.
pub use archive::{Archive, EntryInfo};
pub use error::{ApackError, Result};
pub use format::{AttributeValue, EntryMeta, FileHeader, COMPAT_LEVEL, MAGIC};
pub use limits::SecurityLimits;
pub use options::{KdfOptions, WriterOptions};
pub use reader::Reader;
pub use writer::Writer;
