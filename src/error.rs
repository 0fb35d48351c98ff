//! One orthogonal error kind per failure class, not a hierarchy. Every
//! fallible engine operation returns `Result<T, ApackError>`.

use std::io;
use thiserror::Error;

/// The single error type surfaced across the reader/writer/chunk-pipeline API.
#[derive(Error, Debug)]
pub enum ApackError {
    /// Magic mismatch, unknown algorithm ID, offset outside the file, a size
    /// contradicting the file length, a header checksum mismatch, or a
    /// compat level this build cannot handle. Fatal — the archive (or the
    /// structure being parsed) is unreadable.
    #[error("format error: {0}")]
    Format(String),

    /// A chunk body decoded successfully but its plaintext checksum does not
    /// match the value stored in the chunk header.
    #[error("checksum mismatch: expected {expected:#018x}, computed {computed:#018x}")]
    Checksum { expected: u64, computed: u64 },

    /// AEAD tag verification failure, key-wrap failure, or KDF parameter
    /// rejection. Deliberately does not distinguish wrong-password from
    /// tampering, so no side channel tells an attacker which one occurred.
    #[error("cryptographic operation failed")]
    Crypto,

    /// Lookup by name or ID returned no result.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A recognized format whose major version or compat level exceeds what
    /// this implementation handles.
    #[error("unsupported format version/compat level: {0}")]
    UnsupportedVersion(String),

    /// A size or ratio exceeded a configured ceiling (`SecurityLimits`).
    /// Refuses to continue even if the data would otherwise be valid.
    #[error("security limit exceeded: {0}")]
    SecurityLimit(String),

    /// Lower-level byte-source/sink failure, surfaced verbatim.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ApackError>;

impl ApackError {
    pub fn format<S: Into<String>>(msg: S) -> Self {
        ApackError::Format(msg.into())
    }

    pub fn security_limit<S: Into<String>>(msg: S) -> Self {
        ApackError::SecurityLimit(msg.into())
    }
}
