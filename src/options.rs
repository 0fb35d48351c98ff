//! Plain, `Default`-backed configuration structs — no external config file
//! format is read. Callers construct these directly or start from
//! `::default()` and override individual fields.

use crate::format::DEFAULT_CHUNK_SIZE;

/// Configuration for [`crate::writer::Writer::new`] / [`crate::archive::Archive::create`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub chunk_size: u32,
    pub checksum_algo: String,
    pub compression_algo: String,
    pub compression_level: i32,
    /// `None` disables encryption outright. `Some` requires `password` to
    /// also be set.
    pub encryption_algo: Option<String>,
    pub password: Option<String>,
    pub kdf_algo: String,
    pub kdf_options: KdfOptions,
    pub random_access: bool,
    pub stream_mode: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum_algo: "xxh3-64".to_owned(),
            compression_algo: "zstd".to_owned(),
            compression_level: 3,
            encryption_algo: None,
            password: None,
            kdf_algo: "argon2id".to_owned(),
            kdf_options: KdfOptions::default(),
            random_access: true,
            stream_mode: false,
        }
    }
}

pub use crate::limits::SecurityLimits;

#[derive(Debug, Clone)]
pub struct KdfOptions {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub pbkdf2_iterations: u32,
}

impl Default for KdfOptions {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 64 * 1024,
            argon2_iterations: 3,
            argon2_parallelism: 1,
            pbkdf2_iterations: 600_000,
        }
    }
}
