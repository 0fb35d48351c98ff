//! Immutable records for every on-disk structure: file header, encryption
//! block, entry header, chunk header, TOC entry, trailer. Magic numbers,
//! algorithm IDs, flag bits and size limits live here; nothing in this
//! module performs I/O beyond serializing to/from an in-memory buffer
//! (actual file I/O is `writer.rs`/`reader.rs`'s job).
//!
//! All multi-byte integers are little-endian. Magic strings are byte-exact
//! ASCII. This is frozen; a future incompatible layout would bump
//! `COMPAT_LEVEL`, not silently renegotiate.

use std::collections::HashMap;
use std::io::{Read, Write};

use crc32fast::Hasher as Crc32;

use crate::bincodec::{ByteReader, ByteWriter};
use crate::error::{ApackError, Result};

// ── File header ──────────────────────────────────────────────────────────

pub const MAGIC: &[u8; 5] = b"APACK";
pub const FILE_HEADER_SIZE: usize = 64;
/// Bytes 0..16 are covered by `header_checksum`: flipping any byte in that
/// prefix must make the stored CRC mismatch on read.
pub const FILE_HEADER_CRC_COVERED: usize = 16;

/// Coarse gating number independent of major/minor/patch. A reader must
/// refuse files whose compat level exceeds its own, raising
/// `ApackError::UnsupportedVersion`.
pub const COMPAT_LEVEL: u8 = 1;

pub const MODE_STREAM: u8 = 0x01;
pub const MODE_ENCRYPTED: u8 = 0x02;
pub const MODE_COMPRESSED: u8 = 0x04;
pub const MODE_RANDOM_ACCESS: u8 = 0x08;

pub const MIN_CHUNK_SIZE: u32 = 1024; // 1 KiB
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024; // 64 MiB
pub const DEFAULT_CHUNK_SIZE: u32 = 4 * 1024 * 1024; // 4 MiB

/// Checksum algorithm IDs stored in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumAlgoId {
    Crc32 = 0,
    Xxh3_64 = 1,
    Xxh3_128 = 2,
}

impl ChecksumAlgoId {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(ChecksumAlgoId::Crc32),
            1 => Ok(ChecksumAlgoId::Xxh3_64),
            2 => Ok(ChecksumAlgoId::Xxh3_128),
            other => Err(ApackError::format(format!("unknown checksum algorithm id {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub format_version: (u8, u8, u8),
    pub compat_level: u8,
    pub mode_flags: u8,
    pub checksum_algo: ChecksumAlgoId,
    pub default_chunk_size: u32,
    pub entry_count: u64,
    pub trailer_offset: u64,
    pub creation_timestamp_ms: u64,
}

impl FileHeader {
    pub fn new(checksum_algo: ChecksumAlgoId, default_chunk_size: u32, mode_flags: u8) -> Self {
        Self {
            format_version: (1, 0, 0),
            compat_level: COMPAT_LEVEL,
            mode_flags,
            checksum_algo,
            default_chunk_size: default_chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE),
            entry_count: 0,
            trailer_offset: 0,
            creation_timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.mode_flags & MODE_STREAM != 0
    }
    pub fn is_encrypted(&self) -> bool {
        self.mode_flags & MODE_ENCRYPTED != 0
    }
    pub fn is_compressed(&self) -> bool {
        self.mode_flags & MODE_COMPRESSED != 0
    }
    pub fn is_random_access(&self) -> bool {
        self.mode_flags & MODE_RANDOM_ACCESS != 0
    }

    /// Serialize to exactly `FILE_HEADER_SIZE` bytes.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut body = Vec::with_capacity(FILE_HEADER_SIZE);
        body.extend_from_slice(MAGIC);
        body.push(self.format_version.0);
        body.push(self.format_version.1);
        body.push(self.format_version.2);
        body.push(self.compat_level);
        body.push(self.mode_flags);
        body.push(self.checksum_algo as u8);
        body.push(0u8); // reserved
        body.extend_from_slice(&self.default_chunk_size.to_le_bytes());
        assert_eq!(body.len(), FILE_HEADER_CRC_COVERED, "header CRC prefix must be 16 bytes");

        let mut h = Crc32::new();
        h.update(&body);
        let crc = h.finalize();
        body.extend_from_slice(&crc.to_le_bytes());

        body.extend_from_slice(&self.entry_count.to_le_bytes());
        body.extend_from_slice(&self.trailer_offset.to_le_bytes());
        body.extend_from_slice(&self.creation_timestamp_ms.to_le_bytes());
        body.resize(FILE_HEADER_SIZE, 0u8);

        w.write_all(&body)?;
        Ok(())
    }

    /// Read and validate magic + header checksum + compat level. Magic and
    /// header checksum must both validate before any other field is
    /// trusted.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        r.read_exact(&mut buf)?;

        if &buf[0..5] != MAGIC {
            return Err(ApackError::format("invalid magic — not an APACK archive"));
        }

        let mut h = Crc32::new();
        h.update(&buf[..FILE_HEADER_CRC_COVERED]);
        let expected = h.finalize();
        let stored = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        if expected != stored {
            return Err(ApackError::format("file header checksum mismatch — corrupted archive"));
        }

        let format_version = (buf[5], buf[6], buf[7]);
        let compat_level = buf[8];
        if compat_level > COMPAT_LEVEL {
            return Err(ApackError::UnsupportedVersion(format!(
                "archive compat level {compat_level} exceeds supported level {COMPAT_LEVEL}"
            )));
        }
        let mode_flags = buf[9];
        let checksum_algo = ChecksumAlgoId::from_u8(buf[10])?;
        let default_chunk_size = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let entry_count = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let trailer_offset = u64::from_le_bytes(buf[28..36].try_into().unwrap());
        let creation_timestamp_ms = u64::from_le_bytes(buf[36..44].try_into().unwrap());

        Ok(Self {
            format_version,
            compat_level,
            mode_flags,
            checksum_algo,
            default_chunk_size,
            entry_count,
            trailer_offset,
            creation_timestamp_ms,
        })
    }
}

// ── Encryption block ─────────────────────────────────────────────────────

pub const ENCR_MAGIC: &[u8; 4] = b"ENCR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdfAlgoId {
    Argon2id = 1,
    Pbkdf2HmacSha256 = 2,
}

impl KdfAlgoId {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(KdfAlgoId::Argon2id),
            2 => Ok(KdfAlgoId::Pbkdf2HmacSha256),
            other => Err(ApackError::format(format!("unknown KDF algorithm id {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipherAlgoId {
    Aes256Gcm = 1,
    ChaCha20Poly1305 = 2,
}

impl CipherAlgoId {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(CipherAlgoId::Aes256Gcm),
            2 => Ok(CipherAlgoId::ChaCha20Poly1305),
            other => Err(ApackError::format(format!("unknown cipher algorithm id {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KdfParams {
    pub iterations: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct EncryptionBlock {
    pub kdf_algo: KdfAlgoId,
    pub cipher_algo: CipherAlgoId,
    pub kdf_params: KdfParams,
    pub salt: Vec<u8>,
    pub wrapped_cek: Vec<u8>,
    pub wrapped_key_tag: Vec<u8>,
}

impl EncryptionBlock {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut bw = ByteWriter::new(w);
        bw.write_bytes(ENCR_MAGIC)?;
        bw.write_u8(self.kdf_algo as u8)?;
        bw.write_u8(self.cipher_algo as u8)?;
        bw.write_u32(self.kdf_params.iterations)?;
        bw.write_u32(self.kdf_params.memory_kib)?;
        bw.write_u32(self.kdf_params.parallelism)?;
        bw.write_bytes_u16(&self.salt)?;
        bw.write_bytes_u16(&self.wrapped_cek)?;
        bw.write_bytes_u16(&self.wrapped_key_tag)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut br = ByteReader::new(r);
        let magic = br.read_array::<4>()?;
        if &magic != ENCR_MAGIC {
            return Err(ApackError::format("invalid encryption block magic"));
        }
        let kdf_algo = KdfAlgoId::from_u8(br.read_u8()?)?;
        let cipher_algo = CipherAlgoId::from_u8(br.read_u8()?)?;
        let iterations = br.read_u32()?;
        let memory_kib = br.read_u32()?;
        let parallelism = br.read_u32()?;
        let salt = br.read_bytes_u16()?;
        if salt.len() < 8 {
            return Err(ApackError::format("encryption block salt shorter than 8 bytes"));
        }
        let wrapped_cek = br.read_bytes_u16()?;
        let wrapped_key_tag = br.read_bytes_u16()?;
        Ok(Self {
            kdf_algo,
            cipher_algo,
            kdf_params: KdfParams { iterations, memory_kib, parallelism },
            salt,
            wrapped_cek,
            wrapped_key_tag,
        })
    }
}

// ── Entry header ─────────────────────────────────────────────────────────

pub const ENTR_MAGIC: &[u8; 4] = b"ENTR";
pub const ENTRY_HEADER_VERSION: u8 = 1;

pub const ENTRY_FLAG_HAS_ECC: u8 = 0x01;
pub const ENTRY_FLAG_ENCRYPTED: u8 = 0x02;
pub const ENTRY_FLAG_COMPRESSED: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Str(String),
    Int64(i64),
    Bytes(Vec<u8>),
}

impl AttributeValue {
    fn type_tag(&self) -> u8 {
        match self {
            AttributeValue::Str(_) => 0,
            AttributeValue::Int64(_) => 1,
            AttributeValue::Bytes(_) => 2,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_owned())
    }
}
impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int64(v)
    }
}
impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        AttributeValue::Bytes(v)
    }
}

#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub flags: u8,
    pub entry_id: u64,
    /// May be 0 on disk for random-access archives — the TOC carries the
    /// canonical value.
    pub original_size: u64,
    pub stored_size: u64,
    pub chunk_count: u32,
    pub compression_algo_id: u8,
    pub encryption_algo_id: u8,
    pub name: String,
    pub mime_type: String,
    pub attributes: Vec<(String, AttributeValue)>,
}

impl EntryHeader {
    pub fn is_encrypted(&self) -> bool {
        self.flags & ENTRY_FLAG_ENCRYPTED != 0
    }
    pub fn is_compressed(&self) -> bool {
        self.flags & ENTRY_FLAG_COMPRESSED != 0
    }

    /// Writes the header, a magic-prefixed, variable-length body followed by
    /// a trailing CRC32 of that body.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        // Build the full body in memory first; header_checksum covers
        // everything up to (not including) itself.
        let mut body: Vec<u8> = Vec::new();
        {
            let mut bw = ByteWriter::new(&mut body);
            bw.write_bytes(ENTR_MAGIC)?;
            bw.write_u8(ENTRY_HEADER_VERSION)?;
            bw.write_u8(self.flags)?;
            bw.write_u64(self.entry_id)?;
            bw.write_u64(self.original_size)?;
            bw.write_u64(self.stored_size)?;
            bw.write_u32(self.chunk_count)?;
            bw.write_u8(self.compression_algo_id)?;
            bw.write_u8(self.encryption_algo_id)?;
            bw.write_string_u16(&self.name)?;
            bw.write_string_u16(&self.mime_type)?;

            if self.attributes.len() > u16::MAX as usize {
                return Err(ApackError::format("too many entry attributes for u16 count prefix"));
            }
            bw.write_u16(self.attributes.len() as u16)?;
            for (key, value) in &self.attributes {
                bw.write_string_u16(key)?;
                bw.write_u8(value.type_tag())?;
                match value {
                    AttributeValue::Str(s) => bw.write_string_u16(s)?,
                    AttributeValue::Int64(v) => bw.write_i64(*v)?,
                    AttributeValue::Bytes(b) => bw.write_bytes_u32(b)?,
                }
            }
        }

        let mut h = Crc32::new();
        h.update(&body);
        let crc = h.finalize();

        w.write_all(&body)?;
        w.write_all(&crc.to_le_bytes())?;
        Ok(())
    }

    /// Reads one entry header's fields, stopping immediately after the
    /// attributes — the trailing CRC32 is not consumed here. Returns the
    /// header; the byte count of the fields just read (body length, not
    /// including the CRC) is available from `read_verified`, which is the
    /// form used everywhere that needs the on-disk size.
    fn read_fields<R: Read>(r: &mut R) -> Result<Self> {
        let mut br = ByteReader::new(r);
        let magic = br.read_array::<4>()?;
        if &magic != ENTR_MAGIC {
            return Err(ApackError::format("invalid entry header magic"));
        }
        let header_version = br.read_u8()?;
        if header_version != ENTRY_HEADER_VERSION {
            return Err(ApackError::UnsupportedVersion(format!(
                "entry header version {header_version} not supported"
            )));
        }
        let flags = br.read_u8()?;
        let entry_id = br.read_u64()?;
        let original_size = br.read_u64()?;
        let stored_size = br.read_u64()?;
        let chunk_count = br.read_u32()?;
        let compression_algo_id = br.read_u8()?;
        let encryption_algo_id = br.read_u8()?;
        let name = br.read_string_u16()?;
        let mime_type = br.read_string_u16()?;

        let attr_count = br.read_u16()? as usize;
        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let key = br.read_string_u16()?;
            let tag = br.read_u8()?;
            let value = match tag {
                0 => AttributeValue::Str(br.read_string_u16()?),
                1 => AttributeValue::Int64(br.read_i64()?),
                2 => AttributeValue::Bytes(br.read_bytes_u32()?),
                other => return Err(ApackError::format(format!("unknown attribute type tag {other}"))),
            };
            attributes.push((key, value));
        }

        Ok(Self {
            flags,
            entry_id,
            original_size,
            stored_size,
            chunk_count,
            compression_algo_id,
            encryption_algo_id,
            name,
            mime_type,
            attributes,
        })
    }

    /// Reads and validates an entry header's CRC32, returning the header and
    /// its total on-disk size in bytes (fields + trailing CRC), used to
    /// locate the next structure when no TOC is present.
    pub fn read_verified<R: Read>(r: &mut R) -> Result<(Self, u64)> {
        // Peek-free approach: buffer the whole header by reading through a
        // counting cursor twice isn't possible on a non-seekable stream, so
        // we instead read field-by-field while mirroring every byte into a
        // side buffer, then verify.
        let mut mirror = MirrorReader { inner: r, mirror: Vec::new() };
        let header = EntryHeader::read_fields(&mut mirror)?;
        let body = mirror.mirror;

        let mut crc_buf = [0u8; 4];
        mirror.inner.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut h = Crc32::new();
        h.update(&body);
        if h.finalize() != stored_crc {
            return Err(ApackError::format("entry header checksum mismatch — corrupted archive"));
        }

        let total_size = body.len() as u64 + 4;
        Ok((header, total_size))
    }
}

/// A `Read` wrapper that copies every byte it yields into `mirror`, so the
/// caller can checksum exactly what was parsed without a second pass.
struct MirrorReader<'a, R: Read> {
    inner: &'a mut R,
    mirror: Vec<u8>,
}

impl<'a, R: Read> Read for MirrorReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.mirror.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

// ── Chunk header ─────────────────────────────────────────────────────────

pub const CHUNK_HEADER_SIZE: usize = 24;

pub const CHUNK_FLAG_LAST: u32 = 0x01;
pub const CHUNK_FLAG_UNCOMPRESSED: u32 = 0x02;
pub const CHUNK_FLAG_HAS_ECC: u32 = 0x04;

#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub chunk_index: u32,
    pub original_size: u32,
    pub stored_size: u32,
    pub checksum: u64,
    pub flags: u32,
}

impl ChunkHeader {
    pub fn is_last(&self) -> bool {
        self.flags & CHUNK_FLAG_LAST != 0
    }
    pub fn is_uncompressed(&self) -> bool {
        self.flags & CHUNK_FLAG_UNCOMPRESSED != 0
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut bw = ByteWriter::new(w);
        bw.write_u32(self.chunk_index)?;
        bw.write_u32(self.original_size)?;
        bw.write_u32(self.stored_size)?;
        bw.write_u64(self.checksum)?;
        bw.write_u32(self.flags)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut br = ByteReader::new(r);
        let chunk_index = br.read_u32()?;
        let original_size = br.read_u32()?;
        let stored_size = br.read_u32()?;
        let checksum = br.read_u64()?;
        let flags = br.read_u32()?;
        Ok(Self { chunk_index, original_size, stored_size, checksum, flags })
    }
}

// ── TOC entry ────────────────────────────────────────────────────────────

/// On-disk size of one TOC entry. The enumerated field list (entry ID u64,
/// name hash u32, reserved u32, entry offset u64, original size u64, stored
/// size u64) sums to 40 bytes; that layout is treated as authoritative (see
/// DESIGN.md, "Open Question decisions").
pub const TOC_ENTRY_SIZE: usize = 40;

#[derive(Debug, Clone, Copy)]
pub struct TocEntry {
    pub entry_id: u64,
    pub name_hash: u32,
    pub entry_offset: u64,
    pub original_size: u64,
    pub stored_size: u64,
}

impl TocEntry {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut bw = ByteWriter::new(w);
        bw.write_u64(self.entry_id)?;
        bw.write_u32(self.name_hash)?;
        bw.write_u32(0)?; // reserved
        bw.write_u64(self.entry_offset)?;
        bw.write_u64(self.original_size)?;
        bw.write_u64(self.stored_size)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut br = ByteReader::new(r);
        let entry_id = br.read_u64()?;
        let name_hash = br.read_u32()?;
        let _reserved = br.read_u32()?;
        let entry_offset = br.read_u64()?;
        let original_size = br.read_u64()?;
        let stored_size = br.read_u64()?;
        Ok(Self { entry_id, name_hash, entry_offset, original_size, stored_size })
    }
}

// ── Trailer ──────────────────────────────────────────────────────────────

pub const TRLR_MAGIC: &[u8; 4] = b"TRLR";

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveStats {
    pub total_original_size: u64,
    pub total_stored_size: u64,
}

#[derive(Debug, Clone)]
pub struct Trailer {
    pub entry_count: u64,
    /// Integrity checksum (CRC32) over the serialized TOC bytes that
    /// immediately precede this trailer.
    pub toc_checksum: u32,
    pub stats: ArchiveStats,
}

impl Trailer {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut bw = ByteWriter::new(w);
        bw.write_bytes(TRLR_MAGIC)?;
        bw.write_u64(self.entry_count)?;
        bw.write_u32(self.toc_checksum)?;
        bw.write_u64(self.stats.total_original_size)?;
        bw.write_u64(self.stats.total_stored_size)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut br = ByteReader::new(r);
        let magic = br.read_array::<4>()?;
        if &magic != TRLR_MAGIC {
            return Err(ApackError::format("invalid trailer magic"));
        }
        let entry_count = br.read_u64()?;
        let toc_checksum = br.read_u32()?;
        let total_original_size = br.read_u64()?;
        let total_stored_size = br.read_u64()?;
        Ok(Self {
            entry_count,
            toc_checksum,
            stats: ArchiveStats { total_original_size, total_stored_size },
        })
    }
}

/// Compute the CRC32 used by `Trailer::toc_checksum` over the raw,
/// already-serialized TOC bytes.
pub fn crc32_of(bytes: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(bytes);
    h.finalize()
}

/// In-memory representation of an entry, reconstructed by the reader either
/// from the TOC (random access) or by walking chunk headers sequentially
/// until the last-chunk flag is seen. Not itself a wire record.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub entry_id: u64,
    pub name: String,
    pub mime_type: String,
    pub attributes: Vec<(String, AttributeValue)>,
    pub name_hash: u32,
    pub entry_offset: u64,
    pub original_size: u64,
    pub stored_size: u64,
    pub chunk_count: u32,
    pub compression_algo_id: u8,
    pub encryption_algo_id: u8,
    pub is_encrypted: bool,
    pub is_compressed: bool,
}

/// XXH3-32 name hash used by the TOC and the name-bucket index. XXH3 is
/// natively a 64/128-bit hash; the 32-bit variant here is the low 32 bits
/// of XXH3-64 (see DESIGN.md, "Open Question decisions").
pub fn name_hash_xxh3_32(name: &str) -> u32 {
    xxhash_rust::xxh3::xxh3_64(name.as_bytes()) as u32
}

pub type AttributeMap = HashMap<String, AttributeValue>;
