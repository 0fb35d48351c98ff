//! Archive writer — a small state machine over a seekable sink.
//!
//! ```text
//! New -> Open -> EntryOpen -> EntryClosed -> EntryOpen   (next entry)
//!                                          -> Closing -> Closed
//! ```
//! Any operation that fails moves the writer to `Failed`; the only legal
//! call afterward is `close()`, which reports the failure rather than
//! trying to produce a usable archive from a half-written state.

use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::chunk::{encode_chunk, EncodeOptions};
use crate::crypto_envelope;
use crate::error::{ApackError, Result};
use crate::format::{
    crc32_of, name_hash_xxh3_32, AttributeValue, ChecksumAlgoId, ChunkHeader, CipherAlgoId, EncryptionBlock,
    EntryHeader, FileHeader, KdfAlgoId, TocEntry, Trailer, ArchiveStats, CHUNK_HEADER_SIZE, ENTRY_FLAG_COMPRESSED,
    ENTRY_FLAG_ENCRYPTED, MODE_COMPRESSED, MODE_ENCRYPTED, MODE_RANDOM_ACCESS, MODE_STREAM,
};
use crate::options::WriterOptions;
use crate::providers::checksum::ChecksumProvider;
use crate::providers::compression::CompressionProvider;
use crate::providers::encryption::EncryptionProvider;
use crate::providers::{checksum as checksum_providers, compression as compression_providers, encryption as encryption_providers, kdf as kdf_providers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    EntryOpen,
    EntryClosed,
    Closed,
    Failed,
}

struct OpenEntry {
    header_offset: u64,
    entry_id: u64,
    name: String,
    mime_type: String,
    attributes: Vec<(String, AttributeValue)>,
    original_size: u64,
    stored_size: u64,
    chunk_count: u32,
    chunk_header_offsets: Vec<u64>,
}

pub struct Writer<W: Write + Seek> {
    inner: W,
    state: WriterState,
    options: WriterOptions,
    checksum: Arc<dyn ChecksumProvider>,
    compression: Option<Arc<dyn CompressionProvider>>,
    encryption: Option<(Arc<dyn EncryptionProvider>, CipherAlgoId)>,
    cek: Option<[u8; 32]>,
    encryption_block: Option<EncryptionBlock>,
    next_entry_id: u64,
    toc: Vec<TocEntry>,
    stats: ArchiveStats,
    current_entry: Option<OpenEntry>,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(mut inner: W, options: WriterOptions) -> Result<Self> {
        let checksum_registry = checksum_providers::build_default_registry();
        let checksum = checksum_registry
            .get_by_name(&options.checksum_algo)
            .ok_or_else(|| ApackError::format(format!("unknown checksum algorithm '{}'", options.checksum_algo)))?;

        let compression = if options.compression_algo.eq_ignore_ascii_case("none") {
            None
        } else {
            let registry = compression_providers::build_default_registry();
            Some(
                registry.get_by_name(&options.compression_algo).ok_or_else(|| {
                    ApackError::format(format!("unknown compression algorithm '{}'", options.compression_algo))
                })?,
            )
        };

        let mut mode_flags = 0u8;
        if options.stream_mode {
            mode_flags |= MODE_STREAM;
        }
        if compression.is_some() {
            mode_flags |= MODE_COMPRESSED;
        }
        if options.random_access && !options.stream_mode {
            mode_flags |= MODE_RANDOM_ACCESS;
        }

        let mut encryption = None;
        let mut cek = None;
        let mut encryption_block = None;
        if let Some(algo) = &options.encryption_algo {
            let password = options
                .password
                .as_ref()
                .ok_or_else(|| ApackError::format("encryption requested but no password was provided"))?;

            let enc_registry = encryption_providers::build_default_registry();
            let provider = enc_registry
                .get_by_name(algo)
                .ok_or_else(|| ApackError::format(format!("unknown encryption algorithm '{algo}'")))?;
            let cipher_algo = match provider.numeric_id() {
                1 => CipherAlgoId::Aes256Gcm,
                2 => CipherAlgoId::ChaCha20Poly1305,
                other => return Err(ApackError::format(format!("unsupported cipher numeric id {other}"))),
            };

            let kdf_registry = kdf_providers::build_default_registry();
            let kdf_provider = kdf_registry
                .get_by_name(&options.kdf_algo)
                .ok_or_else(|| ApackError::format(format!("unknown KDF algorithm '{}'", options.kdf_algo)))?;
            let kdf_algo = match kdf_provider.numeric_id() {
                1 => KdfAlgoId::Argon2id,
                2 => KdfAlgoId::Pbkdf2HmacSha256,
                other => return Err(ApackError::format(format!("unsupported KDF numeric id {other}"))),
            };
            let kdf_params = match kdf_algo {
                KdfAlgoId::Argon2id => crate::format::KdfParams {
                    iterations: options.kdf_options.argon2_iterations,
                    memory_kib: options.kdf_options.argon2_memory_kib,
                    parallelism: options.kdf_options.argon2_parallelism,
                },
                KdfAlgoId::Pbkdf2HmacSha256 => crate::format::KdfParams {
                    iterations: options.kdf_options.pbkdf2_iterations,
                    memory_kib: 0,
                    parallelism: 1,
                },
            };

            let generated_cek = crypto_envelope::generate_cek();
            let block = crypto_envelope::build_encryption_block(
                kdf_algo,
                kdf_provider.as_ref(),
                cipher_algo,
                password,
                &generated_cek,
                kdf_params,
            )?;

            mode_flags |= MODE_ENCRYPTED;
            encryption = Some((provider, cipher_algo));
            cek = Some(generated_cek);
            encryption_block = Some(block);
        }

        let checksum_algo_id = match checksum.numeric_id() {
            0 => ChecksumAlgoId::Crc32,
            1 => ChecksumAlgoId::Xxh3_64,
            2 => ChecksumAlgoId::Xxh3_128,
            other => return Err(ApackError::format(format!("unsupported checksum numeric id {other}"))),
        };

        let file_header = FileHeader::new(checksum_algo_id, options.chunk_size, mode_flags);
        file_header.write(&mut inner)?;
        if let Some(block) = &encryption_block {
            block.write(&mut inner)?;
        }

        Ok(Self {
            inner,
            state: WriterState::Open,
            options,
            checksum,
            compression,
            encryption,
            cek,
            encryption_block,
            next_entry_id: 0,
            toc: Vec::new(),
            stats: ArchiveStats::default(),
            current_entry: None,
        })
    }

    fn fail<T>(&mut self, err: ApackError) -> Result<T> {
        self.state = WriterState::Failed;
        Err(err)
    }

    /// Begins a new entry. Writes a provisional entry header immediately
    /// (sizes and chunk count are patched in on `close_entry`), since the
    /// variable-length fields (name, MIME type, attributes) fix the
    /// header's total size before any chunk is written.
    pub fn open_entry(&mut self, name: &str, mime_type: &str, attributes: Vec<(String, AttributeValue)>) -> Result<()> {
        match self.state {
            WriterState::Open | WriterState::EntryClosed => {}
            _ => return self.fail(ApackError::format("open_entry called outside Open/EntryClosed state")),
        }

        let mut flags = 0u8;
        if self.compression.is_some() {
            flags |= ENTRY_FLAG_COMPRESSED;
        }
        if self.encryption.is_some() {
            flags |= ENTRY_FLAG_ENCRYPTED;
        }

        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;

        let header_offset = match self.inner.stream_position() {
            Ok(pos) => pos,
            Err(e) => return self.fail(e.into()),
        };

        let header = EntryHeader {
            flags,
            entry_id,
            original_size: 0,
            stored_size: 0,
            chunk_count: 0,
            compression_algo_id: self.compression.as_ref().map(|p| p.numeric_id()).unwrap_or(0),
            encryption_algo_id: self.encryption.as_ref().map(|(p, _)| p.numeric_id()).unwrap_or(0),
            name: name.to_owned(),
            mime_type: mime_type.to_owned(),
            attributes,
        };
        if let Err(e) = header.write(&mut self.inner) {
            return self.fail(e);
        }

        self.current_entry = Some(OpenEntry {
            header_offset,
            entry_id,
            name: name.to_owned(),
            mime_type: mime_type.to_owned(),
            attributes: header.attributes.clone(),
            original_size: 0,
            stored_size: 0,
            chunk_count: 0,
            chunk_header_offsets: Vec::new(),
        });
        self.state = WriterState::EntryOpen;
        Ok(())
    }

    /// Encodes and writes one chunk of the currently open entry's data.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if self.state != WriterState::EntryOpen {
            return self.fail(ApackError::format("write_chunk called outside EntryOpen state"));
        }

        let chunk_index = self.current_entry.as_ref().unwrap().chunk_count;
        let opts = EncodeOptions {
            chunk_index,
            is_last: false,
            checksum: self.checksum.as_ref(),
            compression: self.compression.as_ref().map(|p| (p.as_ref(), self.options.compression_level)),
            encryption: match (&self.encryption, &self.cek) {
                (Some((provider, _)), Some(cek)) => Some((provider.as_ref(), cek.as_slice())),
                _ => None,
            },
        };

        let (header, body) = match encode_chunk(data, &opts) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };

        let chunk_offset = match self.inner.stream_position() {
            Ok(pos) => pos,
            Err(e) => return self.fail(e.into()),
        };
        if let Err(e) = header.write(&mut self.inner) {
            return self.fail(e);
        }
        if let Err(e) = self.inner.write_all(&body) {
            return self.fail(e.into());
        }

        let entry = self.current_entry.as_mut().unwrap();
        entry.original_size += header.original_size as u64;
        entry.stored_size += CHUNK_HEADER_SIZE as u64 + header.stored_size as u64;
        entry.chunk_count += 1;
        entry.chunk_header_offsets.push(chunk_offset);
        Ok(())
    }

    /// Closes the currently open entry: patches the last chunk's LAST flag,
    /// rewrites the entry header with final sizes, and records a TOC entry.
    pub fn close_entry(&mut self) -> Result<()> {
        if self.state != WriterState::EntryOpen {
            return self.fail(ApackError::format("close_entry called outside EntryOpen state"));
        }
        let entry = self.current_entry.take().unwrap();

        if let Some(&last_offset) = entry.chunk_header_offsets.last() {
            if let Err(e) = self.mark_chunk_last(last_offset) {
                return self.fail(e);
            }
        }

        let header = EntryHeader {
            flags: {
                let mut f = 0u8;
                if self.compression.is_some() {
                    f |= ENTRY_FLAG_COMPRESSED;
                }
                if self.encryption.is_some() {
                    f |= ENTRY_FLAG_ENCRYPTED;
                }
                f
            },
            entry_id: entry.entry_id,
            original_size: entry.original_size,
            stored_size: entry.stored_size,
            chunk_count: entry.chunk_count,
            compression_algo_id: self.compression.as_ref().map(|p| p.numeric_id()).unwrap_or(0),
            encryption_algo_id: self.encryption.as_ref().map(|(p, _)| p.numeric_id()).unwrap_or(0),
            name: entry.name.clone(),
            mime_type: entry.mime_type.clone(),
            attributes: entry.attributes.clone(),
        };

        let resume_offset = match self.inner.stream_position() {
            Ok(pos) => pos,
            Err(e) => return self.fail(e.into()),
        };
        if let Err(e) = self.inner.seek(SeekFrom::Start(entry.header_offset)) {
            return self.fail(e.into());
        }
        if let Err(e) = header.write(&mut self.inner) {
            return self.fail(e);
        }
        if let Err(e) = self.inner.seek(SeekFrom::Start(resume_offset)) {
            return self.fail(e.into());
        }

        self.stats.total_original_size += entry.original_size;
        self.stats.total_stored_size += entry.stored_size;

        self.toc.push(TocEntry {
            entry_id: entry.entry_id,
            name_hash: name_hash_xxh3_32(&entry.name),
            entry_offset: entry.header_offset,
            original_size: entry.original_size,
            stored_size: entry.stored_size,
        });

        self.state = WriterState::EntryClosed;
        Ok(())
    }

    fn mark_chunk_last(&mut self, chunk_header_offset: u64) -> Result<()> {
        let flags_field_offset = chunk_header_offset + 20; // chunk_index(4)+original_size(4)+stored_size(4)+checksum(8)

        let resume = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(chunk_header_offset))?;
        let mut raw = ChunkHeaderRaw::read(&mut self.inner)?;
        raw.flags |= crate::format::CHUNK_FLAG_LAST;
        self.inner.seek(SeekFrom::Start(flags_field_offset))?;
        self.inner.write_all(&raw.flags.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(resume))?;
        Ok(())
    }

    /// Closes the archive: writes the TOC (unless in stream mode) and the
    /// trailer, then patches the file header's `entry_count`/`trailer_offset`.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Failed {
            return Err(ApackError::format("writer is in a failed state and cannot produce a valid archive"));
        }
        if self.state == WriterState::EntryOpen {
            return self.fail(ApackError::format("close called with an entry still open"));
        }
        if self.state == WriterState::Closed {
            return Ok(());
        }

        let toc_offset = self.inner.stream_position()?;
        let mut toc_bytes = Vec::new();
        if !self.options.stream_mode {
            for entry in &self.toc {
                entry.write(&mut toc_bytes)?;
            }
            self.inner.write_all(&toc_bytes)?;
        }

        let trailer = Trailer {
            entry_count: self.toc.len() as u64,
            toc_checksum: crc32_of(&toc_bytes),
            stats: self.stats,
        };
        let trailer_offset = self.inner.stream_position()?;
        trailer.write(&mut self.inner)?;
        let _ = toc_offset;

        self.inner.seek(SeekFrom::Start(0))?;
        let checksum_algo_id = match self.checksum.numeric_id() {
            0 => ChecksumAlgoId::Crc32,
            1 => ChecksumAlgoId::Xxh3_64,
            _ => ChecksumAlgoId::Xxh3_128,
        };
        let mut mode_flags = 0u8;
        if self.options.stream_mode {
            mode_flags |= MODE_STREAM;
        }
        if self.compression.is_some() {
            mode_flags |= MODE_COMPRESSED;
        }
        if self.options.random_access && !self.options.stream_mode {
            mode_flags |= MODE_RANDOM_ACCESS;
        }
        if self.encryption.is_some() {
            mode_flags |= MODE_ENCRYPTED;
        }
        let mut header = FileHeader::new(checksum_algo_id, self.options.chunk_size, mode_flags);
        header.entry_count = if self.options.stream_mode { 0 } else { self.toc.len() as u64 };
        header.trailer_offset = trailer_offset;
        header.write(&mut self.inner)?;

        self.inner.seek(SeekFrom::End(0))?;
        self.state = WriterState::Closed;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Minimal chunk-header reread used only to patch the `flags` field in
/// place; avoids pulling the full `ChunkHeader::read` (which expects to be
/// positioned at the header start and consumes the whole structure) into a
/// context where only the flags word needs to change.
struct ChunkHeaderRaw {
    flags: u32,
}

impl ChunkHeaderRaw {
    fn read<R: std::io::Read>(r: &mut R) -> Result<Self> {
        let header = ChunkHeader::read(r)?;
        Ok(Self { flags: header.flags })
    }
}
