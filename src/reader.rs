//! Archive reader — parses the container structure up front, then serves
//! entry reads against that parsed index.
//!
//! Every stored offset or size is checked against the file's actual length
//! before it is trusted for a seek or a read. A corrupted or hostile
//! trailer/TOC/entry-header field can only ever cause an error, never an
//! out-of-bounds read.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::chunk::{decode_chunk, DecodeOptions};
use crate::crypto_envelope;
use crate::error::{ApackError, Result};
use crate::format::{
    name_hash_xxh3_32, AttributeValue, ChunkHeader, EncryptionBlock, EntryHeader, EntryMeta, FileHeader, TocEntry,
    Trailer, CHUNK_HEADER_SIZE, FILE_HEADER_SIZE, TOC_ENTRY_SIZE,
};
use crate::limits::SecurityLimits;
use crate::providers::checksum::ChecksumProvider;
use crate::providers::compression::CompressionProvider;
use crate::providers::encryption::EncryptionProvider;
use crate::providers::{checksum as checksum_providers, compression as compression_providers, encryption as encryption_providers, kdf as kdf_providers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Open,
    Closed,
}

pub struct Reader<R: Read + Seek> {
    inner: R,
    state: ReaderState,
    file_len: u64,
    header: FileHeader,
    encryption_block: Option<EncryptionBlock>,
    cek: Option<[u8; 32]>,
    checksum: Arc<dyn ChecksumProvider>,
    limits: SecurityLimits,
    entries_by_id: HashMap<u64, EntryMeta>,
    name_buckets: HashMap<u32, Vec<u64>>,
    order: Vec<u64>,
}

impl<R: Read + Seek> Reader<R> {
    pub fn open(inner: R) -> Result<Self> {
        Self::open_impl(inner, None)
    }

    /// Opens an archive, deriving the content-encryption key from
    /// `password` when an encryption block is present. If `ENCRYPTED` is
    /// set in the file header but no encryption block follows it, this
    /// fails with `ApackError::Crypto` — there is no KDF material to derive
    /// anything from. Use `open_with_key` for that situation instead.
    pub fn open_with_password(inner: R, password: &str) -> Result<Self> {
        let mut reader = Self::open_impl(inner, None)?;
        if reader.header.is_encrypted() {
            let block = reader
                .encryption_block
                .clone()
                .ok_or(ApackError::Crypto)?;
            let kdf_registry = kdf_providers::build_default_registry();
            let kdf = kdf_registry
                .get_by_numeric_id(block.kdf_algo as u8)
                .ok_or(ApackError::Crypto)?;
            let cek = crypto_envelope::open_encryption_block(&block, kdf.as_ref(), password)?;
            reader.cek = Some(cek);
        }
        Ok(reader)
    }

    /// Opens an archive supplying the content-encryption key directly,
    /// bypassing the encryption block entirely. This is the out-of-band
    /// path for an archive whose `ENCRYPTED` flag is set without a
    /// corresponding encryption block — `open`/`open_with_password` both
    /// refuse to read entries in that case.
    pub fn open_with_key(inner: R, key: [u8; 32]) -> Result<Self> {
        let mut reader = Self::open_impl(inner, None)?;
        reader.cek = Some(key);
        Ok(reader)
    }

    fn open_impl(mut inner: R, _unused: Option<()>) -> Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        if file_len < FILE_HEADER_SIZE as u64 {
            return Err(ApackError::format("file too small to contain a file header"));
        }
        let header = FileHeader::read(&mut inner)?;

        let mut encryption_block = None;
        if header.is_encrypted() {
            let mark = inner.stream_position()?;
            let mut magic_probe = [0u8; 4];
            let enough_room = mark + 4 <= file_len;
            if enough_room {
                inner.read_exact(&mut magic_probe)?;
                inner.seek(SeekFrom::Start(mark))?;
                if &magic_probe == crate::format::ENCR_MAGIC {
                    encryption_block = Some(EncryptionBlock::read(&mut inner)?);
                }
            }
        }

        let checksum_registry = checksum_providers::build_default_registry();
        let checksum = checksum_registry
            .get_by_numeric_id(header.checksum_algo as u8)
            .ok_or_else(|| ApackError::format("file header names an unregistered checksum algorithm"))?;

        let limits = SecurityLimits::default();
        let mut entries_by_id = HashMap::new();
        let mut name_buckets: HashMap<u32, Vec<u64>> = HashMap::new();
        let mut order = Vec::new();

        if header.is_stream() {
            let post_header_offset = inner.stream_position()?;
            if post_header_offset < file_len {
                let meta = read_entry_meta_sequential(&mut inner, post_header_offset, file_len)?;
                name_buckets.entry(meta.name_hash).or_default().push(meta.entry_id);
                order.push(meta.entry_id);
                entries_by_id.insert(meta.entry_id, meta);
            }
        } else {
            let header_end = inner.stream_position()?;
            if header.trailer_offset == 0 || header.trailer_offset >= file_len {
                return Err(ApackError::format("trailer_offset is outside the file bounds"));
            }
            inner.seek(SeekFrom::Start(header.trailer_offset))?;
            let trailer = Trailer::read(&mut inner)?;

            let toc_entry_count = header.entry_count;
            let toc_bytes_len = toc_entry_count
                .checked_mul(TOC_ENTRY_SIZE as u64)
                .ok_or_else(|| ApackError::format("TOC size overflows u64"))?;
            if toc_bytes_len > header.trailer_offset - header_end {
                return Err(ApackError::format("TOC size does not fit between the header and the trailer"));
            }
            let toc_offset = header.trailer_offset - toc_bytes_len;

            inner.seek(SeekFrom::Start(toc_offset))?;
            let mut toc_bytes = vec![0u8; toc_bytes_len as usize];
            inner.read_exact(&mut toc_bytes)?;
            if crate::format::crc32_of(&toc_bytes) != trailer.toc_checksum {
                return Err(ApackError::format("TOC checksum mismatch — corrupted archive"));
            }

            let mut toc_entries = Vec::with_capacity(toc_entry_count as usize);
            {
                let mut cursor = std::io::Cursor::new(&toc_bytes);
                for _ in 0..toc_entry_count {
                    toc_entries.push(TocEntry::read(&mut cursor)?);
                }
            }

            for toc_entry in toc_entries {
                if toc_entry.entry_offset >= toc_offset || toc_entry.entry_offset < header_end {
                    return Err(ApackError::format("TOC entry offset is outside the valid entry region"));
                }
                inner.seek(SeekFrom::Start(toc_entry.entry_offset))?;
                let (entry_header, header_size) = EntryHeader::read_verified(&mut inner)?;
                if toc_entry.entry_offset + header_size > toc_offset {
                    return Err(ApackError::format("entry header overruns the TOC region"));
                }

                let meta = EntryMeta {
                    entry_id: entry_header.entry_id,
                    name: entry_header.name.clone(),
                    mime_type: entry_header.mime_type.clone(),
                    attributes: entry_header.attributes.clone(),
                    name_hash: toc_entry.name_hash,
                    entry_offset: toc_entry.entry_offset + header_size,
                    original_size: toc_entry.original_size,
                    stored_size: toc_entry.stored_size,
                    chunk_count: entry_header.chunk_count,
                    compression_algo_id: entry_header.compression_algo_id,
                    encryption_algo_id: entry_header.encryption_algo_id,
                    is_encrypted: entry_header.is_encrypted(),
                    is_compressed: entry_header.is_compressed(),
                };

                if meta.entry_offset + meta.stored_size > toc_offset {
                    return Err(ApackError::format("entry body overruns the TOC region"));
                }

                name_buckets.entry(meta.name_hash).or_default().push(meta.entry_id);
                order.push(meta.entry_id);
                entries_by_id.insert(meta.entry_id, meta);
            }
        }

        Ok(Self {
            inner,
            state: ReaderState::Open,
            file_len,
            header,
            encryption_block,
            cek: None,
            checksum,
            limits,
            entries_by_id,
            name_buckets,
            order,
        })
    }

    pub fn list(&self) -> Vec<&EntryMeta> {
        self.order.iter().filter_map(|id| self.entries_by_id.get(id)).collect()
    }

    pub fn get_entry_by_id(&self, entry_id: u64) -> Result<&EntryMeta> {
        self.entries_by_id
            .get(&entry_id)
            .ok_or_else(|| ApackError::EntryNotFound(entry_id.to_string()))
    }

    pub fn get_entry_by_name(&self, name: &str) -> Result<&EntryMeta> {
        let hash = name_hash_xxh3_32(name);
        let bucket = self.name_buckets.get(&hash);
        let found = bucket.and_then(|ids| {
            ids.iter()
                .map(|id| &self.entries_by_id[id])
                .find(|meta| meta.name == name)
        });
        found.ok_or_else(|| ApackError::EntryNotFound(name.to_owned()))
    }

    pub fn read_entry(&mut self, entry_id: u64) -> Result<Vec<u8>> {
        if self.state == ReaderState::Closed {
            return Err(ApackError::format("read_entry called after close"));
        }
        let meta = self
            .entries_by_id
            .get(&entry_id)
            .ok_or_else(|| ApackError::EntryNotFound(entry_id.to_string()))?
            .clone();

        if meta.entry_offset + meta.stored_size > self.file_len {
            return Err(ApackError::format("entry body extends past end of file"));
        }

        let compression: Option<Arc<dyn CompressionProvider>> = if meta.is_compressed {
            let registry = compression_providers::build_default_registry();
            Some(
                registry
                    .get_by_numeric_id(meta.compression_algo_id)
                    .ok_or_else(|| ApackError::format("entry names an unregistered compression algorithm"))?,
            )
        } else {
            None
        };

        let encryption: Option<Arc<dyn EncryptionProvider>> = if meta.is_encrypted {
            let registry = encryption_providers::build_default_registry();
            Some(
                registry
                    .get_by_numeric_id(meta.encryption_algo_id)
                    .ok_or_else(|| ApackError::format("entry names an unregistered encryption algorithm"))?,
            )
        } else {
            None
        };
        if meta.is_encrypted && self.cek.is_none() {
            return Err(ApackError::Crypto);
        }

        self.inner.seek(SeekFrom::Start(meta.entry_offset))?;

        let mut out = Vec::with_capacity(meta.original_size.min(self.limits.max_chunk_original_size * 4) as usize);
        let mut index = 0u32;
        loop {
            let pos = self.inner.stream_position()?;
            if pos >= meta.entry_offset + meta.stored_size {
                break;
            }
            let chunk_header = ChunkHeader::read(&mut self.inner)?;
            if chunk_header.chunk_index != index {
                return Err(ApackError::format("chunk index is out of sequence"));
            }
            let mut body = vec![0u8; chunk_header.stored_size as usize];
            self.inner.read_exact(&mut body)?;

            let key_slice = self.cek.as_ref().map(|k| k.as_slice());
            let decode_opts = DecodeOptions {
                checksum: self.checksum.as_ref(),
                compression: compression.as_deref(),
                encryption: match (&encryption, key_slice) {
                    (Some(provider), Some(key)) => Some((provider.as_ref(), key)),
                    _ => None,
                },
                limits: &self.limits,
            };
            let plaintext = decode_chunk(&chunk_header, &body, &decode_opts)?;
            out.extend_from_slice(&plaintext);

            index += 1;
            if chunk_header.is_last() {
                break;
            }
        }

        if out.len() as u64 != meta.original_size {
            return Err(ApackError::format("reassembled entry size does not match its declared original size"));
        }
        Ok(out)
    }

    /// Reads every entry end-to-end, continuing past failures so one
    /// corrupted entry does not prevent verifying the rest of the archive.
    pub fn verify_all(&mut self) -> Vec<(u64, Option<ApackError>)> {
        let ids: Vec<u64> = self.order.clone();
        ids.into_iter()
            .map(|id| match self.read_entry(id) {
                Ok(_) => (id, None),
                Err(e) => (id, Some(e)),
            })
            .collect()
    }

    pub fn close(&mut self) {
        self.state = ReaderState::Closed;
    }

    pub fn entry_count(&self) -> usize {
        self.order.len()
    }
}

/// Reconstructs a single entry's metadata by walking its chunk headers
/// sequentially until the last-chunk flag, used for `STREAM` mode archives
/// that carry no TOC.
fn read_entry_meta_sequential<R: Read + Seek>(inner: &mut R, start: u64, file_len: u64) -> Result<EntryMeta> {
    inner.seek(SeekFrom::Start(start))?;
    let (entry_header, header_size) = EntryHeader::read_verified(inner)?;
    let body_start = start + header_size;
    if body_start > file_len {
        return Err(ApackError::format("entry header overruns end of file"));
    }

    let mut pos = body_start;
    let mut stored_size = 0u64;
    let mut original_size = 0u64;
    let mut chunk_count = 0u32;
    loop {
        if pos + CHUNK_HEADER_SIZE as u64 > file_len {
            return Err(ApackError::format("truncated chunk header while scanning stream entry"));
        }
        inner.seek(SeekFrom::Start(pos))?;
        let chunk_header = ChunkHeader::read(inner)?;
        let chunk_total = CHUNK_HEADER_SIZE as u64 + chunk_header.stored_size as u64;
        if pos + chunk_total > file_len {
            return Err(ApackError::format("truncated chunk body while scanning stream entry"));
        }
        stored_size += chunk_total;
        original_size += chunk_header.original_size as u64;
        chunk_count += 1;
        pos += chunk_total;
        if chunk_header.is_last() {
            break;
        }
    }

    Ok(EntryMeta {
        entry_id: entry_header.entry_id,
        name: entry_header.name.clone(),
        mime_type: entry_header.mime_type.clone(),
        attributes: entry_header.attributes.clone(),
        name_hash: name_hash_xxh3_32(&entry_header.name),
        entry_offset: body_start,
        original_size,
        stored_size,
        chunk_count,
        compression_algo_id: entry_header.compression_algo_id,
        encryption_algo_id: entry_header.encryption_algo_id,
        is_encrypted: entry_header.is_encrypted(),
        is_compressed: entry_header.is_compressed(),
    })
}

