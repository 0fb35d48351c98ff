//! High-level [`Archive`] API — the primary embedding surface for callers
//! who don't need [`crate::writer::Writer`]/[`crate::reader::Reader`]'s
//! chunk-by-chunk control.
//!
//! ```no_run
//! use apack::archive::Archive;
//! use apack::options::WriterOptions;
//!
//! // Write
//! let mut ar = Archive::create("out.apack", WriterOptions::default())?;
//! ar.add_entry("readme.txt", "text/plain", vec![], b"Hello, world!")?;
//! ar.finalize()?;
//!
//! // Read
//! let mut ar = Archive::open("out.apack")?;
//! let data = ar.read_entry_by_name("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), apack::error::ApackError>(())
//! ```

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ApackError, Result};
use crate::format::{AttributeValue, EntryMeta};
use crate::options::WriterOptions;
use crate::reader::Reader;
use crate::writer::Writer;

/// Lightweight descriptor returned by [`Archive::list`], independent of
/// whichever on-disk record (TOC entry vs. walked entry header) it was
/// reconstructed from.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub id: u64,
    pub name: String,
    pub mime_type: String,
    pub attributes: Vec<(String, AttributeValue)>,
    pub original_size: u64,
    pub stored_size: u64,
    pub chunk_count: u32,
    pub is_compressed: bool,
    pub is_encrypted: bool,
}

impl From<&EntryMeta> for EntryInfo {
    fn from(m: &EntryMeta) -> Self {
        Self {
            id: m.entry_id,
            name: m.name.clone(),
            mime_type: m.mime_type.clone(),
            attributes: m.attributes.clone(),
            original_size: m.original_size,
            stored_size: m.stored_size,
            chunk_count: m.chunk_count,
            is_compressed: m.is_compressed,
            is_encrypted: m.is_encrypted,
        }
    }
}

enum ArchiveMode {
    Read(Reader<File>),
    Write(Writer<File>, u32),
}

/// A thin `File`-backed wrapper over [`Writer`]/[`Reader`] that owns its
/// byte source/sink for the archive's whole lifetime and hides entry
/// chunking behind a single `add_entry`/`read_entry` call.
pub struct Archive {
    path: PathBuf,
    mode: ArchiveMode,
}

impl Archive {
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let chunk_size = options.chunk_size;
        let file = File::create(&path)?;
        let writer = Writer::new(file, options)?;
        Ok(Self { path, mode: ArchiveMode::Write(writer, chunk_size) })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let reader = Reader::open(file)?;
        Ok(Self { path, mode: ArchiveMode::Read(reader) })
    }

    pub fn open_encrypted<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let reader = Reader::open_with_password(file, password)?;
        Ok(Self { path, mode: ArchiveMode::Read(reader) })
    }

    /// Opens an archive whose `ENCRYPTED` flag is set without a matching
    /// `"ENCR"` block, supplying the content-encryption key directly. See
    /// [`Reader::open_with_key`] — flagged as a footgun in DESIGN.md.
    pub fn open_with_key<P: AsRef<Path>>(path: P, key: [u8; 32]) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let reader = Reader::open_with_key(file, key)?;
        Ok(Self { path, mode: ArchiveMode::Read(reader) })
    }

    /// Adds one entry, splitting `data` into `chunk_size`-sized pieces and
    /// driving `open_entry`/`write_chunk`/`close_entry` for the caller.
    pub fn add_entry(
        &mut self,
        name: &str,
        mime_type: &str,
        attributes: Vec<(String, AttributeValue)>,
        data: &[u8],
    ) -> Result<()> {
        let (writer, chunk_size) = match &mut self.mode {
            ArchiveMode::Write(w, c) => (w, *c),
            ArchiveMode::Read(_) => return Err(read_only()),
        };
        writer.open_entry(name, mime_type, attributes)?;
        if data.is_empty() {
            writer.write_chunk(&[])?;
        } else {
            for piece in data.chunks(chunk_size as usize) {
                writer.write_chunk(piece)?;
            }
        }
        writer.close_entry()?;
        Ok(())
    }

    /// Flushes the TOC (unless stream mode) and trailer, and patches the
    /// file header. Must be called exactly once to produce a valid archive.
    pub fn finalize(&mut self) -> Result<()> {
        match &mut self.mode {
            ArchiveMode::Write(w, _) => w.close(),
            ArchiveMode::Read(_) => Err(read_only()),
        }
    }

    pub fn list(&self) -> Vec<EntryInfo> {
        match &self.mode {
            ArchiveMode::Read(r) => r.list().into_iter().map(EntryInfo::from).collect(),
            ArchiveMode::Write(_, _) => Vec::new(),
        }
    }

    pub fn get_entry_by_name(&self, name: &str) -> Result<EntryInfo> {
        match &self.mode {
            ArchiveMode::Read(r) => r.get_entry_by_name(name).map(EntryInfo::from),
            ArchiveMode::Write(_, _) => Err(write_only()),
        }
    }

    pub fn get_entry_by_id(&self, id: u64) -> Result<EntryInfo> {
        match &self.mode {
            ArchiveMode::Read(r) => r.get_entry_by_id(id).map(EntryInfo::from),
            ArchiveMode::Write(_, _) => Err(write_only()),
        }
    }

    pub fn read_entry_by_id(&mut self, id: u64) -> Result<Vec<u8>> {
        match &mut self.mode {
            ArchiveMode::Read(r) => r.read_entry(id),
            ArchiveMode::Write(_, _) => Err(write_only()),
        }
    }

    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let id = self.get_entry_by_name(name)?.id;
        self.read_entry_by_id(id)
    }

    /// Opens every entry's chunk stream end-to-end and reports the first
    /// `ChecksumError`/`CryptoError` encountered per entry without
    /// aborting the whole scan (testable property #2, scenario S6).
    pub fn verify_all(&mut self) -> Result<Vec<(u64, Option<ApackError>)>> {
        match &mut self.mode {
            ArchiveMode::Read(r) => Ok(r.verify_all()),
            ArchiveMode::Write(_, _) => Err(write_only()),
        }
    }

    /// Extracts every entry into `dest`, creating it if necessary. Entry
    /// names are forward-slash separated per spec §3 and are joined onto
    /// `dest` as relative path components.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        let dest = dest.as_ref();
        if !dest.exists() {
            std::fs::create_dir_all(dest)?;
        }
        let entries: Vec<(u64, String)> = self.list().into_iter().map(|e| (e.id, e.name)).collect();
        for (id, name) in entries {
            let data = self.read_entry_by_id(id)?;
            let out_path = dest.join(&name);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out_path, data)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) {
        if let ArchiveMode::Read(mut r) = self.mode {
            r.close();
        }
    }
}

fn read_only() -> ApackError {
    ApackError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "archive is read-only"))
}
fn write_only() -> ApackError {
    ApackError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "archive is write-only"))
}
