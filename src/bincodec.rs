//! Little-endian primitive reader/writer with a monotonic byte counter, plus
//! length-prefixed byte-string and UTF-8-string helpers used by every record
//! in `format.rs`.
//!
//! All multi-byte integers are little-endian; this is never negotiated.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{ApackError, Result};

/// Wraps a `Read` and counts every byte consumed, so callers can recover the
/// exact size of a variable-length record (e.g. an entry header) after
/// parsing it without the format storing that size explicitly.
pub struct ByteReader<R: Read> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, bytes_read: 0 }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8()?;
        self.bytes_read += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = self.inner.read_u16::<LittleEndian>()?;
        self.bytes_read += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = self.inner.read_u32::<LittleEndian>()?;
        self.bytes_read += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let v = self.inner.read_u64::<LittleEndian>()?;
        self.bytes_read += 8;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let v = self.inner.read_i64::<LittleEndian>()?;
        self.bytes_read += 8;
        Ok(v)
    }

    pub fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.bytes_read += n as u64;
        Ok(buf)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        self.bytes_read += N as u64;
        Ok(buf)
    }

    /// Length-prefixed (u16) byte string.
    pub fn read_bytes_u16(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u16()? as usize;
        self.read_exact_bytes(len)
    }

    /// Length-prefixed (u32) byte string.
    pub fn read_bytes_u32(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_exact_bytes(len)
    }

    /// Length-prefixed (u16) UTF-8 string.
    pub fn read_string_u16(&mut self) -> Result<String> {
        let bytes = self.read_bytes_u16()?;
        String::from_utf8(bytes).map_err(|e| ApackError::format(format!("invalid UTF-8: {e}")))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// Wraps a `Write` and counts every byte emitted.
pub struct ByteWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, bytes_written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_u8(v)?;
        self.bytes_written += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.inner.write_u16::<LittleEndian>(v)?;
        self.bytes_written += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_u32::<LittleEndian>(v)?;
        self.bytes_written += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.inner.write_u64::<LittleEndian>(v)?;
        self.bytes_written += 8;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.inner.write_i64::<LittleEndian>(v)?;
        self.bytes_written += 8;
        Ok(())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.inner.write_all(b)?;
        self.bytes_written += b.len() as u64;
        Ok(())
    }

    /// Length-prefixed (u16) byte string. Errors if `b.len()` overflows u16.
    pub fn write_bytes_u16(&mut self, b: &[u8]) -> Result<()> {
        if b.len() > u16::MAX as usize {
            return Err(ApackError::format(format!(
                "byte string of {} bytes overflows u16 length prefix",
                b.len()
            )));
        }
        self.write_u16(b.len() as u16)?;
        self.write_bytes(b)
    }

    /// Length-prefixed (u32) byte string. Errors if `b.len()` overflows u32.
    pub fn write_bytes_u32(&mut self, b: &[u8]) -> Result<()> {
        if b.len() > u32::MAX as usize {
            return Err(ApackError::format(format!(
                "byte string of {} bytes overflows u32 length prefix",
                b.len()
            )));
        }
        self.write_u32(b.len() as u32)?;
        self.write_bytes(b)
    }

    /// Length-prefixed (u16) UTF-8 string.
    pub fn write_string_u16(&mut self, s: &str) -> Result<()> {
        self.write_bytes_u16(s.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}
