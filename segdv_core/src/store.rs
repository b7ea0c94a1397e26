//! Byte-level streams shared by every writer and reader in the crate.
//!
//! Writes go through [`IndexOutput`], an append-only [`Write`] that tracks its
//! own file pointer and a running xxh3 checksum. Reads go through
//! [`IndexInput`], a cursor over shared immutable [`Bytes`]: cloning an input
//! yields an independent cursor over the same bytes, so many readers can be
//! derived from one opened file without locking.

use std::io::{self, Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};

// ── Encoding helpers ───────────────────────────────────────────────────────

/// Append the vlong encoding of `v` to an in-memory buffer.
pub fn push_vlong(buf: &mut Vec<u8>, mut v: u64) {
    while v & !0x7F != 0 {
        buf.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
    buf.push(v as u8);
}

#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

// ── Output ─────────────────────────────────────────────────────────────────

/// Variable-length and fixed-width primitives over any [`Write`].
///
/// Fixed-width integers are big-endian. `vint` uses 7-bit groups with a
/// continuation bit; a negative `vint` always takes five bytes.
pub trait DataOutput: Write {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_all(&[b])?;
        Ok(())
    }

    fn write_vint(&mut self, v: i32) -> Result<()> {
        let mut v = v as u32;
        while v & !0x7F != 0 {
            self.write_byte(((v & 0x7F) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    fn write_vlong(&mut self, v: u64) -> Result<()> {
        let mut v = v;
        while v & !0x7F != 0 {
            self.write_byte(((v & 0x7F) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    fn write_zlong(&mut self, v: i64) -> Result<()> {
        self.write_vlong(zigzag_encode(v))
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_i32::<BigEndian>(v)?;
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_i64::<BigEndian>(v)?;
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_vint(s.len() as i32)?;
        self.write_all(s.as_bytes())?;
        Ok(())
    }
}

impl<W: Write + ?Sized> DataOutput for W {}

/// A named, append-only output file.
pub trait IndexOutput: Write + Send {
    fn name(&self) -> &str;

    /// Number of bytes written so far.
    fn file_pointer(&self) -> u64;

    /// xxh3-64 of every byte written so far.
    fn checksum(&self) -> u64;

    /// Flush and release the underlying file.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Counts and hashes bytes on their way to an inner writer.
pub(crate) struct Tracked<W> {
    pub(crate) inner: W,
    pos: u64,
    hasher: Xxh3,
}

impl<W: Write> Tracked<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            pos: 0,
            hasher: Xxh3::new(),
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn digest(&self) -> u64 {
        self.hasher.digest()
    }
}

impl<W: Write> Write for Tracked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── Input ──────────────────────────────────────────────────────────────────

/// Random-access cursor over an immutable file image.
///
/// `Clone` duplicates the cursor, not the bytes.
#[derive(Clone)]
pub struct IndexInput {
    name: Arc<str>,
    data: Bytes,
    pos: usize,
}

impl std::fmt::Debug for IndexInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexInput")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .finish()
    }
}

impl IndexInput {
    pub fn new(name: impl Into<Arc<str>>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
            pos: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn file_pointer(&self) -> u64 {
        self.pos as u64
    }

    /// The whole file image, independent of the cursor.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len() {
            return Err(self.eof(pos));
        }
        self.pos = pos as usize;
        Ok(())
    }

    /// A new input over `len` bytes starting at `offset`, positioned at 0.
    pub fn slice(&self, offset: u64, len: u64) -> Result<IndexInput> {
        let end = offset.checked_add(len).filter(|&end| end <= self.len());
        let end = end.ok_or_else(|| self.eof(offset.saturating_add(len)))?;
        Ok(IndexInput {
            name: self.name.clone(),
            data: self.data.slice(offset as usize..end as usize),
            pos: 0,
        })
    }

    fn eof(&self, at: u64) -> Error {
        Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("read past EOF: {} (at {}, length {})", self.name, at, self.data.len()),
        ))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.eof(self.pos as u64))?;
        self.pos += 1;
        Ok(b)
    }

    /// End offset of a `len`-byte read from the cursor, if it stays in bounds.
    fn read_end(&self, len: usize) -> Result<usize> {
        self.pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.eof((self.pos as u64).saturating_add(len as u64)))
    }

    pub fn read_exact_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let end = self.read_end(dst.len())?;
        dst.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Zero-copy read of the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<Bytes> {
        let end = self.read_end(len)?;
        let out = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(out)
    }

    pub fn read_vint(&mut self) -> Result<i32> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7F) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 28 {
                return Err(Error::corrupt(format!("vint too long in {}", self.name)));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7F) as u32) << shift;
            shift += 7;
        }
        Ok(v as i32)
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7F) as u64;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 63 {
                return Err(Error::corrupt(format!("vlong too long in {}", self.name)));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7F) as u64) << shift;
            shift += 7;
        }
        Ok(v)
    }

    pub fn read_zlong(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_vlong()?))
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let pos = self.pos;
        self.read_i32::<BigEndian>().map_err(|_| self.eof(pos as u64 + 4))
    }

    pub fn read_long(&mut self) -> Result<i64> {
        let pos = self.pos;
        self.read_i64::<BigEndian>().map_err(|_| self.eof(pos as u64 + 8))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()?;
        if len < 0 {
            return Err(Error::corrupt(format!("negative string length {len}")));
        }
        let raw = self.read_slice(len as usize)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::corrupt(format!("invalid utf-8 string in {}: {e}", self.name)))
    }
}

impl Read for IndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(buf: Vec<u8>) -> IndexInput {
        IndexInput::new("test", Bytes::from(buf))
    }

    #[test]
    fn test_vint_lengths() {
        let mut buf = Vec::new();
        buf.write_vint(0).unwrap();
        buf.write_vint(127).unwrap();
        buf.write_vint(128).unwrap();
        buf.write_vint(-1).unwrap();
        // 1 + 1 + 2 + 5
        assert_eq!(buf.len(), 9);

        let mut inp = input(buf);
        assert_eq!(inp.read_vint().unwrap(), 0);
        assert_eq!(inp.read_vint().unwrap(), 127);
        assert_eq!(inp.read_vint().unwrap(), 128);
        assert_eq!(inp.read_vint().unwrap(), -1);
        assert_eq!(inp.file_pointer(), inp.len());
    }

    #[test]
    fn test_fixed_width_is_big_endian() {
        let mut buf = Vec::new();
        DataOutput::write_int(&mut buf, 0x0102_0304).unwrap();
        buf.write_long(-2).unwrap();
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);

        let mut inp = input(buf);
        assert_eq!(inp.read_int().unwrap(), 0x0102_0304);
        assert_eq!(inp.read_long().unwrap(), -2);
    }

    #[test]
    fn test_zigzag_extremes() {
        for v in [0i64, -1, 1, i64::MIN, i64::MAX, -64, 63] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
        let mut buf = Vec::new();
        buf.write_zlong(i64::MIN).unwrap();
        buf.write_vlong(u64::MAX).unwrap();
        let mut inp = input(buf);
        assert_eq!(inp.read_zlong().unwrap(), i64::MIN);
        assert_eq!(inp.read_vlong().unwrap(), u64::MAX);
    }

    #[test]
    fn test_push_vlong_matches_writer() {
        for v in [0u64, 127, 128, 300, u64::MAX] {
            let mut written = Vec::new();
            written.write_vlong(v).unwrap();
            let mut pushed = Vec::new();
            push_vlong(&mut pushed, v);
            assert_eq!(pushed, written, "{v}");
        }
    }

    #[test]
    fn test_clone_is_independent_cursor() {
        let mut a = input(vec![1, 2, 3, 4]);
        a.read_byte().unwrap();
        let mut b = a.clone();
        assert_eq!(b.read_byte().unwrap(), 2);
        assert_eq!(b.read_byte().unwrap(), 3);
        assert_eq!(a.read_byte().unwrap(), 2);
    }

    #[test]
    fn test_read_past_eof() {
        let mut inp = input(vec![0x80]);
        let err = inp.read_vint().unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(inp.seek(2).is_err());
        assert!(inp.slice(0, 2).is_err());
    }

    #[test]
    fn test_huge_read_length_is_eof() {
        let mut inp = input(vec![1, 2, 3, 4]);
        inp.read_byte().unwrap();
        let err = inp.read_slice(usize::MAX).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        // cursor is untouched by the failed read
        assert_eq!(inp.read_byte().unwrap(), 2);
        assert!(inp.read_slice(4).is_err());
        assert_eq!(inp.read_slice(2).unwrap().as_ref(), &[3, 4]);
    }

    #[test]
    fn test_tracked_output_checksum() {
        let mut t = Tracked::new(Vec::new());
        t.write_all(b"hello").unwrap();
        assert_eq!(t.position(), 5);
        assert_eq!(t.digest(), xxhash_rust::xxh3::xxh3_64(b"hello"));
    }
}
