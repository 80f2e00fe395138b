// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Bounds-checked cursors over in-memory buffers. Every boot image container
//! and the cpio archive are parsed with [`ByteReader`] and emitted with
//! [`ByteWriter`].

use std::mem;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{format::padding, util};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Reading {size} bytes at offset {offset} exceeds buffer size {len}")]
    OutOfBounds { offset: usize, size: usize, len: usize },
    #[error("Offset {offset} is beyond buffer size {len}")]
    InvalidOffset { offset: usize, len: usize },
    #[error("Aligning offset {offset} to {alignment} overflows")]
    AlignmentOverflow { offset: usize, alignment: usize },
}

type Result<T> = std::result::Result<T, Error>;

/// Byte order of a multi-byte field. Container formats are fixed-endian and
/// never depend on the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A read cursor over a fixed-size byte buffer.
#[derive(Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unread part of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::InvalidOffset {
                offset,
                len: self.data.len(),
            });
        }

        self.pos = offset;
        Ok(())
    }

    pub fn read_bytes(&mut self, size: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(size)
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::OutOfBounds {
                offset: self.pos,
                size,
                len: self.data.len(),
            })?;

        let buf = &self.data[self.pos..end];
        self.pos = end;

        Ok(buf)
    }

    pub fn skip(&mut self, size: usize) -> Result<()> {
        self.read_bytes(size).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    /// Read `size` bytes and return the portion before the first NUL byte.
    pub fn read_fixed_string(&mut self, size: usize) -> Result<&'a [u8]> {
        let buf = self.read_bytes(size)?;
        let end = memchr::memchr(0, buf).unwrap_or(buf.len());

        Ok(&buf[..end])
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        let buf = self.read_array::<2>()?;
        Ok(match endian {
            Endian::Little => u16::from_le_bytes(buf),
            Endian::Big => u16::from_be_bytes(buf),
        })
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        let buf = self.read_array::<4>()?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(buf),
            Endian::Big => u32::from_be_bytes(buf),
        })
    }

    pub fn read_u64(&mut self, endian: Endian) -> Result<u64> {
        let buf = self.read_array::<8>()?;
        Ok(match endian {
            Endian::Little => u64::from_le_bytes(buf),
            Endian::Big => u64::from_be_bytes(buf),
        })
    }

    /// Read a plain-old-data structure. Field endianness is encoded in the
    /// structure's field types.
    pub fn read_struct<T: FromBytes + KnownLayout + Immutable>(&mut self) -> Result<T> {
        let offset = self.pos;
        let buf = self.read_bytes(mem::size_of::<T>())?;

        T::read_from_bytes(buf).map_err(|_| Error::OutOfBounds {
            offset,
            size: mem::size_of::<T>(),
            len: self.data.len(),
        })
    }

    /// Skip to the next multiple of `alignment`. Returns the number of bytes
    /// skipped.
    pub fn align(&mut self, alignment: usize) -> Result<usize> {
        let padding = padding::calc(self.pos, alignment);
        self.skip(padding)?;
        Ok(padding)
    }
}

/// A write cursor over a growable buffer.
#[derive(Clone, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn position(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn write_bytes(&mut self, buf: &[u8]) {
        self.data.extend_from_slice(buf);
    }

    pub fn write_zeros(&mut self, size: usize) {
        let mut remain = size;

        while remain > 0 {
            let n = remain.min(util::ZEROS.len());
            self.data.extend_from_slice(&util::ZEROS[..n]);
            remain -= n;
        }
    }

    pub fn write_u16(&mut self, value: u16, endian: Endian) {
        match endian {
            Endian::Little => self.write_bytes(&value.to_le_bytes()),
            Endian::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(&mut self, value: u32, endian: Endian) {
        match endian {
            Endian::Little => self.write_bytes(&value.to_le_bytes()),
            Endian::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u64(&mut self, value: u64, endian: Endian) {
        match endian {
            Endian::Little => self.write_bytes(&value.to_le_bytes()),
            Endian::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_struct<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.write_bytes(value.as_bytes());
    }

    /// Write zeros until the next multiple of `alignment`. Returns the number
    /// of bytes written.
    pub fn pad_to(&mut self, alignment: usize) -> Result<usize> {
        let offset = self.data.len();
        padding::round(offset, alignment).ok_or(Error::AlignmentOverflow { offset, alignment })?;

        let padding = padding::calc(offset, alignment);
        self.write_zeros(padding);

        Ok(padding)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn read_integers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u32(Endian::Little).unwrap(), 0x04030201);
        assert_eq!(reader.read_u32(Endian::Big).unwrap(), 0x05060708);
        assert_eq!(reader.remaining(), 0);

        reader.seek(0).unwrap();
        assert_eq!(reader.read_u16(Endian::Big).unwrap(), 0x0102);
        reader.seek(0).unwrap();
        assert_eq!(reader.read_u64(Endian::Little).unwrap(), 0x0807060504030201);
    }

    #[test]
    fn read_out_of_bounds() {
        let data = [0u8; 3];
        let mut reader = ByteReader::new(&data);

        assert_matches!(
            reader.read_u32(Endian::Little),
            Err(Error::OutOfBounds {
                offset: 0,
                size: 4,
                len: 3,
            })
        );
        // A failed read does not advance the cursor.
        assert_eq!(reader.position(), 0);

        assert_matches!(
            reader.seek(4),
            Err(Error::InvalidOffset { offset: 4, len: 3 })
        );
        reader.seek(3).unwrap();
        assert_matches!(reader.read_bytes(1), Err(Error::OutOfBounds { .. }));
    }

    #[test]
    fn fixed_string() {
        let data = *b"name\0garbage\0\0\0\0";
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_fixed_string(16).unwrap(), b"name");
        assert_eq!(reader.position(), 16);

        reader.seek(0).unwrap();
        assert_eq!(reader.read_fixed_string(3).unwrap(), b"nam");
    }

    #[test]
    fn alignment() {
        let data = [0u8; 16];
        let mut reader = ByteReader::new(&data);
        reader.skip(5).unwrap();
        assert_eq!(reader.align(4).unwrap(), 3);
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.align(4).unwrap(), 0);

        let mut writer = ByteWriter::new();
        writer.write_bytes(b"abcde");
        assert_eq!(writer.pad_to(4).unwrap(), 3);
        writer.write_u32(0xdeadbeef, Endian::Big);
        assert_eq!(writer.as_slice(), b"abcde\0\0\0\xde\xad\xbe\xef");
    }
}
