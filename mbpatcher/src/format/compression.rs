// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Cursor, Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use liblzma::{
    read::XzDecoder,
    stream::{Check, Stream},
    write::XzEncoder,
};
use lz4_flex::frame::FrameDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";
static LZ4_LEGACY_MAGIC: &[u8; 4] = b"\x02\x21\x4c\x18";
static XZ_MAGIC: &[u8; 6] = b"\xfd\x37\x7a\x58\x5a\x00";
static CPIO_MAGIC: &[u8; 5] = b"07070";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown compression format: {0:02x?}")]
    UnknownFormat(Vec<u8>),
    #[error("Failed to initialize XZ encoder")]
    XzInit(#[source] liblzma::stream::Error),
    #[error("Failed to decompress {0:?} data")]
    Decompress(CompressedFormat, #[source] io::Error),
    #[error("Failed to compress {0:?} data")]
    Compress(CompressedFormat, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

pub struct Lz4LegacyEncoder<W: Write> {
    writer: Option<W>,
    buf: Vec<u8>,
    n_filled: usize,
}

impl<W: Write> Lz4LegacyEncoder<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(LZ4_LEGACY_MAGIC)?;

        Ok(Self {
            writer: Some(writer),
            // We always use the max block size.
            buf: vec![0u8; 8 * 1024 * 1024],
            n_filled: 0,
        })
    }

    fn write_block(&mut self, force: bool) -> io::Result<()> {
        if !force && self.n_filled < self.buf.len() {
            return Ok(());
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::other("Encoder already finished"));
        };

        let compressed = lz4_flex::block::compress(&self.buf[..self.n_filled]);

        writer.write_all(&(compressed.len() as u32).to_le_bytes())?;
        writer.write_all(&compressed)?;

        self.n_filled = 0;

        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.write_block(true)?;
        self.writer
            .take()
            .ok_or_else(|| io::Error::other("Encoder already finished"))
    }
}

impl<W: Write> Drop for Lz4LegacyEncoder<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.write_block(true);
        }
    }
}

impl<W: Write> Write for Lz4LegacyEncoder<W> {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let total = buf.len();

        while !buf.is_empty() {
            let to_write = buf.len().min(self.buf.len() - self.n_filled);
            self.buf[self.n_filled..self.n_filled + to_write].copy_from_slice(&buf[..to_write]);

            self.n_filled += to_write;
            self.write_block(false)?;

            buf = &buf[to_write..];
        }

        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_block(false)
    }
}

/// Compression format of a ramdisk. `None` means a bare cpio archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CompressedFormat {
    None,
    Gzip,
    Lz4Legacy,
    Xz,
}

impl CompressedFormat {
    /// Detect the format from the leading bytes of the data.
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.starts_with(CPIO_MAGIC) {
            Ok(Self::None)
        } else if data.starts_with(GZIP_MAGIC) {
            Ok(Self::Gzip)
        } else if data.starts_with(LZ4_LEGACY_MAGIC) {
            Ok(Self::Lz4Legacy)
        } else if data.starts_with(XZ_MAGIC) {
            Ok(Self::Xz)
        } else {
            Err(Error::UnknownFormat(data[..data.len().min(6)].to_vec()))
        }
    }
}

pub enum CompressedReader<R: Read> {
    None(R),
    Gzip(GzDecoder<R>),
    Lz4(FrameDecoder<R>),
    Xz(XzDecoder<R>),
}

impl<R: Read> CompressedReader<R> {
    pub fn with_format(reader: R, format: CompressedFormat) -> Self {
        match format {
            CompressedFormat::None => Self::None(reader),
            CompressedFormat::Gzip => Self::Gzip(GzDecoder::new(reader)),
            CompressedFormat::Lz4Legacy => Self::Lz4(FrameDecoder::new(reader)),
            CompressedFormat::Xz => Self::Xz(XzDecoder::new(reader)),
        }
    }

    pub fn format(&self) -> CompressedFormat {
        match self {
            Self::None(_) => CompressedFormat::None,
            Self::Gzip(_) => CompressedFormat::Gzip,
            Self::Lz4(_) => CompressedFormat::Lz4Legacy,
            Self::Xz(_) => CompressedFormat::Xz,
        }
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::None(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
            Self::Lz4(r) => r.read(buf),
            Self::Xz(r) => r.read(buf),
        }
    }
}

#[allow(clippy::large_enum_variant)]
pub enum CompressedWriter<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
    Lz4Legacy(Lz4LegacyEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(writer: W, format: CompressedFormat) -> Result<Self> {
        match format {
            CompressedFormat::None => Ok(Self::None(writer)),
            CompressedFormat::Gzip => {
                Ok(Self::Gzip(GzEncoder::new(writer, Compression::default())))
            }
            CompressedFormat::Lz4Legacy => {
                let encoder = Lz4LegacyEncoder::new(writer)
                    .map_err(|e| Error::Compress(CompressedFormat::Lz4Legacy, e))?;
                Ok(Self::Lz4Legacy(encoder))
            }
            CompressedFormat::Xz => {
                // Some kernels are compiled without support for the default CRC64.
                let stream = Stream::new_easy_encoder(6, Check::Crc32).map_err(Error::XzInit)?;
                Ok(Self::Xz(XzEncoder::new_stream(writer, stream)))
            }
        }
    }

    pub fn format(&self) -> CompressedFormat {
        match self {
            Self::None(_) => CompressedFormat::None,
            Self::Gzip(_) => CompressedFormat::Gzip,
            Self::Lz4Legacy(_) => CompressedFormat::Lz4Legacy,
            Self::Xz(_) => CompressedFormat::Xz,
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::None(w) => Ok(w),
            Self::Gzip(w) => w.finish(),
            Self::Lz4Legacy(w) => w.finish(),
            Self::Xz(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Lz4Legacy(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Lz4Legacy(w) => w.flush(),
            Self::Xz(w) => w.flush(),
        }
    }
}

/// Decompress an in-memory ramdisk, autodetecting its format.
pub fn decompress(data: &[u8]) -> Result<(Vec<u8>, CompressedFormat)> {
    let format = CompressedFormat::detect(data)?;
    if format == CompressedFormat::None {
        return Ok((data.to_vec(), format));
    }

    let mut reader = CompressedReader::with_format(Cursor::new(data), format);
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| Error::Decompress(format, e))?;

    Ok((buf, format))
}

/// Compress an in-memory ramdisk with the specified format.
pub fn compress(data: &[u8], format: CompressedFormat) -> Result<Vec<u8>> {
    let mut writer = CompressedWriter::new(Cursor::new(Vec::new()), format)?;
    writer
        .write_all(data)
        .map_err(|e| Error::Compress(format, e))?;
    let raw_writer = writer.finish().map_err(|e| Error::Compress(format, e))?;

    Ok(raw_writer.into_inner())
}
