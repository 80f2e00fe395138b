// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Plain Android boot images and the page-aligned section layout that the
//! other Android-based wrappers build on.

use std::mem;

use zerocopy::little_endian;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    format::{
        binary::{ByteReader, ByteWriter},
        bootimage::{
            BOOT_ARGS_SIZE, BOOT_EXTRA_ARGS_SIZE, BOOT_MAGIC, BOOT_NAME_SIZE, BootImage,
            BootImageHeader, COMPONENT_MAX_SIZE, Error, Format, Result, Wrapper,
        },
        padding::{self, ZeroPadding},
    },
    util,
};

/// The header may be preceded by up to this many bytes of vendor data.
pub const MAX_HEADER_OFFSET: usize = 512;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Raw on-disk layout of the image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
pub(crate) struct RawHeader {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    pub magic: [u8; 8],
    pub kernel_size: little_endian::U32,
    pub kernel_addr: little_endian::U32,
    pub ramdisk_size: little_endian::U32,
    pub ramdisk_addr: little_endian::U32,
    pub second_size: little_endian::U32,
    pub second_addr: little_endian::U32,
    pub tags_addr: little_endian::U32,
    pub page_size: little_endian::U32,
    pub dt_size: little_endian::U32,
    pub unused: little_endian::U32,
    pub name: [u8; BOOT_NAME_SIZE],
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [little_endian::U32; 8],
    pub extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

pub const HEADER_SIZE: usize = mem::size_of::<RawHeader>();

impl RawHeader {
    pub fn from_header(header: &BootImageHeader) -> Result<Self> {
        let name = header
            .name
            .to_padded_array::<BOOT_NAME_SIZE>()
            .ok_or_else(|| Error::StringTooLong("name", BOOT_NAME_SIZE, header.name.clone()))?;
        let cmdline = header
            .cmdline
            .to_padded_array::<BOOT_ARGS_SIZE>()
            .ok_or_else(|| {
                Error::StringTooLong("cmdline", BOOT_ARGS_SIZE, header.cmdline.clone())
            })?;
        let extra_cmdline = header
            .extra_cmdline
            .to_padded_array::<BOOT_EXTRA_ARGS_SIZE>()
            .ok_or_else(|| {
                Error::StringTooLong(
                    "extra_cmdline",
                    BOOT_EXTRA_ARGS_SIZE,
                    header.extra_cmdline.clone(),
                )
            })?;

        Ok(Self {
            magic: BOOT_MAGIC,
            kernel_size: header.kernel_size.into(),
            kernel_addr: header.kernel_addr.into(),
            ramdisk_size: header.ramdisk_size.into(),
            ramdisk_addr: header.ramdisk_addr.into(),
            second_size: header.second_size.into(),
            second_addr: header.second_addr.into(),
            tags_addr: header.tags_addr.into(),
            page_size: header.page_size.into(),
            dt_size: header.dt_size.into(),
            unused: header.unused.into(),
            name,
            cmdline,
            id: header.id.map(|id| id.into()),
            extra_cmdline,
        })
    }

    /// Convert to the canonical header. Size fields are copied as-is; callers
    /// overwrite them when a wrapper stores the real sizes elsewhere.
    pub fn to_header(&self) -> BootImageHeader {
        BootImageHeader {
            kernel_size: self.kernel_size.get(),
            kernel_addr: self.kernel_addr.get(),
            ramdisk_size: self.ramdisk_size.get(),
            ramdisk_addr: self.ramdisk_addr.get(),
            second_size: self.second_size.get(),
            second_addr: self.second_addr.get(),
            tags_addr: self.tags_addr.get(),
            page_size: self.page_size.get(),
            dt_size: self.dt_size.get(),
            unused: self.unused.get(),
            name: self.name.trim_end_padding().to_vec(),
            cmdline: self.cmdline.trim_end_padding().to_vec(),
            id: self.id.map(|id| id.get()),
            extra_cmdline: self.extra_cmdline.trim_end_padding().to_vec(),
        }
    }
}

/// Bytes surrounding the page-aligned image that are not part of any section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AndroidMeta {
    /// Vendor data preceding the header.
    pub prologue: Vec<u8>,
    /// Data following the last page-aligned section.
    pub trailer: Vec<u8>,
    /// Whether the last section is followed by page padding. Some images end
    /// immediately after the last section's data.
    pub pad_last_section: bool,
    /// Non-zero page padding found after the header or a section.
    pub padding: Vec<Padding>,
}

/// Page padding that was not zero-filled. It is written back as long as the
/// region keeps its original length, which is the case when the preceding
/// section was not resized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Padding {
    pub section: &'static str,
    pub data: Vec<u8>,
}

/// Find the offset of the Android header magic.
pub(crate) fn find_header(data: &[u8]) -> Option<usize> {
    let limit = data.len().min(MAX_HEADER_OFFSET + BOOT_MAGIC.len());
    memchr::memmem::find(&data[..limit], &BOOT_MAGIC)
}

/// Locate and parse the raw header without validating the sections.
pub(crate) fn read_raw_header(data: &[u8]) -> Result<(usize, RawHeader)> {
    let Some(offset) = find_header(data) else {
        let magic = data[..data.len().min(BOOT_MAGIC.len())].to_vec();
        return Err(Error::UnknownMagic(magic));
    };

    let mut reader = ByteReader::new(data);
    reader
        .seek(offset)
        .map_err(|e| Error::DataRead("header_offset", e))?;
    let raw = reader
        .read_struct::<RawHeader>()
        .map_err(|e| Error::DataRead("header", e))?;

    BootImageHeader::validate_page_size(raw.page_size.get())?;

    Ok((offset, raw))
}

/// Reads page-aligned sections relative to the start of the header while
/// tracking the offset with checked 32-bit arithmetic.
pub(crate) struct PageReader<'a> {
    reader: ByteReader<'a>,
    page_size: u32,
    offset: u32,
    padded: bool,
    padding: Vec<Padding>,
}

impl<'a> PageReader<'a> {
    /// Start reading the sections following the header page.
    pub fn new(data: &'a [u8], header_offset: usize, page_size: u32) -> Result<Self> {
        let mut result = Self {
            reader: ByteReader::new(&data[header_offset..]),
            page_size,
            offset: 0,
            padded: true,
            padding: Vec::new(),
        };
        result.section("header", HEADER_SIZE as u32)?;

        Ok(result)
    }

    /// Read a section of `size` bytes followed by padding to the next page
    /// boundary. Missing padding is tolerated only at the end of the data.
    pub fn section(&mut self, name: &'static str, size: u32) -> Result<&'a [u8]> {
        let size = util::check_bounds(size, ..=COMPONENT_MAX_SIZE)
            .map_err(|e| Error::IntOutOfBounds(name, e))?;
        let end = self
            .offset
            .checked_add(size)
            .ok_or(Error::IntOverflow(name))?;
        let page_end = padding::round(end, self.page_size).ok_or(Error::IntOverflow(name))?;

        let data = self
            .reader
            .read_bytes(size as usize)
            .map_err(|e| Error::DataRead(name, e))?;

        let padding = (page_end - end) as usize;
        if padding > 0 && self.reader.remaining() == 0 {
            self.padded = false;
        } else {
            let buf = self
                .reader
                .read_bytes(padding)
                .map_err(|e| Error::DataRead(name, e))?;
            if !util::is_zero(buf) {
                self.padding.push(Padding {
                    section: name,
                    data: buf.to_vec(),
                });
            }
        }

        self.offset = page_end;

        Ok(data)
    }

    /// Position relative to the header.
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    pub fn rest(&self) -> &'a [u8] {
        self.reader.rest()
    }

    pub fn padded(&self) -> bool {
        self.padded
    }

    /// Non-zero padding regions read so far.
    pub fn take_padding(&mut self) -> Vec<Padding> {
        std::mem::take(&mut self.padding)
    }
}

/// Writes page-aligned sections. The counterpart of [`PageReader`].
pub(crate) struct PageWriter<'a> {
    writer: ByteWriter,
    page_size: usize,
    padding: &'a [Padding],
}

impl<'a> PageWriter<'a> {
    pub fn new(raw: &RawHeader, padding: &'a [Padding]) -> Result<Self> {
        let mut result = Self {
            writer: ByteWriter::new(),
            page_size: raw.page_size.get() as usize,
            padding,
        };
        result.writer.write_struct(raw);
        result.pad("header")?;

        Ok(result)
    }

    /// Pad to the next page boundary, restoring the recorded padding for
    /// `name` if it still fits exactly.
    fn pad(&mut self, name: &'static str) -> Result<()> {
        let size = padding::calc(self.writer.position(), self.page_size);
        let recorded = self
            .padding
            .iter()
            .find(|p| p.section == name && p.data.len() == size);

        if let Some(p) = recorded {
            self.writer.write_bytes(&p.data);
        } else {
            self.writer
                .pad_to(self.page_size)
                .map_err(|e| Error::DataWrite(name, e))?;
        }

        Ok(())
    }

    pub fn section(&mut self, name: &'static str, data: &[u8]) -> Result<()> {
        self.writer.write_bytes(data);
        self.pad(name)
    }

    /// Write the last section, padding only if the original image did.
    pub fn last_section(&mut self, name: &'static str, data: &[u8], pad: bool) -> Result<()> {
        self.writer.write_bytes(data);
        if pad {
            self.pad(name)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// Sections of a plain Android image.
pub(crate) struct Sections<'a> {
    pub header_offset: usize,
    pub raw: RawHeader,
    pub kernel: &'a [u8],
    pub ramdisk: &'a [u8],
    pub second: &'a [u8],
    pub dt: &'a [u8],
    /// Absolute offset of the first byte after the page-aligned image.
    pub end: usize,
    pub padded: bool,
    pub padding: Vec<Padding>,
}

pub(crate) fn read_sections(data: &[u8]) -> Result<Sections<'_>> {
    let (header_offset, raw) = read_raw_header(data)?;
    let mut reader = PageReader::new(data, header_offset, raw.page_size.get())?;

    let kernel = reader.section("kernel", raw.kernel_size.get())?;
    let ramdisk = reader.section("ramdisk", raw.ramdisk_size.get())?;
    let second = reader.section("second", raw.second_size.get())?;
    let dt = reader.section("dt", raw.dt_size.get())?;

    Ok(Sections {
        header_offset,
        raw,
        kernel,
        ramdisk,
        second,
        dt,
        end: header_offset + reader.position(),
        padded: reader.padded(),
        padding: reader.take_padding(),
    })
}

/// Compute the absolute end offset of the page-aligned image from the header
/// alone. Used by probes that look for data after the image.
pub(crate) fn image_end(header_offset: usize, raw: &RawHeader) -> Option<usize> {
    let page_size = raw.page_size.get();
    let mut offset = padding::round(HEADER_SIZE as u32, page_size)?;

    for size in [
        raw.kernel_size.get(),
        raw.ramdisk_size.get(),
        raw.second_size.get(),
        raw.dt_size.get(),
    ] {
        offset = offset.checked_add(padding::round(size, page_size)?)?;
    }

    header_offset.checked_add(offset as usize)
}

/// Write the standard section sequence with `raw` as the header.
pub(crate) fn write_sections(
    raw: &RawHeader,
    sections: [(&'static str, &[u8]); 4],
    pad_last: bool,
    padding: &[Padding],
) -> Result<Vec<u8>> {
    let mut writer = PageWriter::new(raw, padding)?;

    let last = sections
        .iter()
        .rposition(|(_, data)| !data.is_empty())
        .unwrap_or_default();

    for (i, (name, data)) in sections.into_iter().enumerate() {
        if i == last {
            writer.last_section(name, data, pad_last)?;
        } else {
            writer.section(name, data)?;
        }
    }

    Ok(writer.finish())
}

/// The sections of `image` in on-disk order.
pub(crate) fn image_sections(image: &BootImage) -> [(&'static str, &[u8]); 4] {
    [
        ("kernel", image.kernel.as_slice()),
        ("ramdisk", image.ramdisk.as_slice()),
        ("second", image.second.as_slice()),
        ("dt", image.dt.as_slice()),
    ]
}

pub fn probe(data: &[u8]) -> bool {
    find_header(data).is_some()
        && !data.starts_with(ELF_MAGIC)
        && !Format::Loki.probe(data)
        && !Format::Bump.probe(data)
        && !Format::Mtk.probe(data)
}

pub fn decode(data: &[u8]) -> Result<BootImage> {
    let sections = read_sections(data)?;

    let meta = AndroidMeta {
        prologue: data[..sections.header_offset].to_vec(),
        trailer: data[sections.end.min(data.len())..].to_vec(),
        pad_last_section: sections.padded,
        padding: sections.padding,
    };

    BootImage::new(
        sections.raw.to_header(),
        sections.kernel.to_vec(),
        sections.ramdisk.to_vec(),
        sections.second.to_vec(),
        sections.dt.to_vec(),
        Wrapper::Android(meta),
    )
}

pub(crate) fn encode(image: &BootImage, meta: &AndroidMeta) -> Result<Vec<u8>> {
    let raw = RawHeader::from_header(&image.header)?;
    let body = write_sections(
        &raw,
        image_sections(image),
        meta.pad_last_section,
        &meta.padding,
    )?;

    Ok([meta.prologue.as_slice(), &body, &meta.trailer].concat())
}

