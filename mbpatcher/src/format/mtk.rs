// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! MediaTek images. These are regular Android images where the kernel and
//! ramdisk sections each begin with an additional 512-byte header.

use std::mem;

use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::{
    android::{self, AndroidMeta, RawHeader},
    bootimage::{BootImage, Error, Format, Result, Wrapper},
    padding,
};

pub const MTK_MAGIC: u32 = 0x58881688;

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawMtkHeader {
    magic: little_endian::U32,
    size: little_endian::U32,
    name: [u8; 32],
    unused: [u8; 472],
}

pub const MTK_HEADER_SIZE: usize = mem::size_of::<RawMtkHeader>();

/// MTK section headers are kept verbatim. Only the size field is rewritten
/// when encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MtkMeta {
    pub android: AndroidMeta,
    pub kernel_header: Vec<u8>,
    pub ramdisk_header: Vec<u8>,
}

/// Absolute offsets of the kernel and ramdisk sections.
fn section_offsets(header_offset: usize, raw: &RawHeader) -> Result<(usize, usize)> {
    let page_size = raw.page_size.get();
    let kernel = padding::round(android::HEADER_SIZE as u32, page_size)
        .ok_or(Error::IntOverflow("kernel_offset"))?;
    let ramdisk = padding::round(raw.kernel_size.get(), page_size)
        .and_then(|s| s.checked_add(kernel))
        .ok_or(Error::IntOverflow("ramdisk_offset"))?;

    let kernel = header_offset
        .checked_add(kernel as usize)
        .ok_or(Error::IntOverflow("kernel_offset"))?;
    let ramdisk = header_offset
        .checked_add(ramdisk as usize)
        .ok_or(Error::IntOverflow("ramdisk_offset"))?;

    Ok((kernel, ramdisk))
}

fn has_magic(data: &[u8], offset: usize) -> bool {
    data.get(offset..)
        .and_then(|d| d.get(..4))
        .is_some_and(|m| m == MTK_MAGIC.to_le_bytes())
}

pub fn probe(data: &[u8]) -> bool {
    if Format::Loki.probe(data) || Format::Bump.probe(data) {
        return false;
    }

    let Ok((header_offset, raw)) = android::read_raw_header(data) else {
        return false;
    };
    let Ok((kernel_offset, ramdisk_offset)) = section_offsets(header_offset, &raw) else {
        return false;
    };

    has_magic(data, kernel_offset) || has_magic(data, ramdisk_offset)
}

/// Validate the MTK header at the start of a section and return it.
fn read_mtk_header(
    data: &[u8],
    section: &'static str,
    offset: usize,
    android_size: u32,
) -> Result<RawMtkHeader> {
    if offset
        .checked_add(MTK_HEADER_SIZE)
        .is_none_or(|end| end > data.len())
    {
        return Err(Error::MtkHeaderOffsetTooLarge {
            section,
            offset,
            len: data.len(),
        });
    }

    if (android_size as usize) < MTK_HEADER_SIZE {
        return Err(Error::InvalidEntrySizeForMtkHeader {
            section,
            size: android_size,
        });
    }

    let header = RawMtkHeader::read_from_bytes(&data[offset..offset + MTK_HEADER_SIZE])
        .map_err(|_| Error::MtkHeaderOffsetTooLarge {
            section,
            offset,
            len: data.len(),
        })?;

    if header.magic.get() != MTK_MAGIC {
        return Err(Error::InvalidMtkMagic {
            section,
            magic: header.magic.get(),
        });
    }

    let expected = header.size.get().checked_add(MTK_HEADER_SIZE as u32);
    if expected != Some(android_size) {
        let mtk = header.size.get();
        return Err(if section == "kernel" {
            Error::MismatchedKernelSizeInHeaders {
                mtk,
                android: android_size,
            }
        } else {
            Error::MismatchedRamdiskSizeInHeaders {
                mtk,
                android: android_size,
            }
        });
    }

    Ok(header)
}

pub fn decode(data: &[u8]) -> Result<BootImage> {
    let (header_offset, raw) = android::read_raw_header(data)?;
    let (kernel_offset, ramdisk_offset) = section_offsets(header_offset, &raw)?;

    let kernel_header = read_mtk_header(data, "kernel", kernel_offset, raw.kernel_size.get())?;
    let ramdisk_header =
        read_mtk_header(data, "ramdisk", ramdisk_offset, raw.ramdisk_size.get())?;

    let sections = android::read_sections(data)?;

    let meta = MtkMeta {
        android: AndroidMeta {
            prologue: data[..header_offset].to_vec(),
            trailer: data[sections.end.min(data.len())..].to_vec(),
            pad_last_section: sections.padded,
            padding: sections.padding,
        },
        kernel_header: kernel_header.as_bytes().to_vec(),
        ramdisk_header: ramdisk_header.as_bytes().to_vec(),
    };

    BootImage::new(
        raw.to_header(),
        sections.kernel[MTK_HEADER_SIZE..].to_vec(),
        sections.ramdisk[MTK_HEADER_SIZE..].to_vec(),
        sections.second.to_vec(),
        sections.dt.to_vec(),
        Wrapper::Mtk(meta),
    )
}

/// Prepend the stored MTK header to `data` with an updated size field.
fn wrap_section(section: &'static str, header: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut header = RawMtkHeader::read_from_bytes(header).map_err(|_| {
        Error::InvalidEntrySizeForMtkHeader {
            section,
            size: header.len() as u32,
        }
    })?;

    let size = u32::try_from(data.len())
        .ok()
        .filter(|s| s.checked_add(MTK_HEADER_SIZE as u32).is_some())
        .ok_or(Error::EntryTooLargeToFitMtkHeader {
            section,
            size: data.len(),
        })?;
    header.size = size.into();

    Ok([header.as_bytes(), data].concat())
}

pub(crate) fn encode(image: &BootImage, meta: &MtkMeta) -> Result<Vec<u8>> {
    let kernel = wrap_section("kernel", &meta.kernel_header, &image.kernel)?;
    let ramdisk = wrap_section("ramdisk", &meta.ramdisk_header, &image.ramdisk)?;

    let mut raw = RawHeader::from_header(&image.header)?;
    raw.kernel_size = (kernel.len() as u32).into();
    raw.ramdisk_size = (ramdisk.len() as u32).into();

    let body = android::write_sections(
        &raw,
        [
            ("kernel", kernel.as_slice()),
            ("ramdisk", ramdisk.as_slice()),
            ("second", image.second.as_slice()),
            ("dt", image.dt.as_slice()),
        ],
        meta.android.pad_last_section,
        &meta.android.padding,
    )?;

    Ok([meta.android.prologue.as_slice(), &body, &meta.android.trailer].concat())
}
