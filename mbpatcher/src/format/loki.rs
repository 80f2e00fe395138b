// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Loki images. Loki exploits a signature check bug in some LG and Samsung
//! bootloaders by pointing the ramdisk address at shellcode and storing the
//! original values in a small header hidden inside the extra command line.

use std::{mem, ops::Range};

use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::{
    android::{self, PageReader, PageWriter, Padding, RawHeader},
    bootimage::{BOOT_EXTRA_ARGS_SIZE, BootImage, Error, Format, Result, Wrapper},
};

pub const LOKI_MAGIC: [u8; 4] = *b"LOKI";

/// Offset of the Loki header relative to the Android header.
pub const LOKI_OFFSET: usize = 0x400;

/// Offset of the extra command line within the Android header.
const EXTRA_CMDLINE_OFFSET: usize = android::HEADER_SIZE - BOOT_EXTRA_ARGS_SIZE;

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawLokiHeader {
    magic: [u8; 4],
    recovery: little_endian::U32,
    build: [u8; 128],
    orig_kernel_size: little_endian::U32,
    orig_ramdisk_size: little_endian::U32,
    ramdisk_addr: little_endian::U32,
}

const LOKI_HEADER_SIZE: usize = mem::size_of::<RawLokiHeader>();

/// Location of the Loki header within the extra command line field.
const LOKI_RANGE: Range<usize> =
    LOKI_OFFSET - EXTRA_CMDLINE_OFFSET..LOKI_OFFSET - EXTRA_CMDLINE_OFFSET + LOKI_HEADER_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LokiMeta {
    pub prologue: Vec<u8>,
    /// Raw Loki header. The original sizes and ramdisk address are rewritten
    /// when encoding.
    pub loki_header: Vec<u8>,
    /// Ramdisk address stored in the Android header, which points to the
    /// shellcode.
    pub shellcode_addr: u32,
    /// Difference between the Android header kernel size and the real size.
    pub kernel_size_delta: i64,
    /// Difference between the Android header ramdisk size and the real size.
    pub ramdisk_size_delta: i64,
    /// Patched bootloader code, stored after the ramdisk and second stage.
    pub aboot: Vec<u8>,
    /// Data following the device tree.
    pub trailer: Vec<u8>,
    pub pad_last_section: bool,
    pub padding: Vec<Padding>,
}

/// Apply a recorded header size delta to a new section size.
fn header_size(name: &'static str, size: u32, delta: i64) -> Result<u32> {
    u32::try_from(i64::from(size) + delta)
        .map_err(|_| Error::Unrepresentable(Format::Loki, name))
}

fn loki_header(data: &[u8], header_offset: usize) -> Option<RawLokiHeader> {
    let offset = header_offset.checked_add(LOKI_OFFSET)?;
    let buf = data.get(offset..)?.get(..LOKI_HEADER_SIZE)?;
    let header = RawLokiHeader::read_from_bytes(buf).ok()?;

    (header.magic == LOKI_MAGIC).then_some(header)
}

pub fn probe(data: &[u8]) -> bool {
    android::find_header(data).is_some_and(|offset| loki_header(data, offset).is_some())
}

pub fn decode(data: &[u8]) -> Result<BootImage> {
    let (header_offset, raw) = android::read_raw_header(data)?;
    let loki = loki_header(data, header_offset).ok_or(Error::LokiMagicNotFound)?;

    let kernel_size = loki.orig_kernel_size.get();
    let ramdisk_size = loki.orig_ramdisk_size.get();

    if kernel_size == 0 || ramdisk_size == 0 {
        return Err(Error::Unsupported(
            Format::Loki,
            "old-style images do not record the original sizes",
        ));
    }

    let page_size = raw.page_size.get();
    let mut reader = PageReader::new(data, header_offset, page_size)?;

    let kernel = reader.section("kernel", kernel_size)?;
    let ramdisk = reader.section("ramdisk", ramdisk_size)?;
    let second = reader.section("second", raw.second_size.get())?;

    let (aboot, dt, trailer) = if raw.dt_size.get() > 0 {
        let aboot = reader.section("aboot", page_size)?;
        let dt = reader.section("dt", raw.dt_size.get())?;
        (aboot, dt, reader.rest())
    } else {
        (reader.rest(), &[][..], &[][..])
    };

    let mut header = raw;
    header.extra_cmdline[LOKI_RANGE].fill(0);
    let mut header = header.to_header();
    header.ramdisk_addr = loki.ramdisk_addr.get();

    let meta = LokiMeta {
        prologue: data[..header_offset].to_vec(),
        loki_header: loki.as_bytes().to_vec(),
        shellcode_addr: raw.ramdisk_addr.get(),
        kernel_size_delta: i64::from(raw.kernel_size.get()) - i64::from(kernel_size),
        ramdisk_size_delta: i64::from(raw.ramdisk_size.get()) - i64::from(ramdisk_size),
        aboot: aboot.to_vec(),
        trailer: trailer.to_vec(),
        pad_last_section: reader.padded(),
        padding: reader.take_padding(),
    };

    BootImage::new(
        header,
        kernel.to_vec(),
        ramdisk.to_vec(),
        second.to_vec(),
        dt.to_vec(),
        Wrapper::Loki(meta),
    )
}

pub(crate) fn encode(image: &BootImage, meta: &LokiMeta) -> Result<Vec<u8>> {
    if image.header.extra_cmdline.len() > LOKI_RANGE.start {
        return Err(Error::Unrepresentable(Format::Loki, "extra_cmdline"));
    }

    let mut loki = RawLokiHeader::read_from_bytes(&meta.loki_header)
        .map_err(|_| Error::LokiMagicNotFound)?;
    loki.orig_kernel_size = image.header.kernel_size.into();
    loki.orig_ramdisk_size = image.header.ramdisk_size.into();
    loki.ramdisk_addr = image.header.ramdisk_addr.into();

    let mut raw = RawHeader::from_header(&image.header)?;
    raw.ramdisk_addr = meta.shellcode_addr.into();
    raw.kernel_size = header_size(
        "kernel_size",
        image.header.kernel_size,
        meta.kernel_size_delta,
    )?
    .into();
    raw.ramdisk_size = header_size(
        "ramdisk_size",
        image.header.ramdisk_size,
        meta.ramdisk_size_delta,
    )?
    .into();
    raw.extra_cmdline[LOKI_RANGE].copy_from_slice(loki.as_bytes());

    let mut writer = PageWriter::new(&raw, &meta.padding)?;
    writer.section("kernel", &image.kernel)?;
    writer.section("ramdisk", &image.ramdisk)?;
    writer.section("second", &image.second)?;

    if image.dt.is_empty() {
        writer.last_section("aboot", &meta.aboot, false)?;
    } else {
        writer.section("aboot", &meta.aboot)?;
        writer.last_section("dt", &image.dt, meta.pad_last_section)?;
    }

    Ok([meta.prologue.as_slice(), &writer.finish(), &meta.trailer].concat())
}
