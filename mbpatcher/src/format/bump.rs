// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Bump images. These are Android images with a fixed magic string appended
//! right after the last page-aligned section, which some LG bootloaders check
//! for in place of a signature.

use crate::format::{
    android::{self, AndroidMeta, RawHeader},
    bootimage::{BootImage, Error, Format, Result, Wrapper},
};

pub const BUMP_MAGIC: [u8; 16] = [
    0x41, 0xa9, 0xe4, 0x67, 0x74, 0x4d, 0x1d, 0x1b, 0xa4, 0x29, 0xf2, 0xec, 0xea, 0x65, 0x52, 0x79,
];

/// Data surrounding the Bump magic. The magic itself is not stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BumpMeta {
    /// The trailer contains the bytes after the magic.
    pub android: AndroidMeta,
}

pub fn probe(data: &[u8]) -> bool {
    if Format::Loki.probe(data) {
        return false;
    }

    let Ok((header_offset, raw)) = android::read_raw_header(data) else {
        return false;
    };

    android::image_end(header_offset, &raw)
        .and_then(|end| data.get(end..))
        .is_some_and(|d| d.starts_with(&BUMP_MAGIC))
}

pub fn decode(data: &[u8]) -> Result<BootImage> {
    let sections = android::read_sections(data)?;

    let trailer = data
        .get(sections.end..)
        .and_then(|d| d.strip_prefix(&BUMP_MAGIC))
        .ok_or(Error::BumpMagicNotFound(sections.end))?;

    let meta = BumpMeta {
        android: AndroidMeta {
            prologue: data[..sections.header_offset].to_vec(),
            trailer: trailer.to_vec(),
            pad_last_section: true,
            padding: sections.padding,
        },
    };

    BootImage::new(
        sections.raw.to_header(),
        sections.kernel.to_vec(),
        sections.ramdisk.to_vec(),
        sections.second.to_vec(),
        sections.dt.to_vec(),
        Wrapper::Bump(meta),
    )
}

pub(crate) fn encode(image: &BootImage, meta: &BumpMeta) -> Result<Vec<u8>> {
    let raw = RawHeader::from_header(&image.header)?;
    let body = android::write_sections(
        &raw,
        android::image_sections(image),
        true,
        &meta.android.padding,
    )?;

    Ok([
        meta.android.prologue.as_slice(),
        &body,
        &BUMP_MAGIC,
        &meta.android.trailer,
    ]
    .concat())
}
