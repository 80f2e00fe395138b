// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

mod common;

use assert_matches::assert_matches;
use mbpatcher::format::compression::{self, CompressedFormat, Error};

fn round_trip(data: &[u8], format: CompressedFormat) {
    let compressed = compression::compress(data, format).unwrap();
    assert_eq!(CompressedFormat::detect(&compressed).unwrap(), format);

    let (new_data, new_format) = compression::decompress(&compressed).unwrap();
    assert_eq!(new_format, format);
    assert_eq!(data, new_data);
}

#[test]
fn round_trip_none() {
    round_trip(&common::ramdisk(), CompressedFormat::None);
}

#[test]
fn round_trip_gzip() {
    round_trip(&common::ramdisk(), CompressedFormat::Gzip);
}

#[test]
fn round_trip_lz4_legacy() {
    // Make sure we exceed the 8MiB block boundary.
    let data = b"Lz4Legacy".repeat(1024 * 1024);
    round_trip(&data, CompressedFormat::Lz4Legacy);
}

#[test]
fn round_trip_xz() {
    round_trip(&common::ramdisk(), CompressedFormat::Xz);
}

#[test]
fn unknown_format() {
    assert_matches!(
        compression::decompress(b"\x00\x01\x02\x03\x04\x05\x06\x07"),
        Err(Error::UnknownFormat(m)) if m == b"\x00\x01\x02\x03\x04\x05"
    );
    assert_matches!(
        CompressedFormat::detect(b""),
        Err(Error::UnknownFormat(m)) if m.is_empty()
    );
}
