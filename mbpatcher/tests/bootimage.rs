// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

mod common;

use assert_matches::assert_matches;
use mbpatcher::format::{
    android::AndroidMeta,
    bootimage::{BootImage, Error, Format, Wrapper},
    bump::BUMP_MAGIC,
    cpio::CpioArchive,
    sonyelf::SegmentKind,
};

use common::{Header, KERNEL_ADDR, RAMDISK_ADDR, android_image, pad, pattern};

const PAGE_SIZE: u32 = 2048;
const SHELLCODE_ADDR: u32 = 0x88f00000;
const RPM_ADDR: u32 = 0x00020000;

fn round_trip(data: &[u8], format: Format) -> BootImage {
    let image = BootImage::decode(data).unwrap();
    assert_eq!(image.format(), format);
    assert_eq!(image.encode().unwrap(), data);

    image
}

fn mtk_header(size: u32, name: &[u8]) -> Vec<u8> {
    let mut buf = 0x58881688u32.to_le_bytes().to_vec();
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(name);
    buf.resize(40, 0);
    buf.resize(512, 0xff);

    buf
}

fn mtk_image(kernel: &[u8], ramdisk: &[u8]) -> Vec<u8> {
    let kernel = [mtk_header(kernel.len() as u32, b"KERNEL"), kernel.to_vec()].concat();
    let ramdisk = [mtk_header(ramdisk.len() as u32, b"ROOTFS"), ramdisk.to_vec()].concat();

    android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b"")
}

fn loki_image(kernel: &[u8], ramdisk: &[u8], record_sizes: bool) -> Vec<u8> {
    let mut header = Header::new(PAGE_SIZE).sizes(kernel.len(), ramdisk.len(), 0, 0);
    header.ramdisk_addr = SHELLCODE_ADDR;
    let mut buf = header.to_bytes();

    let (kernel_size, ramdisk_size) = if record_sizes {
        (kernel.len() as u32, ramdisk.len() as u32)
    } else {
        (0, 0)
    };

    let mut loki = b"LOKI".to_vec();
    loki.extend_from_slice(&0u32.to_le_bytes());
    loki.extend_from_slice(b"VS98012B");
    loki.resize(136, 0);
    loki.extend_from_slice(&kernel_size.to_le_bytes());
    loki.extend_from_slice(&ramdisk_size.to_le_bytes());
    loki.extend_from_slice(&RAMDISK_ADDR.to_le_bytes());
    assert_eq!(loki.len(), 148);

    buf[0x400..0x400 + loki.len()].copy_from_slice(&loki);
    pad(&mut buf, PAGE_SIZE as usize);

    for section in [kernel, ramdisk] {
        buf.extend_from_slice(section);
        pad(&mut buf, PAGE_SIZE as usize);
    }

    // Patched aboot.
    buf.extend_from_slice(&pattern(PAGE_SIZE as usize, 9));

    buf
}

fn elf_image(kernel: &[u8], ramdisk: &[u8], cmdline: &[u8], rpm: &[u8]) -> Vec<u8> {
    let segments: [(u32, u32, u32, &[u8]); 4] = [
        (1, 0, KERNEL_ADDR, kernel),
        (1, 0x80000000, RAMDISK_ADDR, ramdisk),
        (4, 0x20000000, 0, cmdline),
        (1, 0x01000000, RPM_ADDR, rpm),
    ];

    let mut buf = vec![0x7f, b'E', b'L', b'F', 1, 1, 1];
    buf.resize(16, 0);
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&40u16.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&KERNEL_ADDR.to_le_bytes());
    buf.extend_from_slice(&52u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&52u16.to_le_bytes());
    buf.extend_from_slice(&32u16.to_le_bytes());
    buf.extend_from_slice(&(segments.len() as u16).to_le_bytes());
    buf.extend_from_slice(&[0; 6]);
    assert_eq!(buf.len(), 52);

    // Leave a gap between the program headers and the first segment.
    let mut offset = 256u32;

    for (p_type, p_flags, addr, data) in segments {
        let size = data.len() as u32;

        for value in [p_type, offset, addr, addr, size, size, p_flags, 0] {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        offset += size;
    }

    buf.resize(256, 0);

    for (_, _, _, data) in segments {
        buf.extend_from_slice(data);
    }

    buf
}

fn sample_ramdisk() -> Vec<u8> {
    common::ramdisk()
}

#[test]
fn android_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let dt = pattern(100, 2);
    let data = android_image(PAGE_SIZE, &kernel, &ramdisk, b"", &dt);

    let image = round_trip(&data, Format::Android);

    assert_eq!(image.kernel, kernel);
    assert_eq!(image.ramdisk, ramdisk);
    assert!(image.second.is_empty());
    assert_eq!(image.dt, dt);
    assert_eq!(image.header.kernel_size, 5000);
    assert_eq!(image.header.kernel_addr, KERNEL_ADDR);
    assert_eq!(image.header.ramdisk_addr, RAMDISK_ADDR);
    assert_eq!(image.header.page_size, PAGE_SIZE);
    assert_eq!(image.header.name, b"hammerhead");
    assert_eq!(image.header.id, Header::new(PAGE_SIZE).id);
}

#[test]
fn android_unpadded_last_section_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let dt = pattern(100, 2);
    let mut data = android_image(PAGE_SIZE, &kernel, &ramdisk, b"", &dt);
    data.truncate(data.len() - (PAGE_SIZE as usize - dt.len()));

    let image = round_trip(&data, Format::Android);

    assert_matches!(
        &image.wrapper,
        Wrapper::Android(AndroidMeta {
            pad_last_section: false,
            ..
        })
    );
}

#[test]
fn android_dirty_padding_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let mut data = android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b"");
    // Header page padding and kernel padding.
    data[1640] = 0xab;
    data[PAGE_SIZE as usize + kernel.len() + 10] = 0xcd;

    let mut image = round_trip(&data, Format::Android);
    assert_matches!(&image.wrapper, Wrapper::Android(meta) if meta.padding.len() == 2);

    // The kernel padding no longer fits after a resize and is zero-filled.
    image.set_kernel(pattern(5100, 1)).unwrap();
    let new_data = image.encode().unwrap();
    assert_eq!(new_data[1640], 0xab);
    assert!(
        new_data[PAGE_SIZE as usize + 5100..4 * PAGE_SIZE as usize]
            .iter()
            .all(|b| *b == 0)
    );

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.kernel, pattern(5100, 1));
    assert_eq!(new_image.ramdisk, ramdisk);
}

#[test]
fn android_prologue_and_trailer_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let prologue = pattern(256, 5);
    let trailer = b"SEANDROIDENFORCE";

    let data = [
        prologue.as_slice(),
        &android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b""),
        trailer,
    ]
    .concat();

    let image = round_trip(&data, Format::Android);

    let Wrapper::Android(meta) = &image.wrapper else {
        panic!("Unexpected wrapper: {:?}", image.wrapper);
    };
    assert_eq!(meta.prologue, prologue);
    assert_eq!(meta.trailer, trailer);
}

#[test]
fn add_entry_grows_ramdisk_by_entry_size() {
    let content = pattern(3856, 1);
    let ramdisk = common::cpio_archive(&[("data", 0o100644, content.as_slice())]);
    assert_eq!(ramdisk.len(), 4096);

    let kernel = pattern(5000, 2);
    let data = android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b"");

    let mut image = round_trip(&data, Format::Android);
    assert_eq!(image.header.ramdisk_size, 4096);
    let orig_header = image.header.clone();

    let mut archive = CpioArchive::load(&image.ramdisk).unwrap();
    archive
        .set_contents("init.multiboot.rc", vec![b'#'; 37], 0o750)
        .unwrap();
    assert_eq!(archive.len(), 2);

    // 110-byte header + 18-byte name (no padding) + 37 bytes of content
    // padded to 40.
    let new_ramdisk = archive.serialize().unwrap();
    assert_eq!(new_ramdisk.len(), 4096 + 168);

    image.set_ramdisk(new_ramdisk.clone()).unwrap();
    let new_data = image.encode().unwrap();

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.format(), Format::Android);
    assert_eq!(new_image.header.ramdisk_size, 4096 + 168);
    assert_eq!(new_image.ramdisk, new_ramdisk);
    assert_eq!(new_image.kernel, kernel);

    let mut header = new_image.header.clone();
    header.ramdisk_size = orig_header.ramdisk_size;
    assert_eq!(header, orig_header);
}

#[test]
fn mtk_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let data = mtk_image(&kernel, &ramdisk);

    let mut image = round_trip(&data, Format::Mtk);
    assert_eq!(image.kernel, kernel);
    assert_eq!(image.ramdisk, ramdisk);

    let new_ramdisk = [ramdisk.as_slice(), &pattern(1000, 3)].concat();
    image.set_ramdisk(new_ramdisk.clone()).unwrap();
    let new_data = image.encode().unwrap();

    // The MTK header in front of the ramdisk has the new size.
    let ramdisk_offset = PAGE_SIZE as usize + 6144;
    assert_eq!(
        &new_data[ramdisk_offset..ramdisk_offset + 8],
        [
            0x58881688u32.to_le_bytes(),
            (new_ramdisk.len() as u32).to_le_bytes(),
        ]
        .concat(),
    );

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.format(), Format::Mtk);
    assert_eq!(new_image.ramdisk, new_ramdisk);
    assert_eq!(new_image.wrapper, image.wrapper);
}

#[test]
fn mtk_mismatched_kernel_size() {
    // The Android size covers the 512-byte MTK header.
    let header = Header::new(PAGE_SIZE).sizes(5_000_000 + 512, 0, 0, 0);
    let mut data = header.to_bytes();
    pad(&mut data, PAGE_SIZE as usize);
    data.extend_from_slice(&mtk_header(5_000_001, b"KERNEL"));

    assert_eq!(Format::detect(&data).unwrap(), Format::Mtk);
    assert_matches!(
        BootImage::decode(&data),
        Err(Error::MismatchedKernelSizeInHeaders {
            mtk: 5_000_001,
            android: 5_000_512,
        })
    );
}

#[test]
fn mtk_section_too_small_for_header() {
    let kernel = [mtk_header(4, b"KERNEL"), pattern(4, 1)].concat();
    let data = android_image(PAGE_SIZE, &kernel, b"tiny", b"", b"");

    assert_eq!(Format::detect(&data).unwrap(), Format::Mtk);
    assert_matches!(
        BootImage::decode(&data),
        Err(Error::InvalidEntrySizeForMtkHeader {
            section: "ramdisk",
            size: 4,
        })
    );
}

#[test]
fn bump_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let data = [
        android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b""),
        BUMP_MAGIC.to_vec(),
    ]
    .concat();

    let mut image = round_trip(&data, Format::Bump);

    image.set_ramdisk(pattern(3000, 4)).unwrap();
    let new_data = image.encode().unwrap();
    assert!(new_data.ends_with(&BUMP_MAGIC));

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.format(), Format::Bump);
    assert_eq!(new_image.ramdisk, pattern(3000, 4));
}

#[test]
fn loki_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let data = loki_image(&kernel, &ramdisk, true);

    let mut image = round_trip(&data, Format::Loki);
    assert_eq!(image.kernel, kernel);
    assert_eq!(image.ramdisk, ramdisk);
    assert_eq!(image.header.ramdisk_addr, RAMDISK_ADDR);
    assert!(image.header.extra_cmdline.is_empty());

    let new_ramdisk = pattern(7000, 4);
    image.set_ramdisk(new_ramdisk.clone()).unwrap();
    let new_data = image.encode().unwrap();

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.format(), Format::Loki);
    assert_eq!(new_image.ramdisk, new_ramdisk);
    assert_eq!(new_image.header.ramdisk_addr, RAMDISK_ADDR);
    assert!(new_data.ends_with(&pattern(PAGE_SIZE as usize, 9)));
}

#[test]
fn loki_header_size_offset_follows_ramdisk() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let mut data = loki_image(&kernel, &ramdisk, true);
    let header_ramdisk_size = ramdisk.len() as u32 + PAGE_SIZE;
    data[16..20].copy_from_slice(&header_ramdisk_size.to_le_bytes());

    let mut image = round_trip(&data, Format::Loki);
    assert_eq!(image.ramdisk, ramdisk);

    let new_ramdisk = pattern(12000, 4);
    image.set_ramdisk(new_ramdisk.clone()).unwrap();
    let new_data = image.encode().unwrap();

    let field = u32::from_le_bytes(new_data[16..20].try_into().unwrap());
    assert_eq!(field, 12000 + PAGE_SIZE);

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.kernel, kernel);
    assert_eq!(new_image.ramdisk, new_ramdisk);
}

#[test]
fn loki_without_original_sizes() {
    let data = loki_image(&pattern(5000, 1), &sample_ramdisk(), false);

    assert_matches!(
        BootImage::decode(&data),
        Err(Error::Unsupported(Format::Loki, _))
    );
}

#[test]
fn sony_elf_round_trip() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();
    let rpm = pattern(700, 6);
    let data = elf_image(&kernel, &ramdisk, b"console=ttyHSL0\0\0", &rpm);

    let mut image = round_trip(&data, Format::SonyElf);
    assert_eq!(image.kernel, kernel);
    assert_eq!(image.ramdisk, ramdisk);
    assert_eq!(image.header.cmdline, b"console=ttyHSL0");
    assert_eq!(image.header.kernel_addr, KERNEL_ADDR);
    assert_eq!(image.header.ramdisk_addr, RAMDISK_ADDR);

    let new_ramdisk = pattern(6001, 4);
    image.set_ramdisk(new_ramdisk.clone()).unwrap();
    let new_data = image.encode().unwrap();

    let new_image = BootImage::decode(&new_data).unwrap();
    assert_eq!(new_image.format(), Format::SonyElf);
    assert_eq!(new_image.kernel, kernel);
    assert_eq!(new_image.ramdisk, new_ramdisk);
    assert_eq!(new_image.header.cmdline, b"console=ttyHSL0");

    let Wrapper::SonyElf(meta) = &new_image.wrapper else {
        panic!("Unexpected wrapper: {:?}", new_image.wrapper);
    };
    let segment = meta
        .segments
        .iter()
        .find(|s| s.kind == SegmentKind::Rpm)
        .unwrap();
    assert_eq!(segment.data, rpm);
    assert_eq!(segment.p_vaddr, RPM_ADDR);
}

#[test]
fn sony_elf_rejects_second_stage() {
    let data = elf_image(&pattern(5000, 1), &sample_ramdisk(), b"", &pattern(10, 2));

    let mut image = BootImage::decode(&data).unwrap();
    image.set_second(b"second".to_vec()).unwrap();

    assert_matches!(
        image.encode(),
        Err(Error::Unrepresentable(Format::SonyElf, "second"))
    );
}

#[test]
fn probe_is_exclusive() {
    let kernel = pattern(5000, 1);
    let ramdisk = sample_ramdisk();

    let samples = [
        (
            Format::Android,
            android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b""),
        ),
        (Format::Mtk, mtk_image(&kernel, &ramdisk)),
        (
            Format::Bump,
            [
                android_image(PAGE_SIZE, &kernel, &ramdisk, b"", b""),
                BUMP_MAGIC.to_vec(),
            ]
            .concat(),
        ),
        (Format::Loki, loki_image(&kernel, &ramdisk, true)),
        (
            Format::SonyElf,
            elf_image(&kernel, &ramdisk, b"console=ttyHSL0\0", b""),
        ),
    ];

    for (format, data) in samples {
        let matched = Format::PROBE_ORDER
            .into_iter()
            .filter(|f| f.probe(&data))
            .collect::<Vec<_>>();

        assert_eq!(matched, [format], "Probes for {format} sample");
        assert_eq!(Format::detect(&data).unwrap(), format);
    }
}

#[test]
fn oversized_section_is_rejected() {
    let mut header = Header::new(PAGE_SIZE);
    header.kernel_size = u32::MAX;
    let mut data = header.to_bytes();
    pad(&mut data, PAGE_SIZE as usize);

    assert_matches!(
        BootImage::decode(&data),
        Err(Error::IntOutOfBounds("kernel", _))
    );
}

#[test]
fn invalid_page_size_is_rejected() {
    let mut data = Header::new(1000).to_bytes();
    pad(&mut data, 1000);

    assert_matches!(BootImage::decode(&data), Err(Error::InvalidPageSize(1000)));
}

#[test]
fn truncated_image_is_rejected() {
    let data = android_image(PAGE_SIZE, &pattern(5000, 1), &sample_ramdisk(), b"", b"");
    let data = &data[..3 * PAGE_SIZE as usize + 100];

    assert_matches!(BootImage::decode(data), Err(Error::DataRead("kernel", _)));

    let data = android_image(PAGE_SIZE, &pattern(5000, 1), &sample_ramdisk(), b"", b"");
    let data = &data[..4 * PAGE_SIZE as usize + 100];

    assert_matches!(BootImage::decode(data), Err(Error::DataRead("ramdisk", _)));
}

#[test]
fn unknown_format() {
    assert_matches!(
        BootImage::decode(&pattern(4096, 1)),
        Err(Error::UnknownFormat)
    );
}

#[test]
fn string_too_long() {
    let data = android_image(PAGE_SIZE, &pattern(5000, 1), &sample_ramdisk(), b"", b"");
    let mut image = BootImage::decode(&data).unwrap();
    image.header.name = b"this name is far too long".to_vec();

    assert_matches!(image.encode(), Err(Error::StringTooLong("name", 16, _)));
}

#[test]
fn compute_id_tracks_sections() {
    let data = android_image(PAGE_SIZE, &pattern(5000, 1), &sample_ramdisk(), b"", b"");
    let mut image = BootImage::decode(&data).unwrap();

    let id = image.compute_id();
    assert_eq!(image.compute_id(), id);
    assert_ne!(id, [0; 8]);

    image.set_ramdisk(pattern(100, 2)).unwrap();
    assert_ne!(image.compute_id(), id);
}
