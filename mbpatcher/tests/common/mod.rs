// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Builders for test images. These write every byte by hand so that the
//! decoders are checked against independently constructed data.

#![allow(dead_code)]

pub const KERNEL_ADDR: u32 = 0x10008000;
pub const RAMDISK_ADDR: u32 = 0x11000000;
pub const SECOND_ADDR: u32 = 0x10f00000;
pub const TAGS_ADDR: u32 = 0x10000100;

pub const HEADER_SIZE: usize = 1632;

pub fn pad(buf: &mut Vec<u8>, page_size: usize) {
    let remain = buf.len() % page_size;
    if remain != 0 {
        buf.resize(buf.len() + page_size - remain, 0);
    }
}

fn fixed(data: &[u8], size: usize) -> Vec<u8> {
    assert!(data.len() <= size);

    let mut result = data.to_vec();
    result.resize(size, 0);
    result
}

#[derive(Clone, Debug)]
pub struct Header {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub dt_size: u32,
    pub name: Vec<u8>,
    pub cmdline: Vec<u8>,
    pub id: [u32; 8],
    pub extra_cmdline: Vec<u8>,
}

impl Header {
    pub fn new(page_size: u32) -> Self {
        Self {
            kernel_size: 0,
            kernel_addr: KERNEL_ADDR,
            ramdisk_size: 0,
            ramdisk_addr: RAMDISK_ADDR,
            second_size: 0,
            second_addr: SECOND_ADDR,
            tags_addr: TAGS_ADDR,
            page_size,
            dt_size: 0,
            name: b"hammerhead".to_vec(),
            cmdline: b"console=ttyHSL0,115200,n8 androidboot.hardware=hammerhead".to_vec(),
            id: [
                0x00112233, 0x44556677, 0x8899aabb, 0xccddeeff, 0xffeeddcc, 0xbbaa9988,
                0x77665544, 0x33221100,
            ],
            extra_cmdline: vec![],
        }
    }

    pub fn sizes(mut self, kernel: usize, ramdisk: usize, second: usize, dt: usize) -> Self {
        self.kernel_size = kernel as u32;
        self.ramdisk_size = ramdisk as u32;
        self.second_size = second as u32;
        self.dt_size = dt as u32;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = b"ANDROID!".to_vec();

        for value in [
            self.kernel_size,
            self.kernel_addr,
            self.ramdisk_size,
            self.ramdisk_addr,
            self.second_size,
            self.second_addr,
            self.tags_addr,
            self.page_size,
            self.dt_size,
            0,
        ] {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        buf.extend_from_slice(&fixed(&self.name, 16));
        buf.extend_from_slice(&fixed(&self.cmdline, 512));
        for word in self.id {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf.extend_from_slice(&fixed(&self.extra_cmdline, 1024));

        assert_eq!(buf.len(), HEADER_SIZE);

        buf
    }
}

/// Build a plain Android image where every section, including the last one,
/// is padded to the page size.
pub fn android_image(
    page_size: u32,
    kernel: &[u8],
    ramdisk: &[u8],
    second: &[u8],
    dt: &[u8],
) -> Vec<u8> {
    let header = Header::new(page_size).sizes(kernel.len(), ramdisk.len(), second.len(), dt.len());
    let page_size = page_size as usize;

    let mut buf = header.to_bytes();
    pad(&mut buf, page_size);

    for section in [kernel, ramdisk, second, dt] {
        buf.extend_from_slice(section);
        pad(&mut buf, page_size);
    }

    buf
}

/// Deterministic non-trivial data.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn cpio_entry(ino: u32, name: &str, mode: u32, content: &[u8]) -> Vec<u8> {
    let mut buf = format!(
        "070701{ino:08x}{mode:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}",
        0,
        0,
        1,
        0,
        content.len(),
        0,
        0,
        0,
        0,
        name.len() + 1,
        0,
    )
    .into_bytes();
    assert_eq!(buf.len(), 110);

    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    pad(&mut buf, 4);
    buf.extend_from_slice(content);
    pad(&mut buf, 4);

    buf
}

/// Build a cpio archive from `(name, mode, content)` tuples. Inodes are
/// assigned sequentially starting at 1.
pub fn cpio_archive(entries: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let mut buf = vec![];

    for (i, (name, mode, content)) in entries.iter().enumerate() {
        buf.extend_from_slice(&cpio_entry(i as u32 + 1, name, *mode, content));
    }

    buf.extend_from_slice(&cpio_entry(0, "TRAILER!!!", 0, b""));

    buf
}

pub const INIT_RC: &[u8] = b"\
import /init.environ.rc

on init
    mkdir /cache 0770 system cache

service ueventd /sbin/ueventd
    class core
    critical
";

pub const FSTAB: &[u8] = b"\
# Android fstab file.
/dev/block/platform/msm_sdcc.1/by-name/system /system ext4 ro,barrier=1 wait,verify
/dev/block/platform/msm_sdcc.1/by-name/cache /cache ext4 noatime,nosuid wait,check
/dev/block/platform/msm_sdcc.1/by-name/userdata /data ext4 noatime,nosuid wait,check,forceencrypt=/dev/block/platform/msm_sdcc.1/by-name/metadata
";

/// A small, realistic, uncompressed ramdisk.
pub fn ramdisk() -> Vec<u8> {
    let init = pattern(300, 7);
    let verity_key = pattern(524, 3);

    let entries: [(&str, u32, &[u8]); 5] = [
        ("init", 0o100750, init.as_slice()),
        ("init.rc", 0o100750, INIT_RC),
        ("fstab.hammerhead", 0o100640, FSTAB),
        ("sbin", 0o40750, &[]),
        ("verity_key", 0o100644, verity_key.as_slice()),
    ];

    cpio_archive(&entries)
}

pub const DEVICES: &str = r#"
[[device]]
id = "hammerhead"
codenames = ["hammerhead"]
name = "Google Nexus 5"
architecture = "armeabi-v7a"

[device.block_devs]
system = ["/dev/block/platform/msm_sdcc.1/by-name/system"]
cache = ["/dev/block/platform/msm_sdcc.1/by-name/cache"]
data = ["/dev/block/platform/msm_sdcc.1/by-name/userdata"]
boot = ["/dev/block/platform/msm_sdcc.1/by-name/boot"]
recovery = ["/dev/block/platform/msm_sdcc.1/by-name/recovery"]
"#;
