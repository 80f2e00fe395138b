// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Canonical boot image model shared by every container format, and the
//! format registry used for autodetection.

use std::fmt;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::{
    escape,
    format::{android, binary, bump, loki, mtk, sonyelf},
    util::{NumBytes, OutOfBoundsError},
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;

/// Smallest page size any known bootloader uses.
pub const MIN_PAGE_SIZE: u32 = 512;

/// Maximum size of any individual boot image component, like the kernel.
pub const COMPONENT_MAX_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown boot image format")]
    UnknownFormat,
    #[error("Unknown magic: {0:?}")]
    UnknownMagic(Vec<u8>),
    #[error("{0} images of this variant are not supported: {1}")]
    Unsupported(Format, &'static str),
    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),
    #[error("{0:?} field is too long (>{1}): {data:?}", data = .2.as_bstr())]
    StringTooLong(&'static str, usize, Vec<u8>),
    #[error("{0:?} field is out of bounds")]
    IntOutOfBounds(&'static str, #[source] OutOfBoundsError),
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("{field:?} header field ({header}) does not match data size ({actual})")]
    SizeMismatch {
        field: &'static str,
        header: u32,
        actual: usize,
    },
    #[error("{0} images cannot store a {1:?} section")]
    Unrepresentable(Format, &'static str),
    #[error("Mismatched kernel size in headers: MTK {mtk} + header != Android {android}")]
    MismatchedKernelSizeInHeaders { mtk: u32, android: u32 },
    #[error("Mismatched ramdisk size in headers: MTK {mtk} + header != Android {android}")]
    MismatchedRamdiskSizeInHeaders { mtk: u32, android: u32 },
    #[error("{section} entry of size {size} cannot fit an MTK header")]
    InvalidEntrySizeForMtkHeader { section: &'static str, size: u32 },
    #[error("{section} entry of size {size} is too large to fit in an MTK header")]
    EntryTooLargeToFitMtkHeader { section: &'static str, size: usize },
    #[error("MTK header for {section} at offset {offset} exceeds image size {len}")]
    MtkHeaderOffsetTooLarge {
        section: &'static str,
        offset: usize,
        len: usize,
    },
    #[error("Invalid MTK header magic for {section}: {magic:#010x}")]
    InvalidMtkMagic { section: &'static str, magic: u32 },
    #[error("Bump magic not found at offset {0}")]
    BumpMagicNotFound(usize),
    #[error("Loki magic not found")]
    LokiMagicNotFound,
    #[error("Missing {0} segment in ELF image")]
    MissingElfSegment(&'static str),
    #[error("Duplicate {0} segment in ELF image")]
    DuplicateElfSegment(&'static str),
    #[error("ELF segments overlap at offset {0}")]
    OverlappingElfSegments(u32),
    #[error("Invalid ELF header field {0:?}: {1}")]
    InvalidElfHeader(&'static str, u32),
    #[error("Failed to read boot image data: {0}")]
    DataRead(&'static str, #[source] binary::Error),
    #[error("Failed to write boot image data: {0}")]
    DataWrite(&'static str, #[source] binary::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Supported boot image container formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Format {
    Android,
    Mtk,
    SonyElf,
    Loki,
    Bump,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Android => "Android",
            Self::Mtk => "MTK",
            Self::SonyElf => "Sony ELF",
            Self::Loki => "Loki",
            Self::Bump => "Bump",
        })
    }
}

impl Format {
    /// Formats in the order they are probed. Wrappers that embed a regular
    /// Android header come before plain Android images.
    pub const PROBE_ORDER: [Self; 5] = [
        Self::Loki,
        Self::Bump,
        Self::Mtk,
        Self::SonyElf,
        Self::Android,
    ];

    /// Cheaply check whether `data` looks like an image of this format.
    pub fn probe(self, data: &[u8]) -> bool {
        match self {
            Self::Android => android::probe(data),
            Self::Mtk => mtk::probe(data),
            Self::SonyElf => sonyelf::probe(data),
            Self::Loki => loki::probe(data),
            Self::Bump => bump::probe(data),
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<BootImage> {
        match self {
            Self::Android => android::decode(data),
            Self::Mtk => mtk::decode(data),
            Self::SonyElf => sonyelf::decode(data),
            Self::Loki => loki::decode(data),
            Self::Bump => bump::decode(data),
        }
    }

    /// Find the first format whose probe accepts `data`.
    pub fn detect(data: &[u8]) -> Result<Self> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|f| f.probe(data))
            .ok_or(Error::UnknownFormat)
    }
}

/// Format-agnostic header fields. The size fields always describe the
/// corresponding blobs of the owning [`BootImage`].
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BootImageHeader {
    #[serde(skip)]
    pub kernel_size: u32,
    pub kernel_addr: u32,
    #[serde(skip)]
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    #[serde(skip)]
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    #[serde(skip)]
    pub dt_size: u32,
    /// Word following the device tree size. Historically unused, later reused
    /// for the OS version. Preserved verbatim.
    pub unused: u32,
    #[serde(with = "escape")]
    pub name: Vec<u8>,
    #[serde(with = "escape")]
    pub cmdline: Vec<u8>,
    pub id: [u32; 8],
    #[serde(with = "escape")]
    pub extra_cmdline: Vec<u8>,
}

impl fmt::Debug for BootImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootImageHeader")
            .field("kernel_size", &self.kernel_size)
            .field("kernel_addr", &self.kernel_addr)
            .field("ramdisk_size", &self.ramdisk_size)
            .field("ramdisk_addr", &self.ramdisk_addr)
            .field("second_size", &self.second_size)
            .field("second_addr", &self.second_addr)
            .field("tags_addr", &self.tags_addr)
            .field("page_size", &self.page_size)
            .field("dt_size", &self.dt_size)
            .field("unused", &self.unused)
            .field("name", &self.name.as_bstr())
            .field("cmdline", &self.cmdline.as_bstr())
            .field("id", &self.id)
            .field("extra_cmdline", &self.extra_cmdline.as_bstr())
            .finish()
    }
}

impl BootImageHeader {
    pub fn validate_page_size(page_size: u32) -> Result<u32> {
        if page_size < MIN_PAGE_SIZE || !page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(page_size));
        }

        Ok(page_size)
    }
}

/// Container-specific data needed to re-emit the exact wrapper an image was
/// read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wrapper {
    Android(android::AndroidMeta),
    Mtk(mtk::MtkMeta),
    SonyElf(sonyelf::SonyElfMeta),
    Loki(loki::LokiMeta),
    Bump(bump::BumpMeta),
}

impl Wrapper {
    pub fn format(&self) -> Format {
        match self {
            Self::Android(_) => Format::Android,
            Self::Mtk(_) => Format::Mtk,
            Self::SonyElf(_) => Format::SonyElf,
            Self::Loki(_) => Format::Loki,
            Self::Bump(_) => Format::Bump,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BootImage {
    pub header: BootImageHeader,
    pub kernel: Vec<u8>,
    pub ramdisk: Vec<u8>,
    pub second: Vec<u8>,
    pub dt: Vec<u8>,
    pub wrapper: Wrapper,
}

impl fmt::Debug for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootImage")
            .field("header", &self.header)
            .field("kernel", &NumBytes(self.kernel.len()))
            .field("ramdisk", &NumBytes(self.ramdisk.len()))
            .field("second", &NumBytes(self.second.len()))
            .field("dt", &NumBytes(self.dt.len()))
            .field("wrapper", &self.wrapper)
            .finish()
    }
}

impl fmt::Display for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;

        writeln!(f, "{} boot image:", self.format())?;
        writeln!(f, "- Kernel size:          {}", h.kernel_size)?;
        writeln!(f, "- Kernel address:       {:#x}", h.kernel_addr)?;
        writeln!(f, "- Ramdisk size:         {}", h.ramdisk_size)?;
        writeln!(f, "- Ramdisk address:      {:#x}", h.ramdisk_addr)?;
        writeln!(f, "- Second stage size:    {}", h.second_size)?;
        writeln!(f, "- Second stage address: {:#x}", h.second_addr)?;
        writeln!(f, "- Kernel tags address:  {:#x}", h.tags_addr)?;
        writeln!(f, "- Page size:            {}", h.page_size)?;
        writeln!(f, "- Device tree size:     {}", h.dt_size)?;
        writeln!(f, "- Name:                 {:?}", h.name.as_bstr())?;
        writeln!(f, "- Kernel cmdline:       {:?}", h.cmdline.as_bstr())?;
        write!(f, "- ID:                   {:08x?}", h.id)
    }
}

impl BootImage {
    /// Create an image from its parts, deriving the header size fields from
    /// the blobs.
    pub fn new(
        header: BootImageHeader,
        kernel: Vec<u8>,
        ramdisk: Vec<u8>,
        second: Vec<u8>,
        dt: Vec<u8>,
        wrapper: Wrapper,
    ) -> Result<Self> {
        let mut image = Self {
            header,
            kernel,
            ramdisk,
            second,
            dt,
            wrapper,
        };
        image.sync_sizes()?;

        Ok(image)
    }

    /// Autodetect the container format and decode the image.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Format::detect(data)?.decode(data)
    }

    /// Encode the image with the same container format it was decoded from.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.check_sizes()?;

        match &self.wrapper {
            Wrapper::Android(meta) => android::encode(self, meta),
            Wrapper::Mtk(meta) => mtk::encode(self, meta),
            Wrapper::SonyElf(meta) => sonyelf::encode(self, meta),
            Wrapper::Loki(meta) => loki::encode(self, meta),
            Wrapper::Bump(meta) => bump::encode(self, meta),
        }
    }

    pub fn format(&self) -> Format {
        self.wrapper.format()
    }

    pub fn set_kernel(&mut self, data: Vec<u8>) -> Result<()> {
        self.kernel = data;
        self.sync_sizes()
    }

    /// Replace the ramdisk and update the header's ramdisk size.
    pub fn set_ramdisk(&mut self, data: Vec<u8>) -> Result<()> {
        self.ramdisk = data;
        self.sync_sizes()
    }

    pub fn set_second(&mut self, data: Vec<u8>) -> Result<()> {
        self.second = data;
        self.sync_sizes()
    }

    pub fn set_dt(&mut self, data: Vec<u8>) -> Result<()> {
        self.dt = data;
        self.sync_sizes()
    }

    fn section_size(field: &'static str, data: &[u8]) -> Result<u32> {
        let size = u32::try_from(data.len()).map_err(|_| Error::IntOverflow(field))?;
        crate::util::check_bounds(size, ..=COMPONENT_MAX_SIZE)
            .map_err(|e| Error::IntOutOfBounds(field, e))
    }

    fn sync_sizes(&mut self) -> Result<()> {
        self.header.kernel_size = Self::section_size("kernel_size", &self.kernel)?;
        self.header.ramdisk_size = Self::section_size("ramdisk_size", &self.ramdisk)?;
        self.header.second_size = Self::section_size("second_size", &self.second)?;
        self.header.dt_size = Self::section_size("dt_size", &self.dt)?;

        Ok(())
    }

    fn check_sizes(&self) -> Result<()> {
        for (field, header, data) in [
            ("kernel_size", self.header.kernel_size, &self.kernel),
            ("ramdisk_size", self.header.ramdisk_size, &self.ramdisk),
            ("second_size", self.header.second_size, &self.second),
            ("dt_size", self.header.dt_size, &self.dt),
        ] {
            if header as usize != data.len() {
                return Err(Error::SizeMismatch {
                    field,
                    header,
                    actual: data.len(),
                });
            }
        }

        BootImageHeader::validate_page_size(self.header.page_size)?;

        Ok(())
    }

    /// Compute the id the way mkbootimg does: a SHA-1 digest over each
    /// section followed by its little-endian size. The device tree is only
    /// included when present.
    pub fn compute_id(&self) -> [u32; 8] {
        let mut hasher = Sha1::new();

        for data in [&self.kernel, &self.ramdisk, &self.second] {
            hasher.update(data);
            hasher.update((data.len() as u32).to_le_bytes());
        }

        if !self.dt.is_empty() {
            hasher.update(&self.dt);
            hasher.update((self.dt.len() as u32).to_le_bytes());
        }

        let digest = hasher.finalize();
        let mut id = [0u32; 8];

        for (word, chunk) in id.iter_mut().zip(digest.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        id
    }
}
