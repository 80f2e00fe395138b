// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Sony ELF images. Older Sony devices boot a 32-bit little-endian ELF file
//! where each boot image component is a program segment identified by its
//! type and flags.

use std::mem;

use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::{
    binary::{ByteReader, ByteWriter},
    bootimage::{BootImage, BootImageHeader, Error, Format, Result, Wrapper},
    padding::ZeroPadding,
};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;

const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;
const PT_SIN: u32 = 0x53494e21;

const FLAGS_KERNEL: u32 = 0;
const FLAGS_RAMDISK: u32 = 0x80000000;
const FLAGS_IPL: u32 = 0x40000000;
const FLAGS_CMDLINE: u32 = 0x20000000;
const FLAGS_RPM: u32 = 0x01000000;
const FLAGS_APPSBL: u32 = 0x02000000;

/// Sony images have no notion of a page size. This is reported so that the
/// canonical header stays valid.
pub const PLACEHOLDER_PAGE_SIZE: u32 = 4096;

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawElfHeader {
    e_ident: [u8; 16],
    e_type: little_endian::U16,
    e_machine: little_endian::U16,
    e_version: little_endian::U32,
    e_entry: little_endian::U32,
    e_phoff: little_endian::U32,
    e_shoff: little_endian::U32,
    e_flags: little_endian::U32,
    e_ehsize: little_endian::U16,
    e_phentsize: little_endian::U16,
    e_phnum: little_endian::U16,
    e_shentsize: little_endian::U16,
    e_shnum: little_endian::U16,
    e_shstrndx: little_endian::U16,
}

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawProgramHeader {
    p_type: little_endian::U32,
    p_offset: little_endian::U32,
    p_vaddr: little_endian::U32,
    p_paddr: little_endian::U32,
    p_filesz: little_endian::U32,
    p_memsz: little_endian::U32,
    p_flags: little_endian::U32,
    p_align: little_endian::U32,
}

const EHDR_SIZE: usize = mem::size_of::<RawElfHeader>();
const PHDR_SIZE: usize = mem::size_of::<RawProgramHeader>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Kernel,
    Ramdisk,
    Cmdline,
    Ipl,
    Rpm,
    Appsbl,
    Sin,
    Other,
}

impl SegmentKind {
    fn classify(p_type: u32, p_flags: u32) -> Self {
        match (p_type, p_flags) {
            (PT_LOAD, FLAGS_KERNEL) => Self::Kernel,
            (PT_LOAD, FLAGS_RAMDISK) => Self::Ramdisk,
            (PT_NOTE, FLAGS_CMDLINE) => Self::Cmdline,
            (PT_SIN, _) => Self::Sin,
            (_, FLAGS_IPL) => Self::Ipl,
            (_, FLAGS_RPM) => Self::Rpm,
            (_, FLAGS_APPSBL) => Self::Appsbl,
            _ => Self::Other,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Cmdline => "cmdline",
            Self::Ipl => "ipl",
            Self::Rpm => "rpm",
            Self::Appsbl => "appsbl",
            Self::Sin => "sin",
            Self::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SonyElfSegment {
    pub kind: SegmentKind,
    pub p_type: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
    /// Whether `p_memsz` equals the file size and should follow it.
    pub memsz_follows_filesz: bool,
    /// Offset used verbatim when the segment has no data.
    pub original_offset: u32,
    /// Bytes preceding this segment in file order.
    pub gap: Vec<u8>,
    /// Segment data for segments that have no canonical counterpart.
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SonyElfMeta {
    /// Raw ELF header. The program header table location is preserved.
    pub ehdr: Vec<u8>,
    /// Bytes between the ELF header and the program header table.
    pub phdr_gap: Vec<u8>,
    /// Segments in program header table order.
    pub segments: Vec<SonyElfSegment>,
    /// Indices into `segments` in file order.
    pub file_order: Vec<usize>,
    /// Number of NUL bytes following the command line in its segment.
    pub cmdline_padding: usize,
    /// Data following the last segment.
    pub trailer: Vec<u8>,
}

pub fn probe(data: &[u8]) -> bool {
    data.starts_with(ELF_MAGIC)
}

pub fn decode(data: &[u8]) -> Result<BootImage> {
    let mut reader = ByteReader::new(data);
    let ehdr = reader
        .read_struct::<RawElfHeader>()
        .map_err(|e| Error::DataRead("ehdr", e))?;

    if !ehdr.e_ident.starts_with(ELF_MAGIC) {
        return Err(Error::UnknownMagic(ehdr.e_ident[..4].to_vec()));
    } else if ehdr.e_ident[4] != ELFCLASS32 {
        return Err(Error::Unsupported(
            Format::SonyElf,
            "only 32-bit ELF files are supported",
        ));
    } else if ehdr.e_ident[5] != ELFDATA2LSB {
        return Err(Error::Unsupported(
            Format::SonyElf,
            "only little-endian ELF files are supported",
        ));
    } else if ehdr.e_shnum.get() != 0 {
        return Err(Error::Unsupported(
            Format::SonyElf,
            "section headers are not supported",
        ));
    } else if usize::from(ehdr.e_phentsize.get()) != PHDR_SIZE {
        return Err(Error::InvalidElfHeader(
            "e_phentsize",
            ehdr.e_phentsize.get().into(),
        ));
    }

    let phoff = ehdr.e_phoff.get() as usize;
    if phoff < EHDR_SIZE {
        return Err(Error::InvalidElfHeader("e_phoff", ehdr.e_phoff.get()));
    }

    let phdr_gap = reader
        .read_bytes(phoff - EHDR_SIZE)
        .map_err(|e| Error::DataRead("phdr_gap", e))?;

    let phdrs = (0..ehdr.e_phnum.get())
        .map(|_| reader.read_struct::<RawProgramHeader>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::DataRead("phdr", e))?;

    let mut file_order = (0..phdrs.len()).collect::<Vec<_>>();
    file_order.sort_by_key(|&i| phdrs[i].p_offset.get());

    let mut segments = phdrs
        .iter()
        .map(|p| SonyElfSegment {
            kind: SegmentKind::classify(p.p_type.get(), p.p_flags.get()),
            p_type: p.p_type.get(),
            p_vaddr: p.p_vaddr.get(),
            p_paddr: p.p_paddr.get(),
            p_memsz: p.p_memsz.get(),
            p_flags: p.p_flags.get(),
            p_align: p.p_align.get(),
            memsz_follows_filesz: p.p_memsz.get() == p.p_filesz.get(),
            original_offset: p.p_offset.get(),
            gap: Vec::new(),
            data: Vec::new(),
        })
        .collect::<Vec<_>>();

    let mut kernel = None;
    let mut ramdisk = None;
    let mut cmdline = None;

    for &i in &file_order {
        let phdr = &phdrs[i];
        let segment = &mut segments[i];
        let offset = phdr.p_offset.get() as usize;
        let size = phdr.p_filesz.get() as usize;

        if offset >= reader.position() {
            segment.gap = reader
                .read_bytes(offset - reader.position())
                .map_err(|e| Error::DataRead("segment_gap", e))?
                .to_vec();
        } else if size > 0 {
            return Err(Error::OverlappingElfSegments(phdr.p_offset.get()));
        }

        let buf = reader
            .read_bytes(size)
            .map_err(|e| Error::DataRead(segment.kind.name(), e))?;

        let slot = match segment.kind {
            SegmentKind::Kernel => &mut kernel,
            SegmentKind::Ramdisk => &mut ramdisk,
            SegmentKind::Cmdline => &mut cmdline,
            _ => {
                segment.data = buf.to_vec();
                continue;
            }
        };

        if slot.replace(buf).is_some() {
            return Err(Error::DuplicateElfSegment(segment.kind.name()));
        }
    }

    let kernel = kernel.ok_or(Error::MissingElfSegment("kernel"))?;
    let ramdisk = ramdisk.ok_or(Error::MissingElfSegment("ramdisk"))?;
    let cmdline_data = cmdline.unwrap_or_default();
    let cmdline = cmdline_data.trim_end_padding();

    let find = |kind| segments.iter().find(|s| s.kind == kind);

    let header = BootImageHeader {
        kernel_addr: find(SegmentKind::Kernel).map_or(0, |s| s.p_vaddr),
        ramdisk_addr: find(SegmentKind::Ramdisk).map_or(0, |s| s.p_vaddr),
        page_size: PLACEHOLDER_PAGE_SIZE,
        cmdline: cmdline.to_vec(),
        ..Default::default()
    };

    let meta = SonyElfMeta {
        ehdr: ehdr.as_bytes().to_vec(),
        phdr_gap: phdr_gap.to_vec(),
        cmdline_padding: cmdline_data.len() - cmdline.len(),
        segments,
        file_order,
        trailer: reader.rest().to_vec(),
    };

    BootImage::new(
        header,
        kernel.to_vec(),
        ramdisk.to_vec(),
        Vec::new(),
        Vec::new(),
        Wrapper::SonyElf(meta),
    )
}

/// Data to write for a segment, taken from the canonical image when the
/// segment has a counterpart there.
fn segment_data<'a>(
    segment: &'a SonyElfSegment,
    image: &'a BootImage,
    cmdline: &'a [u8],
) -> &'a [u8] {
    match segment.kind {
        SegmentKind::Kernel => &image.kernel,
        SegmentKind::Ramdisk => &image.ramdisk,
        SegmentKind::Cmdline => cmdline,
        _ => &segment.data,
    }
}

pub(crate) fn encode(image: &BootImage, meta: &SonyElfMeta) -> Result<Vec<u8>> {
    if !image.second.is_empty() {
        return Err(Error::Unrepresentable(Format::SonyElf, "second"));
    } else if !image.dt.is_empty() {
        return Err(Error::Unrepresentable(Format::SonyElf, "dt"));
    } else if !image.header.name.is_empty() {
        return Err(Error::Unrepresentable(Format::SonyElf, "name"));
    } else if !image.header.cmdline.is_empty()
        && !meta.segments.iter().any(|s| s.kind == SegmentKind::Cmdline)
    {
        return Err(Error::Unrepresentable(Format::SonyElf, "cmdline"));
    }

    let ehdr = RawElfHeader::read_from_bytes(&meta.ehdr)
        .map_err(|_| Error::InvalidElfHeader("ehdr", meta.ehdr.len() as u32))?;

    let mut cmdline = image.header.cmdline.clone();
    cmdline.resize(cmdline.len() + meta.cmdline_padding, 0);

    // Lay out the segments in file order after the program header table.
    let mut offset = EHDR_SIZE + meta.phdr_gap.len() + meta.segments.len() * PHDR_SIZE;
    let mut offsets = vec![0u32; meta.segments.len()];

    for &i in &meta.file_order {
        let segment = &meta.segments[i];
        let data = segment_data(segment, image, &cmdline);

        offset += segment.gap.len();
        offsets[i] = if data.is_empty() {
            segment.original_offset
        } else {
            u32::try_from(offset).map_err(|_| Error::IntOverflow(segment.kind.name()))?
        };
        offset = offset
            .checked_add(data.len())
            .ok_or(Error::IntOverflow(segment.kind.name()))?;
    }

    let mut writer = ByteWriter::with_capacity(offset + meta.trailer.len());
    writer.write_struct(&ehdr);
    writer.write_bytes(&meta.phdr_gap);

    for (segment, &p_offset) in meta.segments.iter().zip(&offsets) {
        let filesz = segment_data(segment, image, &cmdline).len() as u32;
        let addr_override = match segment.kind {
            SegmentKind::Kernel => Some(image.header.kernel_addr),
            SegmentKind::Ramdisk => Some(image.header.ramdisk_addr),
            _ => None,
        };

        writer.write_struct(&RawProgramHeader {
            p_type: segment.p_type.into(),
            p_offset: p_offset.into(),
            p_vaddr: addr_override.unwrap_or(segment.p_vaddr).into(),
            p_paddr: segment.p_paddr.into(),
            p_filesz: filesz.into(),
            p_memsz: if segment.memsz_follows_filesz {
                filesz
            } else {
                segment.p_memsz
            }
            .into(),
            p_flags: segment.p_flags.into(),
            p_align: segment.p_align.into(),
        });
    }

    for &i in &meta.file_order {
        let segment = &meta.segments[i];
        writer.write_bytes(&segment.gap);
        writer.write_bytes(segment_data(segment, image, &cmdline));
    }

    writer.write_bytes(&meta.trailer);

    Ok(writer.into_inner())
}
