// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! In-memory "new ASCII" (newc) cpio archives, as used for Android ramdisks.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use bstr::ByteSlice;
use thiserror::Error;

use crate::{
    format::{
        binary::{self, ByteReader, ByteWriter},
        padding,
    },
    util::{self, NumBytes},
};

const MAGIC_NEW: &[u8; 6] = b"070701";
const MAGIC_NEW_CRC: &[u8; 6] = b"070702";

const CPIO_TRAILER: &[u8; 10] = b"TRAILER!!!";

/// Size of the fixed ASCII header of every entry, including the magic.
pub const HEADER_SIZE: usize = 110;

const S_IFMT: u32 = 0o170000;
const S_IFIFO: u32 = 0o010000;
const S_IFCHR: u32 = 0o020000;
const S_IFDIR: u32 = 0o040000;
const S_IFBLK: u32 = 0o060000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFSOCK: u32 = 0o140000;

const PERMS_MASK: u32 = 0o7777;

/// Block size the kernel's initramfs loader historically expects archives to
/// be padded to.
pub const IO_BLOCK_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown magic at offset {offset}: {magic:?}")]
    UnknownMagic { offset: usize, magic: [u8; 6] },
    #[error("{field:?} field at offset {offset} is not a hex number: {value:?}")]
    InvalidHexField {
        field: &'static str,
        offset: usize,
        value: [u8; 8],
    },
    #[error("Filename at offset {0} is not NULL-terminated")]
    NameNotTerminated(usize),
    #[error("Truncated data while reading {0:?}")]
    Truncated(&'static str, #[source] binary::Error),
    #[error("Archive has no trailer entry")]
    MissingTrailer,
    #[error("Hard links are not supported: {:?}", .0.as_bstr())]
    HardLinksNotSupported(Vec<u8>),
    #[error("{0:?} field exceeds integer bounds")]
    IntegerTooLarge(&'static str),
    #[error("Entry not found: {:?}", .0.as_bstr())]
    NotFound(Vec<u8>),
    #[error("Invalid entry name: {:?}", .0.as_bstr())]
    InvalidName(Vec<u8>),
    #[error("Failed to read file: {0:?}")]
    File(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpioEntryType {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Pipe,
    Socket,
    Unknown(u32),
}

impl CpioEntryType {
    fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFCHR => Self::CharDevice,
            S_IFBLK => Self::BlockDevice,
            S_IFIFO => Self::Pipe,
            S_IFSOCK => Self::Socket,
            m => Self::Unknown(m),
        }
    }
}

impl fmt::Display for CpioEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("regular file"),
            Self::Directory => f.write_str("directory"),
            Self::Symlink => f.write_str("symbolic link"),
            Self::CharDevice => f.write_str("character device"),
            Self::BlockDevice => f.write_str("block device"),
            Self::Pipe => f.write_str("pipe"),
            Self::Socket => f.write_str("socket"),
            Self::Unknown(m) => write!(f, "unknown ({m:o})"),
        }
    }
}

/// Read u32 formatted as an ASCII 8-char wide hex string.
fn read_int(reader: &mut ByteReader, field: &'static str) -> Result<u32> {
    let offset = reader.position();
    let buf = reader
        .read_array::<8>()
        .map_err(|e| Error::Truncated(field, e))?;

    let mut value = 0;

    for b in buf {
        let digit = (b as char).to_digit(16).ok_or(Error::InvalidHexField {
            field,
            offset,
            value: buf,
        })?;

        value <<= 4;
        value |= digit;
    }

    Ok(value)
}

/// Write u32 formatted as an ASCII 8-char wide hex string.
fn write_int(writer: &mut ByteWriter, value: u32) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    let mut buf = [b'0'; 8];
    for (i, b) in buf.iter_mut().rev().enumerate() {
        *b = DIGITS[((value >> (i * 4)) & 0xf) as usize];
    }

    writer.write_bytes(&buf);
}

/// Reject names that are empty, absolute, contain NUL bytes, or have `.` or
/// `..` components.
fn validate_name(name: &[u8]) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with(b"/")
        || name.contains(&b'\0')
        || name.split(|b| *b == b'/').any(|c| c == b"." || c == b"..");

    if invalid {
        return Err(Error::InvalidName(name.to_vec()));
    }

    Ok(())
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct CpioEntry {
    pub name: Vec<u8>,
    /// File type and permission bits.
    pub mode: u32,
    pub content: Vec<u8>,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub dev_maj: u32,
    pub dev_min: u32,
    pub rdev_maj: u32,
    pub rdev_min: u32,
    pub chksum: u32,
    /// Whether the entry was stored with the `070702` magic.
    pub crc_magic: bool,
}

impl fmt::Debug for CpioEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpioEntry")
            .field("name", &self.name.as_bstr())
            .field("mode", &format_args!("{:o}", self.mode))
            .field("content", &NumBytes(self.content.len()))
            .field("ino", &self.ino)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("nlink", &self.nlink)
            .field("mtime", &self.mtime)
            .field("dev_maj", &self.dev_maj)
            .field("dev_min", &self.dev_min)
            .field("rdev_maj", &self.rdev_maj)
            .field("rdev_min", &self.rdev_min)
            .field("chksum", &self.chksum)
            .field("crc_magic", &self.crc_magic)
            .finish()
    }
}

impl fmt::Display for CpioEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filename:  {:?}", self.name.as_bstr())?;
        writeln!(f, "Filetype:  {}", self.file_type())?;
        writeln!(f, "Inode:     {}", self.ino)?;
        writeln!(f, "Mode:      {:o}", self.mode)?;
        writeln!(f, "UID:       {}", self.uid)?;
        writeln!(f, "GID:       {}", self.gid)?;
        writeln!(f, "Links:     {}", self.nlink)?;
        writeln!(f, "Modified:  {}", self.mtime)?;
        writeln!(f, "Device:    {:x},{:x}", self.dev_maj, self.dev_min)?;
        writeln!(f, "Device ID: {:x},{:x}", self.rdev_maj, self.rdev_min)?;
        writeln!(f, "Checksum:  {:x}", self.chksum)?;
        write!(f, "Content:   {:?}", NumBytes(self.content.len()))
    }
}

impl CpioEntry {
    pub fn new_trailer() -> Self {
        Self {
            nlink: 1,
            name: CPIO_TRAILER.to_vec(),
            ..Default::default()
        }
    }

    pub fn new_file(name: &[u8], perms: u32, content: Vec<u8>) -> Self {
        Self {
            name: name.to_owned(),
            mode: S_IFREG | (perms & PERMS_MASK),
            nlink: 1,
            content,
            ..Default::default()
        }
    }

    pub fn new_symlink(name: &[u8], target: &[u8]) -> Self {
        Self {
            name: name.to_owned(),
            mode: S_IFLNK | 0o777,
            nlink: 1,
            content: target.to_owned(),
            ..Default::default()
        }
    }

    pub fn new_directory(name: &[u8], perms: u32) -> Self {
        Self {
            name: name.to_owned(),
            mode: S_IFDIR | (perms & PERMS_MASK),
            nlink: 1,
            ..Default::default()
        }
    }

    pub fn file_type(&self) -> CpioEntryType {
        CpioEntryType::from_mode(self.mode)
    }

    pub fn perms(&self) -> u32 {
        self.mode & PERMS_MASK
    }

    /// Number of bytes this entry occupies in a serialized archive.
    pub fn serialized_size(&self) -> usize {
        let header = HEADER_SIZE + self.name.len() + 1;
        let header = header + padding::calc(header, 4);

        header + self.content.len() + padding::calc(self.content.len(), 4)
    }

    fn read(reader: &mut ByteReader) -> Result<Self> {
        let offset = reader.position();
        let magic = reader
            .read_array::<6>()
            .map_err(|e| Error::Truncated("magic", e))?;

        let crc_magic = if magic == *MAGIC_NEW {
            false
        } else if magic == *MAGIC_NEW_CRC {
            true
        } else {
            return Err(Error::UnknownMagic { offset, magic });
        };

        let ino = read_int(reader, "ino")?;
        let mode = read_int(reader, "mode")?;
        let uid = read_int(reader, "uid")?;
        let gid = read_int(reader, "gid")?;
        let nlink = read_int(reader, "nlink")?;
        let mtime = read_int(reader, "mtime")?;
        let filesize = read_int(reader, "filesize")?;
        let dev_maj = read_int(reader, "dev_maj")?;
        let dev_min = read_int(reader, "dev_min")?;
        let rdev_maj = read_int(reader, "rdev_maj")?;
        let rdev_min = read_int(reader, "rdev_min")?;
        let namesize = read_int(reader, "namesize")?;
        let chksum = read_int(reader, "chksum")?;

        let name_offset = reader.position();
        let name = reader
            .read_bytes(namesize as usize)
            .map_err(|e| Error::Truncated("name", e))?;
        let Some((&b'\0', name)) = name.split_last() else {
            return Err(Error::NameNotTerminated(name_offset));
        };
        reader
            .align(4)
            .map_err(|e| Error::Truncated("name_padding", e))?;

        let content = reader
            .read_bytes(filesize as usize)
            .map_err(|e| Error::Truncated("content", e))?;
        reader
            .align(4)
            .map_err(|e| Error::Truncated("content_padding", e))?;

        Ok(Self {
            name: name.to_vec(),
            mode,
            content: content.to_vec(),
            ino,
            uid,
            gid,
            nlink,
            mtime,
            dev_maj,
            dev_min,
            rdev_maj,
            rdev_min,
            chksum,
            crc_magic,
        })
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        let filesize = u32::try_from(self.content.len())
            .map_err(|_| Error::IntegerTooLarge("filesize"))?;
        let namesize = self
            .name
            .len()
            .checked_add(1)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or(Error::IntegerTooLarge("namesize"))?;

        if self.crc_magic {
            writer.write_bytes(MAGIC_NEW_CRC);
        } else {
            writer.write_bytes(MAGIC_NEW);
        }

        write_int(writer, self.ino);
        write_int(writer, self.mode);
        write_int(writer, self.uid);
        write_int(writer, self.gid);
        write_int(writer, self.nlink);
        write_int(writer, self.mtime);
        write_int(writer, filesize);
        write_int(writer, self.dev_maj);
        write_int(writer, self.dev_min);
        write_int(writer, self.rdev_maj);
        write_int(writer, self.rdev_min);
        write_int(writer, namesize);
        write_int(writer, self.chksum);

        writer.write_bytes(&self.name);
        writer.write_zeros(1);
        writer
            .pad_to(4)
            .map_err(|_| Error::IntegerTooLarge("name_padding"))?;

        writer.write_bytes(&self.content);
        writer
            .pad_to(4)
            .map_err(|_| Error::IntegerTooLarge("content_padding"))?;

        Ok(())
    }
}

/// What follows the trailer entry in a serialized archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TrailerPadding {
    /// Nothing beyond the trailer's own 4-byte alignment.
    #[default]
    None,
    /// Zero padding up to the next [`IO_BLOCK_SIZE`] boundary.
    Block,
    /// Arbitrary bytes, preserved verbatim.
    Raw(Vec<u8>),
}

impl TrailerPadding {
    fn classify(archive_len: usize, rest: &[u8]) -> Self {
        if rest.is_empty() {
            Self::None
        } else if rest.len() < IO_BLOCK_SIZE
            && util::is_zero(rest)
            && (archive_len + rest.len()) % IO_BLOCK_SIZE == 0
        {
            Self::Block
        } else {
            Self::Raw(rest.to_vec())
        }
    }
}

/// An ordered collection of cpio entries. The order of entries is the order
/// in which they are serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpioArchive {
    entries: Vec<CpioEntry>,
    trailer: CpioEntry,
    padding: TrailerPadding,
}

impl Default for CpioArchive {
    fn default() -> Self {
        Self {
            entries: vec![],
            trailer: CpioEntry::new_trailer(),
            padding: TrailerPadding::None,
        }
    }
}

impl CpioArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(data: &[u8]) -> Result<Self> {
        Self::load_with_progress(data, |_, _| {})
    }

    /// Parse an archive, invoking `progress` with the number of bytes parsed
    /// and the total size after every entry.
    pub fn load_with_progress(data: &[u8], mut progress: impl FnMut(u64, u64)) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let mut entries = vec![];
        let total = data.len() as u64;

        let trailer = loop {
            if reader.remaining() == 0 {
                return Err(Error::MissingTrailer);
            }

            let entry = CpioEntry::read(&mut reader)?;
            progress(reader.position() as u64, total);

            if entry.name == CPIO_TRAILER {
                break entry;
            }

            if entry.file_type() != CpioEntryType::Directory && entry.nlink > 1 {
                return Err(Error::HardLinksNotSupported(entry.name));
            }

            entries.push(entry);
        };

        let padding = TrailerPadding::classify(reader.position(), reader.rest());

        Ok(Self {
            entries,
            trailer,
            padding,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(self.serialized_size());

        for entry in &self.entries {
            entry.write(&mut writer)?;
        }

        self.trailer.write(&mut writer)?;

        match &self.padding {
            TrailerPadding::None => {}
            TrailerPadding::Block => {
                writer
                    .pad_to(IO_BLOCK_SIZE)
                    .map_err(|_| Error::IntegerTooLarge("trailer_padding"))?;
            }
            TrailerPadding::Raw(data) => writer.write_bytes(data),
        }

        Ok(writer.into_inner())
    }

    /// Size of the serialized archive.
    pub fn serialized_size(&self) -> usize {
        let size = self
            .entries
            .iter()
            .chain(std::iter::once(&self.trailer))
            .map(|e| e.serialized_size())
            .sum::<usize>();

        match &self.padding {
            TrailerPadding::None => size,
            TrailerPadding::Block => size + padding::calc(size, IO_BLOCK_SIZE),
            TrailerPadding::Raw(data) => size + data.len(),
        }
    }

    pub fn padding(&self) -> &TrailerPadding {
        &self.padding
    }

    pub fn set_padding(&mut self, padding: TrailerPadding) {
        self.padding = padding;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CpioEntry] {
        &self.entries
    }

    pub fn filenames(&self) -> Vec<&[u8]> {
        self.entries.iter().map(|e| e.name.as_slice()).collect()
    }

    fn position(&self, name: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn exists(&self, name: impl AsRef<[u8]>) -> bool {
        self.position(name.as_ref()).is_some()
    }

    pub fn entry(&self, name: impl AsRef<[u8]>) -> Option<&CpioEntry> {
        let name = name.as_ref();
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entry_mut(&mut self, name: impl AsRef<[u8]>) -> Option<&mut CpioEntry> {
        let name = name.as_ref();
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// Get the content of an entry. For symlinks, this is the link target.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Result<&[u8]> {
        let name = name.as_ref();
        self.entry(name)
            .map(|e| e.content.as_slice())
            .ok_or_else(|| Error::NotFound(name.to_vec()))
    }

    fn next_inode(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.ino)
            .max()
            .map_or(0, |i| i.saturating_add(1))
    }

    /// Insert an entry, replacing an existing entry with the same name in
    /// place. New entries are appended and receive the next free inode.
    fn upsert(&mut self, mut entry: CpioEntry) -> Result<()> {
        validate_name(&entry.name)?;

        if let Some(index) = self.position(&entry.name) {
            let old = &mut self.entries[index];
            old.mode = entry.mode;
            old.content = entry.content;
        } else {
            entry.ino = self.next_inode();
            self.entries.push(entry);
        }

        Ok(())
    }

    /// Set the content of a regular file. If the entry exists, its content
    /// and mode are replaced, but its position and other metadata are kept.
    pub fn set_contents(
        &mut self,
        name: impl AsRef<[u8]>,
        content: impl Into<Vec<u8>>,
        perms: u32,
    ) -> Result<()> {
        self.upsert(CpioEntry::new_file(name.as_ref(), perms, content.into()))
    }

    pub fn add_symlink(&mut self, name: impl AsRef<[u8]>, target: impl AsRef<[u8]>) -> Result<()> {
        self.upsert(CpioEntry::new_symlink(name.as_ref(), target.as_ref()))
    }

    pub fn add_directory(&mut self, name: impl AsRef<[u8]>, perms: u32) -> Result<()> {
        self.upsert(CpioEntry::new_directory(name.as_ref(), perms))
    }

    /// Add a regular file whose content is read from the host filesystem.
    pub fn add_file(&mut self, source: &Path, name: impl AsRef<[u8]>, perms: u32) -> Result<()> {
        let content = fs::read(source).map_err(|e| Error::File(source.to_owned(), e))?;
        self.set_contents(name, content, perms)
    }

    /// Remove an entry. Returns false if it did not exist.
    pub fn remove(&mut self, name: impl AsRef<[u8]>) -> bool {
        match self.position(name.as_ref()) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }
}
