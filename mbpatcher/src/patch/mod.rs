// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use thiserror::Error;

use crate::format::{bootimage, compression, cpio};

pub mod auto;
pub mod pipeline;
pub mod ramdisk;
pub mod steps;
pub mod text;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Boot image error")]
    BootImage(#[from] bootimage::Error),
    #[error("Compression error")]
    Compression(#[from] compression::Error),
    #[error("CPIO error")]
    Cpio(#[from] cpio::Error),
    #[error("Unknown ramdisk patcher: {0:?}")]
    UnknownPatcher(String),
    #[error("Patch step {step:?} failed: {reason}")]
    PatchStepFailed { step: &'static str, reason: String },
    #[error("Invalid pattern in patch step {0:?}")]
    Pattern(&'static str, #[source] regex::Error),
    #[error("File I/O error: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Received cancel signal")]
    Cancelled,
}

type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] for callers that only need to know
/// what kind of failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecognized or malformed boot image.
    FileFormat,
    /// Malformed ramdisk archive.
    ParseError,
    /// Recognized, but unhandled, variant of a format.
    Unsupported,
    PatchStepFailed,
    Io,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BootImage(bootimage::Error::Unsupported(..)) => ErrorKind::Unsupported,
            Self::BootImage(_) => ErrorKind::FileFormat,
            Self::Compression(compression::Error::UnknownFormat(_)) => ErrorKind::Unsupported,
            Self::Compression(_) => ErrorKind::FileFormat,
            Self::Cpio(cpio::Error::File(..)) => ErrorKind::Io,
            Self::Cpio(_) => ErrorKind::ParseError,
            Self::UnknownPatcher(_) => ErrorKind::Unsupported,
            Self::PatchStepFailed { .. } | Self::Pattern(..) => ErrorKind::PatchStepFailed,
            Self::File(..) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Returns [`Error::Cancelled`] if `cancel_signal` is set. This is only
/// checked between steps.
pub fn check_cancel(cancel_signal: &AtomicBool) -> Result<()> {
    if cancel_signal.load(Ordering::SeqCst) {
        return Err(Error::Cancelled);
    }

    Ok(())
}

/// Best-effort progress notifications. All methods default to doing nothing.
pub trait Progress: Sync {
    /// Bytes processed while loading or saving data.
    fn bytes(&self, _current: u64, _total: u64) {}

    /// Files processed by an auto patcher.
    fn files(&self, _current: u64, _total: u64) {}

    /// Ramdisk patcher step about to run.
    fn step(&self, _current: u64, _total: u64) {}

    fn details(&self, _message: &str) {}
}

/// A [`Progress`] that discards all notifications.
pub struct NoProgress;

impl Progress for NoProgress {}

/// Paths and identity of the file being patched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// ID of the ROM the image is being installed for.
    pub rom_id: String,
}
