// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end patching of a boot image file for a device.

use std::{fs, io::Write, path::Path, sync::atomic::AtomicBool};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    device::Device,
    format::{
        bootimage::BootImage,
        compression::{self, CompressedFormat},
        cpio::CpioArchive,
    },
    patch::{
        self, Error, FileInfo, Progress,
        ramdisk::{PatcherContext, RamdiskPatcher},
    },
    util,
};

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Decoding,
    Patching,
    Encoding,
    Done,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

/// How a pipeline run that did not fail ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    Completed,
    /// The cancel signal was observed. No output was written.
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Replace the header id with the mkbootimg digest of the new sections.
    pub recompute_id: bool,
}

/// Patch the ramdisk of an in-memory boot image. Returns whether the ramdisk
/// changed. The original compressed blob is kept when the patched archive
/// serializes to the same bytes.
pub fn patch_image(
    image: &mut BootImage,
    device: &Device,
    info: &FileInfo,
    progress: &dyn Progress,
    cancel_signal: &AtomicBool,
) -> Result<bool> {
    let patcher = RamdiskPatcher::for_device(device)?;
    debug!("Using ramdisk patcher: {}", patcher.id());

    let (raw, format) = compression::decompress(&image.ramdisk)?;
    debug!("Ramdisk compression: {format:?}");

    let mut archive = CpioArchive::load_with_progress(&raw, |c, t| progress.bytes(c, t))?;

    patcher.patch(
        &mut PatcherContext {
            device,
            info,
            archive: &mut archive,
        },
        progress,
        cancel_signal,
    )?;

    let new_raw = archive.serialize()?;
    if new_raw == raw {
        debug!("Ramdisk unchanged");
        return Ok(false);
    }

    let new_ramdisk = match format {
        CompressedFormat::None => new_raw,
        f => compression::compress(&new_raw, f)?,
    };
    image.set_ramdisk(new_ramdisk)?;

    Ok(true)
}

/// Write `data` to a temporary file next to `path` and then move it into
/// place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = util::parent_path(path);

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::File(parent.to_owned(), e))?;
    temp.write_all(data)
        .map_err(|e| Error::File(temp.path().to_owned(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::File(temp.path().to_owned(), e))?;
    temp.persist(path)
        .map_err(|e| Error::File(path.to_owned(), e.error))?;

    Ok(())
}

/// Drives a single patch job from the input file to the output file.
pub struct Pipeline<'a> {
    device: &'a Device,
    info: &'a FileInfo,
    progress: &'a dyn Progress,
    options: PatchOptions,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(device: &'a Device, info: &'a FileInfo, progress: &'a dyn Progress) -> Self {
        Self {
            device,
            info,
            progress,
            options: PatchOptions::default(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, state: PipelineState) {
        debug!("Pipeline state: {:?} -> {state:?}", self.state);
        self.state = state;
    }

    /// Run the job. Cancellation is not an error and ends the run with
    /// [`PatchOutcome::Cancelled`]. The output file is only created once the
    /// new image has been fully encoded.
    pub fn run(&mut self, cancel_signal: &AtomicBool) -> Result<PatchOutcome> {
        self.state = PipelineState::Idle;

        match self.run_stages(cancel_signal) {
            Ok(()) => {
                self.transition(PipelineState::Done);
                Ok(PatchOutcome::Completed)
            }
            Err(Error::Cancelled) => {
                self.transition(PipelineState::Cancelled);
                Ok(PatchOutcome::Cancelled)
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, cancel_signal: &AtomicBool) -> Result<()> {
        let info = self.info;
        let input = &info.input_path;
        let output = &info.output_path;

        patch::check_cancel(cancel_signal)?;
        self.transition(PipelineState::Decoding);
        self.progress.details("Loading boot image");

        let data = fs::read(input).map_err(|e| Error::File(input.clone(), e))?;
        let mut image = BootImage::decode(&data)?;
        info!("Loaded {} boot image: {input:?}", image.format());

        patch::check_cancel(cancel_signal)?;
        self.transition(PipelineState::Patching);

        patch_image(
            &mut image,
            self.device,
            info,
            self.progress,
            cancel_signal,
        )?;

        if self.options.recompute_id {
            image.header.id = image.compute_id();
        }

        patch::check_cancel(cancel_signal)?;
        self.transition(PipelineState::Encoding);
        self.progress.details("Writing boot image");

        let new_data = image.encode()?;

        write_atomic(output, &new_data)?;
        info!("Wrote {} boot image: {output:?}", image.format());

        let total = new_data.len() as u64;
        self.progress.bytes(total, total);

        Ok(())
    }
}
