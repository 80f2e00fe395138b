// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Execution of ramdisk step-sets against an in-memory cpio archive.

use std::sync::atomic::AtomicBool;

use bstr::ByteSlice;
use regex::bytes::Regex;
use tracing::{debug, trace};

use crate::{
    device::Device,
    format::cpio::{CpioArchive, CpioEntryType},
    patch::{
        self, Error, FileInfo, Progress,
        steps::{self, Action, Contents, Files, StepDef, StepSet},
        text::{self, ServiceEdit},
    },
};

type Result<T> = std::result::Result<T, Error>;

const INIT_RC: &str = "init.rc";

/// Everything a step may read or modify.
pub struct PatcherContext<'a> {
    pub device: &'a Device,
    pub info: &'a FileInfo,
    pub archive: &'a mut CpioArchive,
}

/// The core step-set followed by the vendor step-sets for a device.
#[derive(Debug)]
pub struct RamdiskPatcher {
    id: String,
    sets: Vec<&'static StepSet>,
}

impl RamdiskPatcher {
    /// Look up the vendor step-sets for a ramdisk patcher ID. [`None`] selects
    /// only the core steps.
    pub fn from_id(id: Option<&str>) -> Result<Self> {
        let id = id.unwrap_or("default");
        let vendor = steps::REGISTRY
            .get(id)
            .ok_or_else(|| Error::UnknownPatcher(id.to_owned()))?;

        let mut sets = vec![&steps::CORE];
        sets.extend(vendor.iter().copied());

        Ok(Self {
            id: id.to_owned(),
            sets,
        })
    }

    pub fn for_device(device: &Device) -> Result<Self> {
        Self::from_id(device.ramdisk_patcher.as_deref())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Steps that apply to `device`, in execution order.
    pub fn steps(&self, device: &Device) -> Vec<&'static StepDef> {
        self.sets
            .iter()
            .flat_map(|s| s.steps.iter())
            .filter(|s| device.flags.contains(s.only_if))
            .collect()
    }

    /// Run every applicable step in sequence. The cancel signal is checked
    /// before each step.
    pub fn patch(
        &self,
        ctx: &mut PatcherContext,
        progress: &dyn Progress,
        cancel_signal: &AtomicBool,
    ) -> Result<()> {
        let steps = self.steps(ctx.device);
        let total = steps.len() as u64;

        for (i, step) in steps.into_iter().enumerate() {
            patch::check_cancel(cancel_signal)?;

            progress.step(i as u64, total);
            progress.details(step.name);

            let changed = apply_step(step, ctx)?;
            debug!("Step {}: {}", step.name, if changed { "changed" } else { "unchanged" });
        }

        progress.step(total, total);

        Ok(())
    }
}

fn step_failed(step: &StepDef, reason: impl Into<String>) -> Error {
    Error::PatchStepFailed {
        step: step.name,
        reason: reason.into(),
    }
}

/// Names of the regular files selected by `files`.
fn matching_files(archive: &CpioArchive, files: Files) -> Vec<Vec<u8>> {
    archive
        .entries()
        .iter()
        .filter(|e| e.file_type() == CpioEntryType::Regular && files.matches(&e.name))
        .map(|e| e.name.clone())
        .collect()
}

/// Apply `edit` to every file selected by `files`. Returns the number of
/// files that changed.
fn edit_files(
    archive: &mut CpioArchive,
    files: Files,
    mut edit: impl FnMut(&[u8]) -> Option<Vec<u8>>,
) -> usize {
    let mut changed = 0;

    for name in matching_files(archive, files) {
        let Some(entry) = archive.entry_mut(&name) else {
            continue;
        };

        if let Some(content) = edit(&entry.content) {
            trace!("Modified {:?}", name.as_bstr());
            entry.content = content;
            changed += 1;
        }
    }

    changed
}

fn ensure_contents(
    archive: &mut CpioArchive,
    path: &str,
    perms: u32,
    contents: Vec<u8>,
) -> Result<bool> {
    if let Some(entry) = archive.entry(path)
        && entry.file_type() == CpioEntryType::Regular
        && entry.perms() == perms
        && entry.content == contents
    {
        return Ok(false);
    }

    archive.set_contents(path, contents, perms)?;

    Ok(true)
}

/// Apply a single step. Returns whether the archive changed.
pub fn apply_step(step: &StepDef, ctx: &mut PatcherContext) -> Result<bool> {
    let archive = &mut *ctx.archive;

    match step.action {
        Action::EnsureFile {
            path,
            perms,
            contents,
        } => {
            let data = match contents {
                Contents::Static(s) => s.as_bytes().to_vec(),
                Contents::RomId => format!("{}\n", ctx.info.rom_id).into_bytes(),
                Contents::DeviceProps => ctx.device.to_props().into_bytes(),
            };

            ensure_contents(archive, path, perms, data)
        }
        Action::EnsureSymlink { path, target } => {
            if let Some(entry) = archive.entry(path)
                && entry.file_type() == CpioEntryType::Symlink
                && entry.content == target.as_bytes()
            {
                return Ok(false);
            }

            archive.add_symlink(path, target)?;
            Ok(true)
        }
        Action::EnsureDirectory { path, perms } => {
            if let Some(entry) = archive.entry(path)
                && entry.file_type() == CpioEntryType::Directory
                && entry.perms() == perms
            {
                return Ok(false);
            }

            archive.add_directory(path, perms)?;
            Ok(true)
        }
        Action::RemoveEntry { path } => Ok(archive.remove(path)),
        Action::ImportInitScript { script } => {
            let data = archive
                .get(INIT_RC)
                .map_err(|_| step_failed(step, format!("{INIT_RC} not found")))?;

            match text::ensure_line(data, &format!("import {script}")) {
                Some(new_data) => {
                    let perms = archive.entry(INIT_RC).map_or(0o750, |e| e.perms());
                    archive.set_contents(INIT_RC, new_data, perms)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Action::PrefixCommands {
            files,
            commands,
            prefix,
        } => {
            let changed = edit_files(archive, files, |data| {
                let (new_data, n) = text::prefix_commands(data, commands, prefix);
                (n > 0).then_some(new_data)
            });

            Ok(changed > 0)
        }
        Action::RewriteFstabMountPoint { from, to, required } => {
            if required {
                let found = matching_files(archive, Files::FSTABS).iter().any(|name| {
                    archive.get(name).is_ok_and(|data| {
                        text::has_fstab_mount_point(data, from)
                            || text::has_fstab_mount_point(data, to)
                    })
                });

                if !found {
                    return Err(step_failed(step, format!("No fstab entry for {from}")));
                }
            }

            let changed = edit_files(archive, Files::FSTABS, |data| {
                let (new_data, n) = text::rewrite_fstab_mount_point(data, from, to);
                (n > 0).then_some(new_data)
            });

            Ok(changed > 0)
        }
        Action::StripFstabFlag { flag } => {
            let changed = edit_files(archive, Files::FSTABS, |data| {
                let (new_data, n) = text::strip_fstab_flag(data, flag);
                (n > 0).then_some(new_data)
            });

            Ok(changed > 0)
        }
        Action::CommentLines {
            files,
            pattern,
            required,
        } => {
            let regex = Regex::new(pattern).map_err(|e| Error::Pattern(step.name, e))?;

            if required {
                let found = matching_files(archive, files).iter().any(|name| {
                    archive
                        .get(name)
                        .is_ok_and(|data| text::has_line_matching(data, &regex))
                });

                if !found {
                    return Err(step_failed(step, format!("No line matches {pattern:?}")));
                }
            }

            let changed = edit_files(archive, files, |data| {
                let (new_data, n) = text::comment_lines(data, &regex);
                (n > 0).then_some(new_data)
            });

            Ok(changed > 0)
        }
        Action::DisableService { name, required } => {
            let mut found = false;

            let changed = edit_files(archive, Files::INIT_SCRIPTS, |data| {
                match text::disable_service(data, name) {
                    ServiceEdit::NotFound => None,
                    ServiceEdit::AlreadyDisabled => {
                        found = true;
                        None
                    }
                    ServiceEdit::Disabled(new_data) => {
                        found = true;
                        Some(new_data)
                    }
                }
            });

            if required && !found {
                return Err(step_failed(step, format!("Service {name:?} not found")));
            }

            Ok(changed > 0)
        }
    }
}
