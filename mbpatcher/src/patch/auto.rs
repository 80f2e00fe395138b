// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Best-effort patching of an extracted ROM installer tree. Installers vary
//! wildly between ROM builds, so nothing here ever fails the operation.
//! Problems are logged and recorded in the returned [`AutoPatchReport`].

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use regex::bytes::Regex;
use tracing::{debug, warn};

use crate::{
    device::Device,
    patch::{FileInfo, Progress, steps::Contents, text},
};

const UPDATER_SCRIPT: &str = "META-INF/com/google/android/updater-script";
const UPDATE_BINARY: &str = "META-INF/com/google/android/update-binary";

const EDIFY_MOUNT_REGEX: &str =
    r#"\bmount\s*\(\s*"[^"]*"\s*,\s*"[^"]*"\s*,\s*"[^"]*"\s*,\s*"([^"]*)"\s*(?:,\s*"[^"]*"\s*)?\)"#;
const EDIFY_UNMOUNT_REGEX: &str = r#"\bunmount\s*\(\s*"([^"]*)"\s*\)"#;

const BUSYBOX_MOUNT: &[u8] = br#"run_program("/sbin/busybox", "mount", "${1}")"#;
const BUSYBOX_UMOUNT: &[u8] = br#"run_program("/sbin/busybox", "umount", "${1}")"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Prefix whole-token shell commands at the start of lines.
    PrefixCommands {
        commands: &'static [&'static str],
        prefix: &'static str,
    },
    /// Replace edify `mount(...)` and `unmount(...)` calls with busybox
    /// invocations so that the multiboot mount wrappers are used.
    ReplaceEdifyMounts,
}

impl Transform {
    /// Returns the new data or [`None`] if nothing matched.
    pub fn apply(&self, data: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::PrefixCommands { commands, prefix } => {
                let (result, changed) = text::prefix_commands(data, commands, prefix);
                (changed > 0).then_some(result)
            }
            Self::ReplaceEdifyMounts => replace_edify_mounts(data),
        }
    }
}

fn replace_edify_mounts(data: &[u8]) -> Option<Vec<u8>> {
    let mount = Regex::new(EDIFY_MOUNT_REGEX).ok()?;
    let unmount = Regex::new(EDIFY_UNMOUNT_REGEX).ok()?;

    if !mount.is_match(data) && !unmount.is_match(data) {
        return None;
    }

    let result = mount.replace_all(data, BUSYBOX_MOUNT);
    let result = unmount.replace_all(&result, BUSYBOX_UMOUNT);

    Some(result.into_owned())
}

#[derive(Clone, Copy, Debug)]
pub struct NewFile {
    pub path: &'static str,
    pub contents: Contents,
}

#[derive(Clone, Copy, Debug)]
pub struct FileTransform {
    pub path: &'static str,
    pub transform: Transform,
}

#[derive(Debug)]
pub struct AutoPatcher {
    pub id: &'static str,
    pub new_files: &'static [NewFile],
    pub transforms: &'static [FileTransform],
}

const MOUNT_COMMANDS: Transform = Transform::PrefixCommands {
    commands: &["mount", "umount"],
    prefix: "/sbin/",
};

pub static AUTO_PATCHERS: [AutoPatcher; 2] = [
    AutoPatcher {
        id: "standard",
        new_files: &[NewFile {
            path: "multiboot/romid",
            contents: Contents::RomId,
        }],
        transforms: &[
            FileTransform {
                path: UPDATER_SCRIPT,
                transform: Transform::ReplaceEdifyMounts,
            },
            FileTransform {
                path: "system/bin/backuptool.sh",
                transform: MOUNT_COMMANDS,
            },
        ],
    },
    AutoPatcher {
        id: "shell-installer",
        new_files: &[
            NewFile {
                path: "multiboot/romid",
                contents: Contents::RomId,
            },
            NewFile {
                path: "multiboot/device.prop",
                contents: Contents::DeviceProps,
            },
        ],
        transforms: &[
            FileTransform {
                path: UPDATE_BINARY,
                transform: MOUNT_COMMANDS,
            },
            FileTransform {
                path: "install/bin/backuptool.sh",
                transform: MOUNT_COMMANDS,
            },
        ],
    },
];

pub fn find_auto_patcher(id: &str) -> Option<&'static AutoPatcher> {
    AUTO_PATCHERS.iter().find(|p| p.id == id)
}

/// Outcome of every file an auto patcher touched, with paths relative to the
/// tree root.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AutoPatchReport {
    pub created: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    /// Files where no substitution matched.
    pub unchanged: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

enum FileResult {
    Created,
    Modified,
    Unchanged,
    Missing,
    Failed(String),
}

impl AutoPatcher {
    fn create_file(
        root: &Path,
        file: &NewFile,
        device: &Device,
        info: &FileInfo,
    ) -> io::Result<FileResult> {
        let path = root.join(file.path);
        let data = match file.contents {
            Contents::Static(s) => s.to_owned(),
            Contents::RomId => format!("{}\n", info.rom_id),
            Contents::DeviceProps => device.to_props(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        Ok(FileResult::Created)
    }

    fn transform_file(root: &Path, file: &FileTransform) -> io::Result<FileResult> {
        let path = root.join(file.path);

        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileResult::Missing),
            Err(e) => return Err(e),
        };

        match file.transform.apply(&data) {
            Some(new_data) => {
                fs::write(&path, new_data)?;
                Ok(FileResult::Modified)
            }
            None => Ok(FileResult::Unchanged),
        }
    }

    /// Create the new files and transform the existing ones under `root`.
    /// Files are processed in parallel.
    pub fn patch(
        &self,
        root: &Path,
        device: &Device,
        info: &FileInfo,
        progress: &dyn Progress,
    ) -> AutoPatchReport {
        let total = (self.new_files.len() + self.transforms.len()) as u64;
        let done = AtomicU64::new(0);
        let report = Mutex::new(AutoPatchReport::default());

        let record = |path: &str, result: io::Result<FileResult>| {
            let path = PathBuf::from(path);
            let result = result.unwrap_or_else(|e| FileResult::Failed(e.to_string()));

            match &result {
                FileResult::Missing => debug!("Skipping missing file: {path:?}"),
                FileResult::Unchanged => debug!("No substitutions matched: {path:?}"),
                FileResult::Failed(e) => warn!("Failed to patch {path:?}: {e}"),
                FileResult::Created | FileResult::Modified => debug!("Patched {path:?}"),
            }

            let mut report = report.lock().unwrap_or_else(|e| e.into_inner());
            match result {
                FileResult::Created => report.created.push(path),
                FileResult::Modified => report.modified.push(path),
                FileResult::Unchanged => report.unchanged.push(path),
                FileResult::Missing => report.missing.push(path),
                FileResult::Failed(e) => report.failed.push((path, e)),
            }
            drop(report);

            let n = done.fetch_add(1, Ordering::SeqCst) + 1;
            progress.files(n, total);
        };

        self.new_files.par_iter().for_each(|file| {
            record(file.path, Self::create_file(root, file, device, info));
        });

        self.transforms.par_iter().for_each(|file| {
            record(file.path, Self::transform_file(root, file));
        });

        let mut report = report.into_inner().unwrap_or_else(|e| e.into_inner());
        // Parallel processing finishes in an arbitrary order.
        report.created.sort();
        report.modified.sort();
        report.unchanged.sort();
        report.missing.sort();
        report.failed.sort();

        report
    }
}
