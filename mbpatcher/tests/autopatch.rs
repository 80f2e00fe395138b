// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use mbpatcher::{
    device::{self, Device},
    patch::{
        FileInfo, NoProgress, Progress,
        auto::{self, AUTO_PATCHERS, AutoPatchReport, Transform},
    },
};

const UPDATER_SCRIPT: &str = "META-INF/com/google/android/updater-script";
const UPDATE_BINARY: &str = "META-INF/com/google/android/update-binary";

const EDIFY: &str = r#"ui_print("Installing");
mount("ext4", "EMMC", "/dev/block/platform/msm_sdcc.1/by-name/system", "/system");
package_extract_dir("system", "/system");
mount("ext4", "EMMC", "/dev/block/platform/msm_sdcc.1/by-name/cache", "/cache", "");
unmount("/system");
"#;

const EDIFY_PATCHED: &str = r#"ui_print("Installing");
run_program("/sbin/busybox", "mount", "/system");
package_extract_dir("system", "/system");
run_program("/sbin/busybox", "mount", "/cache");
run_program("/sbin/busybox", "umount", "/system");
"#;

const BACKUPTOOL: &str = "\
#!/sbin/sh
  mount /system
mount -o remount,rw /system
remount /system
umount /system
";

const BACKUPTOOL_PATCHED: &str = "\
#!/sbin/sh
  /sbin/mount /system
/sbin/mount -o remount,rw /system
remount /system
/sbin/umount /system
";

fn device() -> Device {
    device::parse_devices(common::DEVICES).unwrap().remove(0)
}

fn file_info(root: &Path) -> FileInfo {
    FileInfo {
        input_path: root.to_owned(),
        output_path: root.to_owned(),
        rom_id: "secondary".to_owned(),
    }
}

fn write(root: &Path, path: &str, data: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

fn paths(paths: &[&str]) -> Vec<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

#[test]
fn transforms() {
    assert_eq!(
        Transform::ReplaceEdifyMounts.apply(EDIFY.as_bytes()).as_deref(),
        Some(EDIFY_PATCHED.as_bytes()),
    );
    assert_eq!(Transform::ReplaceEdifyMounts.apply(b"ui_print(\"hi\");\n"), None);

    let prefix = Transform::PrefixCommands {
        commands: &["mount", "umount"],
        prefix: "/sbin/",
    };
    assert_eq!(
        prefix.apply(BACKUPTOOL.as_bytes()).as_deref(),
        Some(BACKUPTOOL_PATCHED.as_bytes()),
    );
    assert_eq!(prefix.apply(BACKUPTOOL_PATCHED.as_bytes()), None);
    assert_eq!(prefix.apply(b"remount /system\n"), None);
}

#[test]
fn lookup() {
    assert_eq!(auto::find_auto_patcher("standard").unwrap().id, "standard");
    assert!(auto::find_auto_patcher("missing").is_none());

    let mut ids = AUTO_PATCHERS.iter().map(|p| p.id).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), AUTO_PATCHERS.len());
}

#[derive(Default)]
struct FileCounter {
    calls: AtomicU64,
    last_total: AtomicU64,
}

impl Progress for FileCounter {
    fn files(&self, _current: u64, total: u64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_total.store(total, Ordering::SeqCst);
    }
}

#[test]
fn standard_installer() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, UPDATER_SCRIPT, EDIFY);
    write(root, "system/bin/backuptool.sh", BACKUPTOOL);

    let patcher = auto::find_auto_patcher("standard").unwrap();
    let progress = FileCounter::default();
    let report = patcher.patch(root, &device(), &file_info(root), &progress);

    assert_eq!(
        report,
        AutoPatchReport {
            created: paths(&["multiboot/romid"]),
            modified: paths(&[UPDATER_SCRIPT, "system/bin/backuptool.sh"]),
            ..Default::default()
        },
    );
    assert_eq!(read(root, "multiboot/romid"), "secondary\n");
    assert_eq!(read(root, UPDATER_SCRIPT), EDIFY_PATCHED);
    assert_eq!(read(root, "system/bin/backuptool.sh"), BACKUPTOOL_PATCHED);
    assert_eq!(progress.calls.load(Ordering::SeqCst), 3);
    assert_eq!(progress.last_total.load(Ordering::SeqCst), 3);

    // A second run has nothing left to substitute.
    let report = patcher.patch(root, &device(), &file_info(root), &NoProgress);
    assert_eq!(
        report.unchanged,
        paths(&[UPDATER_SCRIPT, "system/bin/backuptool.sh"]),
    );
    assert!(report.modified.is_empty());
    assert_eq!(read(root, UPDATER_SCRIPT), EDIFY_PATCHED);
}

#[test]
fn shell_installer_with_missing_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "install/bin/backuptool.sh", "remount /system\n");

    let device = device();
    let patcher = auto::find_auto_patcher("shell-installer").unwrap();
    let report = patcher.patch(root, &device, &file_info(root), &NoProgress);

    assert_eq!(
        report,
        AutoPatchReport {
            created: paths(&["multiboot/device.prop", "multiboot/romid"]),
            unchanged: paths(&["install/bin/backuptool.sh"]),
            missing: paths(&[UPDATE_BINARY]),
            ..Default::default()
        },
    );
    assert_eq!(read(root, "multiboot/device.prop"), device.to_props());
    assert!(!root.join(UPDATE_BINARY).exists());
}

#[test]
fn failures_are_recorded() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    // Neither can be written or read as a regular file.
    write(root, "multiboot", "");
    fs::create_dir_all(root.join(UPDATER_SCRIPT)).unwrap();

    let patcher = auto::find_auto_patcher("standard").unwrap();
    let report = patcher.patch(root, &device(), &file_info(root), &NoProgress);

    let failed = report
        .failed
        .iter()
        .map(|(p, _)| p.clone())
        .collect::<Vec<_>>();
    assert_eq!(failed, paths(&[UPDATER_SCRIPT, "multiboot/romid"]));
    assert_eq!(report.missing, paths(&["system/bin/backuptool.sh"]));
    assert!(report.created.is_empty());
}
