// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Ramdisk step-sets. Devices are supported by composing these sets in the
//! registry rather than by writing new code.

use phf::phf_map;

use crate::device::DeviceFlags;

/// Generated content of a file added to the ramdisk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contents {
    Static(&'static str),
    /// The ID of the ROM being installed.
    RomId,
    /// The device properties from [`crate::device::Device::to_props`].
    DeviceProps,
}

/// Top-level ramdisk files whose names start with `prefix` and end with
/// `suffix`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Files {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl Files {
    pub const FSTABS: Self = Self {
        prefix: "fstab.",
        suffix: "",
    };
    pub const INIT_SCRIPTS: Self = Self {
        prefix: "init",
        suffix: ".rc",
    };

    pub fn matches(&self, name: &[u8]) -> bool {
        !name.contains(&b'/')
            && name.starts_with(self.prefix.as_bytes())
            && name.ends_with(self.suffix.as_bytes())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Add or replace a regular file.
    EnsureFile {
        path: &'static str,
        perms: u32,
        contents: Contents,
    },
    EnsureSymlink {
        path: &'static str,
        target: &'static str,
    },
    EnsureDirectory { path: &'static str, perms: u32 },
    RemoveEntry { path: &'static str },
    /// Import `script` from `init.rc`, which must exist.
    ImportInitScript { script: &'static str },
    /// Prefix whole-token commands at the start of lines.
    PrefixCommands {
        files: Files,
        commands: &'static [&'static str],
        prefix: &'static str,
    },
    /// Move fstab entries from one mount point to another. When `required`,
    /// some fstab must contain an entry for either mount point.
    RewriteFstabMountPoint {
        from: &'static str,
        to: &'static str,
        required: bool,
    },
    /// Remove an fs_mgr flag from every fstab entry.
    StripFstabFlag { flag: &'static str },
    /// Comment out lines matching a regex. When `required`, some file must
    /// contain a matching line, commented or not.
    CommentLines {
        files: Files,
        pattern: &'static str,
        required: bool,
    },
    /// Comment out an init service definition. When `required`, the service
    /// must be defined in one of the init scripts.
    DisableService { name: &'static str, required: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepDef {
    pub name: &'static str,
    pub action: Action,
    /// The step only runs for devices with all of these flags.
    pub only_if: DeviceFlags,
}

impl StepDef {
    const fn new(name: &'static str, action: Action) -> Self {
        Self {
            name,
            action,
            only_if: DeviceFlags::empty(),
        }
    }

    const fn only_if(mut self, flags: DeviceFlags) -> Self {
        self.only_if = flags;
        self
    }
}

#[derive(Debug)]
pub struct StepSet {
    pub name: &'static str,
    pub steps: &'static [StepDef],
}

const INIT_MULTIBOOT_RC: &str = "\
on init
    mkdir /raw 0755 root root
    mkdir /raw/system 0755 root root
    mkdir /raw/cache 0770 system cache
    mkdir /raw/data 0771 system system

on post-fs-data
    symlink /raw/system /system
";

/// Steps applied to every device.
pub static CORE: StepSet = StepSet {
    name: "core",
    steps: &[
        StepDef::new(
            "create_multiboot_dir",
            Action::EnsureDirectory {
                path: "multiboot",
                perms: 0o755,
            },
        ),
        StepDef::new(
            "add_init_script",
            Action::EnsureFile {
                path: "init.multiboot.rc",
                perms: 0o750,
                contents: Contents::Static(INIT_MULTIBOOT_RC),
            },
        ),
        StepDef::new(
            "add_rom_id",
            Action::EnsureFile {
                path: "multiboot/romid",
                perms: 0o644,
                contents: Contents::RomId,
            },
        ),
        StepDef::new(
            "add_device_props",
            Action::EnsureFile {
                path: "multiboot/device.prop",
                perms: 0o644,
                contents: Contents::DeviceProps,
            },
        ),
        StepDef::new(
            "import_init_script",
            Action::ImportInitScript {
                script: "/init.multiboot.rc",
            },
        ),
        StepDef::new(
            "redirect_system",
            Action::RewriteFstabMountPoint {
                from: "/system",
                to: "/raw/system",
                required: true,
            },
        ),
        StepDef::new(
            "redirect_cache",
            Action::RewriteFstabMountPoint {
                from: "/cache",
                to: "/raw/cache",
                required: false,
            },
        ),
        StepDef::new(
            "redirect_data",
            Action::RewriteFstabMountPoint {
                from: "/data",
                to: "/raw/data",
                required: false,
            },
        ),
        StepDef::new("strip_verity", Action::StripFstabFlag { flag: "verify" }),
        StepDef::new("remove_verity_key", Action::RemoveEntry { path: "verity_key" }),
        StepDef::new(
            "strip_force_encrypt",
            Action::StripFstabFlag {
                flag: "forceencrypt",
            },
        )
        .only_if(DeviceFlags::STRIP_FORCE_ENCRYPT),
    ],
};

pub static QCOM: StepSet = StepSet {
    name: "qcom",
    steps: &[
        StepDef::new(
            "strip_manual_cache_mounts",
            Action::CommentLines {
                files: Files::INIT_SCRIPTS,
                pattern: r"^mount\s+\S+\s+\S+\s+/cache(\s|$)",
                required: false,
            },
        ),
        StepDef::new(
            "prefix_shell_mounts",
            Action::PrefixCommands {
                files: Files {
                    prefix: "init.qcom",
                    suffix: ".sh",
                },
                commands: &["mount", "umount"],
                prefix: "/sbin/",
            },
        ),
        StepDef::new(
            "disable_cache_formatter",
            Action::DisableService {
                name: "formatter",
                required: true,
            },
        )
        .only_if(DeviceFlags::DISABLE_CACHE_FORMATTER),
    ],
};

pub static MTK: StepSet = StepSet {
    name: "mtk",
    steps: &[
        StepDef::new(
            "strip_manual_system_mounts",
            Action::CommentLines {
                files: Files::INIT_SCRIPTS,
                pattern: r"^mount\s+\S+\s+\S+\s+/system(\s|$)",
                required: true,
            },
        ),
        StepDef::new(
            "link_emmc_partitions",
            Action::EnsureSymlink {
                path: "emmc@android",
                target: "/raw/system",
            },
        ),
    ],
};

pub static SAMSUNG: StepSet = StepSet {
    name: "samsung",
    steps: &[
        StepDef::new(
            "disable_sysinit_knox",
            Action::DisableService {
                name: "sysinit_knox",
                required: false,
            },
        ),
        StepDef::new(
            "strip_cache_restorecon",
            Action::CommentLines {
                files: Files::INIT_SCRIPTS,
                pattern: r"^restorecon_recursive\s+/cache(\s|$)",
                required: false,
            },
        ),
    ],
};

/// Vendor step-sets by ramdisk patcher ID. [`CORE`] always runs before these.
pub static REGISTRY: phf::Map<&'static str, &[&StepSet]> = phf_map! {
    "default" => &[],
    "qcom" => &[&QCOM],
    "mtk" => &[&MTK],
    "samsung" => &[&SAMSUNG],
    "qcom-samsung" => &[&QCOM, &SAMSUNG],
};
