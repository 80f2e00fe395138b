// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, trace};

use crate::{
    cli::{status, warning},
    device::{self, Device},
    patch::{
        FileInfo, Progress,
        auto::{self, AUTO_PATCHERS},
        pipeline::{PatchOptions, PatchOutcome, Pipeline},
    },
};

struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn bytes(&self, current: u64, total: u64) {
        trace!("Processed {current}/{total} bytes");
    }

    fn files(&self, current: u64, total: u64) {
        debug!("Processed {current}/{total} files");
    }

    fn step(&self, current: u64, total: u64) {
        debug!("Step {current}/{total}");
    }

    fn details(&self, message: &str) {
        status!("{message}");
    }
}

fn load_device(cli: &DeviceGroup) -> Result<Device> {
    let devices = device::load_devices(&cli.devices)
        .with_context(|| format!("Failed to load devices: {:?}", cli.devices))?;
    let device = device::find_device(&devices, &cli.device)?;

    Ok(device.clone())
}

fn boot_subcommand(cli: &BootCli, cancel_signal: &AtomicBool) -> Result<()> {
    let device = load_device(&cli.device)?;
    status!("Patching for device: {device}");

    let info = FileInfo {
        input_path: cli.input.clone(),
        output_path: cli.output.clone(),
        rom_id: cli.rom_id.clone(),
    };
    let options = PatchOptions {
        recompute_id: cli.recompute_id,
    };

    let mut pipeline = Pipeline::new(&device, &info, &ConsoleProgress).with_options(options);
    let outcome = pipeline
        .run(cancel_signal)
        .with_context(|| format!("Failed to patch boot image: {:?}", cli.input))?;

    match outcome {
        PatchOutcome::Completed => {
            status!("Successfully patched boot image: {:?}", cli.output);
            Ok(())
        }
        PatchOutcome::Cancelled => bail!("Cancelled by user"),
    }
}

fn files_subcommand(cli: &FilesCli) -> Result<()> {
    let Some(patcher) = auto::find_auto_patcher(&cli.patcher) else {
        let ids = AUTO_PATCHERS.iter().map(|p| p.id).collect::<Vec<_>>();
        bail!("Unknown auto patcher {:?}; expected one of {ids:?}", cli.patcher);
    };

    let device = load_device(&cli.device)?;
    let info = FileInfo {
        input_path: cli.root.clone(),
        output_path: cli.root.clone(),
        rom_id: cli.rom_id.clone(),
    };

    let report = patcher.patch(&cli.root, &device, &info, &ConsoleProgress);

    for path in &report.created {
        status!("Created: {path:?}");
    }
    for path in &report.modified {
        status!("Patched: {path:?}");
    }
    for path in &report.unchanged {
        status!("Unchanged: {path:?}");
    }
    for path in &report.missing {
        status!("Not present: {path:?}");
    }
    for (path, error) in &report.failed {
        warning!("Failed to patch {path:?}: {error}");
    }

    Ok(())
}

fn devices_subcommand(cli: &DevicesCli) -> Result<()> {
    let devices = device::load_devices(&cli.devices)
        .with_context(|| format!("Failed to load devices: {:?}", cli.devices))?;

    for device in devices {
        println!("{device}");
        println!("- Codenames:       {}", device.codenames.join(", "));
        println!("- Architecture:    {}", device.architecture);
        println!(
            "- Ramdisk patcher: {}",
            device.ramdisk_patcher.as_deref().unwrap_or("default"),
        );
        println!("- Flags:           {:?}", device.flags);
    }

    Ok(())
}

pub fn patch_main(cli: &PatchCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    match &cli.command {
        PatchCommand::Boot(c) => boot_subcommand(c, cancel_signal),
        PatchCommand::Files(c) => files_subcommand(c),
        PatchCommand::Devices(c) => devices_subcommand(c),
    }
}

#[derive(Debug, Args)]
struct DeviceGroup {
    /// Path to device list TOML.
    #[arg(long, value_name = "FILE", value_parser)]
    devices: PathBuf,

    /// Device ID or codename.
    #[arg(long, value_name = "ID")]
    device: String,
}

/// Patch the ramdisk of a boot image for multiboot.
#[derive(Debug, Parser)]
struct BootCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    #[command(flatten)]
    device: DeviceGroup,

    /// ID of the ROM being installed.
    #[arg(long, value_name = "ID")]
    rom_id: String,

    /// Replace the header ID with the digest of the patched sections.
    #[arg(long)]
    recompute_id: bool,
}

/// Patch an extracted ROM installer.
#[derive(Debug, Parser)]
struct FilesCli {
    /// Root directory of the extracted installer.
    #[arg(short, long, value_name = "DIR", value_parser)]
    root: PathBuf,

    /// Auto patcher to use.
    #[arg(long, value_name = "ID", default_value = "standard")]
    patcher: String,

    #[command(flatten)]
    device: DeviceGroup,

    /// ID of the ROM being installed.
    #[arg(long, value_name = "ID")]
    rom_id: String,
}

/// List devices in a device list.
#[derive(Debug, Parser)]
struct DevicesCli {
    /// Path to device list TOML.
    #[arg(long, value_name = "FILE", value_parser)]
    devices: PathBuf,
}

#[derive(Debug, Subcommand)]
enum PatchCommand {
    Boot(BootCli),
    Files(FilesCli),
    Devices(DevicesCli),
}

/// Patch boot images and ROM installers for multiboot.
#[derive(Debug, Parser)]
pub struct PatchCli {
    #[command(subcommand)]
    command: PatchCommand,
}
