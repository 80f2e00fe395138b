// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::format::{
    android::AndroidMeta,
    bootimage::{BootImage, BootImageHeader, Wrapper},
};

fn read_image(path: &Path) -> Result<BootImage> {
    let data = fs::read(path).with_context(|| format!("Failed to read: {path:?}"))?;
    let image = BootImage::decode(&data)
        .with_context(|| format!("Failed to load boot image: {path:?}"))?;

    Ok(image)
}

fn write_image(path: &Path, image: &BootImage) -> Result<()> {
    let data = image
        .encode()
        .with_context(|| format!("Failed to encode boot image: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write boot image: {path:?}"))?;

    Ok(())
}

fn read_header(path: &Path) -> Result<BootImageHeader> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read header TOML: {path:?}"))?;
    let header = toml_edit::de::from_str(&data)
        .with_context(|| format!("Failed to parse header TOML: {path:?}"))?;

    Ok(header)
}

fn write_header(path: &Path, header: &BootImageHeader) -> Result<()> {
    let data = toml_edit::ser::to_string_pretty(header)
        .with_context(|| format!("Failed to serialize header TOML: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write header TOML: {path:?}"))?;

    Ok(())
}

fn read_data_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    let data = match fs::read(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read data: {path:?}"))?,
    };

    Ok(Some(data))
}

fn read_data(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read data: {path:?}"))
}

fn write_data_if_not_empty(path: &Path, data: &[u8]) -> Result<()> {
    if !data.is_empty() {
        fs::write(path, data).with_context(|| format!("Failed to write data: {path:?}"))?;
    }

    Ok(())
}

fn display_info(cli: &BootCli, image: &BootImage) {
    if !cli.quiet {
        if cli.debug {
            println!("{image:#?}");
        } else {
            println!("{image}");
        }
    }
}

fn finish_image(image: &mut BootImage, recompute_id: bool) {
    if recompute_id {
        image.header.id = image.compute_id();
    }
}

fn unpack_subcommand(boot_cli: &BootCli, cli: &UnpackCli) -> Result<()> {
    let image = read_image(&cli.input)?;
    display_info(boot_cli, &image);

    write_header(&cli.output_header, &image.header)?;
    write_data_if_not_empty(&cli.output_kernel, &image.kernel)?;
    write_data_if_not_empty(&cli.output_ramdisk, &image.ramdisk)?;
    write_data_if_not_empty(&cli.output_second, &image.second)?;
    write_data_if_not_empty(&cli.output_dt, &image.dt)?;

    Ok(())
}

fn pack_subcommand(boot_cli: &BootCli, cli: &PackCli) -> Result<()> {
    let header = read_header(&cli.input_header)?;

    let mut image = BootImage::new(
        header,
        read_data_if_exists(&cli.input_kernel)?.unwrap_or_default(),
        read_data_if_exists(&cli.input_ramdisk)?.unwrap_or_default(),
        read_data_if_exists(&cli.input_second)?.unwrap_or_default(),
        read_data_if_exists(&cli.input_dt)?.unwrap_or_default(),
        Wrapper::Android(AndroidMeta {
            pad_last_section: true,
            ..Default::default()
        }),
    )
    .context("Invalid boot image components")?;
    finish_image(&mut image, cli.recompute_id);

    display_info(boot_cli, &image);
    write_image(&cli.output, &image)?;

    Ok(())
}

fn repack_subcommand(boot_cli: &BootCli, cli: &RepackCli) -> Result<()> {
    let mut image = read_image(&cli.input)?;

    if let Some(path) = &cli.kernel {
        image.set_kernel(read_data(path)?)?;
    }
    if let Some(path) = &cli.ramdisk {
        image.set_ramdisk(read_data(path)?)?;
    }
    if let Some(path) = &cli.second {
        image.set_second(read_data(path)?)?;
    }
    if let Some(path) = &cli.dt {
        image.set_dt(read_data(path)?)?;
    }
    finish_image(&mut image, cli.recompute_id);

    display_info(boot_cli, &image);
    write_image(&cli.output, &image)?;

    Ok(())
}

fn info_subcommand(boot_cli: &BootCli, cli: &InfoCli) -> Result<()> {
    let image = read_image(&cli.input)?;
    display_info(boot_cli, &image);

    Ok(())
}

pub fn boot_main(cli: &BootCli) -> Result<()> {
    match &cli.command {
        BootCommand::Unpack(c) => unpack_subcommand(cli, c),
        BootCommand::Pack(c) => pack_subcommand(cli, c),
        BootCommand::Repack(c) => repack_subcommand(cli, c),
        BootCommand::Info(c) => info_subcommand(cli, c),
    }
}

/// Unpack a boot image.
///
/// Container specific data, like MTK section headers or the Loki patch, is
/// not unpacked. Use `repack` to replace sections while keeping it.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output header TOML.
    #[arg(long, value_name = "FILE", value_parser, default_value = "header.toml")]
    output_header: PathBuf,

    /// Path to output kernel image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "kernel.img")]
    output_kernel: PathBuf,

    /// Path to output ramdisk image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "ramdisk.img")]
    output_ramdisk: PathBuf,

    /// Path to output second stage bootloader image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "second.img")]
    output_second: PathBuf,

    /// Path to output device tree image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "dt.img")]
    output_dt: PathBuf,
}

/// Pack a plain Android boot image.
#[derive(Debug, Parser)]
struct PackCli {
    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Path to input header TOML.
    #[arg(long, value_name = "FILE", value_parser, default_value = "header.toml")]
    input_header: PathBuf,

    /// Path to input kernel image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "kernel.img")]
    input_kernel: PathBuf,

    /// Path to input ramdisk image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "ramdisk.img")]
    input_ramdisk: PathBuf,

    /// Path to input second stage bootloader image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "second.img")]
    input_second: PathBuf,

    /// Path to input device tree image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "dt.img")]
    input_dt: PathBuf,

    /// Replace the header ID with the digest of the sections.
    #[arg(long)]
    recompute_id: bool,
}

/// Repack a boot image in its original container format.
#[derive(Debug, Parser)]
struct RepackCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Replace the kernel.
    #[arg(long, value_name = "FILE", value_parser)]
    kernel: Option<PathBuf>,

    /// Replace the ramdisk.
    #[arg(long, value_name = "FILE", value_parser)]
    ramdisk: Option<PathBuf>,

    /// Replace the second stage bootloader.
    #[arg(long, value_name = "FILE", value_parser)]
    second: Option<PathBuf>,

    /// Replace the device tree.
    #[arg(long, value_name = "FILE", value_parser)]
    dt: Option<PathBuf>,

    /// Replace the header ID with the digest of the sections.
    #[arg(long)]
    recompute_id: bool,
}

/// Display boot image header information.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum BootCommand {
    Unpack(UnpackCli),
    Pack(PackCli),
    Repack(RepackCli),
    Info(InfoCli),
}

/// Pack or unpack boot images.
#[derive(Debug, Parser)]
pub struct BootCli {
    #[command(subcommand)]
    command: BootCommand,

    /// Don't print boot image header information.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print boot image header information in debug format.
    #[arg(short, long, global = true)]
    debug: bool,
}
