// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
    str,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::format::{
    compression::{self, CompressedFormat},
    cpio::CpioArchive,
};

static CONTENT_BEGIN: &str = "----- BEGIN UTF-8 CONTENT -----";
static CONTENT_END: &str = "----- END UTF-8 CONTENT -----";
static CONTENT_END_NO_NEWLINE: &str = "----- END UTF-8 CONTENT (NO NEWLINE) -----";

static BINARY_BEGIN: &str = "----- BEGIN BINARY CONTENT -----";
static BINARY_END: &str = "----- END BINARY CONTENT -----";
static BINARY_END_TRUNCATED: &str = "----- END BINARY CONTENT (TRUNCATED) -----";

static NO_DATA: &str = "----- NO DATA -----";

fn print_content(data: &[u8], truncate: bool) {
    if data.is_empty() {
        println!("{NO_DATA}");
        return;
    }

    if !data.contains(&b'\0')
        && let Ok(s) = str::from_utf8(data)
        && !s.contains(CONTENT_BEGIN)
        && !s.contains(CONTENT_END)
        && !s.contains(CONTENT_END_NO_NEWLINE)
    {
        println!("{CONTENT_BEGIN}");
        print!("{s}");
        if data.last() == Some(&b'\n') {
            println!("{CONTENT_END}");
        } else {
            println!();
            println!("{CONTENT_END_NO_NEWLINE}");
        }

        return;
    }

    println!("{BINARY_BEGIN}");

    if data.len() > 512 && truncate {
        println!("{}", data[..512].escape_ascii());
        println!("{BINARY_END_TRUNCATED}");
    } else {
        println!("{}", data.escape_ascii());
        println!("{BINARY_END}");
    }
}

fn load_archive(path: &Path) -> Result<(CpioArchive, CompressedFormat)> {
    let data = fs::read(path)?;
    let (raw, format) = compression::decompress(&data)?;
    let archive = CpioArchive::load(&raw)?;

    Ok((archive, format))
}

fn save_archive(path: &Path, archive: &CpioArchive, format: CompressedFormat) -> Result<()> {
    let raw = archive.serialize()?;
    let data = compression::compress(&raw, format)?;
    fs::write(path, data)?;

    Ok(())
}

pub fn ramdisk_main(cli: &RamdiskCli) -> Result<()> {
    match &cli.command {
        RamdiskCommand::Dump(c) => {
            let (archive, format) = load_archive(&c.input)
                .with_context(|| format!("Failed to read cpio: {:?}", c.input))?;

            println!("Compression format: {format:?}");
            println!("Trailer padding: {:?}", archive.padding());
            println!();

            for entry in archive.entries() {
                println!("{entry}");
                print_content(&entry.content, !c.no_truncate);
                println!();
            }
        }
        RamdiskCommand::Repack(c) => {
            let (archive, format) = load_archive(&c.input)
                .with_context(|| format!("Failed to read cpio: {:?}", c.input))?;

            save_archive(&c.output, &archive, format)
                .with_context(|| format!("Failed to write cpio: {:?}", c.output))?;
        }
    }

    Ok(())
}

/// Dump cpio headers and data.
#[derive(Debug, Parser)]
struct DumpCli {
    /// Path to input cpio file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Do not truncate binary file contents.
    #[arg(long)]
    no_truncate: bool,
}

/// Repack cpio archive.
#[derive(Debug, Parser)]
struct RepackCli {
    /// Path to input cpio file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output cpio file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,
}

#[derive(Debug, Subcommand)]
enum RamdiskCommand {
    Dump(DumpCli),
    Repack(RepackCli),
}

/// Show information about ramdisk cpio archives.
#[derive(Debug, Parser)]
pub struct RamdiskCli {
    #[command(subcommand)]
    command: RamdiskCommand,
}
