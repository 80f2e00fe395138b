// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::cli::{boot, patch, ramdisk};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Send log messages to stderr so that they never mix with command output.
pub fn init_logging(log_level: LogLevel) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::from(log_level))
        .with_target(false)
        .init();
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Boot(boot::BootCli),
    Ramdisk(ramdisk::RamdiskCli),
    Patch(patch::PatchCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", default_value_t, value_enum)]
    pub log_level: LogLevel,
}

pub fn main(logging_initialized: &AtomicBool, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level);
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Boot(c) => boot::boot_main(&c),
        Command::Ramdisk(c) => ramdisk::ramdisk_main(&c),
        Command::Patch(c) => patch::patch_main(&c, cancel_signal),
    }
}
