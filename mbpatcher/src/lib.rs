// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! mbpatcher is primarily an application. The semver versioning covers the
//! CLI only and the Rust APIs can change at any time.
//!
//! The boot image and cpio code under [`format`] knows nothing about
//! multiboot. Everything specific to installing a secondary ROM lives under
//! [`patch`].

pub mod cli;
pub mod device;
pub mod escape;
pub mod format;
pub mod patch;
pub mod util;
