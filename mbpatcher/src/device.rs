// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Device descriptors. These are supplied by the device database as TOML and
//! are only ever read during patching.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse device list")]
    Parse(#[source] toml_edit::de::Error),
    #[error("Failed to read device list: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Duplicate device ID: {0:?}")]
    DuplicateId(String),
    #[error("Device {0:?} has no system block devices")]
    NoSystemBlockDevs(String),
    #[error("Device not found: {0:?}")]
    NotFound(String),
}

type Result<T> = std::result::Result<T, Error>;

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    pub struct DeviceFlags: u32 {
        /// The stock fstab forces encryption of the data partition.
        const STRIP_FORCE_ENCRYPT = 1 << 0;
        /// The stock init scripts start a service that reformats /cache when
        /// it fails to mount.
        const DISABLE_CACHE_FORMATTER = 1 << 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockDevs {
    pub system: Vec<String>,
    pub cache: Vec<String>,
    pub data: Vec<String>,
    pub boot: Vec<String>,
    pub recovery: Vec<String>,
    pub extra: Vec<String>,
}

impl BlockDevs {
    /// Block device lists in a fixed order along with their names.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            ("system", self.system.as_slice()),
            ("cache", self.cache.as_slice()),
            ("data", self.data.as_slice()),
            ("boot", self.boot.as_slice()),
            ("recovery", self.recovery.as_slice()),
            ("extra", self.extra.as_slice()),
        ]
        .into_iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub codenames: Vec<String>,
    pub name: String,
    pub architecture: String,
    #[serde(default)]
    pub block_devs: BlockDevs,
    /// Vendor ramdisk patcher to run after the core steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramdisk_patcher: Option<String>,
    #[serde(default)]
    pub flags: DeviceFlags,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

impl Device {
    pub fn matches(&self, name: &str) -> bool {
        self.id == name || self.codenames.iter().any(|c| c == name)
    }

    /// Render the device properties that the multiboot init binary reads at
    /// boot time.
    pub fn to_props(&self) -> String {
        let mut result = String::new();

        result.push_str(&format!("device.id={}\n", self.id));
        result.push_str(&format!("device.codenames={}\n", self.codenames.join(",")));
        result.push_str(&format!("device.architecture={}\n", self.architecture));

        for (name, devs) in self.block_devs.iter() {
            if !devs.is_empty() {
                result.push_str(&format!("device.block_devs.{name}={}\n", devs.join(",")));
            }
        }

        result
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct DeviceList {
    #[serde(default)]
    device: Vec<Device>,
}

/// Parse a list of `[[device]]` tables.
pub fn parse_devices(data: &str) -> Result<Vec<Device>> {
    let list: DeviceList = toml_edit::de::from_str(data).map_err(Error::Parse)?;

    for (i, device) in list.device.iter().enumerate() {
        if list.device[..i].iter().any(|d| d.id == device.id) {
            return Err(Error::DuplicateId(device.id.clone()));
        } else if device.block_devs.system.is_empty() {
            return Err(Error::NoSystemBlockDevs(device.id.clone()));
        }
    }

    Ok(list.device)
}

pub fn load_devices(path: &Path) -> Result<Vec<Device>> {
    let data = fs::read_to_string(path).map_err(|e| Error::File(path.to_owned(), e))?;
    parse_devices(&data)
}

/// Find a device by ID or codename.
pub fn find_device<'a>(devices: &'a [Device], name: &str) -> Result<&'a Device> {
    devices
        .iter()
        .find(|d| d.matches(name))
        .ok_or_else(|| Error::NotFound(name.to_owned()))
}
