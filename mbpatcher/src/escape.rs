// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Serde helpers for storing raw byte fields (boot image names, command lines)
//! as escaped strings in TOML.

use std::fmt;

use bstr::{ByteSlice, ByteVec};
use serde::{Deserializer, Serializer, de::Visitor};

pub fn serialize<S, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    let s = data.as_ref().escape_bytes().to_string();
    serializer.serialize_str(&s)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EscapedStrVisitor;

    impl Visitor<'_> for EscapedStrVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an escaped byte string")
        }

        fn visit_str<E>(self, data: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::unescape_bytes(data))
        }
    }

    deserializer.deserialize_str(EscapedStrVisitor)
}
