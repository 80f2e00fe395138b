// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    ops::{Bound, RangeBounds},
    path::Path,
};

use num_traits::PrimInt;
use thiserror::Error;

pub const ZEROS: [u8; 16384] = [0u8; 16384];

/// A small wrapper to format a number as a size in bytes.
#[derive(Clone, Copy)]
pub struct NumBytes<T: PrimInt>(pub T);

impl<T: PrimInt + fmt::Debug> fmt::Debug for NumBytes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == T::one() {
            write!(f, "<{:?} byte>", self.0)
        } else {
            write!(f, "<{:?} bytes>", self.0)
        }
    }
}

#[derive(Debug, Error)]
#[error("{value} not in range {start}..{end}")]
pub struct OutOfBoundsError {
    pub value: String,
    pub start: String,
    pub end: String,
}

/// Ensure that `value` is within `range`. The error message contains the
/// stringified value and range bounds.
pub fn check_bounds<T, R>(value: T, range: R) -> Result<T, OutOfBoundsError>
where
    T: PrimInt + fmt::Display,
    R: RangeBounds<T>,
{
    if range.contains(&value) {
        return Ok(value);
    }

    let start = match range.start_bound() {
        Bound::Included(v) => v.to_string(),
        Bound::Excluded(v) => format!("({v}"),
        Bound::Unbounded => String::new(),
    };
    let end = match range.end_bound() {
        Bound::Included(v) => format!("={v}"),
        Bound::Excluded(v) => v.to_string(),
        Bound::Unbounded => String::new(),
    };

    Err(OutOfBoundsError {
        value: value.to_string(),
        start,
        end,
    })
}

/// Check if a byte slice is all zeros.
pub fn is_zero(mut buf: &[u8]) -> bool {
    while !buf.is_empty() {
        let n = buf.len().min(ZEROS.len());
        if buf[..n] != ZEROS[..n] {
            return false;
        }

        buf = &buf[n..];
    }

    true
}

/// Get the non-empty parent of a path. If the path has no parent in the string,
/// then `.` is returned. This does not perform any filesystem operations.
pub fn parent_path(path: &Path) -> &Path {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            return parent;
        }
    }

    Path::new(".")
}
