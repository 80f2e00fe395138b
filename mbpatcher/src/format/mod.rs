// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

pub mod android;
pub mod binary;
pub mod bootimage;
pub mod bump;
pub mod compression;
pub mod cpio;
pub mod loki;
pub mod mtk;
pub mod padding;
pub mod sonyelf;
