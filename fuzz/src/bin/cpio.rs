// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use mbpatcher::format::cpio::CpioArchive;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(archive) = CpioArchive::load(data) {
                    let _ = archive.serialize();
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
