// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use mbpatcher::format::bootimage::BootImage;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(image) = BootImage::decode(data) {
                    let _ = image.encode();
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
