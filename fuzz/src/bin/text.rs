// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use mbpatcher::patch::text;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let (once, _) = text::rewrite_fstab_mount_point(data, "/system", "/raw/system");
                let (twice, n) = text::rewrite_fstab_mount_point(&once, "/system", "/raw/system");
                assert_eq!(n, 0);
                assert_eq!(once, twice);

                let (once, _) = text::prefix_commands(data, &["mount", "umount"], "/sbin/");
                let (_, n) = text::prefix_commands(&once, &["mount", "umount"], "/sbin/");
                assert_eq!(n, 0);

                let (once, _) = text::strip_fstab_flag(data, "verify");
                let (_, n) = text::strip_fstab_flag(&once, "verify");
                assert_eq!(n, 0);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
