// SPDX-FileCopyrightText: 2026 The mbpatcher Authors
// SPDX-License-Identifier: GPL-3.0-only

//! Line-oriented edits of init scripts, fstab files, and updater scripts.
//! Every function returns the new data and how many lines were changed, and
//! applying a function to its own output changes nothing.

use std::ops::Range;

use bstr::ByteSlice;
use regex::bytes::Regex;

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Split a line into the leading whitespace, the content, and the line
/// terminator.
fn split_line(line: &[u8]) -> (&[u8], &[u8], &[u8]) {
    let content_end = line.trim_end_with(|c| c == '\n' || c == '\r').len();
    let indent_end = line[..content_end]
        .iter()
        .position(|b| !is_blank(*b))
        .unwrap_or(content_end);

    (
        &line[..indent_end],
        &line[indent_end..content_end],
        &line[content_end..],
    )
}

/// Byte ranges of the whitespace-separated fields in `content`.
fn fields(content: &[u8]) -> Vec<Range<usize>> {
    let mut result = vec![];
    let mut start = None;

    for (i, b) in content.iter().enumerate() {
        match (start, is_blank(*b)) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                result.push(s..i);
                start = None;
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        result.push(s..content.len());
    }

    result
}

const COMMENT: &[u8] = b"#";

fn is_comment(content: &[u8]) -> bool {
    content.starts_with(COMMENT)
}

/// Apply `f` to the content of every line. `f` returns the replacement
/// content or [`None`] to leave the line alone.
fn map_lines(data: &[u8], mut f: impl FnMut(&[u8], &[u8]) -> Option<Vec<u8>>) -> (Vec<u8>, usize) {
    let mut result = Vec::with_capacity(data.len());
    let mut changed = 0;

    for line in data.lines_with_terminator() {
        let (indent, content, terminator) = split_line(line);

        match f(indent, content) {
            Some(new_content) => {
                result.extend_from_slice(indent);
                result.extend_from_slice(&new_content);
                result.extend_from_slice(terminator);
                changed += 1;
            }
            None => result.extend_from_slice(line),
        }
    }

    (result, changed)
}

/// Whether `content` begins with `token` as a whole word.
pub fn starts_with_token(content: &[u8], token: &[u8]) -> bool {
    content.starts_with(token) && content.get(token.len()).is_none_or(|b| b.is_ascii_whitespace())
}

/// Prefix the commands in `commands` with `prefix` wherever they appear as a
/// whole token at the start of a line, after leading whitespace.
/// `remount` and `mountpoint` are never mistaken for `mount`, and lines that
/// already have the prefix are left untouched.
pub fn prefix_commands(data: &[u8], commands: &[&str], prefix: &str) -> (Vec<u8>, usize) {
    map_lines(data, |_, content| {
        commands
            .iter()
            .find(|c| starts_with_token(content, c.as_bytes()))
            .map(|_| [prefix.as_bytes(), content].concat())
    })
}

/// Comment out lines whose content matches `regex`.
pub fn comment_lines(data: &[u8], regex: &Regex) -> (Vec<u8>, usize) {
    map_lines(data, |_, content| {
        if is_comment(content) || !regex.is_match(content) {
            None
        } else {
            Some([COMMENT, content].concat())
        }
    })
}

/// Result of [`disable_service`].
#[derive(Debug, PartialEq, Eq)]
pub enum ServiceEdit {
    /// The service definition does not exist.
    NotFound,
    /// The service definition is already commented out.
    AlreadyDisabled,
    Disabled(Vec<u8>),
}

/// Keywords that start a new section in an init script.
const SECTION_KEYWORDS: [&[u8]; 3] = [b"service", b"on", b"import"];

/// Comment out the definition of the init service named `name`, including
/// all of its options.
pub fn disable_service(data: &[u8], name: &str) -> ServiceEdit {
    let is_definition = |content: &[u8]| {
        let f = fields(content);
        f.len() >= 2
            && &content[f[0].clone()] == b"service"
            && &content[f[1].clone()] == name.as_bytes()
    };

    let mut in_service = false;
    let mut found = false;
    let mut already_disabled = false;

    let (result, changed) = map_lines(data, |_, content| {
        if in_service {
            let new_section = SECTION_KEYWORDS
                .iter()
                .any(|k| starts_with_token(content, k));

            if new_section || content.is_empty() {
                in_service = false;
            } else if !is_comment(content) {
                return Some([COMMENT, content].concat());
            } else {
                return None;
            }
        }

        if is_definition(content) {
            found = true;
            in_service = true;
            Some([COMMENT, content].concat())
        } else if is_comment(content) && is_definition(content[1..].trim_start()) {
            already_disabled = true;
            None
        } else {
            None
        }
    });

    if found && changed > 0 {
        ServiceEdit::Disabled(result)
    } else if found || already_disabled {
        ServiceEdit::AlreadyDisabled
    } else {
        ServiceEdit::NotFound
    }
}

/// Replace the mount point of fstab entries mounted at `from` with `to`.
/// Both the `<src> <mount point> <type> ...` and the legacy
/// `<mount point> <type> <src>` layouts are handled.
pub fn rewrite_fstab_mount_point(data: &[u8], from: &str, to: &str) -> (Vec<u8>, usize) {
    map_lines(data, |_, content| {
        if is_comment(content) {
            return None;
        }

        let f = fields(content);
        let range = f[fstab_mount_point_index(f.len())?].clone();

        (&content[range.clone()] == from.as_bytes()).then(|| {
            [&content[..range.start], to.as_bytes(), &content[range.end..]].concat()
        })
    })
}

/// Index of the mount point field in an fstab line with `n` fields.
fn fstab_mount_point_index(n: usize) -> Option<usize> {
    match n {
        3 => Some(0),
        n if n >= 4 => Some(1),
        _ => None,
    }
}

/// Whether any fstab entry is mounted at `mount_point`.
pub fn has_fstab_mount_point(data: &[u8], mount_point: &str) -> bool {
    data.lines().any(|line| {
        let (_, content, _) = split_line(line);
        let f = fields(content);

        !is_comment(content)
            && fstab_mount_point_index(f.len())
                .is_some_and(|i| &content[f[i].clone()] == mount_point.as_bytes())
    })
}

/// Whether any line matches `regex`, ignoring whether it is commented out.
pub fn has_line_matching(data: &[u8], regex: &Regex) -> bool {
    data.lines().any(|line| {
        let (_, content, _) = split_line(line);
        let content = content.strip_prefix(COMMENT).unwrap_or(content);

        regex.is_match(content)
    })
}

/// Remove `flag` (and `flag=<value>`) from the fs_mgr flags column of fstab
/// entries. If no flags remain, the column becomes `defaults`.
pub fn strip_fstab_flag(data: &[u8], flag: &str) -> (Vec<u8>, usize) {
    let matches_flag = |f: &[u8]| {
        f == flag.as_bytes() || f.strip_prefix(flag.as_bytes()).is_some_and(|r| r.starts_with(b"="))
    };

    map_lines(data, |_, content| {
        if is_comment(content) {
            return None;
        }

        let f = fields(content);
        if f.len() < 5 {
            return None;
        }
        let range = f[4].clone();
        let column = &content[range.clone()];

        if !column.split_str(",").any(matches_flag) {
            return None;
        }

        let mut remaining = column
            .split_str(",")
            .filter(|f| !matches_flag(f))
            .collect::<Vec<_>>()
            .join(&b","[..]);
        if remaining.is_empty() {
            remaining = b"defaults".to_vec();
        }

        Some([&content[..range.start], remaining.as_slice(), &content[range.end..]].concat())
    })
}

/// Append `line` if no line with the same content exists. Returns [`None`] if
/// nothing changed.
pub fn ensure_line(data: &[u8], line: &str) -> Option<Vec<u8>> {
    if data.lines().any(|l| l.trim() == line.as_bytes()) {
        return None;
    }

    let mut result = data.to_vec();
    if !result.is_empty() && !result.ends_with(b"\n") {
        result.push(b'\n');
    }
    result.extend_from_slice(line.as_bytes());
    result.push(b'\n');

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_mount_commands() {
        let data = b"  mount /system\nremount /system\nmountpoint -q /data\n\tumount\n/sbin/mount /cache\n";
        let (result, changed) = prefix_commands(data, &["mount", "umount"], "/sbin/");

        assert_eq!(changed, 2);
        assert_eq!(
            result.as_bstr(),
            b"  /sbin/mount /system\nremount /system\nmountpoint -q /data\n\t/sbin/umount\n/sbin/mount /cache\n"
                .as_bstr(),
        );

        let (again, changed) = prefix_commands(&result, &["mount", "umount"], "/sbin/");
        assert_eq!(changed, 0);
        assert_eq!(again, result);
    }

    #[test]
    fn crlf_preserved() {
        let (result, changed) = prefix_commands(b"mount\r\n", &["mount"], "/sbin/");
        assert_eq!(changed, 1);
        assert_eq!(result, b"/sbin/mount\r\n");
    }

    #[test]
    fn comment_matching_lines() {
        let regex = Regex::new(r"^mount\s+\S+\s+\S+\s+/cache").unwrap();
        let data = b"on fs\n    mount ext4 /dev/block/cache /cache nosuid\n    mount ext4 /dev/block/data /data\n";
        let (result, changed) = comment_lines(data, &regex);

        assert_eq!(changed, 1);
        assert_eq!(
            result.as_bstr(),
            b"on fs\n    #mount ext4 /dev/block/cache /cache nosuid\n    mount ext4 /dev/block/data /data\n"
                .as_bstr(),
        );
        assert_eq!(comment_lines(&result, &regex).1, 0);
    }

    #[test]
    fn disable_service_block() {
        let data = b"service formatter /system/bin/formatter\n    class core\n    oneshot\n\non boot\n    start formatter\n";
        let ServiceEdit::Disabled(result) = disable_service(data, "formatter") else {
            panic!("Service not disabled");
        };

        assert_eq!(
            result.as_bstr(),
            b"#service formatter /system/bin/formatter\n    #class core\n    #oneshot\n\non boot\n    start formatter\n"
                .as_bstr(),
        );
        assert_eq!(disable_service(&result, "formatter"), ServiceEdit::AlreadyDisabled);
        assert_eq!(disable_service(data, "missing"), ServiceEdit::NotFound);
    }

    #[test]
    fn fstab_mount_points() {
        let data = b"/dev/block/system /system ext4 ro wait\n/dev/block/systemx /systemx ext4 ro wait\n/system ext4 /dev/block/system\n# /dev/block/system /system ext4 ro wait\n";
        let (result, changed) = rewrite_fstab_mount_point(data, "/system", "/raw/system");

        assert_eq!(changed, 2);
        assert_eq!(
            result.as_bstr(),
            b"/dev/block/system /raw/system ext4 ro wait\n/dev/block/systemx /systemx ext4 ro wait\n/raw/system ext4 /dev/block/system\n# /dev/block/system /system ext4 ro wait\n"
                .as_bstr(),
        );
        assert_eq!(rewrite_fstab_mount_point(&result, "/system", "/raw/system").1, 0);
    }

    #[test]
    fn fstab_flags() {
        let data = b"/dev/a /system ext4 ro wait,verify=/dev/meta,check\n/dev/b /data ext4 rw verify\n/dev/c /cache ext4 rw wait,verifyatboot\n";
        let (result, changed) = strip_fstab_flag(data, "verify");

        assert_eq!(changed, 2);
        assert_eq!(
            result.as_bstr(),
            b"/dev/a /system ext4 ro wait,check\n/dev/b /data ext4 rw defaults\n/dev/c /cache ext4 rw wait,verifyatboot\n"
                .as_bstr(),
        );
        assert_eq!(strip_fstab_flag(&result, "verify").1, 0);
    }

    #[test]
    fn ensure_lines() {
        let result = ensure_line(b"import /init.usb.rc", "import /init.multiboot.rc").unwrap();
        assert_eq!(result, b"import /init.usb.rc\nimport /init.multiboot.rc\n");
        assert_eq!(ensure_line(&result, "import /init.multiboot.rc"), None);
    }
}
