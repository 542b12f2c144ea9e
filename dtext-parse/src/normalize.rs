//! Input normalization.
//!
//! The scanner works on `NUL <text> NUL`: the sentinels make `p - 1` and
//! `p + 1` always readable, and a NUL before the first byte doubles as the
//! "start of input" mention boundary.

/// Byte used for both sentinels.
pub(crate) const SENTINEL: u8 = 0;

/// Convert CRLF to LF, drop embedded NULs and wrap the result in sentinels.
///
/// A lone `\r` is kept; the scanner treats it as ordinary whitespace.
pub(crate) fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\0');

    let mut rest = input;
    while let Some(idx) = rest.find(|c: char| c == '\r' || c == '\0') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if tail.starts_with("\r\n") {
            out.push('\n');
            rest = &tail[2..];
        } else if tail.starts_with('\r') {
            out.push('\r');
            rest = &tail[1..];
        } else {
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    out.push('\0');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_in_sentinels() {
        assert_eq!(normalize("abc"), "\0abc\0");
        assert_eq!(normalize(""), "\0\0");
    }

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize("a\r\nb\r\n"), "\0a\nb\n\0");
    }

    #[test]
    fn lone_cr_is_preserved() {
        assert_eq!(normalize("a\rb"), "\0a\rb\0");
        assert_eq!(normalize("a\r\r\nb"), "\0a\r\nb\0");
    }

    #[test]
    fn embedded_nul_is_dropped() {
        assert_eq!(normalize("a\0b"), "\0ab\0");
    }
}
