//! Memoized forward scans.
//!
//! Several rules only match if a terminator shows up later: the `]` ending
//! `[color=red]`, the `)` ending `[title](url)`, `[/url]`, a closing code
//! fence. A failed match would otherwise rescan the same stretch again
//! from every following candidate. [`Lookahead`] keeps the last answer for
//! each kind of scan; because the scanner only moves forward, the answer
//! stays valid for every later start up to the stop it found.

use std::cell::Cell;

use crate::tags::starts_with_ignore_case;

/// What a forward scan stops at. Every kind also stops at a NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// `]` or a newline: the end of `[tag=value]` and `"title":[url]`.
    Bracket,
    /// `>` or a newline: the end of `<tag=value>`.
    Angle,
    /// `)` or whitespace: the end of the url in `[title](url)`.
    Paren,
    /// `[/url]` in any case, or a newline.
    UrlClose,
    /// The start of a line holding nothing but ```` ``` ````.
    Fence,
}

const STOP_KINDS: usize = 5;

impl Stop {
    fn slot(self) -> usize {
        match self {
            Stop::Bracket => 0,
            Stop::Angle => 1,
            Stop::Paren => 2,
            Stop::UrlClose => 3,
            Stop::Fence => 4,
        }
    }

    fn matches(self, bytes: &[u8], i: usize) -> bool {
        let b = bytes[i];
        if b == 0 {
            return true;
        }
        match self {
            Stop::Bracket => matches!(b, b']' | b'\n'),
            Stop::Angle => matches!(b, b'>' | b'\n'),
            Stop::Paren => matches!(b, b')' | b' ' | b'\t' | b'\n' | b'\r'),
            Stop::UrlClose => b == b'\n' || starts_with_ignore_case(&bytes[i..], b"[/url]"),
            Stop::Fence => i > 0 && bytes[i - 1] == b'\n' && is_fence_line(&bytes[i..]),
        }
    }
}

/// ```` ``` ```` followed by nothing but horizontal space on its line.
fn is_fence_line(line: &[u8]) -> bool {
    line.starts_with(b"```")
        && line[3..]
            .iter()
            .find(|&&b| !matches!(b, b' ' | b'\t'))
            .is_none_or(|&b| matches!(b, b'\n' | b'\r' | 0))
}

/// The last `(from, stop)` pair per [`Stop`] kind: nothing in `from..stop`
/// matched.
#[derive(Debug, Default)]
pub(crate) struct Lookahead {
    last: [Cell<Option<(usize, usize)>>; STOP_KINDS],
}

impl Lookahead {
    /// Offset of the first `stop` position at or after `from`, or
    /// `bytes.len()` if there is none.
    pub(crate) fn find(&self, bytes: &[u8], from: usize, stop: Stop) -> usize {
        let slot = &self.last[stop.slot()];
        if let Some((start, end)) = slot.get() {
            if start <= from && from <= end {
                return end;
            }
        }

        let mut i = from;
        while i < bytes.len() && !stop.matches(bytes, i) {
            i += 1;
        }
        slot.set(Some((from, i)));
        i
    }

    /// Offset of the next `[/url]` on the current line.
    pub(crate) fn find_url_close(&self, bytes: &[u8], from: usize) -> Option<usize> {
        let i = self.find(bytes, from, Stop::UrlClose);
        (bytes.get(i) == Some(&b'[')).then_some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn url_close_stops_at_newline() {
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find_url_close(b"abc[/URL]", 0), Some(3));
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find_url_close(b"ab\nc[/url]", 0), None);
    }

    #[test]
    fn later_starts_reuse_the_last_answer() {
        let bytes = b"\0[a=[a=[a=x]\0";
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find(bytes, 4, Stop::Bracket), 11);
        assert_eq!(lookahead.last[Stop::Bracket.slot()].get(), Some((4, 11)));

        assert_eq!(lookahead.find(bytes, 7, Stop::Bracket), 11);
        assert_eq!(lookahead.last[Stop::Bracket.slot()].get(), Some((4, 11)));

        // Before the cached range: scanned again.
        assert_eq!(lookahead.find(bytes, 1, Stop::Bracket), 11);
        assert_eq!(lookahead.last[Stop::Bracket.slot()].get(), Some((1, 11)));
    }

    #[test]
    fn kinds_are_cached_separately() {
        let bytes = b"\0a)b]\0";
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find(bytes, 1, Stop::Bracket), 4);
        assert_eq!(lookahead.find(bytes, 1, Stop::Paren), 2);
    }

    #[test]
    fn fence_lines() {
        let bytes = b"\0```x\na```\n```  \nb\0";
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find(bytes, 6, Stop::Fence), 11);

        let bytes = b"\0```x\nno close\0";
        let lookahead = Lookahead::default();
        assert_eq!(lookahead.find(bytes, 6, Stop::Fence), bytes.len() - 1);
    }
}
