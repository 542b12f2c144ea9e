//! HTML entities that pass through unchanged.

const NAMED: &[&str] = &[
    "amp", "lt", "gt", "quot", "apos", "nbsp", "copy", "reg", "trade", "mdash", "ndash", "hellip",
    "lsquo", "rsquo", "ldquo", "rdquo", "bull", "middot",
];

/// Length of the entity starting at `s[0] == '&'`, if it is one we re-emit.
///
/// Recognizes the named entities above and decimal `&#N;` for
/// `0 <= N <= 99999`.
pub(crate) fn match_entity(s: &[u8]) -> Option<usize> {
    if s.first() != Some(&b'&') {
        return None;
    }

    if s.get(1) == Some(&b'#') {
        let digits = s[2..].iter().take_while(|b| b.is_ascii_digit()).count();
        if (1..=5).contains(&digits) && s.get(2 + digits) == Some(&b';') {
            return Some(digits + 3);
        }
        return None;
    }

    let name_len = s[1..].iter().take_while(|b| b.is_ascii_alphabetic()).count();
    if name_len == 0 || s.get(1 + name_len) != Some(&b';') {
        return None;
    }
    let name = &s[1..1 + name_len];
    NAMED
        .iter()
        .any(|n| n.as_bytes() == name)
        .then_some(name_len + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_entities() {
        assert_eq!(match_entity(b"&amp; rest"), Some(5));
        assert_eq!(match_entity(b"&hellip;"), Some(8));
        assert_eq!(match_entity(b"&#39;"), Some(5));
    }

    #[test]
    fn numeric_range() {
        assert_eq!(match_entity(b"&#0;"), Some(4));
        assert_eq!(match_entity(b"&#99999;"), Some(8));
        assert_eq!(match_entity(b"&#100000;"), None);
        assert_eq!(match_entity(b"&#;"), None);
    }

    #[test]
    fn unknown_or_unterminated() {
        assert_eq!(match_entity(b"&foo;"), None);
        assert_eq!(match_entity(b"&amp"), None);
        assert_eq!(match_entity(b"& amp;"), None);
        assert_eq!(match_entity(b"&AMP;"), None);
    }
}
