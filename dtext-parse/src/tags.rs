//! Lexer for `[tag]` / `<tag>` spellings.
//!
//! A tag is lexed the same way in every mode; what it *means* depends on the
//! mode the scanner is in, so classification is a separate step
//! ([`TagName::classify`]).

use crate::lookahead::{Lookahead, Stop};

/// Which bracket pair the tag was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delim {
    /// `[b]`
    Bracket,
    /// `<b>`
    Angle,
}

impl Delim {
    fn close(self) -> u8 {
        match self {
            Delim::Bracket => b']',
            Delim::Angle => b'>',
        }
    }
}

/// One lexed tag, borrowing from the normalized input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag<'a> {
    pub name: &'a str,
    pub closing: bool,
    pub delim: Delim,
    /// `[tag=value]`, quotes stripped.
    pub value: Option<&'a str>,
    /// `[tag name=value name="value"]`, in source order.
    pub attrs: Vec<(&'a str, &'a str)>,
    /// Byte offset of the opening `[` / `<`.
    pub start: usize,
    /// Byte offset just past the closing `]` / `>`.
    pub end: usize,
}

/// Tag names the scanner knows about, with their aliases folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagName {
    B,
    I,
    U,
    S,
    Sup,
    Sub,
    Tn,
    Spoiler,
    Code,
    NoDText,
    Br,
    Hr,
    Color,
    Url,
    Quote,
    Section,
    SectionExpanded,
    Table,
    Thead,
    Tbody,
    Tr,
    Th,
    Td,
    Col,
    ColGroup,
}

impl TagName {
    /// Case-insensitive lookup. BBCode-only names (`color`, `url`, `section`)
    /// are not recognized in the `<angle>` spelling.
    pub(crate) fn classify(tag: &Tag<'_>) -> Option<TagName> {
        let name = tag.name.to_ascii_lowercase();
        let kind = match name.as_str() {
            "b" | "strong" => TagName::B,
            "i" | "em" => TagName::I,
            "u" => TagName::U,
            "s" | "strike" => TagName::S,
            "sup" => TagName::Sup,
            "sub" => TagName::Sub,
            "tn" => TagName::Tn,
            "spoiler" | "spoilers" => TagName::Spoiler,
            "code" => TagName::Code,
            "nodtext" => TagName::NoDText,
            "br" => TagName::Br,
            "hr" => TagName::Hr,
            "quote" | "blockquote" => TagName::Quote,
            "table" => TagName::Table,
            "thead" => TagName::Thead,
            "tbody" => TagName::Tbody,
            "tr" => TagName::Tr,
            "th" => TagName::Th,
            "td" => TagName::Td,
            "col" => TagName::Col,
            "colgroup" => TagName::ColGroup,
            "color" if tag.delim == Delim::Bracket => TagName::Color,
            "url" if tag.delim == Delim::Bracket => TagName::Url,
            "section" if tag.delim == Delim::Bracket => TagName::Section,
            "section,expanded" if tag.delim == Delim::Bracket => TagName::SectionExpanded,
            _ => return None,
        };
        Some(kind)
    }

    /// Table sub-vocabulary: the tags a table cell gives way to.
    pub(crate) fn is_table_structure(self) -> bool {
        matches!(
            self,
            TagName::Table
                | TagName::Thead
                | TagName::Tbody
                | TagName::Tr
                | TagName::Th
                | TagName::Td
                | TagName::Col
                | TagName::ColGroup
        )
    }
}

/// Lex a tag starting at `src[start]`, which must be `[` or `<`.
///
/// Returns `None` for anything that is not a complete, single-line tag; the
/// caller then treats the opening bracket as literal text.
pub(crate) fn lex_tag<'s>(src: &'s str, start: usize, lookahead: &Lookahead) -> Option<Tag<'s>> {
    let bytes = src.as_bytes();
    let delim = match bytes.get(start)? {
        b'[' => Delim::Bracket,
        b'<' => Delim::Angle,
        _ => return None,
    };
    let close = delim.close();
    let mut p = start + 1;

    let closing = bytes.get(p) == Some(&b'/');
    if closing {
        p += 1;
    }

    let name_start = p;
    if !bytes.get(p)?.is_ascii_alphabetic() {
        return None;
    }
    while bytes
        .get(p)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b',')
    {
        p += 1;
    }
    let name = &src[name_start..p];

    let mut tag = Tag {
        name,
        closing,
        delim,
        value: None,
        attrs: Vec::new(),
        start,
        end: 0,
    };

    match *bytes.get(p)? {
        b if b == close => {
            tag.end = p + 1;
        }
        b'=' if !closing => {
            let value_start = p + 1;
            let stop = match delim {
                Delim::Bracket => Stop::Bracket,
                Delim::Angle => Stop::Angle,
            };
            let value_end = lookahead.find(bytes, value_start, stop);
            if bytes.get(value_end) != Some(&close) {
                return None;
            }
            tag.value = Some(strip_quotes(&src[value_start..value_end]));
            tag.end = value_end + 1;
        }
        b'/' if bytes.get(p + 1) == Some(&close) => {
            tag.end = p + 2;
        }
        b' ' | b'\t' if !closing => {
            let (attrs, end) = lex_attributes(src, p, close)?;
            tag.attrs = attrs;
            tag.end = end;
        }
        _ => return None,
    }

    Some(tag)
}

/// `name=value` pairs up to the closing bracket. Values may be bare,
/// `"double"` or `'single'` quoted.
fn lex_attributes(src: &str, mut p: usize, close: u8) -> Option<(Vec<(&str, &str)>, usize)> {
    let bytes = src.as_bytes();
    let mut attrs = Vec::new();

    loop {
        while matches!(bytes.get(p), Some(b' ' | b'\t')) {
            p += 1;
        }
        match *bytes.get(p)? {
            b if b == close => return Some((attrs, p + 1)),
            b'/' if bytes.get(p + 1) == Some(&close) => return Some((attrs, p + 2)),
            b if b.is_ascii_alphabetic() => {}
            _ => return None,
        }

        let name_start = p;
        while bytes
            .get(p)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
        {
            p += 1;
        }
        let name = &src[name_start..p];
        if bytes.get(p) != Some(&b'=') {
            return None;
        }
        p += 1;

        let value = match *bytes.get(p)? {
            quote @ (b'"' | b'\'') => {
                let value_start = p + 1;
                let len = bytes[value_start..]
                    .iter()
                    .position(|&b| b == quote || b == b'\n' || b == 0)?;
                if bytes[value_start + len] != quote {
                    return None;
                }
                p = value_start + len + 1;
                &src[value_start..value_start + len]
            }
            _ => {
                let value_start = p;
                while bytes
                    .get(p)
                    .is_some_and(|&b| b != close && !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0))
                {
                    p += 1;
                }
                if p == value_start {
                    return None;
                }
                &src[value_start..p]
            }
        };
        attrs.push((name, value));
    }
}

fn strip_quotes(s: &str) -> &str {
    let trimmed = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

/// Case-insensitive `starts_with` on raw bytes.
pub(crate) fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(src: &str, start: usize) -> Option<Tag<'_>> {
        lex_tag(src, start, &Lookahead::default())
    }

    #[test]
    fn simple_open_and_close() {
        let tag = lex("[b]x", 0).unwrap();
        assert_eq!(tag.name, "b");
        assert!(!tag.closing);
        assert_eq!(tag.end, 3);

        let tag = lex("x</STRONG>", 1).unwrap();
        assert_eq!(tag.name, "STRONG");
        assert!(tag.closing);
        assert_eq!(tag.delim, Delim::Angle);
        assert_eq!(TagName::classify(&tag), Some(TagName::B));
    }

    #[test]
    fn value_form() {
        let tag = lex("[section,expanded=Hidden stuff]", 0).unwrap();
        assert_eq!(tag.name, "section,expanded");
        assert_eq!(tag.value, Some("Hidden stuff"));
        assert_eq!(TagName::classify(&tag), Some(TagName::SectionExpanded));

        let tag = lex(r#"[url="https://e621.net"]"#, 0).unwrap();
        assert_eq!(tag.value, Some("https://e621.net"));
    }

    #[test]
    fn attribute_form() {
        let tag = lex(r#"[td colspan=2 align="center" x='y']"#, 0).unwrap();
        assert_eq!(
            tag.attrs,
            vec![("colspan", "2"), ("align", "center"), ("x", "y")]
        );
    }

    #[test]
    fn self_closing() {
        let tag = lex("<br/>", 0).unwrap();
        assert_eq!(tag.name, "br");
        assert_eq!(tag.end, 5);
    }

    #[test]
    fn malformed_tags_do_not_lex() {
        assert!(lex("[b", 0).is_none());
        assert!(lex("[1]", 0).is_none());
        assert!(lex("[color=red\n]", 0).is_none());
        assert!(lex(r#"[td align="left]"#, 0).is_none());
        assert!(lex("<http://x>", 0).is_none());
    }

    #[test]
    fn bbcode_only_names() {
        let tag = lex("<color>", 0).unwrap();
        assert_eq!(TagName::classify(&tag), None);
        let tag = lex("[COLOR=red]", 0).unwrap();
        assert_eq!(TagName::classify(&tag), Some(TagName::Color));
    }
}
