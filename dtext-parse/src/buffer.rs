//! Append-only output buffer and the two escapers.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Bytes left alone by [`uri_escape`]: `[A-Za-z0-9-_.~]`.
const URI_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The HTML being built. Bytes only ever get appended.
#[derive(Debug, Default)]
pub(crate) struct Buffer {
    out: String,
    /// Mirrors `DTextOptions::f_inline`: block-level writes are dropped.
    f_inline: bool,
}

impl Buffer {
    pub(crate) fn new(capacity: usize, f_inline: bool) -> Self {
        Self {
            out: String::with_capacity(capacity),
            f_inline,
        }
    }

    pub(crate) fn append(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub(crate) fn append_html_escaped(&mut self, s: &str) {
        escape_html_into(&mut self.out, s);
    }

    pub(crate) fn append_uri_escaped(&mut self, s: &str) {
        self.out.extend(utf8_percent_encode(s, URI_UNRESERVED));
    }

    /// Block-level markup: written only when not rendering inline-only.
    pub(crate) fn append_block(&mut self, s: &str) {
        if !self.f_inline {
            self.out.push_str(s);
        }
    }

    pub(crate) fn append_block_html_escaped(&mut self, s: &str) {
        if !self.f_inline {
            escape_html_into(&mut self.out, s);
        }
    }

    /// `base_url + url` for site-relative (`/`, `#`) URLs, `url` otherwise.
    pub(crate) fn append_relative_url(&mut self, base_url: &str, url: &str) {
        if !base_url.is_empty() && (url.starts_with('/') || url.starts_with('#')) {
            self.append_html_escaped(base_url);
        }
        self.append_html_escaped(url);
    }

    pub(crate) fn into_string(self) -> String {
        self.out
    }

    #[cfg(test)]
    pub(crate) fn as_str(&self) -> &str {
        &self.out
    }
}

/// Escape `< > & "` and pass everything else through.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_html_into(&mut out, s);
    out
}

/// Percent-encode every byte outside `[A-Za-z0-9-_.~]`.
pub fn uri_escape(s: &str) -> String {
    utf8_percent_encode(s, URI_UNRESERVED).to_string()
}

fn escape_html_into(out: &mut String, s: &str) {
    let mut last = 0;
    for (i, b) in s.bytes().enumerate() {
        let entity = match b {
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'&' => "&amp;",
            b'"' => "&quot;",
            _ => continue,
        };
        out.push_str(&s[last..i]);
        out.push_str(entity);
        last = i + 1;
    }
    out.push_str(&s[last..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_the_four_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn escape_leaves_other_bytes_alone() {
        assert_eq!(escape_html("[b]'日本'[/b]"), "[b]'日本'[/b]");
    }

    #[test]
    fn escaping_is_not_idempotent_on_entities() {
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
        assert_eq!(escape_html(&escape_html("<")), "&amp;lt;");
    }

    #[test]
    fn uri_escape_passes_unreserved() {
        assert_eq!(uri_escape("Az09-_.~"), "Az09-_.~");
        assert_eq!(uri_escape("kaga_(kc)"), "kaga_%28kc%29");
        assert_eq!(uri_escape("a b/é"), "a%20b%2F%C3%A9");
    }

    #[test]
    fn block_writes_respect_inline_flag() {
        let mut buf = Buffer::new(16, true);
        buf.append_block("<p>");
        buf.append("text");
        buf.append_block_html_escaped("<x>");
        assert_eq!(buf.as_str(), "text");
    }

    #[test]
    fn relative_url_gets_base() {
        let mut buf = Buffer::new(16, false);
        buf.append_relative_url("https://e621.net", "/posts/1");
        assert_eq!(buf.as_str(), "https://e621.net/posts/1");

        let mut buf = Buffer::new(16, false);
        buf.append_relative_url("https://e621.net", "https://x.com/");
        assert_eq!(buf.as_str(), "https://x.com/");

        let mut buf = Buffer::new(16, false);
        buf.append_relative_url("", "/posts/1");
        assert_eq!(buf.as_str(), "/posts/1");
    }
}
