//! Block and formatting emitters: headers, sections, code, colors.

use crate::element::Element;
use crate::error::DTextError;
use crate::links::sanitize_anchor;
use crate::scanner::Scanner;

impl Scanner<'_> {
    /// `h2#id. Title` opens `<h2 id="dtext-id">`. Header mode lasts until the
    /// header element is rewound.
    pub(crate) fn append_header(&mut self, level: u8, id: &str) -> Result<(), DTextError> {
        let Some(element) = Element::header(level) else {
            return Ok(());
        };
        self.close_leaf_blocks();

        let html = if id.is_empty() {
            format!("<h{level}>")
        } else {
            format!("<h{level} id=\"dtext-{}\">", sanitize_anchor(id))
        };
        self.open_element(element, &html)?;
        self.header_mode = true;
        Ok(())
    }

    /// `[section]`, `[section=Summary]`, `[section,expanded=Summary]`.
    pub(crate) fn append_section(&mut self, summary: &str, expanded: bool) -> Result<(), DTextError> {
        self.close_leaf_blocks();
        self.dstack.push(Element::Section)?;

        self.out.append_block(if expanded {
            "<details open>"
        } else {
            "<details>"
        });
        self.out.append_block("<summary>");
        self.out.append_block_html_escaped(summary);
        self.out.append_block("</summary><div>");
        Ok(())
    }

    /// A complete ```` ``` ```` fence. Nothing is pushed.
    pub(crate) fn append_code_fence(&mut self, body: &str, language: &str) {
        self.close_leaf_blocks();
        self.append_pre_open(language);
        self.out.append_html_escaped(body);
        self.out.append_block("</pre>");
    }

    /// `[code]` at a block boundary.
    pub(crate) fn append_block_code(&mut self, language: &str) -> Result<(), DTextError> {
        self.close_leaf_blocks();
        self.dstack.push(Element::Code)?;
        self.append_pre_open(language);
        Ok(())
    }

    /// `[code]` inside a line.
    pub(crate) fn append_inline_code(&mut self, language: &str) -> Result<(), DTextError> {
        self.dstack.push(Element::InlineCode)?;
        if language.is_empty() {
            self.out.append("<code>");
        } else {
            self.out.append("<code class=\"language-");
            self.out.append_html_escaped(language);
            self.out.append("\">");
        }
        Ok(())
    }

    /// `` `code` ``: a single-line span with nothing pushed.
    pub(crate) fn append_code_span(&mut self, body: &str) {
        self.out.append("<code>");
        self.out.append_html_escaped(body);
        self.out.append("</code>");
    }

    fn append_pre_open(&mut self, language: &str) {
        if language.is_empty() {
            self.out.append_block("<pre>");
        } else {
            self.out.append_block("<pre class=\"language-");
            self.out.append_block_html_escaped(language);
            self.out.append_block("\">");
        }
    }

    /// `[color=red]` / `[color=#ff0000]`. Consumed silently when colors are
    /// disabled.
    pub(crate) fn append_color(&mut self, value: &str) -> Result<(), DTextError> {
        if !self.options.allow_color {
            return Ok(());
        }
        self.dstack.push(Element::Color)?;

        if let Some(hex) = value.strip_prefix('#') {
            self.out.append("<span class=\"dtext-color\" style=\"color: #");
            self.out.append_uri_escaped(hex);
            self.out.append("\">");
        } else {
            self.out.append("<span class=\"dtext-color-");
            self.out.append_uri_escaped(&value.to_ascii_lowercase());
            self.out.append("\">");
        }
        Ok(())
    }

    pub(crate) fn append_hr(&mut self) {
        self.close_leaf_blocks();
        self.out.append_block("<hr>");
    }

    /// `[br]`: a real break, or escaped text inside a header.
    pub(crate) fn append_line_break(&mut self) {
        if self.header_mode {
            self.out.append_html_escaped("<br>");
        } else {
            self.out.append("<br>");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::options::DTextOptions;
    use crate::scanner::{Mode, Scanner};
    use pretty_assertions::assert_eq;

    #[test]
    fn header_with_id() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_header(2, "See Also").unwrap();
        assert!(s.header_mode);
        s.dstack_close_all();
        assert_eq!(s.out.as_str(), r#"<h2 id="dtext-see-also"></h2>"#);
        assert!(!s.header_mode);
    }

    #[test]
    fn expanded_section() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_section("<Spoilers>", true).unwrap();
        s.dstack_close_all();
        assert_eq!(
            s.out.as_str(),
            "<details open><summary>&lt;Spoilers&gt;</summary><div></div></details>"
        );
    }

    #[test]
    fn code_fence_escapes_body() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_code_fence("a < b", "rust");
        assert_eq!(s.out.as_str(), r#"<pre class="language-rust">a &lt; b</pre>"#);
    }

    #[test]
    fn colors() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_color("#zz z").unwrap();
        s.append_color("Red").unwrap();
        s.dstack_close_all();
        assert_eq!(
            s.out.as_str(),
            r#"<span class="dtext-color" style="color: #zz%20z"><span class="dtext-color-red"></span></span>"#
        );
    }

    #[test]
    fn colors_disabled() {
        let options = DTextOptions {
            allow_color: false,
            ..DTextOptions::default()
        };
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_color("red").unwrap();
        assert_eq!(s.out.as_str(), "");
        assert!(s.dstack.is_empty());
    }

    #[test]
    fn line_break_in_header_is_text() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_line_break();
        s.header_mode = true;
        s.append_line_break();
        assert_eq!(s.out.as_str(), "<br>&lt;br&gt;");
    }
}
