//! The scanner: a byte-driven state machine over the normalized input.
//!
//! Each lexical mode is a `step_*` method that looks at the byte under `p`,
//! consumes a token and drives the emitters. Entering a nested mode pushes
//! the current one onto `modes`; returning pops it (an empty stack resumes
//! the mode the scan started in). Every step either consumes input or hands control to a
//! mode that will, so the loop in [`Scanner::run`] always terminates.

use crate::buffer::Buffer;
use crate::dstack::Dstack;
use crate::element::Element;
use crate::entities::match_entity;
use crate::error::DTextError;
use crate::html::filter_attributes;
use crate::links::match_id_link;
use crate::normalize::SENTINEL;
use crate::options::DTextOptions;
use crate::parse::ParseResult;
use crate::lookahead::{Lookahead, Stop};
use crate::tags::{Tag, TagName, lex_tag, starts_with_ignore_case};
use crate::MAX_STACK_DEPTH;
use std::collections::HashSet;

/// Lexical modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Block boundaries.
    Main,
    /// The body of a paragraph, header, list item or table cell.
    Inline,
    /// Link titles: emphasis only.
    BasicInline,
    /// Everything up to `[/code]` is escaped text.
    Code,
    /// Everything up to `[/nodtext]` is escaped text.
    NoDText,
    /// Table structure between cells.
    Table,
}

/// A construct that can only start at a block boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockStart<'a> {
    Header { level: u8, id: &'a str },
    Fence { language: &'a str, body: &'a str },
    Hr,
    ListItem { depth: usize },
    Quote,
    Spoiler,
    Section { summary: &'a str, expanded: bool },
    Code { language: &'a str },
    NoDText,
    Table,
    Tn,
    /// `[/quote]`, `[/spoiler]`, `[/section]`, `[/tn]`.
    Close(Element),
}

/// Bytes that end a plain-text run in inline mode.
fn is_inline_special(b: u8) -> bool {
    matches!(
        b,
        b'\n' | b'&' | b'<' | b'[' | b'{' | b'"' | b'@' | b'`' | SENTINEL
    ) || b.is_ascii_alphanumeric()
}

/// Bytes after which `@name` is a mention.
fn is_mention_boundary(b: u8) -> bool {
    matches!(
        b,
        SENTINEL
            | b'\r'
            | b'\n'
            | b' '
            | b'/'
            | b'"'
            | b'\''
            | b'('
            | b')'
            | b'['
            | b']'
            | b'{'
            | b'}'
    )
}

/// Length of the user name at the start of `s`, trailing punctuation
/// excluded.
fn mention_name_len(s: &str) -> Option<usize> {
    let first = s.chars().next()?;
    if first.is_ascii_punctuation() || first.is_whitespace() || first == '\0' {
        return None;
    }

    let mut len = s
        .char_indices()
        .find(|&(_, c)| c.is_whitespace() || matches!(c, '\0' | '[' | ']' | '<' | '>' | '{' | '}' | '"'))
        .map_or(s.len(), |(i, _)| i);

    let bytes = s.as_bytes();
    while len > 0 && bytes[len - 1].is_ascii_punctuation() {
        len -= 1;
    }
    (len > 0).then_some(len)
}

pub(crate) struct Scanner<'a> {
    /// Normalized input, `NUL text NUL`.
    pub(crate) src: &'a str,
    pub(crate) bytes: &'a [u8],
    pub(crate) p: usize,
    /// Index of the trailing sentinel.
    pub(crate) pe: usize,
    pub(crate) mode: Mode,
    pub(crate) modes: Vec<Mode>,
    /// The mode `ret` falls back to once `modes` is empty.
    base_mode: Mode,
    pub(crate) options: &'a DTextOptions,
    pub(crate) out: Buffer,
    pub(crate) dstack: Dstack,
    pub(crate) header_mode: bool,
    lookahead: Lookahead,
    pub(crate) wiki_pages: Vec<String>,
    pub(crate) wiki_seen: HashSet<String>,
    pub(crate) posts: Vec<i64>,
    pub(crate) mentions: Vec<String>,
}

impl<'a> Scanner<'a> {
    /// `src` must come from [`crate::normalize::normalize`].
    pub(crate) fn new(src: &'a str, options: &'a DTextOptions, mode: Mode) -> Self {
        let capacity = src.len() + src.len() / 2;
        Scanner {
            src,
            bytes: src.as_bytes(),
            p: 1.min(src.len()),
            pe: src.len().saturating_sub(1),
            mode,
            modes: Vec::new(),
            base_mode: mode,
            options,
            out: Buffer::new(capacity, options.f_inline),
            dstack: Dstack::default(),
            header_mode: false,
            lookahead: Lookahead::default(),
            wiki_pages: Vec::new(),
            wiki_seen: HashSet::new(),
            posts: Vec::new(),
            mentions: Vec::new(),
        }
    }

    /// Scan to the end of input and close everything still open.
    pub(crate) fn run(mut self) -> Result<ParseResult, DTextError> {
        while self.p < self.pe {
            match self.mode {
                Mode::Main => self.step_main()?,
                Mode::Inline => self.step_inline()?,
                Mode::BasicInline => self.step_basic_inline()?,
                Mode::Code => self.step_verbatim(b"code", Element::Code, Element::InlineCode),
                Mode::NoDText => {
                    self.step_verbatim(b"nodtext", Element::NoDText, Element::InlineNoDText)
                }
                Mode::Table => self.step_table()?,
            }
        }
        self.dstack_close_all();

        Ok(ParseResult {
            html: self.out.into_string(),
            wiki_pages: self.wiki_pages,
            posts: self.posts,
            mentions: self.mentions,
        })
    }

    // ------------------------------------------------------------------
    // Mode stack
    // ------------------------------------------------------------------

    pub(crate) fn call(&mut self, mode: Mode) -> Result<(), DTextError> {
        if self.modes.len() >= MAX_STACK_DEPTH {
            return Err(DTextError::too_deep());
        }
        tracing::debug!(from = ?self.mode, to = ?mode, p = self.p, "call");
        self.modes.push(self.mode);
        self.mode = mode;
        Ok(())
    }

    /// False at the outermost level of an inline-only scan, where block
    /// constructs have nowhere to return to.
    fn can_leave_inline(&self) -> bool {
        !self.modes.is_empty() || self.base_mode != Mode::Inline
    }

    pub(crate) fn ret(&mut self) {
        let mode = self.modes.pop().unwrap_or(self.base_mode);
        tracing::debug!(from = ?self.mode, to = ?mode, p = self.p, "return");
        self.mode = mode;
    }

    // ------------------------------------------------------------------
    // Byte helpers
    // ------------------------------------------------------------------

    /// The byte at `i`, or the sentinel past the end.
    fn at(&self, i: usize) -> u8 {
        self.bytes.get(i).copied().unwrap_or(SENTINEL)
    }

    fn prev_is_alnum(&self, p: usize) -> bool {
        p > 0 && self.bytes[p - 1].is_ascii_alphanumeric()
    }

    fn skip_horizontal_space(&self, mut p: usize) -> usize {
        while matches!(self.at(p), b' ' | b'\t') {
            p += 1;
        }
        p
    }

    fn skip_whitespace(&self, mut p: usize) -> usize {
        while matches!(self.at(p), b' ' | b'\t' | b'\r' | b'\n') {
            p += 1;
        }
        p
    }

    /// True if only horizontal whitespace separates `p` from a newline or
    /// the end of input.
    fn at_line_end(&self, p: usize) -> bool {
        matches!(self.at(self.skip_horizontal_space(p)), b'\n' | b'\r' | SENTINEL)
    }

    fn count_while(&self, start: usize, pred: impl Fn(u8) -> bool) -> usize {
        self.bytes[start.min(self.bytes.len())..]
            .iter()
            .take_while(|&&b| pred(b))
            .count()
    }

    // ------------------------------------------------------------------
    // Block starts (shared by Main and the Inline newline lookahead)
    // ------------------------------------------------------------------

    /// Recognize a block construct at the start of a line. Leading
    /// horizontal whitespace is skipped. Returns the construct and the
    /// offset where its content starts.
    fn match_block_start(&self, start: usize) -> Option<(BlockStart<'a>, usize)> {
        let p = self.skip_horizontal_space(start);

        if let Some(found) = self.match_header(p) {
            return Some(found);
        }
        if let Some(found) = self.match_fence(p) {
            return Some(found);
        }

        if self.at(p) == b'*' {
            let stars = self.count_while(p, |b| b == b'*');
            let after = p + stars;
            if stars >= 3 && self.at_line_end(after) {
                return Some((BlockStart::Hr, self.skip_horizontal_space(after)));
            }
            if matches!(self.at(after), b' ' | b'\t') {
                let text = self.skip_horizontal_space(after);
                if !matches!(self.at(text), b'\n' | b'\r' | SENTINEL) {
                    return Some((BlockStart::ListItem { depth: stars }, text));
                }
            }
            return None;
        }

        if matches!(self.at(p), b'[' | b'<') {
            let tag = lex_tag(self.src, p, &self.lookahead)?;
            return self.match_block_tag(&tag);
        }

        None
    }

    /// `h1.` … `h6.`, with an optional `#anchor` before the dot.
    fn match_header(&self, p: usize) -> Option<(BlockStart<'a>, usize)> {
        if !matches!(self.at(p), b'h' | b'H') || !(b'1'..=b'6').contains(&self.at(p + 1)) {
            return None;
        }
        let level = self.at(p + 1) - b'0';
        let mut q = p + 2;
        let mut id = "";

        if self.at(q) == b'#' {
            let len = self.count_while(q + 1, |b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
            if len == 0 {
                return None;
            }
            id = &self.src[q + 1..q + 1 + len];
            q += 1 + len;
        }
        if self.at(q) != b'.' {
            return None;
        }
        let content = self.skip_horizontal_space(q + 1);
        Some((BlockStart::Header { level, id }, content))
    }

    /// ```` ```lang ```` … ```` ``` ````, the closing fence alone on its line.
    fn match_fence(&self, p: usize) -> Option<(BlockStart<'a>, usize)> {
        if !self.bytes[p..].starts_with(b"```") {
            return None;
        }
        let lang_start = p + 3;
        let lang_len = self.count_while(lang_start, |b| {
            b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+' | b'#' | b'.')
        });
        let language = &self.src[lang_start..lang_start + lang_len];
        let eol = self.skip_horizontal_space(lang_start + lang_len);
        if self.at(eol) != b'\n' {
            return None;
        }

        let body_start = eol + 1;
        let line = self.lookahead.find(self.bytes, body_start, Stop::Fence);
        if self.at(line) != b'`' {
            return None;
        }
        let body = if line == body_start {
            ""
        } else {
            &self.src[body_start..line - 1]
        };
        let end = self.skip_horizontal_space(line + 3);
        Some((BlockStart::Fence { language, body }, end))
    }

    fn match_block_tag(&self, tag: &Tag<'a>) -> Option<(BlockStart<'a>, usize)> {
        let name = TagName::classify(tag)?;

        if tag.closing {
            let element = match name {
                TagName::Quote => Element::Quote,
                TagName::Spoiler => Element::Spoiler,
                TagName::Section => Element::Section,
                TagName::Tn => Element::TnBlock,
                _ => return None,
            };
            return Some((BlockStart::Close(element), tag.end));
        }

        let value = tag.value.unwrap_or("");
        let found = match name {
            TagName::Quote => (BlockStart::Quote, self.skip_whitespace(tag.end)),
            TagName::Spoiler => (BlockStart::Spoiler, self.skip_whitespace(tag.end)),
            TagName::Section | TagName::SectionExpanded => (
                BlockStart::Section {
                    summary: value,
                    expanded: name == TagName::SectionExpanded,
                },
                self.skip_whitespace(tag.end),
            ),
            TagName::Code => (
                BlockStart::Code { language: value },
                self.skip_one_newline(tag.end),
            ),
            TagName::NoDText => (BlockStart::NoDText, self.skip_one_newline(tag.end)),
            TagName::Table => (BlockStart::Table, self.skip_whitespace(tag.end)),
            TagName::Tn => (BlockStart::Tn, self.skip_horizontal_space(tag.end)),
            TagName::Hr if self.at_line_end(tag.end) => {
                (BlockStart::Hr, self.skip_horizontal_space(tag.end))
            }
            _ => return None,
        };
        Some(found)
    }

    fn skip_one_newline(&self, p: usize) -> usize {
        let p = self.skip_horizontal_space(p);
        if self.at(p) == b'\n' { p + 1 } else { p }
    }

    // ------------------------------------------------------------------
    // Main
    // ------------------------------------------------------------------

    fn step_main(&mut self) -> Result<(), DTextError> {
        self.p = self.skip_whitespace(self.p);
        if self.p >= self.pe {
            return Ok(());
        }

        match self.match_block_start(self.p) {
            Some((start, end)) => self.start_block(start, end),
            None => self.start_paragraph(),
        }
    }

    fn start_block(&mut self, start: BlockStart<'a>, end: usize) -> Result<(), DTextError> {
        tracing::trace!(?start, p = self.p, "block");
        match start {
            BlockStart::Header { level, id } => {
                self.append_header(level, id)?;
                self.p = end;
                self.call(Mode::Inline)?;
            }
            BlockStart::Fence { language, body } => {
                self.append_code_fence(body, language);
                self.p = end;
            }
            BlockStart::Hr => {
                self.append_hr();
                self.p = end;
            }
            BlockStart::ListItem { depth } => {
                self.dstack_open_list(depth)?;
                self.p = end;
                self.call(Mode::Inline)?;
            }
            BlockStart::Quote => {
                self.close_leaf_blocks();
                self.open_element(Element::Quote, "<blockquote>")?;
                self.p = end;
            }
            BlockStart::Spoiler => {
                self.close_leaf_blocks();
                self.open_element(Element::Spoiler, "<div class=\"spoiler\">")?;
                self.p = end;
            }
            BlockStart::Section { summary, expanded } => {
                self.append_section(summary, expanded)?;
                self.p = end;
            }
            BlockStart::Code { language } => {
                self.append_block_code(language)?;
                self.p = end;
                self.call(Mode::Code)?;
            }
            BlockStart::NoDText => {
                self.close_leaf_blocks();
                self.open_element(Element::NoDText, "<p>")?;
                self.p = end;
                self.call(Mode::NoDText)?;
            }
            BlockStart::Table => {
                self.close_leaf_blocks();
                self.open_element(Element::Table, "<table class=\"striped\">")?;
                self.p = end;
                self.call(Mode::Table)?;
            }
            BlockStart::Tn => {
                self.close_leaf_blocks();
                self.open_element(Element::TnBlock, "<p class=\"tn\">")?;
                self.p = end;
                self.call(Mode::Inline)?;
            }
            BlockStart::Close(element) => {
                if !self.dstack.is_open(element) {
                    return self.start_paragraph();
                }
                self.dstack_close_until(element);
                self.p = end;
            }
        }
        Ok(())
    }

    fn start_paragraph(&mut self) -> Result<(), DTextError> {
        let needs_paragraph = matches!(
            self.dstack.peek(),
            None | Some(Element::Quote | Element::Spoiler | Element::Section)
        );
        if needs_paragraph {
            self.open_element(Element::Paragraph, "<p>")?;
        }
        self.call(Mode::Inline)
    }

    // ------------------------------------------------------------------
    // Inline
    // ------------------------------------------------------------------

    fn step_inline(&mut self) -> Result<(), DTextError> {
        match self.at(self.p) {
            b'\n' => self.inline_newline(),
            b'&' => {
                self.append_entity();
                Ok(())
            }
            b'<' => self.inline_angle(),
            b'[' => self.inline_bracket(),
            b'{' => {
                if !self.try_search_link(self.p, self.p) {
                    self.append_literal(1);
                }
                Ok(())
            }
            b'"' => self.inline_named_link(),
            b'@' => {
                self.inline_mention();
                Ok(())
            }
            b'`' => {
                self.inline_code_span();
                Ok(())
            }
            b if b.is_ascii_alphanumeric() => self.inline_word(),
            _ => {
                self.append_text_run(is_inline_special);
                Ok(())
            }
        }
    }

    /// Escape `len` bytes at `p` as text.
    fn append_literal(&mut self, len: usize) {
        let end = (self.p + len).min(self.pe);
        self.out.append_html_escaped(&self.src[self.p..end]);
        self.p = end;
    }

    /// Escape everything up to the next byte `stop` accepts (at least one
    /// byte).
    fn append_text_run(&mut self, stop: fn(u8) -> bool) {
        let start = self.p;
        let mut end = start + 1;
        while end < self.pe && !stop(self.bytes[end]) {
            end += 1;
        }
        self.out.append_html_escaped(&self.src[start..end]);
        self.p = end;
    }

    fn append_entity(&mut self) {
        match match_entity(&self.bytes[self.p..]) {
            Some(len) => {
                self.out.append(&self.src[self.p..self.p + len]);
                self.p += len;
            }
            None => {
                self.out.append("&amp;");
                self.p += 1;
            }
        }
    }

    fn inline_newline(&mut self) -> Result<(), DTextError> {
        let p = self.p;

        let mut q = p + 1;
        while matches!(self.at(q), b' ' | b'\t' | b'\r') {
            q += 1;
        }
        if !self.can_leave_inline() {
            if q >= self.pe {
                self.p = self.pe;
            } else {
                self.out.append("<br>");
                self.p = p + 1;
            }
            return Ok(());
        }

        // Blank line, or only whitespace to the end of input.
        if self.at(q) == b'\n' || q >= self.pe {
            self.p = self.skip_whitespace(q);
            self.close_leaf_blocks();
            self.ret();
            return Ok(());
        }

        if self.header_mode {
            self.p = p + 1;
            self.close_leaf_blocks();
            self.ret();
            return Ok(());
        }

        if let Some((start, _)) = self.match_block_start(p + 1) {
            match start {
                BlockStart::ListItem { .. } if self.dstack.is_open(Element::Ul) => {
                    self.p = p + 1;
                    self.ret();
                    return Ok(());
                }
                BlockStart::Close(element) if !self.dstack.is_open(element) => {}
                BlockStart::Close(_) => {
                    self.p = self.skip_horizontal_space(p + 1);
                    return Ok(());
                }
                _ => {
                    self.close_leaf_blocks();
                    self.p = p + 1;
                    self.ret();
                    return Ok(());
                }
            }
        }

        if self.in_table_cell() && self.table_tag_follows(p + 1) {
            self.p = p + 1;
            return Ok(());
        }

        if self.dstack.is_open(Element::Ul) {
            self.dstack_close_list();
            self.p = p + 1;
            self.ret();
            return Ok(());
        }

        self.out.append("<br>");
        self.p = p + 1;
        Ok(())
    }

    fn in_table_cell(&self) -> bool {
        self.dstack
            .innermost_of(&[Element::Td, Element::Th])
            .is_some()
    }

    fn table_tag_follows(&self, p: usize) -> bool {
        let p = self.skip_horizontal_space(p);
        lex_tag(self.src, p, &self.lookahead)
            .and_then(|tag| TagName::classify(&tag))
            .is_some_and(TagName::is_table_structure)
    }

    fn inline_angle(&mut self) -> Result<(), DTextError> {
        let p = self.p;

        // <@name>
        if self.at(p + 1) == b'@' && self.options.f_mentions {
            let name_start = p + 2;
            let len = self.count_while(name_start, |b| {
                !matches!(b, b'>' | b'<' | b' ' | b'\t' | b'\n' | b'\r' | SENTINEL)
            });
            if len > 0 && self.at(name_start + len) == b'>' {
                let name = &self.src[name_start..name_start + len];
                self.append_mention(name);
                self.p = name_start + len + 1;
                return Ok(());
            }
        }

        // <https://...>
        let rest = &self.bytes[p + 1..];
        if starts_with_ignore_case(rest, b"http://") || starts_with_ignore_case(rest, b"https://") {
            let url_start = p + 1;
            let len = self.count_while(url_start, |b| {
                !matches!(b, b'>' | b'<' | b' ' | b'\t' | b'\n' | b'\r' | SENTINEL)
            });
            if self.at(url_start + len) == b'>' {
                let url = &self.src[url_start..url_start + len];
                self.append_unnamed_url(url);
                self.p = url_start + len + 1;
                return Ok(());
            }
        }

        if let Some(tag) = lex_tag(self.src, p, &self.lookahead) {
            if self.inline_tag(&tag)? {
                return Ok(());
            }
        }

        self.append_literal(1);
        Ok(())
    }

    fn inline_bracket(&mut self) -> Result<(), DTextError> {
        let p = self.p;
        if self.at(p + 1) == b'[' && self.try_wiki_link(p, p) {
            return Ok(());
        }
        if let Some(tag) = lex_tag(self.src, p, &self.lookahead) {
            if self.inline_tag(&tag)? {
                return Ok(());
            }
        }
        if self.try_markdown_link()? {
            return Ok(());
        }
        self.append_literal(1);
        Ok(())
    }

    /// Handle a lexed tag in inline mode. Returns `false` if the tag means
    /// nothing here and its first byte should be literal text.
    fn inline_tag(&mut self, tag: &Tag<'a>) -> Result<bool, DTextError> {
        let Some(name) = TagName::classify(tag) else {
            return Ok(false);
        };
        let literal = &self.src[tag.start..tag.end];

        if name.is_table_structure() {
            if let Some(cell) = self.dstack.innermost_of(&[Element::Td, Element::Th]) {
                let closes_cell = tag.closing
                    && matches!(
                        (name, cell),
                        (TagName::Td, Element::Td) | (TagName::Th, Element::Th)
                    );
                self.dstack_close_until(cell);
                if closes_cell {
                    self.p = tag.end;
                }
                self.ret();
                return Ok(true);
            }
            if name == TagName::Table && !tag.closing && self.can_leave_inline() {
                self.close_leaf_blocks();
                self.ret();
                return Ok(true);
            }
            return Ok(false);
        }

        let formatting = match name {
            TagName::B => Some((Element::B, "<strong>")),
            TagName::I => Some((Element::I, "<em>")),
            TagName::U => Some((Element::U, "<u>")),
            TagName::S => Some((Element::S, "<s>")),
            TagName::Sup => Some((Element::Sup, "<sup>")),
            TagName::Sub => Some((Element::Sub, "<sub>")),
            _ => None,
        };
        if let Some((element, html)) = formatting {
            if tag.closing {
                self.close_element(element, literal);
            } else {
                self.open_element(element, html)?;
            }
            self.p = tag.end;
            return Ok(true);
        }

        match (name, tag.closing) {
            (TagName::Quote | TagName::Section | TagName::SectionExpanded, false) => {
                if !self.can_leave_inline() {
                    return Ok(false);
                }
                self.close_leaf_blocks();
                self.ret();
            }
            (TagName::Quote, true) => return Ok(self.close_container(Element::Quote, tag.end)),
            (TagName::Section, true) => {
                return Ok(self.close_container(Element::Section, tag.end));
            }
            (TagName::Spoiler, false) => {
                self.open_element(Element::InlineSpoiler, "<span class=\"spoiler\">")?;
                self.p = tag.end;
            }
            (TagName::Spoiler, true) => {
                return Ok(self.close_inline_or_container(
                    Element::InlineSpoiler,
                    Element::Spoiler,
                    tag.end,
                ));
            }
            (TagName::Tn, false) => {
                self.open_element(Element::Tn, "<span class=\"tn\">")?;
                self.p = tag.end;
            }
            (TagName::Tn, true) => {
                return Ok(self.close_inline_or_container(Element::Tn, Element::TnBlock, tag.end));
            }
            (TagName::Code, false) => {
                self.append_inline_code(tag.value.unwrap_or(""))?;
                self.p = tag.end;
                self.call(Mode::Code)?;
            }
            (TagName::NoDText, false) => {
                self.open_element(Element::InlineNoDText, "")?;
                self.p = tag.end;
                self.call(Mode::NoDText)?;
            }
            (TagName::Br, false) => {
                self.append_line_break();
                self.p = tag.end;
            }
            (TagName::Color, false) => match tag.value {
                Some(value) if !value.is_empty() => {
                    self.append_color(value)?;
                    self.p = tag.end;
                }
                _ => return Ok(false),
            },
            (TagName::Color, true) => {
                if self.options.allow_color {
                    self.close_element(Element::Color, literal);
                }
                self.p = tag.end;
            }
            (TagName::Url, false) => return self.inline_url_tag(tag),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// `[/quote]` or `[/section]` in inline mode.
    fn close_container(&mut self, element: Element, end: usize) -> bool {
        if !self.dstack.is_open(element) {
            return false;
        }
        self.dstack_close_until(element);
        self.p = end;
        self.ret();
        true
    }

    /// `[/spoiler]` and `[/tn]` close the inline variant when one is open,
    /// otherwise the block.
    fn close_inline_or_container(&mut self, inline: Element, block: Element, end: usize) -> bool {
        if self.dstack.is_open(inline) {
            self.dstack_close_until(inline);
            self.p = end;
            true
        } else {
            self.close_container(block, end)
        }
    }

    /// `[url]https://...[/url]` and `[url=https://...]title[/url]`.
    fn inline_url_tag(&mut self, tag: &Tag<'a>) -> Result<bool, DTextError> {
        let body_start = tag.end;
        let Some(close) = self.lookahead.find_url_close(self.bytes, body_start) else {
            return Ok(false);
        };
        let body = self.src[body_start..close].trim();

        match tag.value.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) if body.is_empty() => self.append_unnamed_url(url),
            Some(url) => self.append_named_url(url, body)?,
            None if body.is_empty() => return Ok(false),
            None => self.append_unnamed_url(body),
        }
        self.p = close + b"[/url]".len();
        Ok(true)
    }

    /// `[title](url)`
    fn try_markdown_link(&mut self) -> Result<bool, DTextError> {
        let title_start = self.p + 1;
        let title_len = self.count_while(title_start, |b| !matches!(b, b'[' | b']' | b'\n' | SENTINEL));
        let close = title_start + title_len;
        if title_len == 0 || self.at(close) != b']' || self.at(close + 1) != b'(' {
            return Ok(false);
        }

        let url_start = close + 2;
        let url_end = self.lookahead.find(self.bytes, url_start, Stop::Paren);
        if url_end == url_start || self.at(url_end) != b')' {
            return Ok(false);
        }

        let title = &self.src[title_start..close];
        let url = &self.src[url_start..url_end];
        self.append_named_url(url, title)?;
        self.p = url_end + 1;
        Ok(true)
    }

    /// `prefix[[tag#anchor|title]]suffix`, with `[[` at `open`.
    fn try_wiki_link(&mut self, prefix_start: usize, open: usize) -> bool {
        let content_start = open + 2;
        let len = self.count_while(content_start, |b| !matches!(b, b'[' | b']' | b'\n' | SENTINEL));
        let close = content_start + len;
        if len == 0 || self.at(close) != b']' || self.at(close + 1) != b']' {
            return false;
        }

        let content = &self.src[content_start..close];
        let (target, title) = match content.split_once('|') {
            Some((target, title)) => (target, Some(title.trim())),
            None => (content, None),
        };
        let (tag, anchor) = match target.split_once('#') {
            Some((tag, anchor)) => (tag.trim(), anchor.trim()),
            None => (target.trim(), ""),
        };

        let suffix_start = close + 2;
        let suffix_end = suffix_start + self.count_while(suffix_start, |b| b.is_ascii_alphanumeric());
        let prefix = &self.src[prefix_start..open];
        let suffix = &self.src[suffix_start..suffix_end];

        if tag.is_empty() {
            if anchor.is_empty() {
                return false;
            }
            self.append_internal_anchor_link(prefix, anchor, title, suffix);
        } else {
            self.append_wiki_link(prefix, tag, anchor, title, suffix);
        }
        self.p = suffix_end;
        true
    }

    /// `prefix{{search|title}}suffix`, with `{{` at `open`.
    fn try_search_link(&mut self, prefix_start: usize, open: usize) -> bool {
        if self.at(open + 1) != b'{' {
            return false;
        }
        let content_start = open + 2;
        let len = self.count_while(content_start, |b| !matches!(b, b'{' | b'}' | b'\n' | SENTINEL));
        let close = content_start + len;
        if len == 0 || self.at(close) != b'}' || self.at(close + 1) != b'}' {
            return false;
        }

        let content = &self.src[content_start..close];
        let (search, title) = match content.split_once('|') {
            Some((search, title)) => (search.trim(), Some(title.trim())),
            None => (content.trim(), None),
        };
        if search.is_empty() {
            return false;
        }

        let suffix_start = close + 2;
        let suffix_end = suffix_start + self.count_while(suffix_start, |b| b.is_ascii_alphanumeric());
        let prefix = &self.src[prefix_start..open];
        let suffix = &self.src[suffix_start..suffix_end];

        self.append_post_search_link(prefix, search, title, suffix);
        self.p = suffix_end;
        true
    }

    /// `"title":url` and `"title":[url]`.
    fn inline_named_link(&mut self) -> Result<(), DTextError> {
        let title_start = self.p + 1;
        let title_len = self.count_while(title_start, |b| !matches!(b, b'"' | b'\n' | SENTINEL));
        let close = title_start + title_len;

        if title_len > 0 && self.at(close) == b'"' && self.at(close + 1) == b':' {
            let title = &self.src[title_start..close];
            let url_start = close + 2;

            if self.at(url_start) == b'[' {
                let url_end = self.lookahead.find(self.bytes, url_start + 1, Stop::Bracket);
                if url_end > url_start + 1 && self.at(url_end) == b']' {
                    let url = &self.src[url_start + 1..url_end];
                    self.append_named_url(url, title)?;
                    self.p = url_end + 1;
                    return Ok(());
                }
            } else if let Some(end) = self.match_url(url_start, true) {
                let url = &self.src[url_start..end];
                self.append_bare_named_url(url, title)?;
                self.p = end;
                return Ok(());
            }
        }

        self.out.append("&quot;");
        self.p += 1;
        Ok(())
    }

    /// End of a bare URL starting at `start`. `http://` / `https://` always
    /// qualify; site-relative `/` and `#` only after `"title":`.
    fn match_url(&self, start: usize, allow_relative: bool) -> Option<usize> {
        let rest = &self.bytes[start..];
        let scheme_len = if starts_with_ignore_case(rest, b"https://") {
            8
        } else if starts_with_ignore_case(rest, b"http://") {
            7
        } else if allow_relative && matches!(self.at(start), b'/' | b'#') {
            0
        } else {
            return None;
        };

        let mut end = start;
        while end < self.pe {
            let b = self.bytes[end];
            if b.is_ascii_whitespace() || matches!(b, b'<' | b'>' | b'"') {
                break;
            }
            if b == b'[' && self.at(end + 1) == b'/' {
                break;
            }
            end += 1;
        }
        while end > start + scheme_len
            && matches!(self.bytes[end - 1], b'.' | b',' | b':' | b';' | b'!' | b'?' | b'\'')
        {
            end -= 1;
        }

        (end > start + scheme_len).then_some(end)
    }

    fn inline_mention(&mut self) {
        let p = self.p;
        if self.options.f_mentions && is_mention_boundary(self.at(p - 1)) {
            if let Some(len) = mention_name_len(&self.src[p + 1..]) {
                let name = &self.src[p + 1..p + 1 + len];
                self.append_mention(name);
                self.p = p + 1 + len;
                return;
            }
        }
        self.append_literal(1);
    }

    /// `` `code` `` on a single line.
    fn inline_code_span(&mut self) {
        let start = self.p + 1;
        let len = self.count_while(start, |b| !matches!(b, b'`' | b'\n' | SENTINEL));
        if len > 0 && self.at(start + len) == b'`' {
            let body = &self.src[start..start + len];
            self.append_code_span(body);
            self.p = start + len + 1;
        } else {
            self.append_literal(1);
        }
    }

    /// An alphanumeric run: id-links, bare URLs and link prefixes only start
    /// at a word boundary.
    fn inline_word(&mut self) -> Result<(), DTextError> {
        let p = self.p;
        let boundary = !self.prev_is_alnum(p);

        if boundary {
            if let Some(m) = match_id_link(self.src, p) {
                tracing::trace!(kind = m.link.kind, id = m.id, "id link");
                match (m.page, m.key) {
                    (Some(page), _) => self.append_paged_link(m.link, m.id, page),
                    (_, Some(key)) => self.append_dmail_key_link(m.link, m.id, key),
                    _ if m.link.kind == "post" => self.append_post_link(m.link, m.id),
                    _ => self.append_id_link(m.link, m.id),
                }
                self.p = m.end;
                return Ok(());
            }
            if let Some(end) = self.match_url(p, false) {
                let url = &self.src[p..end];
                self.append_bare_unnamed_url(url);
                self.p = end;
                return Ok(());
            }
        }

        let end = p + self.count_while(p, |b| b.is_ascii_alphanumeric());
        if boundary {
            if self.at(end) == b'[' && self.at(end + 1) == b'[' && self.try_wiki_link(p, end) {
                return Ok(());
            }
            if self.at(end) == b'{' && self.try_search_link(p, end) {
                return Ok(());
            }
        }

        self.out.append(&self.src[p..end]);
        self.p = end;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Basic inline
    // ------------------------------------------------------------------

    fn step_basic_inline(&mut self) -> Result<(), DTextError> {
        match self.at(self.p) {
            b'\n' => {
                self.out.append("<br>");
                self.p += 1;
            }
            b'&' => self.append_entity(),
            b'[' | b'<' => {
                if !self.basic_inline_tag()? {
                    self.append_literal(1);
                }
            }
            _ => self.append_text_run(|b| matches!(b, b'\n' | b'&' | b'[' | b'<' | SENTINEL)),
        }
        Ok(())
    }

    fn basic_inline_tag(&mut self) -> Result<bool, DTextError> {
        let Some(tag) = lex_tag(self.src, self.p, &self.lookahead) else {
            return Ok(false);
        };
        let (element, html) = match TagName::classify(&tag) {
            Some(TagName::B) => (Element::B, "<strong>"),
            Some(TagName::I) => (Element::I, "<em>"),
            Some(TagName::U) => (Element::U, "<u>"),
            Some(TagName::S) => (Element::S, "<s>"),
            Some(TagName::Sup) => (Element::Sup, "<sup>"),
            Some(TagName::Sub) => (Element::Sub, "<sub>"),
            _ => return Ok(false),
        };

        if tag.closing {
            let literal = &self.src[tag.start..tag.end];
            self.close_element(element, literal);
        } else {
            self.open_element(element, html)?;
        }
        self.p = tag.end;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Code / NoDText
    // ------------------------------------------------------------------

    /// Length of `[/name]` or `</name>` at `p`, if present.
    fn verbatim_terminator(&self, p: usize, name: &[u8]) -> Option<usize> {
        let rest = &self.bytes[p.min(self.bytes.len())..];
        let open = *rest.first()?;
        let close = match open {
            b'[' => b']',
            b'<' => b'>',
            _ => return None,
        };
        let len = name.len() + 3;
        let matches = rest.len() >= len
            && rest[1] == b'/'
            && rest[2..2 + name.len()].eq_ignore_ascii_case(name)
            && rest[2 + name.len()] == close;
        matches.then_some(len)
    }

    fn step_verbatim(&mut self, name: &[u8], block: Element, inline: Element) {
        let p = self.p;
        let element_open = self.dstack.check(block) || self.dstack.check(inline);
        if !element_open {
            self.ret();
            return;
        }

        match self.at(p) {
            b'\n' => {
                if self.verbatim_terminator(p + 1, name).is_none() {
                    self.out.append("\n");
                }
                self.p = p + 1;
            }
            b'[' | b'<' => match self.verbatim_terminator(p, name) {
                Some(len) => {
                    self.rewind();
                    self.p = p + len;
                    self.ret();
                }
                None => self.append_literal(1),
            },
            _ => self.append_text_run(|b| matches!(b, b'\n' | b'[' | b'<' | SENTINEL)),
        }
    }

    // ------------------------------------------------------------------
    // Table
    // ------------------------------------------------------------------

    fn step_table(&mut self) -> Result<(), DTextError> {
        if !self.dstack.is_open(Element::Table) {
            self.ret();
            return Ok(());
        }

        self.p = self.skip_whitespace(self.p);
        if self.p >= self.pe {
            return Ok(());
        }

        if matches!(self.at(self.p), b'[' | b'<') {
            if let Some(tag) = lex_tag(self.src, self.p, &self.lookahead) {
                if self.table_tag(&tag)? {
                    return Ok(());
                }
            }
            self.append_literal(1);
            return Ok(());
        }

        self.append_text_run(|b| b.is_ascii_whitespace() || matches!(b, b'[' | b'<' | SENTINEL));
        Ok(())
    }

    fn table_tag(&mut self, tag: &Tag<'a>) -> Result<bool, DTextError> {
        let (element, html_name) = match TagName::classify(tag) {
            Some(TagName::Thead) => (Element::Thead, "thead"),
            Some(TagName::Tbody) => (Element::Tbody, "tbody"),
            Some(TagName::Tr) => (Element::Tr, "tr"),
            Some(TagName::Th) => (Element::Th, "th"),
            Some(TagName::Td) => (Element::Td, "td"),
            Some(TagName::Col) => (Element::Col, "col"),
            Some(TagName::ColGroup) => (Element::ColGroup, "colgroup"),
            Some(TagName::Table) if tag.closing => {
                self.dstack_close_until(Element::Table);
                self.p = tag.end;
                self.ret();
                return Ok(true);
            }
            _ => return Ok(false),
        };

        if tag.closing {
            let literal = &self.src[tag.start..tag.end];
            self.close_element(element, literal);
            self.p = tag.end;
            return Ok(true);
        }

        // A new row or section ends the one still open.
        let enclosing: &[Element] = match element {
            Element::Tr => &[Element::Tr, Element::Table],
            Element::Thead | Element::Tbody => {
                &[Element::Tr, Element::Thead, Element::Tbody, Element::Table]
            }
            _ => &[],
        };
        while let Some(open @ (Element::Tr | Element::Thead | Element::Tbody)) =
            self.dstack.innermost_of(enclosing)
        {
            self.dstack_close_until(open);
        }

        let attributes = filter_attributes(html_name, &tag.attrs);
        self.open_element_attributes(element, html_name, &attributes)?;
        self.p = tag.end;

        match element {
            Element::Col => {
                self.rewind();
            }
            Element::Th | Element::Td => self.call(Mode::Inline)?,
            _ => {}
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use pretty_assertions::assert_eq;

    fn render(input: &str) -> String {
        let options = DTextOptions::default();
        let src = normalize(input);
        Scanner::new(&src, &options, Mode::Main).run().unwrap().html
    }

    fn block_start(input: &str) -> Option<BlockStart<'static>> {
        let src: &'static str = Box::leak(normalize(input).into_boxed_str());
        let options: &'static DTextOptions = Box::leak(Box::new(DTextOptions::default()));
        let scanner = Scanner::new(src, options, Mode::Main);
        scanner.match_block_start(1).map(|(start, _)| start)
    }

    #[test]
    fn block_start_recognition() {
        assert_eq!(
            block_start("h3#intro. Hi"),
            Some(BlockStart::Header { level: 3, id: "intro" })
        );
        assert_eq!(block_start("h7. no"), None);
        assert_eq!(block_start("  ** item"), Some(BlockStart::ListItem { depth: 2 }));
        assert_eq!(block_start("****"), Some(BlockStart::Hr));
        assert_eq!(block_start("*bold*"), None);
        assert_eq!(block_start("[/QUOTE]"), Some(BlockStart::Close(Element::Quote)));
        assert_eq!(
            block_start("[section,expanded=More]"),
            Some(BlockStart::Section { summary: "More", expanded: true })
        );
        assert_eq!(block_start("```\nunterminated"), None);
    }

    #[test]
    fn fence_body() {
        assert_eq!(
            block_start("```ruby\nputs 1\nputs 2\n```\nafter"),
            Some(BlockStart::Fence { language: "ruby", body: "puts 1\nputs 2" })
        );
        assert_eq!(
            block_start("```\n```"),
            Some(BlockStart::Fence { language: "", body: "" })
        );
    }

    #[test]
    fn mention_names() {
        assert_eq!(mention_name_len("alice, hi"), Some(5));
        assert_eq!(mention_name_len("bob."), Some(3));
        assert_eq!(mention_name_len("_x"), None);
        assert_eq!(mention_name_len(" x"), None);
        assert_eq!(mention_name_len("名前!"), Some("名前".len()));
    }

    #[test]
    fn paragraphs_and_breaks() {
        assert_eq!(render("a\nb\n\nc"), "<p>a<br>b</p><p>c</p>");
        assert_eq!(render("a\n\n\n"), "<p>a</p>");
    }

    #[test]
    fn lists() {
        assert_eq!(
            render("* a\n** b\n* c\n\nd"),
            "<ul><li>a</li><ul><li>b</li></ul><li>c</li></ul><p>d</p>"
        );
    }

    #[test]
    fn list_followed_by_text_line() {
        assert_eq!(render("* a\nb"), "<ul><li>a</li></ul><p>b</p>");
    }

    #[test]
    fn headers_are_single_line() {
        assert_eq!(render("h2. Title\nbody"), "<h2>Title</h2><p>body</p>");
        assert_eq!(render("h1. a[br]b"), "<h1>a&lt;br&gt;b</h1>");
    }

    #[test]
    fn empty_quote_has_no_paragraph() {
        assert_eq!(render("[quote][/quote]"), "<blockquote></blockquote>");
    }

    #[test]
    fn code_block_drops_final_newline() {
        assert_eq!(
            render("[code]\n[b]x[/b] < y\n[/code]"),
            "<pre>[b]x[/b] &lt; y</pre>"
        );
    }

    #[test]
    fn table_cells() {
        assert_eq!(
            render("[table][tr][td colspan=2 onclick=x]a[/td][/tr][/table]"),
            r#"<table class="striped"><tr><td colspan="2">a</td></tr></table>"#
        );
    }

    #[test]
    fn indented_container_close() {
        assert_eq!(
            render("[quote]a\n  [/quote]"),
            "<blockquote><p>a</p></blockquote>"
        );
        assert_eq!(
            render("[spoiler]a\n\t[/spoiler]b"),
            r#"<div class="spoiler"><p>a</p></div><p>b</p>"#
        );
    }

    #[test]
    fn new_row_closes_the_open_one() {
        assert_eq!(
            render("[table][tr][td]a[tr][td]b[/table]"),
            r#"<table class="striped"><tr><td>a</td></tr><tr><td>b</td></tr></table>"#
        );
        assert_eq!(
            render("[table][thead][tr][th]h[tbody][tr][td]b[/table]"),
            r#"<table class="striped"><thead><tr><th>h</th></tr></thead><tbody><tr><td>b</td></tr></tbody></table>"#
        );
    }

    #[test]
    fn table_recovers_from_missing_cell_close() {
        assert_eq!(
            render("[table][tr][td]a[td]b[/tr][/table]"),
            r#"<table class="striped"><tr><td>a</td><td>b</td></tr></table>"#
        );
    }
}
