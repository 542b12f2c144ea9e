use serde::Serialize;

use crate::error::DTextError;
use crate::normalize::normalize;
use crate::options::DTextOptions;
use crate::scanner::{Mode, Scanner};

/// Everything a parse produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    /// The rendered HTML fragment.
    pub html: String,
    /// Wiki page names referenced by `[[...]]`, unique, in first-seen order.
    pub wiki_pages: Vec<String>,
    /// Post ids rendered as thumbnails, at most `max_thumbs` of them.
    pub posts: Vec<i64>,
    /// `@name` mentions in source order, duplicates kept.
    pub mentions: Vec<String>,
}

/// Translate a DText document into HTML and collect its references.
///
/// The only error is [`DTextError::TooDeep`]; every other malformed
/// construct is rendered as escaped text.
pub fn parse_dtext(input: &str, options: &DTextOptions) -> Result<ParseResult, DTextError> {
    run(input, options, Mode::Main)
}

/// Like [`parse_dtext`], but starts inside a paragraph body and returns only
/// the HTML.
pub fn parse_inline(input: &str, options: &DTextOptions) -> Result<String, DTextError> {
    run(input, options, Mode::Inline).map(|result| result.html)
}

/// Emphasis, entities and line breaks only. Thumbnails are always disabled.
pub fn parse_basic_inline(input: &str, options: &DTextOptions) -> Result<String, DTextError> {
    let options = DTextOptions {
        max_thumbs: 0,
        f_mentions: false,
        ..options.clone()
    };
    run(input, &options, Mode::BasicInline).map(|result| result.html)
}

fn run(input: &str, options: &DTextOptions, mode: Mode) -> Result<ParseResult, DTextError> {
    let src = normalize(input);
    tracing::debug!(len = input.len(), ?mode, "parsing dtext");

    let result = Scanner::new(&src, options, mode).run();
    if let Err(err) = &result {
        tracing::debug!(%err, "dtext parse aborted");
    }
    result
}
