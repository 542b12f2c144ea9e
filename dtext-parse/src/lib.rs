//! `dtext-parse`: a single-pass DText → HTML translator.
//!
//! DText is the markup used on imageboard forums and wikis: BBCode-style
//! `[b]tags[/b]`, `[[wiki links]]`, `{{tag searches}}`, `post #123`
//! shortcuts, `@mentions`, quotes, spoilers, tables and lists. This crate
//! turns it into a restricted HTML fragment and reports the wiki pages,
//! posts and users it referenced.
//!
//! # Quick start
//!
//! ```
//! use dtext_parse::{DTextOptions, parse_dtext};
//!
//! let result = parse_dtext("hello [b]bold[/b] world", &DTextOptions::default()).unwrap();
//! assert_eq!(result.html, "<p>hello <strong>bold</strong> world</p>");
//! ```

mod buffer;
mod dstack;
mod element;
mod emit;
mod entities;
pub mod error;
mod html;
mod links;
mod lookahead;
mod normalize;
pub mod options;
pub mod parse;
mod scanner;
mod tags;
pub mod url;

pub use buffer::{escape_html, uri_escape};
pub use error::DTextError;
pub use options::DTextOptions;
pub use parse::{ParseResult, parse_basic_inline, parse_dtext, parse_inline};
pub use url::{Url, trim_url};

/// Maximum depth of both the element stack and the mode stack.
pub const MAX_STACK_DEPTH: usize = 512;
