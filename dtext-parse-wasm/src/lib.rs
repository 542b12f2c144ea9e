//! WASM bindings for `dtext-parse`.
//!
//! Exposes the DText renderer to JavaScript via wasm-bindgen. Every entry
//! point takes the source text and an optional JSON options string shaped
//! like `DTextOptions` (`{"base_url": "https://e621.net", "max_thumbs": 5}`;
//! missing fields take their defaults).

use dtext_parse::{DTextOptions, ParseResult};
use wasm_bindgen::prelude::*;

fn options_from_json(options_json: Option<String>) -> Result<DTextOptions, JsError> {
    match options_json.as_deref().map(str::trim) {
        None | Some("") => Ok(DTextOptions::default()),
        Some(json) => serde_json::from_str(json)
            .map_err(|err| JsError::new(&format!("invalid options: {err}"))),
    }
}

fn run(input: &str, options_json: Option<String>) -> Result<ParseResult, JsError> {
    let options = options_from_json(options_json)?;
    dtext_parse::parse_dtext(input, &options).map_err(JsError::from)
}

/// Render DText to an HTML fragment.
#[wasm_bindgen]
pub fn render_html(input: &str, options_json: Option<String>) -> Result<String, JsError> {
    run(input, options_json).map(|result| result.html)
}

/// Render a single line of DText with no block markup.
#[wasm_bindgen]
pub fn render_inline(input: &str, options_json: Option<String>) -> Result<String, JsError> {
    let options = options_from_json(options_json)?;
    dtext_parse::parse_inline(input, &options).map_err(JsError::from)
}

/// Parse DText and return `{ html, wiki_pages, posts, mentions }` as JSON.
#[wasm_bindgen]
pub fn parse(input: &str, options_json: Option<String>) -> Result<String, JsError> {
    let result = run(input, options_json)?;
    serde_json::to_string(&result).map_err(JsError::from)
}

/// Same as [`parse`], returned as a plain JavaScript object.
#[wasm_bindgen(js_name = parseObject)]
pub fn parse_object(input: &str, options_json: Option<String>) -> Result<JsValue, JsError> {
    let result = run(input, options_json)?;
    serde_wasm_bindgen::to_value(&result).map_err(JsError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_when_missing() {
        assert_eq!(options_from_json(None).ok(), Some(DTextOptions::default()));
        assert_eq!(
            options_from_json(Some("  ".to_string())).ok(),
            Some(DTextOptions::default())
        );
    }

    #[test]
    fn partial_options_json() {
        let options = options_from_json(Some(r#"{"max_thumbs": 3}"#.to_string())).ok();
        assert_eq!(options.map(|o| o.max_thumbs), Some(3));
    }
}
