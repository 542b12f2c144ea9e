//! Property-based tests using proptest.
//!
//! The parser must never panic, must be deterministic, and must always emit
//! balanced markup no matter how badly the input nests its tags.

use dtext_parse::{DTextError, DTextOptions, parse_dtext};
use proptest::prelude::*;

const VOID_ELEMENTS: &[&str] = &["br", "hr", "col"];

/// Check that every opening tag in `html` has a matching close, in order.
fn assert_balanced(html: &str) {
    let mut stack: Vec<&str> = Vec::new();
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let close = after
            .find('>')
            .unwrap_or_else(|| panic!("unterminated tag in {html:?}"));
        let inner = &after[..close];
        rest = &after[close + 1..];

        if let Some(name) = inner.strip_prefix('/') {
            let top = stack.pop();
            assert_eq!(top, Some(name), "mismatched </{name}> in {html:?}");
        } else {
            let name = inner.split(' ').next().unwrap_or(inner);
            if !VOID_ELEMENTS.contains(&name) {
                stack.push(name);
            }
        }
    }

    assert!(stack.is_empty(), "unclosed {stack:?} in {html:?}");
}

/// Inputs built from DText fragments, so that tags actually nest and cross.
fn dtext_soup() -> impl Strategy<Value = String> {
    let fragments = vec![
        "[b]", "[/b]", "[i]", "[/i]", "[s]", "[/s]", "[quote]", "[/quote]", "[spoiler]",
        "[/spoiler]", "[section=x]", "[/section]", "[tn]", "[/tn]", "[code]", "[/code]",
        "[nodtext]", "[/nodtext]", "[table]", "[/table]", "[tr]", "[/tr]", "[td]", "[/td]",
        "[th]", "[/th]", "[col]", "[color=red]", "[/color]", "* ", "** ", "h2. ", "\n",
        "\n\n", "text ", "post #1 ", "[[wiki]]", "@someone ", "`x`", "<b>", "</i>", "&amp;",
    ];
    prop::collection::vec(prop::sample::select(fragments), 0..60).prop_map(|v| v.concat())
}

proptest! {
    /// Any random string fed to the parser should never cause a panic.
    #[test]
    fn any_dtext_no_panic(input in "\\PC{0,500}") {
        let options = DTextOptions::default();
        let _ = parse_dtext(&input, &options);
    }

    #[test]
    fn parsing_is_deterministic(input in "\\PC{0,300}") {
        let options = DTextOptions::default().with_max_thumbs(3);
        prop_assert_eq!(parse_dtext(&input, &options), parse_dtext(&input, &options));
    }

    #[test]
    fn output_is_balanced(input in dtext_soup()) {
        let options = DTextOptions::default().with_max_thumbs(2);
        let result = parse_dtext(&input, &options).unwrap();
        assert_balanced(&result.html);
    }

    #[test]
    fn thumbnails_never_exceed_limit(
        ids in prop::collection::vec(0u32..50, 0..20),
        max_thumbs in 0usize..5,
    ) {
        let input: String = ids.iter().map(|id| format!("post #{id} ")).collect();
        let options = DTextOptions::default().with_max_thumbs(max_thumbs);
        let result = parse_dtext(&input, &options).unwrap();

        prop_assert!(result.posts.len() <= max_thumbs);
        let mut unique = result.posts.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(unique.len(), result.posts.len());
    }

    #[test]
    fn wiki_pages_are_unique(names in prop::collection::vec("[a-c]{1,2}", 0..20)) {
        let input: String = names.iter().map(|n| format!("[[{n}]] ")).collect();
        let result = parse_dtext(&input, &DTextOptions::default()).unwrap();

        let mut sorted = result.wiki_pages.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), result.wiki_pages.len());
    }

    #[test]
    fn plain_text_survives(text in "[A-Za-gi-z0-9][A-Za-z0-9 ,.!?]{0,99}") {
        let result = parse_dtext(&text, &DTextOptions::default()).unwrap();
        prop_assert!(result.html.starts_with("<p>"));
        assert_balanced(&result.html);
    }
}

#[test]
fn nesting_overflow_is_reported() {
    for opener in ["[b]", "[quote]", "[spoiler]", "[i][u]"] {
        let input = opener.repeat(600);
        let result = parse_dtext(&input, &DTextOptions::default());
        assert!(
            matches!(result, Err(DTextError::TooDeep { limit: 512 })),
            "{opener} x 600 should overflow"
        );
    }
}
