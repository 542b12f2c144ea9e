use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Rendering options for a single parse.
///
/// Every field has a default, so a partial JSON/YAML object deserializes
/// cleanly (`{"base_url": "https://e621.net"}` is a valid config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DTextOptions {
    /// Canonical hostname of the site. Links to this host are internal.
    pub domain: String,

    /// Prepended to every site-relative href the emitter writes.
    pub base_url: String,

    /// Hosts whose URLs are rewritten into id-links / wiki links where the
    /// path allows it.
    pub internal_domains: BTreeSet<String>,

    /// When false, `[color]` tags are consumed without emitting a span.
    pub allow_color: bool,

    /// When false, `@name` is always literal text.
    pub f_mentions: bool,

    /// When true, block-level markup is suppressed.
    pub f_inline: bool,

    /// Upper bound on thumbnail placeholders (and on `posts`).
    pub max_thumbs: usize,
}

impl Default for DTextOptions {
    fn default() -> Self {
        Self {
            domain: String::new(),
            base_url: String::new(),
            internal_domains: BTreeSet::new(),
            allow_color: true,
            f_mentions: true,
            f_inline: false,
            max_thumbs: 0,
        }
    }
}

impl DTextOptions {
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_internal_domain(mut self, domain: impl Into<String>) -> Self {
        self.internal_domains.insert(domain.into());
        self
    }

    pub fn with_max_thumbs(mut self, max_thumbs: usize) -> Self {
        self.max_thumbs = max_thumbs;
        self
    }

    /// True if `domain` (any case) is one of `internal_domains`.
    pub(crate) fn is_internal_domain(&self, domain: &str) -> bool {
        self.internal_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let opts = DTextOptions::default();
        assert!(opts.allow_color);
        assert!(opts.f_mentions);
        assert!(!opts.f_inline);
        assert_eq!(opts.max_thumbs, 0);
        assert!(opts.domain.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: DTextOptions =
            serde_json::from_str(r#"{"base_url": "https://e621.net", "max_thumbs": 5}"#).unwrap();
        assert_eq!(opts.base_url, "https://e621.net");
        assert_eq!(opts.max_thumbs, 5);
        assert!(opts.allow_color);
        assert!(opts.internal_domains.is_empty());
    }

    #[test]
    fn internal_domain_lookup_ignores_case() {
        let opts = DTextOptions::default().with_internal_domain("e621.net");
        assert!(opts.is_internal_domain("E621.NET"));
        assert!(!opts.is_internal_domain("e926.net"));
    }
}
