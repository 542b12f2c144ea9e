//! URL splitting and the bare-URL trimming rule.
//!
//! This is not a general URL parser. It only needs to answer the questions
//! the emitter asks: which host is this, what are the path components, is
//! there a query or a fragment.

use percent_encoding::percent_decode_str;

/// A URL split into the parts the emitter looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    /// The URL as written (after `//host` has been given an `http:` scheme).
    pub raw: String,
    pub scheme: Option<String>,
    /// Lower-cased host, without userinfo or port.
    pub domain: Option<String>,
    /// Non-empty path segments, still percent-encoded.
    pub path_components: Vec<String>,
    /// Query string without the leading `?`.
    pub query: Option<String>,
    /// Fragment without the leading `#`.
    pub fragment: Option<String>,
}

impl Url {
    /// Split `raw` into scheme, domain, path components, query and fragment.
    ///
    /// `//example.com/x` is protocol-relative and parsed as
    /// `http://example.com/x`. Inputs without `scheme://` are treated as a
    /// bare path.
    pub fn parse(raw: &str) -> Url {
        let raw = if raw.starts_with("//") {
            format!("http:{raw}")
        } else {
            raw.to_owned()
        };

        let (before_fragment, fragment) = match raw.split_once('#') {
            Some((head, frag)) => (head, Some(frag.to_owned())),
            None => (raw.as_str(), None),
        };
        let (before_query, query) = match before_fragment.split_once('?') {
            Some((head, q)) => (head, Some(q.to_owned())),
            None => (before_fragment, None),
        };

        let (scheme, domain, path) = match split_scheme(before_query) {
            Some((scheme, rest)) => {
                let (authority, path) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], &rest[idx..]),
                    None => (rest, ""),
                };
                (Some(scheme.to_ascii_lowercase()), host_of(authority), path)
            }
            None => (None, None, before_query),
        };

        let path_components = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();

        Url {
            scheme,
            domain,
            path_components,
            query,
            fragment,
            raw,
        }
    }

    /// Case-insensitive comparison against this URL's host.
    pub fn has_domain(&self, domain: &str) -> bool {
        !domain.is_empty()
            && self
                .domain
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(domain))
    }

    /// The `index`-th path component with percent-escapes decoded.
    pub fn decoded_component(&self, index: usize) -> Option<String> {
        self.path_components
            .get(index)
            .map(|c| percent_decode_str(c).decode_utf8_lossy().into_owned())
    }
}

/// `scheme://rest` → `(scheme, rest)`. The scheme must be ASCII letters.
fn split_scheme(s: &str) -> Option<(&str, &str)> {
    let idx = s.find("://")?;
    let scheme = &s[..idx];
    if scheme.is_empty() || !scheme.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((scheme, &s[idx + 3..]))
}

/// Host part of an authority (`user:pass@host:port`), lower-cased.
fn host_of(authority: &str) -> Option<String> {
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };
    let host = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(idx) => &host_port[..=idx],
            None => host_port,
        }
    } else {
        match host_port.find(':') {
            Some(idx) => &host_port[..idx],
            None => host_port,
        }
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Split unbalanced trailing `)` off a bare URL.
///
/// While `s` ends with `)` and contains more `)` than `(`, the last `)` moves
/// to the leftover. Returns `(trimmed, leftover)`.
pub fn trim_url(s: &str) -> (&str, &str) {
    let opens = s.bytes().filter(|&b| b == b'(').count();
    let mut closes = s.bytes().filter(|&b| b == b')').count();
    let mut end = s.len();

    while end > 0 && s.as_bytes()[end - 1] == b')' && closes > opens {
        end -= 1;
        closes -= 1;
    }

    (&s[..end], &s[end..])
}
