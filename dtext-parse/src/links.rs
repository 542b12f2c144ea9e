//! Link emitters: id-links, wiki and search links, URLs and mentions.

use crate::buffer::uri_escape;
use crate::error::DTextError;
use crate::parse::parse_basic_inline;
use crate::scanner::Scanner;
use crate::url::{Url, trim_url};

// ------------------------------------------------------------------
// Id-link table
// ------------------------------------------------------------------

/// One `title #N` shortcut.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct IdLink {
    /// Display text, matched case-insensitively against the source.
    pub title: &'static str,
    /// Goes into the `dtext-KIND-id-link` class.
    pub kind: &'static str,
    /// The id is appended to this.
    pub url: &'static str,
}

const fn id_link(title: &'static str, kind: &'static str, url: &'static str) -> IdLink {
    IdLink { title, kind, url }
}

pub(crate) static ID_LINKS: &[IdLink] = &[
    id_link("post", "post", "/posts/"),
    id_link("post changes", "post-changes-for", "/post_versions?search[post_id]="),
    id_link("flag", "post-flag", "/post_flags/"),
    id_link("note", "note", "/notes/"),
    id_link("forum", "forum-post", "/forum_posts/"),
    id_link("topic", "forum-topic", "/forum_topics/"),
    id_link("comment", "comment", "/comments/"),
    id_link("dmail", "dmail", "/dmails/"),
    id_link("pool", "pool", "/pools/"),
    id_link("user", "user", "/users/"),
    id_link("artist", "artist", "/artists/"),
    id_link("artist changes", "artist-changes-for", "/artist_versions?search[artist_id]="),
    id_link("ban", "ban", "/bans/"),
    id_link("BUR", "bulk-update-request", "/bulk_update_requests/"),
    id_link("alias", "tag-alias", "/tag_aliases/"),
    id_link("implication", "tag-implication", "/tag_implications/"),
    id_link("mod action", "mod-action", "/mod_actions/"),
    id_link("record", "user-feedback", "/user_feedbacks/"),
    id_link("wiki", "wiki-page", "/wiki_pages/"),
    id_link("wiki changes", "wiki-page-changes-for", "/wiki_page_versions?search[wiki_page_id]="),
    id_link("set", "set", "/post_sets/"),
    id_link("favgroup", "favorite-group", "/favorite_groups/"),
    id_link("ticket", "ticket", "/tickets/"),
    id_link("takedown", "takedown", "/takedowns/"),
    id_link("avoid posting", "avoid-posting", "/avoid_postings/"),
    id_link("issue", "github", "https://github.com/e621ng/e621ng/issues/"),
    id_link("pull", "github-pull", "https://github.com/e621ng/e621ng/pull/"),
    id_link("commit", "github-commit", "https://github.com/e621ng/e621ng/commit/"),
];

/// Look up an id-link by its title (case-insensitive).
pub(crate) fn find_id_link(title: &str) -> Option<&'static IdLink> {
    ID_LINKS.iter().find(|l| l.title.eq_ignore_ascii_case(title))
}

/// A recognized `title #N`, `topic #N/pM` or `dmail #N/KEY` surface.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct IdLinkMatch<'a> {
    pub link: &'static IdLink,
    pub id: &'a str,
    pub page: Option<&'a str>,
    pub key: Option<&'a str>,
    pub end: usize,
}

/// Match the longest id-link surface at `src[p..]`.
pub(crate) fn match_id_link(src: &str, p: usize) -> Option<IdLinkMatch<'_>> {
    let bytes = src.as_bytes();
    let rest = &bytes[p..];

    let link = ID_LINKS
        .iter()
        .filter(|l| {
            let t = l.title.as_bytes();
            rest.len() > t.len() + 2
                && rest[..t.len()].eq_ignore_ascii_case(t)
                && &rest[t.len()..t.len() + 2] == b" #"
                && rest[t.len() + 2].is_ascii_digit()
        })
        .max_by_key(|l| l.title.len())?;

    let id_start = p + link.title.len() + 2;
    let id_end = id_start + digits_at(bytes, id_start);
    let mut m = IdLinkMatch {
        link,
        id: &src[id_start..id_end],
        page: None,
        key: None,
        end: id_end,
    };

    if bytes.get(id_end) == Some(&b'/') {
        if link.kind == "forum-topic" && matches!(bytes.get(id_end + 1), Some(b'p' | b'P')) {
            let page_start = id_end + 2;
            let len = digits_at(bytes, page_start);
            if len > 0 {
                m.page = Some(&src[page_start..page_start + len]);
                m.end = page_start + len;
            }
        } else if link.kind == "dmail" {
            let key_start = id_end + 1;
            let len = bytes[key_start..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
                .count();
            if len > 0 {
                m.key = Some(&src[key_start..key_start + len]);
                m.end = key_start + len;
            }
        }
    }

    Some(m)
}

fn digits_at(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count()
}

// ------------------------------------------------------------------
// Internal URL rewriting
// ------------------------------------------------------------------

/// `/<controller>/<id>` paths on an internal domain that become id-links.
struct InternalRoute {
    controller: &'static str,
    id_link: &'static str,
    no_query: bool,
    no_fragment: bool,
}

const fn route(
    controller: &'static str,
    id_link: &'static str,
    no_query: bool,
    no_fragment: bool,
) -> InternalRoute {
    InternalRoute {
        controller,
        id_link,
        no_query,
        no_fragment,
    }
}

static INTERNAL_ROUTES: &[InternalRoute] = &[
    route("posts", "post", false, true),
    route("pools", "pool", true, false),
    route("comments", "comment", false, false),
    route("forum_posts", "forum", false, false),
    route("forum_topics", "topic", true, true),
    route("users", "user", false, false),
    route("artists", "artist", false, false),
    route("notes", "note", false, false),
    route("favorite_groups", "favgroup", true, false),
    route("wiki_pages", "wiki", false, true),
];

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ------------------------------------------------------------------
// Title helpers
// ------------------------------------------------------------------

/// Pipe trick: drop a trailing ` (qualifier)` or `_(qualifier)`.
pub(crate) fn strip_qualifier(s: &str) -> &str {
    let Some(body) = s.strip_suffix(')') else {
        return s;
    };
    let bytes = body.as_bytes();
    let search_from = body.rfind(')').map_or(0, |i| i + 1);
    for (offset, _) in body[search_from..].match_indices('(') {
        let open = search_from + offset;
        if open > 0 && open + 1 < body.len() && matches!(bytes[open - 1], b' ' | b'_') {
            return &s[..open - 1];
        }
    }
    s
}

/// Lower-case, with every non-alphanumeric byte replaced by `-`.
pub(crate) fn sanitize_anchor(s: &str) -> String {
    s.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                char::from(b.to_ascii_lowercase())
            } else {
                '-'
            }
        })
        .collect()
}

fn normalize_wiki_tag(tag: &str) -> String {
    tag.to_ascii_lowercase().replace(' ', "_")
}

// ------------------------------------------------------------------
// Emitters
// ------------------------------------------------------------------

impl Scanner<'_> {
    /// Site-relative (but not protocol-relative), or on `options.domain`.
    pub(crate) fn is_internal_url(&self, url: &str) -> bool {
        if url.starts_with('/') && !url.starts_with("//") {
            return true;
        }
        !self.options.domain.is_empty() && Url::parse(url).has_domain(&self.options.domain)
    }

    pub(crate) fn append_id_link(&mut self, link: &IdLink, id: &str) {
        self.open_id_link(link);
        self.out.append_relative_url(&self.options.base_url, link.url);
        self.out.append_uri_escaped(id);
        self.out.append("\">");
        self.out.append_html_escaped(link.title);
        self.out.append(" #");
        self.out.append_html_escaped(id);
        self.out.append("</a>");
    }

    /// `<a ... class="dtext-link [dtext-external-link ]dtext-id-link dtext-KIND-id-link" href="`
    fn open_id_link(&mut self, link: &IdLink) {
        if link.url.starts_with('/') {
            self.out.append("<a class=\"dtext-link dtext-id-link dtext-");
        } else {
            self.out.append(
                "<a rel=\"external nofollow noreferrer\" class=\"dtext-link dtext-external-link dtext-id-link dtext-",
            );
        }
        self.out.append(link.kind);
        self.out.append("-id-link");
        self.out.append("\" href=\"");
    }

    /// `post #N`: a thumbnail placeholder while under `max_thumbs`, a plain
    /// id-link otherwise.
    pub(crate) fn append_post_link(&mut self, link: &IdLink, id: &str) {
        let Ok(post_id) = id.parse::<i64>() else {
            self.append_id_link(link, id);
            return;
        };

        let known = self.posts.contains(&post_id);
        if !known && self.posts.len() >= self.options.max_thumbs {
            self.append_id_link(link, id);
            return;
        }
        if !known {
            self.posts.push(post_id);
        }

        self.out.append(
            "<a class=\"dtext-link dtext-id-link dtext-post-id-link thumb-placeholder-link\" data-id=\"",
        );
        self.out.append_html_escaped(id);
        self.out.append("\" href=\"");
        self.out.append_relative_url(&self.options.base_url, link.url);
        self.out.append_uri_escaped(id);
        self.out.append("\">");
        self.out.append_html_escaped(link.title);
        self.out.append(" #");
        self.out.append_html_escaped(id);
        self.out.append("</a>");
    }

    /// `topic #N/pM`
    pub(crate) fn append_paged_link(&mut self, link: &IdLink, id: &str, page: &str) {
        self.open_id_link(link);
        self.out.append_relative_url(&self.options.base_url, link.url);
        self.out.append_uri_escaped(id);
        self.out.append("?page=");
        self.out.append_uri_escaped(page);
        self.out.append("\">");
        self.out.append_html_escaped(link.title);
        self.out.append(" #");
        self.out.append_html_escaped(id);
        self.out.append("/p");
        self.out.append_html_escaped(page);
        self.out.append("</a>");
    }

    /// `dmail #N/KEY`; the key is part of the href only.
    pub(crate) fn append_dmail_key_link(&mut self, link: &IdLink, id: &str, key: &str) {
        self.open_id_link(link);
        self.out.append_relative_url(&self.options.base_url, link.url);
        self.out.append_uri_escaped(id);
        self.out.append("?key=");
        self.out.append_uri_escaped(key);
        self.out.append("\">");
        self.out.append_html_escaped(link.title);
        self.out.append(" #");
        self.out.append_html_escaped(id);
        self.out.append("</a>");
    }

    /// `title_html` is inserted as-is when `escape_title` is false.
    pub(crate) fn append_absolute_link(
        &mut self,
        url: &str,
        title_html: &str,
        internal: bool,
        escape_title: bool,
    ) {
        if internal {
            self.out.append("<a class=\"dtext-link\" href=\"");
        } else if url == title_html {
            self.out.append(
                "<a rel=\"external nofollow noreferrer\" class=\"dtext-link dtext-external-link\" href=\"",
            );
        } else {
            self.out.append(
                "<a rel=\"external nofollow noreferrer\" class=\"dtext-link dtext-external-link dtext-named-external-link\" href=\"",
            );
        }
        self.out.append_relative_url(&self.options.base_url, url);
        self.out.append("\">");
        if escape_title {
            self.out.append_html_escaped(title_html);
        } else {
            self.out.append(title_html);
        }
        self.out.append("</a>");
    }

    /// A URL with no separate title. URLs on `internal_domains` are turned
    /// into id-links or wiki links where the path allows it.
    pub(crate) fn append_unnamed_url(&mut self, url: &str) {
        let parsed = Url::parse(url);
        let on_internal_domain = parsed
            .domain
            .as_deref()
            .is_some_and(|d| self.options.is_internal_domain(d));
        if on_internal_domain && self.append_internal_url(&parsed) {
            return;
        }

        let internal = self.is_internal_url(url);
        self.append_absolute_link(url, url, internal, true);
    }

    /// Returns `false` if the path is not one of the rewritable routes.
    fn append_internal_url(&mut self, url: &Url) -> bool {
        let components: Vec<&str> = url.path_components.iter().map(String::as_str).collect();
        match components.as_slice() {
            ["post", "show", id] if is_digits(id) => match find_id_link("post") {
                Some(link) => {
                    self.append_id_link(link, id);
                    true
                }
                None => false,
            },
            [controller, id] if is_digits(id) => {
                let Some(route) = INTERNAL_ROUTES.iter().find(|r| r.controller == *controller) else {
                    return false;
                };
                if (route.no_query && url.query.is_some())
                    || (route.no_fragment && url.fragment.is_some())
                {
                    return false;
                }
                match find_id_link(route.id_link) {
                    Some(link) => {
                        self.append_id_link(link, id);
                        true
                    }
                    None => false,
                }
            }
            ["wiki_pages", _] if url.fragment.is_none() => match url.decoded_component(1) {
                Some(name) => {
                    self.append_wiki_link("", &name, "", None, "");
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Bare URL: an unbalanced trailing `)` stays outside the link.
    pub(crate) fn append_bare_unnamed_url(&mut self, url: &str) {
        let (url, leftover) = trim_url(url);
        self.append_unnamed_url(url);
        self.out.append_html_escaped(leftover);
    }

    /// `"title":url`, `[title](url)` and `[url=url]title[/url]`.
    ///
    /// The title goes through a nested basic-inline parse, so it may carry
    /// emphasis but never links, mentions or thumbnails.
    pub(crate) fn append_named_url(&mut self, url: &str, title: &str) -> Result<(), DTextError> {
        let title_html = parse_basic_inline(title, self.options)?;

        let url = if url.starts_with("//") {
            format!("http:{url}")
        } else {
            url.to_owned()
        };

        if url.starts_with('/') || url.starts_with('#') {
            self.out.append("<a class=\"dtext-link\" href=\"");
            self.out.append_relative_url(&self.options.base_url, &url);
            self.out.append("\">");
            self.out.append(&title_html);
            self.out.append("</a>");
        } else if url == title {
            self.append_unnamed_url(&url);
        } else {
            let internal = self.is_internal_url(&url);
            self.append_absolute_link(&url, &title_html, internal, false);
        }
        Ok(())
    }

    pub(crate) fn append_bare_named_url(&mut self, url: &str, title: &str) -> Result<(), DTextError> {
        let (url, leftover) = trim_url(url);
        self.append_named_url(url, title)?;
        self.out.append_html_escaped(leftover);
        Ok(())
    }

    /// `prefix[[tag#anchor|title]]suffix`.
    ///
    /// `title` is `None` without a pipe and `Some("")` for the pipe trick.
    pub(crate) fn append_wiki_link(
        &mut self,
        prefix: &str,
        tag: &str,
        anchor: &str,
        title: Option<&str>,
        suffix: &str,
    ) {
        let normalized = normalize_wiki_tag(tag);
        let title = match title {
            None => tag,
            Some("") => strip_qualifier(tag),
            Some(title) => title,
        };

        if self.wiki_seen.insert(tag.to_owned()) {
            self.wiki_pages.push(tag.to_owned());
        }

        let mut href = if is_digits(&normalized) {
            format!("/wiki_pages/{normalized}")
        } else {
            format!("/wiki_pages/show_or_new?title={}", uri_escape(&normalized))
        };
        if !anchor.is_empty() {
            href.push_str("#dtext-");
            href.push_str(&sanitize_anchor(anchor));
        }

        self.out.append("<a class=\"dtext-link dtext-wiki-link\" href=\"");
        self.out.append_relative_url(&self.options.base_url, &href);
        self.out.append("\">");
        self.out.append_html_escaped(prefix);
        self.out.append_html_escaped(title);
        self.out.append_html_escaped(suffix);
        self.out.append("</a>");
    }

    /// `prefix{{search|title}}suffix`.
    pub(crate) fn append_post_search_link(
        &mut self,
        prefix: &str,
        search: &str,
        title: Option<&str>,
        suffix: &str,
    ) {
        let title = match title {
            None => search,
            Some("") => strip_qualifier(search),
            Some(title) => title,
        };

        self.out.append("<a class=\"dtext-link dtext-post-search-link\" href=\"");
        self.out.append_relative_url(&self.options.base_url, "/posts?tags=");
        self.out.append_uri_escaped(search);
        self.out.append("\">");
        self.out.append_html_escaped(prefix);
        self.out.append_html_escaped(title);
        self.out.append_html_escaped(suffix);
        self.out.append("</a>");
    }

    /// `[[#anchor]]` points into the current page.
    pub(crate) fn append_internal_anchor_link(
        &mut self,
        prefix: &str,
        anchor: &str,
        title: Option<&str>,
        suffix: &str,
    ) {
        let title = match title {
            None | Some("") => anchor,
            Some(title) => title,
        };

        self.out.append("<a class=\"dtext-link dtext-internal-anchor-link\" href=\"");
        self.out
            .append_relative_url(&self.options.base_url, &format!("#{}", uri_escape(anchor)));
        self.out.append("\">");
        self.out.append_html_escaped(prefix);
        self.out.append_html_escaped(title);
        self.out.append_html_escaped(suffix);
        self.out.append("</a>");
    }

    pub(crate) fn append_mention(&mut self, name: &str) {
        tracing::trace!(name, "mention");
        self.mentions.push(name.to_owned());

        self.out.append("<a class=\"dtext-link dtext-user-mention-link\" data-user-name=\"");
        self.out.append_html_escaped(name);
        self.out.append("\" href=\"");
        self.out.append_relative_url(&self.options.base_url, "/users?name=");
        self.out.append_uri_escaped(name);
        self.out.append("\">@");
        self.out.append_html_escaped(name);
        self.out.append("</a>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DTextOptions;
    use crate::scanner::Mode;
    use pretty_assertions::assert_eq;

    fn with_scanner(options: &DTextOptions, f: impl FnOnce(&mut Scanner<'_>)) -> String {
        let mut s = Scanner::new("\0\0", options, Mode::Main);
        f(&mut s);
        s.out.as_str().to_owned()
    }

    #[test]
    fn longest_surface_wins() {
        let m = match_id_link("\0post changes #12 x", 1).unwrap();
        assert_eq!(m.link.kind, "post-changes-for");
        assert_eq!(m.id, "12");

        let m = match_id_link("\0Wiki Changes #3\0", 1).unwrap();
        assert_eq!(m.link.kind, "wiki-page-changes-for");
    }

    #[test]
    fn surface_needs_digits() {
        assert!(match_id_link("\0post #abc\0", 1).is_none());
        assert!(match_id_link("\0post#1\0", 1).is_none());
    }

    #[test]
    fn paged_and_keyed_surfaces() {
        let m = match_id_link("\0topic #7/p3\0", 1).unwrap();
        assert_eq!((m.id, m.page), ("7", Some("3")));

        let m = match_id_link("\0dmail #5/abc=\0", 1).unwrap();
        assert_eq!((m.id, m.key), ("5", Some("abc=")));

        let m = match_id_link("\0post #5/p3\0", 1).unwrap();
        assert_eq!((m.page, m.end), (None, 8));
    }

    #[test]
    fn qualifier_stripping() {
        assert_eq!(strip_qualifier("Kaga (Kantai Collection)"), "Kaga");
        assert_eq!(strip_qualifier("kaga_(kantai_collection)"), "kaga");
        assert_eq!(strip_qualifier("foo(bar)"), "foo(bar)");
        assert_eq!(strip_qualifier("foo ()"), "foo ()");
        assert_eq!(strip_qualifier("plain"), "plain");
    }

    #[test]
    fn anchor_sanitizing() {
        assert_eq!(sanitize_anchor("See Also!"), "see-also-");
    }

    #[test]
    fn github_links_are_external() {
        let options = DTextOptions::default();
        let html = with_scanner(&options, |s| {
            s.append_id_link(find_id_link("issue").unwrap(), "42")
        });
        assert_eq!(
            html,
            r#"<a rel="external nofollow noreferrer" class="dtext-link dtext-external-link dtext-id-link dtext-github-id-link" href="https://github.com/e621ng/e621ng/issues/42">issue #42</a>"#
        );
    }

    #[test]
    fn thumbs_are_capped_and_deduplicated() {
        let options = DTextOptions::default().with_max_thumbs(1);
        let link = find_id_link("post").unwrap();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_post_link(link, "1");
        s.append_post_link(link, "2");
        s.append_post_link(link, "1");
        assert_eq!(s.posts, vec![1]);
        assert_eq!(s.out.as_str().matches("thumb-placeholder-link").count(), 2);
    }

    #[test]
    fn internal_domain_urls_become_id_links() {
        let options = DTextOptions::default().with_internal_domain("e621.net");
        let html = with_scanner(&options, |s| s.append_unnamed_url("https://e621.net/pools/12"));
        assert_eq!(
            html,
            r#"<a class="dtext-link dtext-id-link dtext-pool-id-link" href="/pools/12">pool #12</a>"#
        );

        let html = with_scanner(&options, |s| {
            s.append_unnamed_url("https://e621.net/pools/12?page=2")
        });
        assert!(html.contains("dtext-external-link"));
    }

    #[test]
    fn internal_wiki_url_becomes_wiki_link() {
        let options = DTextOptions::default().with_internal_domain("e621.net");
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_unnamed_url("https://e621.net/wiki_pages/kaga_%28kc%29");
        assert_eq!(
            s.out.as_str(),
            r#"<a class="dtext-link dtext-wiki-link" href="/wiki_pages/show_or_new?title=kaga_%28kc%29">kaga_(kc)</a>"#
        );
        assert_eq!(s.wiki_pages, vec!["kaga_(kc)"]);
    }

    #[test]
    fn own_domain_is_internal() {
        let options = DTextOptions::default().with_domain("e621.net");
        let html = with_scanner(&options, |s| s.append_unnamed_url("https://E621.net/help"));
        assert_eq!(
            html,
            r#"<a class="dtext-link" href="https://E621.net/help">https://E621.net/help</a>"#
        );
    }

    #[test]
    fn wiki_link_with_anchor_and_numeric_tag() {
        let options = DTextOptions::default().with_base_url("https://e621.net");
        let html = with_scanner(&options, |s| {
            s.append_wiki_link("", "Help: Tags", "Rating Tags", Some("rating"), "s")
        });
        assert_eq!(
            html,
            r#"<a class="dtext-link dtext-wiki-link" href="https://e621.net/wiki_pages/show_or_new?title=help%3A_tags#dtext-rating-tags">ratings</a>"#
        );

        let html = with_scanner(&options, |s| s.append_wiki_link("", "123", "", None, ""));
        assert!(html.contains(r#"href="https://e621.net/wiki_pages/123""#));
    }

    #[test]
    fn mention_markup() {
        let options = DTextOptions::default();
        let mut s = Scanner::new("\0\0", &options, Mode::Main);
        s.append_mention("a&b");
        assert_eq!(
            s.out.as_str(),
            r#"<a class="dtext-link dtext-user-mention-link" data-user-name="a&amp;b" href="/users?name=a%26b">@a&amp;b</a>"#
        );
        assert_eq!(s.mentions, vec!["a&b"]);
    }
}
