//! The closed allow-list of attributes that table tags may carry.

use std::collections::BTreeMap;

/// Filtered attributes for the next block-level opening tag, keyed by the
/// canonical (lower-case) attribute name so output order is stable.
pub(crate) type TagAttributes<'a> = BTreeMap<&'static str, &'a str>;

/// Attribute names each table element accepts.
pub(crate) fn permitted_attributes(element: &str) -> &'static [&'static str] {
    match element {
        "thead" | "tbody" | "tr" => &["align"],
        "td" | "th" => &["align", "colspan", "rowspan"],
        "col" => &["align", "span"],
        _ => &[],
    }
}

/// Value check for a permitted attribute.
pub(crate) fn is_valid_attribute_value(name: &str, value: &str) -> bool {
    match name {
        "align" => ["left", "center", "right", "justify"]
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
        "span" | "colspan" | "rowspan" => {
            !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Keep only the attributes `element` allows whose values validate.
///
/// Names match case-insensitively; a repeated attribute keeps its last value.
pub(crate) fn filter_attributes<'a>(
    element: &str,
    attrs: &[(&'a str, &'a str)],
) -> TagAttributes<'a> {
    let allowed = permitted_attributes(element);
    let mut out = TagAttributes::new();
    for &(name, value) in attrs {
        let Some(&canonical) = allowed.iter().find(|a| a.eq_ignore_ascii_case(name)) else {
            continue;
        };
        if is_valid_attribute_value(canonical, value) {
            out.insert(canonical, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn td_keeps_span_attributes() {
        let attrs = filter_attributes("td", &[("COLSPAN", "2"), ("align", "center")]);
        assert_eq!(
            attrs.into_iter().collect::<Vec<_>>(),
            vec![("align", "center"), ("colspan", "2")]
        );
    }

    #[test]
    fn invalid_values_are_dropped() {
        let attrs = filter_attributes("td", &[("colspan", "two"), ("align", "middle")]);
        assert!(attrs.is_empty());
    }

    #[test]
    fn unknown_attributes_are_dropped() {
        let attrs = filter_attributes("tr", &[("onclick", "x()"), ("colspan", "2")]);
        assert!(attrs.is_empty());
    }

    #[test]
    fn colgroup_allows_nothing() {
        assert!(permitted_attributes("colgroup").is_empty());
        assert_eq!(permitted_attributes("col"), &["align", "span"]);
    }
}
