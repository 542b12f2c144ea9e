//! Element kinds that live on the document-structure stack.

/// One open HTML element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Element {
    // Block elements.
    Paragraph,
    Quote,
    Spoiler,
    Section,
    NoDText,
    Code,
    Td,
    Th,
    Col,
    ColGroup,
    Thead,
    Tbody,
    Tr,
    Table,
    Ul,
    Li,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    TnBlock,

    // Inline elements.
    B,
    I,
    U,
    S,
    Sup,
    Sub,
    Tn,
    InlineCode,
    InlineNoDText,
    InlineSpoiler,
    Color,
}

impl Element {
    pub(crate) fn is_inline(self) -> bool {
        matches!(
            self,
            Element::B
                | Element::I
                | Element::U
                | Element::S
                | Element::Sup
                | Element::Sub
                | Element::Tn
                | Element::InlineCode
                | Element::InlineNoDText
                | Element::InlineSpoiler
                | Element::Color
        )
    }

    /// Blocks that can hold other blocks. `close_leaf_blocks` stops here.
    pub(crate) fn is_container(self) -> bool {
        matches!(
            self,
            Element::Quote | Element::Spoiler | Element::Section | Element::TnBlock
        )
    }

    pub(crate) fn is_header(self) -> bool {
        matches!(
            self,
            Element::H1 | Element::H2 | Element::H3 | Element::H4 | Element::H5 | Element::H6
        )
    }

    pub(crate) fn header(level: u8) -> Option<Element> {
        match level {
            1 => Some(Element::H1),
            2 => Some(Element::H2),
            3 => Some(Element::H3),
            4 => Some(Element::H4),
            5 => Some(Element::H5),
            6 => Some(Element::H6),
            _ => None,
        }
    }

    /// HTML written when this element is popped. `Col` and inline nodtext
    /// have no closing markup.
    pub(crate) fn close_tag(self) -> &'static str {
        match self {
            Element::Paragraph => "</p>",
            Element::Quote => "</blockquote>",
            Element::Spoiler => "</div>",
            Element::Section => "</div></details>",
            Element::NoDText => "</p>",
            Element::Code => "</pre>",
            Element::Td => "</td>",
            Element::Th => "</th>",
            Element::Col => "",
            Element::ColGroup => "</colgroup>",
            Element::Thead => "</thead>",
            Element::Tbody => "</tbody>",
            Element::Tr => "</tr>",
            Element::Table => "</table>",
            Element::Ul => "</ul>",
            Element::Li => "</li>",
            Element::H1 => "</h1>",
            Element::H2 => "</h2>",
            Element::H3 => "</h3>",
            Element::H4 => "</h4>",
            Element::H5 => "</h5>",
            Element::H6 => "</h6>",
            Element::TnBlock => "</p>",
            Element::B => "</strong>",
            Element::I => "</em>",
            Element::U => "</u>",
            Element::S => "</s>",
            Element::Sup => "</sup>",
            Element::Sub => "</sub>",
            Element::Tn => "</span>",
            Element::InlineCode => "</code>",
            Element::InlineNoDText => "",
            Element::InlineSpoiler => "</span>",
            Element::Color => "</span>",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_container_are_disjoint() {
        for el in [Element::Quote, Element::Spoiler, Element::Section, Element::TnBlock] {
            assert!(el.is_container());
            assert!(!el.is_inline());
        }
        for el in [Element::B, Element::InlineSpoiler, Element::Color] {
            assert!(el.is_inline());
            assert!(!el.is_container());
        }
    }

    #[test]
    fn header_levels() {
        assert_eq!(Element::header(3), Some(Element::H3));
        assert_eq!(Element::header(7), None);
        assert!(Element::H6.is_header());
        assert!(!Element::Paragraph.is_header());
    }

    #[test]
    fn section_closes_both_wrappers() {
        assert_eq!(Element::Section.close_tag(), "</div></details>");
        assert_eq!(Element::Col.close_tag(), "");
    }
}
