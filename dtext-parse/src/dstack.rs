//! The document-structure stack and the operations that close elements.
//!
//! Every element pushed here is popped again before a parse returns, and
//! popping always writes the element's close tag, so the emitted HTML is
//! balanced by construction.

use crate::element::Element;
use crate::error::DTextError;
use crate::html::TagAttributes;
use crate::scanner::Scanner;
use crate::MAX_STACK_DEPTH;

/// Stack of open elements, innermost last.
#[derive(Debug, Default)]
pub(crate) struct Dstack {
    stack: Vec<Element>,
}

impl Dstack {
    pub(crate) fn push(&mut self, element: Element) -> Result<(), DTextError> {
        if self.stack.len() >= MAX_STACK_DEPTH {
            return Err(DTextError::too_deep());
        }
        self.stack.push(element);
        Ok(())
    }

    /// Pop the top element. Underflow is logged, never fatal.
    pub(crate) fn pop(&mut self) -> Option<Element> {
        let element = self.stack.pop();
        if element.is_none() {
            tracing::warn!("dstack underflow");
        }
        element
    }

    pub(crate) fn peek(&self) -> Option<Element> {
        self.stack.last().copied()
    }

    /// True if the top element is `element`.
    pub(crate) fn check(&self, element: Element) -> bool {
        self.peek() == Some(element)
    }

    /// True if `element` is open anywhere in the stack.
    pub(crate) fn is_open(&self, element: Element) -> bool {
        self.stack.contains(&element)
    }

    pub(crate) fn count(&self, element: Element) -> usize {
        self.stack.iter().filter(|&&e| e == element).count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Topmost element among `candidates`, if any of them is open.
    pub(crate) fn innermost_of(&self, candidates: &[Element]) -> Option<Element> {
        self.stack
            .iter()
            .rev()
            .find(|e| candidates.contains(e))
            .copied()
    }
}

impl Scanner<'_> {
    /// Push `element` and write its opening markup.
    pub(crate) fn open_element(&mut self, element: Element, html: &str) -> Result<(), DTextError> {
        self.dstack.push(element)?;
        if element.is_inline() {
            self.out.append(html);
        } else {
            self.out.append_block(html);
        }
        Ok(())
    }

    /// Push a table element and write `<name attr="value"...>` with the
    /// already-filtered attributes.
    pub(crate) fn open_element_attributes(
        &mut self,
        element: Element,
        name: &str,
        attributes: &TagAttributes<'_>,
    ) -> Result<(), DTextError> {
        self.dstack.push(element)?;
        self.out.append_block("<");
        self.out.append_block(name);
        for (attr, value) in attributes {
            self.out.append_block(" ");
            self.out.append_block(attr);
            self.out.append_block("=\"");
            self.out.append_block_html_escaped(value);
            self.out.append_block("\"");
        }
        self.out.append_block(">");
        Ok(())
    }

    /// Pop the top element and write its close tag.
    pub(crate) fn rewind(&mut self) -> Option<Element> {
        let element = self.dstack.pop()?;
        if element.is_inline() {
            self.out.append(element.close_tag());
        } else {
            self.out.append_block(element.close_tag());
        }
        if element.is_header() {
            self.header_mode = false;
        }
        Some(element)
    }

    /// Rewind up to and including the innermost `element`.
    pub(crate) fn dstack_close_until(&mut self, element: Element) {
        while let Some(closed) = self.rewind() {
            if closed == element {
                break;
            }
        }
    }

    /// Rewind everything above the innermost container block.
    pub(crate) fn close_leaf_blocks(&mut self) {
        while self.dstack.peek().is_some_and(|top| !top.is_container()) {
            self.rewind();
        }
    }

    pub(crate) fn dstack_close_all(&mut self) {
        while !self.dstack.is_empty() {
            self.rewind();
        }
    }

    /// Close `element` if it is the innermost open element; a stray close
    /// becomes literal text.
    ///
    /// Returns `true` if something was closed.
    pub(crate) fn close_element(&mut self, element: Element, literal: &str) -> bool {
        if self.dstack.check(element) {
            self.rewind();
            true
        } else if element.is_inline() && self.dstack.peek().is_some_and(Element::is_inline) {
            self.rewind();
            true
        } else if element.is_inline() {
            self.out.append_html_escaped(literal);
            false
        } else {
            self.out.append_block_html_escaped(literal);
            false
        }
    }

    /// Open or re-align a list so that the next `<li>` sits at `depth`.
    pub(crate) fn dstack_open_list(&mut self, depth: usize) -> Result<(), DTextError> {
        if self.dstack.is_open(Element::Li) {
            self.dstack_close_until(Element::Li);
        } else {
            self.close_leaf_blocks();
        }

        while self.dstack.count(Element::Ul) < depth {
            self.open_element(Element::Ul, "<ul>")?;
        }
        while self.dstack.count(Element::Ul) > depth {
            self.dstack_close_until(Element::Ul);
        }

        self.open_element(Element::Li, "<li>")
    }

    pub(crate) fn dstack_close_list(&mut self) {
        while self.dstack.is_open(Element::Ul) {
            self.dstack_close_until(Element::Ul);
        }
    }
}
