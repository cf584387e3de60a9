//! Owned XML element tree
//!
//! Documents are parsed with `roxmltree` and copied into [`Element`] values
//! that own their text, so validated fragments can be handed to plugins and
//! kept in the resolved configuration without borrowing the source buffer.

mod element;

pub use self::element::{Attribute, Element, Node, TextPosition};

use crate::common::ValidationIssue;

/// Deepest element nesting accepted in a document
pub const MAX_DEPTH: usize = 256;

/// Parse XML text into its root element
///
/// Well-formedness errors, and elements nested deeper than [`MAX_DEPTH`],
/// come back as a positioned [`ValidationIssue`].
pub fn parse_document(text: &str) -> std::result::Result<Element, ValidationIssue> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: false,
        ..roxmltree::ParsingOptions::default()
    };

    let doc = roxmltree::Document::parse_with_options(text, options).map_err(|e| {
        let pos = e.pos();
        ValidationIssue::new(pos.row, pos.col, format!("Malformed XML: {}", e))
    })?;

    Element::from_node(&doc, doc.root_element(), MAX_DEPTH)
}
