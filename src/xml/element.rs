//! Element, attribute and node types

use std::fmt;

use serde::{Serialize, Serializer};

use crate::common::ValidationIssue;

/// 1-based position of an element's start tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

/// An attribute with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// Element child node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned, namespace-resolved XML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    namespace: Option<String>,
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    position: TextPosition,
}

impl Element {
    /// Create an empty element, mostly useful in tests
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
            position: TextPosition::default(),
        }
    }

    /// Copy a `roxmltree` node, refusing trees nested deeper than `max_depth`
    pub(crate) fn from_node(
        doc: &roxmltree::Document<'_>,
        node: roxmltree::Node<'_, '_>,
        max_depth: usize,
    ) -> std::result::Result<Self, ValidationIssue> {
        let pos = doc.text_pos_at(node.range().start);
        if max_depth == 0 {
            return Err(ValidationIssue::new(
                pos.row,
                pos.col,
                format!("Element <{}> is nested too deeply", node.tag_name().name()),
            ));
        }

        let attributes = node
            .attributes()
            .map(|a| Attribute {
                namespace: a.namespace().map(str::to_string),
                name: a.name().to_string(),
                value: a.value().to_string(),
            })
            .collect();

        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Node::Element(Element::from_node(doc, child, max_depth - 1)?));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    children.push(Node::Text(text.to_string()));
                }
            }
        }

        Ok(Self {
            namespace: node.tag_name().namespace().map(str::to_string),
            name: node.tag_name().name().to_string(),
            attributes,
            children,
            position: TextPosition {
                line: pos.row,
                column: pos.col,
            },
        })
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute {
            namespace: None,
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Builder-style child setter
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder-style text setter
    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> TextPosition {
        self.position
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Value of an unqualified attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements with the given local name, in the same namespace as `self`
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements()
            .filter(move |e| e.name == name && e.namespace == self.namespace)
    }

    /// First child element with the given local name, in the same namespace as `self`
    pub fn child<'a>(&'a self, name: &'a str) -> Option<&'a Element> {
        self.children_named(name).next()
    }

    /// Concatenated text content of direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// True when there is non-whitespace text directly under this element
    pub fn has_significant_text(&self) -> bool {
        self.children.iter().any(|n| match n {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Element(_) => false,
        })
    }

    /// `{namespace}name` form used in diagnostics
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl Element {
    fn write_xml(&self, f: &mut fmt::Formatter<'_>, parent_ns: Option<&str>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        if self.namespace.as_deref() != parent_ns {
            write!(f, " xmlns=\"{}\"", escape(self.namespace.as_deref().unwrap_or("")))?;
        }
        for a in self.attributes.iter().filter(|a| a.namespace.is_none()) {
            write!(f, " {}=\"{}\"", a.name, escape(&a.value))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_xml(f, self.namespace.as_deref())?,
                Node::Text(t) => write!(f, "{}", escape(t))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

/// Serializes the element back to XML text (unqualified attributes only)
impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_xml(f, None)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Fragments appear in JSON dumps as their XML text
impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let e = Element::new(Some("urn:foo"), "foo")
            .with_attribute("name", "x")
            .with_child(Element::new(Some("urn:foo"), "bar").with_text("1"))
            .with_child(Element::new(Some("urn:other"), "bar"));

        assert_eq!(e.attribute("name"), Some("x"));
        assert_eq!(e.children_named("bar").count(), 1);
        assert_eq!(e.child("bar").map(|b| b.text()), Some("1".to_string()));
        assert_eq!(e.qualified_name(), "{urn:foo}foo");
    }

    #[test]
    fn test_display_escapes() {
        let e = Element::new(None, "a").with_attribute("v", "<&>");
        assert_eq!(e.to_string(), "<a v=\"&lt;&amp;&gt;\"/>");
    }
}
