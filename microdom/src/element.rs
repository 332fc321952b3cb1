// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The element tree.

use core::fmt;
use std::collections::BTreeMap;
use core::str::FromStr;

use crate::builder::{Framing, StreamEvent, TreeBuilder};
use crate::error::Error;

/// Namespace bindings in scope for an element, captured from its
/// ancestors by the tree builder at the moment the element is parsed.
///
/// An element owns its children but holds no reference to its parent;
/// the scope answers the namespace questions that would otherwise need
/// an upward walk. It does not take part in equality or serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NsScope {
    default_ns: Option<String>,
    prefixes: BTreeMap<String, String>,
}

impl NsScope {
    /// The inherited default namespace (nearest ancestor `xmlns=`).
    pub fn default_ns(&self) -> Option<&str> {
        self.default_ns.as_deref()
    }

    /// The namespace bound to `prefix` by the nearest ancestor
    /// `xmlns:prefix=` declaration.
    pub fn prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// The scope seen by children of `parent`, i.e. this scope with
    /// `parent`'s own declarations applied on top.
    pub(crate) fn for_child_of(&self, parent: &Element) -> NsScope {
        let mut scope = self.clone();
        for (name, value) in &parent.attrs {
            if name == "xmlns" {
                scope.default_ns = Some(value.clone());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                scope.prefixes.insert(prefix.to_owned(), value.clone());
            }
        }
        scope
    }
}

/// A node in an element tree: either a child element or character data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A child element.
    Element(Element),
    /// Character data (already entity-decoded).
    Text(String),
}

impl Node {
    /// This node as an element, if it is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// This node as text, if it is character data.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Element(_) => None,
            Node::Text(text) => Some(text),
        }
    }
}

/// An XML element: a (possibly prefixed) name, insertion-ordered
/// attributes and an ordered list of child nodes.
///
/// Equality is attribute-order-independent but sensitive to attribute
/// values and to the order and content of children.
#[derive(Clone, Debug, Default)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
    scope: NsScope,
}

impl Element {
    /// Create an element with no attributes and no children.
    pub fn new(name: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            scope: NsScope::default(),
        }
    }

    /// The qualified name, including a prefix if present.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without its prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// The prefix part of the name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Get an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for (attr, old) in &mut self.attrs {
            if *attr == name {
                *old = value;
                return;
            }
        }
        self.attrs.push((name, value));
    }

    /// Builder-style [`set_attr`][`Element::set_attr`].
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Element {
        self.set_attr(name, value);
        self
    }

    /// The attributes in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.attrs
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Append a child element.
    pub fn append(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Builder-style [`append`][`Element::append`].
    pub fn with_child(mut self, child: Element) -> Element {
        self.append(child);
        self
    }

    /// Append character data, merging with a trailing text node.
    pub fn append_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }

    /// Builder-style [`append_text`][`Element::append_text`].
    pub fn with_text(mut self, text: impl Into<String>) -> Element {
        self.append_text(text);
        self
    }

    /// All child nodes, in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// The child elements, in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children.iter().filter_map(Node::as_element)
    }

    /// The concatenated direct character data of this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(text) = node {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether this element has the given local name and resolves to
    /// the given namespace.
    pub fn is(&self, name: &str, ns: &str) -> bool {
        self.local_name() == name && self.namespace() == Some(ns)
    }

    /// The namespace this element lives in: its own declaration if it
    /// has one, otherwise the binding inherited from its ancestors.
    pub fn namespace(&self) -> Option<&str> {
        self.find_ns(self.prefix())
    }

    /// Resolve a namespace prefix (`None` for the default namespace),
    /// checking this element's own declarations first and the
    /// inherited scope second.
    pub fn find_ns(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            None => self.attr("xmlns").or_else(|| self.scope.default_ns()),
            Some(prefix) => {
                for (name, value) in &self.attrs {
                    if let Some(declared) = name.strip_prefix("xmlns:") {
                        if declared == prefix {
                            return Some(value);
                        }
                    }
                }
                self.scope.prefix(prefix)
            }
        }
    }

    /// The namespace bindings inherited from this element's ancestors.
    pub fn scope(&self) -> &NsScope {
        &self.scope
    }

    pub(crate) fn set_scope(&mut self, scope: NsScope) {
        self.scope = scope;
    }

    /// The first child matching [`is(name, ns)`][`Element::is`].
    pub fn get_child(&self, name: &str, ns: &str) -> Option<&Element> {
        self.children().find(|child| child.is(name, ns))
    }

    /// All children matching [`is(name, ns)`][`Element::is`].
    pub fn get_children<'a>(
        &'a self,
        name: &'a str,
        ns: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children().filter(move |child| child.is(name, ns))
    }

    /// Whether a child matching `(name, ns)` exists.
    pub fn has_child(&self, name: &str, ns: &str) -> bool {
        self.get_child(name, ns).is_some()
    }

    /// Serialize into `out`. Attribute values escape `& < > " '`,
    /// character data escapes `& < >`.
    pub fn write_to(&self, out: &mut impl fmt::Write) -> fmt::Result {
        write!(out, "<{}", self.name)?;
        for (name, value) in &self.attrs {
            write!(out, " {}=\"{}\"", name, escape_attribute(value))?;
        }
        if self.children.is_empty() {
            return out.write_str("/>");
        }
        out.write_str(">")?;
        for node in &self.children {
            match node {
                Node::Element(child) => child.write_to(out)?,
                Node::Text(text) => out.write_str(&escape_text(text))?,
            }
        }
        write!(out, "</{}>", self.name)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Element) -> bool {
        self.name == other.name
            && self.attrs.len() == other.attrs.len()
            && self
                .attrs
                .iter()
                .all(|(name, value)| other.attr(name) == Some(value.as_str()))
            && self.children == other.children
    }
}

impl Eq for Element {}

impl fmt::Display for Element {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.write_to(fmt)
    }
}

impl FromStr for Element {
    type Err = Error;

    /// Parse a single complete XML document into its root element.
    fn from_str(s: &str) -> Result<Element, Error> {
        let mut builder = TreeBuilder::new(Framing::Framed);
        builder.push(s)?;
        match builder.next_event() {
            Some(StreamEvent::Element(el)) => Ok(el),
            _ => Err(Error::InvalidMarkup("expected one complete element")),
        }
    }
}

/// Escape character data: `&`, `<` and `>`.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape an attribute value: `&`, `<`, `>`, `"` and `'`.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
