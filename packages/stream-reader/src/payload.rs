//! Read-only payloads handed to callbacks.
//!
//! Payloads are owned snapshots: they do not borrow from the stream or from
//! the dispatcher, so a callback may clone and keep them after it returns.

use serde::Serialize;

/// What a callback receives for a matched path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// A complete element subtree, delivered when its end tag is seen.
    Element(Fragment),
    /// A single attribute, delivered when its element's start tag is seen.
    Attribute(Attribute),
}

impl Payload {
    /// The fragment, if this is an element payload.
    #[must_use]
    pub fn as_fragment(&self) -> Option<&Fragment> {
        match self {
            Self::Element(fragment) => Some(fragment),
            Self::Attribute(_) => None,
        }
    }

    /// The root element, if this is an element payload.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        self.as_fragment().map(Fragment::root)
    }

    /// The attribute, if this is an attribute payload.
    #[must_use]
    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Self::Attribute(attribute) => Some(attribute),
            Self::Element(_) => None,
        }
    }
}

/// A standalone XML fragment and its parsed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    xml: String,
    element: Element,
}

impl Fragment {
    pub(crate) fn new(xml: String, element: Element) -> Self {
        Self { xml, element }
    }

    /// The fragment markup, including any injected namespace declarations.
    #[must_use]
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// The fragment's root element.
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.element
    }

    /// Take ownership of the root element.
    #[must_use]
    pub fn into_root(self) -> Element {
        self.element
    }
}

/// A name/value attribute pair. Names keep their prefix (`xlink:href`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    name: String,
    value: String,
}

impl Attribute {
    /// Create an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Qualified attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A namespace binding in scope on an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub uri: String,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    #[serde(rename = "pi")]
    ProcessingInstruction {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

/// An element of a materialized fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) namespace: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) namespaces: Vec<Namespace>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) children: Vec<Node>,
}

impl Element {
    /// Qualified element name as written (`ns:item`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element name without its prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Element prefix, if the name has one.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Resolved namespace URI of the element.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Namespace bindings in scope on this element.
    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Resolve a prefix against the bindings in scope on this element.
    #[must_use]
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|ns| ns.prefix.as_deref() == Some(prefix))
            .map(|ns| ns.uri.as_str())
    }

    /// All attributes, namespace declarations excluded.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of the attribute with the given qualified name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(Attribute::value)
    }

    /// All child nodes in document order.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with the given qualified name.
    #[must_use]
    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|child| child.name == name)
    }

    /// Concatenated text of the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.collect_text(out),
                Node::Comment(_) | Node::ProcessingInstruction { .. } => {}
            }
        }
    }
}
