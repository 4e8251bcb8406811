//! Turning buffered fragment markup into owned payload trees.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use roxmltree::{Document, NodeType};

use crate::payload::{Attribute, Element, Fragment, Namespace, Node};

/// Namespace bound to the `xml` prefix by definition.
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse a self-contained fragment into a payload.
///
/// # Arguments
/// * `xml` - Fragment markup with a single root element
///
/// # Returns
/// The fragment together with an owned copy of its element tree
///
/// # Examples
/// ```
/// use xml_path_stream::materialize::parse_fragment;
///
/// let fragment = parse_fragment(r#"<a:item xmlns:a="urn:a" id="1">x</a:item>"#.to_string()).unwrap();
/// let root = fragment.root();
/// assert_eq!(root.name(), "a:item");
/// assert_eq!(root.namespace(), Some("urn:a"));
/// assert_eq!(root.attribute("id"), Some("1"));
/// ```
pub fn parse_fragment(xml: String) -> Result<Fragment, roxmltree::Error> {
    let element = parse_tree(&xml)?;
    Ok(Fragment::new(xml, element))
}

/// Parse a fragment, recovering from namespace errors.
///
/// When the fragment does not parse with namespace checking, the tree is
/// rebuilt from the markup as written: names keep their prefixes and
/// elements whose prefix has no binding get no namespace. Only markup that
/// is not well-formed at all is still an error.
///
/// # Examples
/// ```
/// use xml_path_stream::materialize::parse_fragment_lenient;
///
/// let fragment = parse_fragment_lenient("<p:item>x</p:item>".to_string()).unwrap();
/// assert_eq!(fragment.root().name(), "p:item");
/// assert_eq!(fragment.root().namespace(), None);
/// ```
pub fn parse_fragment_lenient(xml: String) -> Result<Fragment, roxmltree::Error> {
    let element = match parse_tree(&xml) {
        Ok(element) => element,
        Err(err) => match recover_tree(&xml) {
            Some(element) => {
                tracing::warn!(error = %err, "fragment rebuilt without namespace checks");
                element
            }
            None => return Err(err),
        },
    };
    Ok(Fragment::new(xml, element))
}

fn parse_tree(xml: &str) -> Result<Element, roxmltree::Error> {
    let doc = Document::parse(xml)?;
    Ok(convert_element(doc.root_element()))
}

fn convert_element(node: roxmltree::Node<'_, '_>) -> Element {
    let tag = node.tag_name();

    let namespaces = node
        .namespaces()
        .filter(|ns| ns.uri() != XML_NAMESPACE)
        .map(|ns| Namespace {
            prefix: ns.name().map(String::from),
            uri: ns.uri().to_string(),
        })
        .collect();

    let attributes = node
        .attributes()
        .map(|attr| {
            Attribute::new(
                qualified_name(node, attr.namespace(), attr.name()),
                attr.value(),
            )
        })
        .collect();

    let children = node
        .children()
        .filter_map(|child| match child.node_type() {
            NodeType::Element => Some(Node::Element(convert_element(child))),
            NodeType::Text => child.text().map(|text| Node::Text(text.to_string())),
            NodeType::Comment => child.text().map(|text| Node::Comment(text.to_string())),
            NodeType::PI => child.pi().map(|pi| Node::ProcessingInstruction {
                target: pi.target.to_string(),
                value: pi.value.map(String::from),
            }),
            NodeType::Root => None,
        })
        .collect();

    Element {
        name: qualified_name(node, tag.namespace(), tag.name()),
        namespace: tag.namespace().map(String::from),
        namespaces,
        attributes,
        children,
    }
}

/// Rebuild `prefix:local` from a resolved name.
fn qualified_name(node: roxmltree::Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(XML_NAMESPACE) => format!("xml:{local}"),
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        },
        None => local.to_string(),
    }
}

/// Build the element tree with quick-xml, resolving only the prefixes that
/// are declared inside the fragment.
fn recover_tree(xml: &str) -> Option<Element> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Element> = Vec::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(start) => {
                let element = open_element(&start, open.last())?;
                open.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&start, open.last())?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => return Some(element),
                }
            }
            Event::End(_) => {
                let element = open.pop()?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => return Some(element),
                }
            }
            Event::Text(text) => push_text(open.last_mut(), &text.unescape().ok()?),
            Event::CData(cdata) => push_text(open.last_mut(), std::str::from_utf8(&cdata).ok()?),
            Event::Comment(comment) => {
                if let Some(parent) = open.last_mut() {
                    let content = std::str::from_utf8(&comment).ok()?;
                    parent.children.push(Node::Comment(content.to_string()));
                }
            }
            Event::PI(pi) => {
                if let Some(parent) = open.last_mut() {
                    let content = std::str::from_utf8(&pi).ok()?;
                    let (target, value) = match content.split_once(char::is_whitespace) {
                        Some((target, value)) => (target, Some(value.trim_start())),
                        None => (content, None),
                    };
                    parent.children.push(Node::ProcessingInstruction {
                        target: target.to_string(),
                        value: value.filter(|v| !v.is_empty()).map(String::from),
                    });
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn open_element(start: &BytesStart<'_>, parent: Option<&Element>) -> Option<Element> {
    let name = std::str::from_utf8(start.name().into_inner()).ok()?.to_string();

    let mut namespaces: Vec<Namespace> = parent.map(|p| p.namespaces.clone()).unwrap_or_default();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.ok()?;
        let key = std::str::from_utf8(attr.key.as_ref()).ok()?;
        let value = attr.unescape_value().ok()?;
        let prefix = match key {
            "xmlns" => None,
            _ => match key.strip_prefix("xmlns:") {
                Some(prefix) => Some(prefix.to_string()),
                None => {
                    attributes.push(Attribute::new(key, &*value));
                    continue;
                }
            },
        };
        namespaces.retain(|ns| ns.prefix != prefix);
        namespaces.push(Namespace {
            prefix,
            uri: value.into_owned(),
        });
    }

    let prefix = name.split_once(':').map(|(prefix, _)| prefix);
    let namespace = namespaces
        .iter()
        .find(|ns| ns.prefix.as_deref() == prefix)
        .map(|ns| ns.uri.clone())
        .filter(|uri| !uri.is_empty());

    Some(Element {
        name,
        namespace,
        namespaces,
        attributes,
        children: Vec::new(),
    })
}

fn push_text(parent: Option<&mut Element>, text: &str) {
    let Some(parent) = parent else {
        return;
    };
    match parent.children.last_mut() {
        Some(Node::Text(existing)) => existing.push_str(text),
        _ => parent.children.push(Node::Text(text.to_string())),
    }
}
