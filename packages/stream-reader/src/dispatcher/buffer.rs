//! Markup buffers for matched subtrees and the namespace table.

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::escape::escape;

/// Prefixes that are bound by the XML specification itself.
const RESERVED_PREFIXES: [&str; 2] = ["xml", "xmlns"];

/// Document-wide prefix → URI bindings.
///
/// Bindings are never removed during a session; redeclaring a prefix
/// overwrites the previous URI. Iteration is ordered by prefix.
#[derive(Debug, Default)]
pub(crate) struct NamespaceTable {
    bindings: BTreeMap<String, String>,
}

impl NamespaceTable {
    pub(crate) fn declare(&mut self, prefix: &str, uri: &str) {
        self.bindings.insert(prefix.to_string(), uri.to_string());
    }

    pub(crate) fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }
}

/// A start tag as seen by the dispatcher, re-serialized once and shared by
/// every open buffer.
#[derive(Debug)]
pub(crate) struct StartTag {
    name_len: usize,
    markup: String,
    declared: Vec<String>,
    used: Vec<String>,
}

impl StartTag {
    pub(crate) fn new(name: &str, attributes: &[(String, String)]) -> Self {
        let mut markup = String::with_capacity(name.len() + 2);
        markup.push('<');
        markup.push_str(name);

        let mut declared = Vec::new();
        let mut used = Vec::new();
        note_prefix(name, &mut used);

        for (key, value) in attributes {
            markup.push(' ');
            markup.push_str(key);
            markup.push_str("=\"");
            markup.push_str(&escape(value.as_str()));
            markup.push('"');

            if let Some(prefix) = key.strip_prefix("xmlns:") {
                declared.push(prefix.to_string());
            } else {
                note_prefix(key, &mut used);
            }
        }
        markup.push('>');

        Self {
            name_len: name.len(),
            markup,
            declared,
            used,
        }
    }

    pub(crate) fn markup(&self) -> &str {
        &self.markup
    }
}

fn note_prefix(name: &str, used: &mut Vec<String>) {
    if let Some((prefix, _)) = name.split_once(':') {
        if !RESERVED_PREFIXES.contains(&prefix) && !used.iter().any(|p| p == prefix) {
            used.push(prefix.to_string());
        }
    }
}

/// Markup captured for one matched subtree.
///
/// Prefixes can be referenced from names as well as from content such as
/// `xsi:type="dc:Thing"`, so a finished fragment carries every binding of
/// the namespace table its root does not declare itself. Prefixes used in
/// names are tracked only to report those no declaration was ever seen for.
#[derive(Debug, Default)]
pub(crate) struct FragmentBuffer {
    markup: String,
    root_name_end: usize,
    root_declared: Vec<String>,
    scopes: Vec<Vec<String>>,
    unbound: BTreeSet<String>,
}

impl FragmentBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_start(&mut self, tag: &StartTag) {
        if self.markup.is_empty() {
            self.root_name_end = 1 + tag.name_len;
            self.root_declared.clone_from(&tag.declared);
        }
        self.markup.push_str(tag.markup());

        for prefix in &tag.used {
            let in_scope = tag.declared.contains(prefix)
                || self.scopes.iter().any(|scope| scope.contains(prefix));
            if !in_scope {
                self.unbound.insert(prefix.clone());
            }
        }
        self.scopes.push(tag.declared.clone());
    }

    pub(crate) fn push_end(&mut self, markup: &str) {
        self.markup.push_str(markup);
        self.scopes.pop();
    }

    pub(crate) fn push_raw(&mut self, markup: &str) {
        self.markup.push_str(markup);
    }

    pub(crate) fn len(&self) -> usize {
        self.markup.len()
    }

    /// Finish the fragment, declaring the known bindings on its root element.
    pub(crate) fn finish(mut self, namespaces: &NamespaceTable) -> String {
        for prefix in &self.unbound {
            if namespaces.get(prefix).is_none() {
                tracing::warn!(prefix = %prefix, "no declaration seen for namespace prefix");
            }
        }

        let mut declarations = String::new();
        for (prefix, uri) in namespaces.iter() {
            if self.root_declared.iter().any(|declared| declared == prefix) {
                continue;
            }
            declarations.push_str(" xmlns:");
            declarations.push_str(prefix);
            declarations.push_str("=\"");
            declarations.push_str(&escape(uri));
            declarations.push('"');
        }
        if !declarations.is_empty() {
            self.markup.insert_str(self.root_name_end, &declarations);
        }
        self.markup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_start_tag_escapes_values() {
        let tag = StartTag::new("item", &attrs(&[("title", "a < b & \"c\" 'd' >")]));
        assert_eq!(
            tag.markup(),
            "<item title=\"a &lt; b &amp; &quot;c&quot; &apos;d&apos; &gt;\">"
        );
    }

    #[test]
    fn test_start_tag_prefixes() {
        let tag = StartTag::new(
            "a:item",
            &attrs(&[("xmlns:b", "urn:b"), ("b:x", "1"), ("xml:lang", "nl"), ("y", "2")]),
        );
        assert_eq!(tag.declared, vec!["b".to_string()]);
        assert_eq!(tag.used, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_namespace_table_last_wins() {
        let mut table = NamespaceTable::default();
        table.declare("a", "urn:one");
        table.declare("a", "urn:two");
        assert_eq!(table.get("a"), Some("urn:two"));
        assert_eq!(table.get("b"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_buffer_injects_table_bindings() {
        let mut table = NamespaceTable::default();
        table.declare("a", "urn:a");
        table.declare("other", "urn:other");

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("item", &[]));
        buffer.push_start(&StartTag::new("a:child", &[]));
        buffer.push_raw("text");
        buffer.push_end("</a:child>");
        buffer.push_end("</item>");

        assert_eq!(
            buffer.finish(&table),
            "<item xmlns:a=\"urn:a\" xmlns:other=\"urn:other\"><a:child>text</a:child></item>"
        );
    }

    #[test]
    fn test_buffer_keeps_prefixes_used_in_values() {
        let mut table = NamespaceTable::default();
        table.declare("xsi", "urn:xsi");
        table.declare("dc", "urn:dc");

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("item", &attrs(&[("xsi:type", "dc:Thing")])));
        buffer.push_end("</item>");

        assert_eq!(
            buffer.finish(&table),
            "<item xmlns:dc=\"urn:dc\" xmlns:xsi=\"urn:xsi\" xsi:type=\"dc:Thing\"></item>"
        );
    }

    #[test]
    fn test_buffer_root_declaration_not_repeated() {
        let mut table = NamespaceTable::default();
        table.declare("a", "urn:a");
        table.declare("b", "urn:b");

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("a:item", &attrs(&[("xmlns:a", "urn:a")])));
        buffer.push_end("</a:item>");

        assert_eq!(
            buffer.finish(&table),
            "<a:item xmlns:b=\"urn:b\" xmlns:a=\"urn:a\"></a:item>"
        );
    }

    #[test]
    fn test_buffer_keeps_self_declared_prefixes() {
        let mut table = NamespaceTable::default();
        table.declare("a", "urn:outer");

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("item", &[]));
        buffer.push_start(&StartTag::new("a:child", &attrs(&[("xmlns:a", "urn:inner")])));
        buffer.push_end("</a:child>");
        buffer.push_end("</item>");

        assert_eq!(
            buffer.finish(&table),
            "<item xmlns:a=\"urn:outer\"><a:child xmlns:a=\"urn:inner\"></a:child></item>"
        );
    }

    #[test]
    fn test_buffer_prefix_used_outside_its_declaration_scope() {
        let mut table = NamespaceTable::default();
        table.declare("a", "urn:a");

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("item", &[]));
        buffer.push_start(&StartTag::new("x", &attrs(&[("xmlns:a", "urn:a")])));
        buffer.push_end("</x>");
        buffer.push_start(&StartTag::new("a:y", &[]));
        buffer.push_end("</a:y>");
        buffer.push_end("</item>");

        assert_eq!(
            buffer.finish(&table),
            "<item xmlns:a=\"urn:a\"><x xmlns:a=\"urn:a\"></x><a:y></a:y></item>"
        );
    }

    #[test]
    fn test_buffer_unknown_prefix_left_alone() {
        let table = NamespaceTable::default();

        let mut buffer = FragmentBuffer::new();
        buffer.push_start(&StartTag::new("p:item", &[]));
        buffer.push_end("</p:item>");

        assert_eq!(buffer.finish(&table), "<p:item></p:item>");
    }
}
