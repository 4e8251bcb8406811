//! Per-dispatch session state and event handling.

use quick_xml::escape::partial_escape;

use super::buffer::{FragmentBuffer, NamespaceTable, StartTag};
use crate::materialize::{parse_fragment, parse_fragment_lenient};
use crate::path::ATTRIBUTE_SEPARATOR;
use crate::payload::{Attribute, Payload};
use crate::registry::{Callback, CallbackRegistry, Control};

/// Why a session cannot continue.
#[derive(Debug)]
pub(crate) enum Fault {
    /// The document is not well-formed.
    Syntax(String),
    /// A captured fragment did not parse on its own.
    Fragment {
        path: String,
        source: roxmltree::Error,
    },
}

impl From<quick_xml::Error> for Fault {
    fn from(err: quick_xml::Error) -> Self {
        Self::Syntax(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Fault {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Syntax(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Fault {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Syntax(format!("invalid UTF-8: {err}"))
    }
}

/// State of one dispatch run: the open element stack, the namespace table and
/// the buffers of matched subtrees that are still open.
///
/// Everything here lives exactly as long as one `dispatch` call.
pub(crate) struct Session<'r> {
    registry: &'r CallbackRegistry,
    stack: Vec<String>,
    path: String,
    scratch: String,
    namespaces: NamespaceTable,
    buffers: Vec<(String, FragmentBuffer)>,
    seen_root: bool,
    root_closed: bool,
    strict_fragments: bool,
    elements: u64,
    payloads: u64,
}

impl<'r> Session<'r> {
    pub(crate) fn new(registry: &'r CallbackRegistry) -> Self {
        tracing::debug!(paths = registry.len(), "session started");
        Self {
            registry,
            stack: Vec::new(),
            path: String::new(),
            scratch: String::new(),
            namespaces: NamespaceTable::default(),
            buffers: Vec::new(),
            seen_root: false,
            root_closed: false,
            strict_fragments: false,
            elements: 0,
            payloads: 0,
        }
    }

    /// Fail on fragments that only parse with unresolved prefixes.
    pub(crate) fn strict_fragments(mut self, strict: bool) -> Self {
        self.strict_fragments = strict;
        self
    }

    /// Slash-joined names of the open elements; empty before the root opens.
    pub(crate) fn current_path(&self) -> &str {
        &self.path
    }

    pub(crate) fn elements(&self) -> u64 {
        self.elements
    }

    pub(crate) fn payloads(&self) -> u64 {
        self.payloads
    }

    pub(crate) fn start_element(
        &mut self,
        name: &str,
        attributes: &[(String, String)],
    ) -> Result<Control, Fault> {
        if self.root_closed {
            return Err(Fault::Syntax(format!(
                "junk after document element: <{name}>"
            )));
        }
        self.seen_root = true;
        self.elements += 1;

        self.stack.push(name.to_string());
        self.path.push('/');
        self.path.push_str(name);
        tracing::trace!(path = %self.path, "start element");

        for (key, value) in attributes {
            if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.namespaces.declare(prefix, value);
            }
        }

        if self.fire_attribute_callbacks(attributes) == Control::StopStream {
            return Ok(Control::StopStream);
        }

        if self.registry.is_registered(&self.path)
            && !self.buffers.iter().any(|(open, _)| *open == self.path)
        {
            tracing::debug!(path = %self.path, "opened fragment buffer");
            self.buffers.push((self.path.clone(), FragmentBuffer::new()));
        }

        if !self.buffers.is_empty() {
            let tag = StartTag::new(name, attributes);
            for (_, buffer) in &mut self.buffers {
                buffer.push_start(&tag);
            }
        }

        Ok(Control::Continue)
    }

    pub(crate) fn end_element(&mut self, name: &str) -> Result<Control, Fault> {
        match self.stack.last() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(Fault::Syntax(format!(
                    "mismatched tag: expected </{open}>, found </{name}>"
                )))
            }
            None => return Err(Fault::Syntax(format!("unexpected end tag </{name}>"))),
        }

        if !self.buffers.is_empty() {
            let close = format!("</{name}>");
            for (_, buffer) in &mut self.buffers {
                buffer.push_end(&close);
            }
        }

        let mut control = Control::Continue;
        if self
            .buffers
            .last()
            .is_some_and(|(open, _)| *open == self.path)
        {
            if let Some((path, buffer)) = self.buffers.pop() {
                tracing::debug!(path = %path, bytes = buffer.len(), "closing fragment buffer");
                let xml = buffer.finish(&self.namespaces);
                let parsed = if self.strict_fragments {
                    parse_fragment(xml)
                } else {
                    parse_fragment_lenient(xml)
                };
                let fragment = parsed.map_err(|source| Fault::Fragment {
                    path: path.clone(),
                    source,
                })?;
                let payload = Payload::Element(fragment);
                control = invoke(self.registry.lookup(&path), &payload, &mut self.payloads);
            }
        }

        self.stack.pop();
        let new_len = self.path.len() - name.len() - 1;
        self.path.truncate(new_len);
        if self.stack.is_empty() {
            self.root_closed = true;
        }

        Ok(control)
    }

    /// Character data, already unescaped by the tokenizer.
    pub(crate) fn text(&mut self, text: &str) -> Result<(), Fault> {
        if self.stack.is_empty() {
            let significant = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
            if !significant.is_empty() {
                return Err(Fault::Syntax(if self.root_closed {
                    "junk after document element".to_string()
                } else {
                    "text before document element".to_string()
                }));
            }
            return Ok(());
        }
        if !self.buffers.is_empty() {
            self.append(&partial_escape(text));
        }
        Ok(())
    }

    /// Contents of a CDATA section.
    pub(crate) fn cdata(&mut self, content: &str) {
        if self.buffers.is_empty() {
            return;
        }
        let mut markup = String::with_capacity(content.len() + 12);
        markup.push_str("<![CDATA[");
        markup.push_str(&content.replace("]]>", "]]]]><![CDATA[>"));
        markup.push_str("]]>");
        self.append(&markup);
    }

    /// Comments and processing instructions, passed through as written.
    pub(crate) fn markup(&mut self, markup: &str) {
        if !self.buffers.is_empty() {
            self.append(markup);
        }
    }

    /// Check the document was complete once the input is exhausted.
    pub(crate) fn finish(&self) -> Result<(), Fault> {
        if let Some(open) = self.stack.last() {
            return Err(Fault::Syntax(format!(
                "unclosed element <{open}> at end of stream"
            )));
        }
        if !self.seen_root {
            return Err(Fault::Syntax("no element found".to_string()));
        }
        tracing::debug!(
            elements = self.elements,
            payloads = self.payloads,
            namespaces = self.namespaces.len(),
            "document complete"
        );
        Ok(())
    }

    fn append(&mut self, markup: &str) {
        for (_, buffer) in &mut self.buffers {
            buffer.push_raw(markup);
        }
    }

    fn fire_attribute_callbacks(&mut self, attributes: &[(String, String)]) -> Control {
        let registry = self.registry;
        for (key, value) in attributes {
            self.scratch.clear();
            self.scratch.push_str(&self.path);
            self.scratch.push_str(ATTRIBUTE_SEPARATOR);
            self.scratch.push_str(key);

            let callbacks = registry.lookup(&self.scratch);
            if callbacks.is_empty() {
                continue;
            }
            let payload = Payload::Attribute(Attribute::new(key.as_str(), value.as_str()));
            if invoke(callbacks, &payload, &mut self.payloads) == Control::StopStream {
                tracing::debug!(path = %self.scratch, "stream processing stopped by callback");
                return Control::StopStream;
            }
        }
        Control::Continue
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            tracing::debug!(
                open_buffers = self.buffers.len(),
                path = %self.path,
                "discarding open fragment buffers"
            );
        }
    }
}

/// Run callbacks in order until one of them asks to stop.
///
/// Returns `StopStream` if a callback aborted the session, `Continue`
/// otherwise; `StopPath` only ends this loop.
fn invoke(callbacks: &[Callback], payload: &Payload, payloads: &mut u64) -> Control {
    for callback in callbacks {
        *payloads += 1;
        match callback.call(payload) {
            Control::Continue => {}
            Control::StopPath => break,
            Control::StopStream => return Control::StopStream,
        }
    }
    Control::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::XmlPath;
    use std::sync::{Arc, Mutex};

    fn recording(log: &Arc<Mutex<Vec<String>>>, label: &'static str, control: Control) -> Callback {
        let log = Arc::clone(log);
        Callback::from_fn(move |payload| {
            let detail = match payload {
                Payload::Element(fragment) => fragment.xml().to_string(),
                Payload::Attribute(attr) => format!("{}={}", attr.name(), attr.value()),
            };
            log.lock().unwrap().push(format!("{label}:{detail}"));
            control
        })
    }

    fn registry(entries: &[(&str, &Callback)]) -> CallbackRegistry {
        let mut registry = CallbackRegistry::new();
        for (path, callback) in entries {
            registry.register(XmlPath::new(*path).unwrap(), callback);
        }
        registry
    }

    #[test]
    fn test_current_path_tracks_nesting() {
        let registry = CallbackRegistry::new();
        let mut session = Session::new(&registry);
        assert_eq!(session.current_path(), "");

        session.start_element("root", &[]).unwrap();
        session.start_element("child", &[]).unwrap();
        assert_eq!(session.current_path(), "/root/child");

        session.end_element("child").unwrap();
        assert_eq!(session.current_path(), "/root");
        session.end_element("root").unwrap();
        assert_eq!(session.current_path(), "");
        assert!(session.finish().is_ok());
    }

    #[test]
    fn test_nested_buffers_capture_independently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = recording(&log, "outer", Control::Continue);
        let inner = recording(&log, "inner", Control::Continue);
        let registry = registry(&[("/a", &outer), ("/a/b", &inner)]);

        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();
        session.text("x").unwrap();
        session.start_element("b", &[]).unwrap();
        session.text("1 < 2").unwrap();
        session.end_element("b").unwrap();
        session.end_element("a").unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "inner:<b>1 &lt; 2</b>".to_string(),
                "outer:<a>x<b>1 &lt; 2</b></a>".to_string(),
            ]
        );
    }

    #[test]
    fn test_cdata_terminator_is_split() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recording(&log, "a", Control::Continue);
        let registry = registry(&[("/a", &callback)]);

        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();
        session.cdata("x]]>y");
        session.end_element("a").unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:<a><![CDATA[x]]]]><![CDATA[>y]]></a>".to_string()]
        );
    }

    #[test]
    fn test_text_terminator_is_escaped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recording(&log, "a", Control::Continue);
        let registry = registry(&[("/a", &callback)]);

        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();
        session.text("x]]>y").unwrap();
        session.end_element("a").unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:<a>x]]&gt;y</a>".to_string()]);
    }

    #[test]
    fn test_attribute_stop_stream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop = recording(&log, "stop", Control::StopStream);
        let after = recording(&log, "after", Control::Continue);
        let registry = registry(&[("/a/@x", &stop), ("/a/@x", &after), ("/a/@y", &after)]);

        let mut session = Session::new(&registry);
        let attributes = vec![
            ("x".to_string(), "1".to_string()),
            ("y".to_string(), "2".to_string()),
        ];
        let control = session.start_element("a", &attributes).unwrap();

        assert_eq!(control, Control::StopStream);
        assert_eq!(*log.lock().unwrap(), vec!["stop:x=1".to_string()]);
    }

    #[test]
    fn test_unbound_prefix_strictness() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recording(&log, "a", Control::Continue);
        let registry = registry(&[("/a", &callback)]);

        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();
        session.start_element("p:b", &[]).unwrap();
        session.end_element("p:b").unwrap();
        session.end_element("a").unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:<a><p:b></p:b></a>".to_string()]);

        let mut session = Session::new(&registry).strict_fragments(true);
        session.start_element("a", &[]).unwrap();
        session.start_element("p:b", &[]).unwrap();
        session.end_element("p:b").unwrap();
        assert!(matches!(
            session.end_element("a"),
            Err(Fault::Fragment { path, .. }) if path == "/a"
        ));
    }

    #[test]
    fn test_unclosed_element_reported() {
        let registry = CallbackRegistry::new();
        let mut session = Session::new(&registry);
        session.start_element("root", &[]).unwrap();

        assert!(matches!(session.finish(), Err(Fault::Syntax(msg)) if msg.contains("<root>")));
    }

    #[test]
    fn test_empty_document_reported() {
        let registry = CallbackRegistry::new();
        let session = Session::new(&registry);
        assert!(matches!(session.finish(), Err(Fault::Syntax(msg)) if msg == "no element found"));
    }

    #[test]
    fn test_second_root_rejected() {
        let registry = CallbackRegistry::new();
        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();
        session.end_element("a").unwrap();

        assert!(session.start_element("b", &[]).is_err());
        assert!(session.text("\n  ").is_ok());
        assert!(session.text("tail").is_err());
    }

    #[test]
    fn test_mismatched_end_rejected() {
        let registry = CallbackRegistry::new();
        let mut session = Session::new(&registry);
        session.start_element("a", &[]).unwrap();

        assert!(session.end_element("b").is_err());
    }
}
