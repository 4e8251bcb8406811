//! Streaming path dispatcher.
//!
//! [`XmlStreamReader`] pulls a document from a [`StreamSource`] in chunks,
//! tracks the path of the innermost open element and hands every registered
//! element subtree or attribute to its callbacks as soon as it is complete.

mod buffer;
mod input;
mod session;

use std::io;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::config::ReaderOptions;
use crate::error::{ReaderError, Result};
use crate::path::XmlPath;
use crate::registry::{Callback, CallbackRegistry, Control};
use crate::stream::StreamSource;

use self::input::ChunkedInput;
use self::session::{Fault, Session};

/// How a dispatch session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The stream was read to the end.
    Completed,
    /// A callback returned [`Control::StopStream`].
    Stopped,
    /// Nothing was registered, so the stream was not touched.
    Skipped,
}

/// Statistics about a finished dispatch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub outcome: Outcome,
    /// Start tags seen, including empty elements.
    pub elements: u64,
    /// Callback invocations.
    pub payloads: u64,
    pub bytes_read: u64,
}

impl DispatchSummary {
    fn skipped() -> Self {
        Self {
            outcome: Outcome::Skipped,
            elements: 0,
            payloads: 0,
            bytes_read: 0,
        }
    }
}

/// Dispatches XML subtrees and attributes to callbacks by path.
///
/// # Examples
/// ```
/// use std::io::Cursor;
/// use std::sync::{Arc, Mutex};
/// use xml_path_stream::{Callback, Control, Payload, XmlPath, XmlStream, XmlStreamReader};
///
/// let titles = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&titles);
/// let callback = Callback::from_fn(move |payload: &Payload| {
///     if let Some(element) = payload.as_element() {
///         sink.lock().unwrap().push(element.text_content());
///     }
///     Control::Continue
/// });
///
/// let mut reader = XmlStreamReader::new();
/// reader.register_callback(&XmlPath::new("/catalog/book/title").unwrap(), &callback);
///
/// let xml = "<catalog><book><title>Dune</title></book><book><title>Emma</title></book></catalog>";
/// let mut stream = XmlStream::new(Cursor::new(xml)).unwrap();
/// reader.dispatch(&mut stream).unwrap();
///
/// assert_eq!(*titles.lock().unwrap(), vec!["Dune", "Emma"]);
/// ```
#[derive(Debug, Default)]
pub struct XmlStreamReader {
    registry: CallbackRegistry,
    options: ReaderOptions,
}

impl XmlStreamReader {
    /// Create a reader with an empty registry and default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ReaderOptions::default())
    }

    #[must_use]
    pub fn with_options(options: ReaderOptions) -> Self {
        Self {
            registry: CallbackRegistry::new(),
            options,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Register a callback for a path.
    ///
    /// Registering the same callback twice for one path has no effect.
    pub fn register_callback(&mut self, path: &XmlPath, callback: &Callback) -> &mut Self {
        if !self.registry.register(path.clone(), callback) {
            tracing::debug!(path = %path, "callback already registered");
        }
        self
    }

    /// Remove a callback from `path`, or from every path when `path` is `None`.
    pub fn deregister_callback(&mut self, callback: &Callback, path: Option<&XmlPath>) -> &mut Self {
        self.registry.deregister(callback, path);
        self
    }

    /// Remove a path with all of its callbacks.
    pub fn deregister_path(&mut self, path: &XmlPath) -> &mut Self {
        self.registry.deregister_path(path);
        self
    }

    /// Read `stream` to the end, invoking callbacks for registered paths.
    ///
    /// # Arguments
    /// * `stream` - Source of the XML document
    ///
    /// # Returns
    /// * `Ok(DispatchSummary)` once the stream is exhausted, a callback
    ///   stopped the session, or nothing is registered
    /// * `Err(ReaderError::Parse)` for malformed XML
    /// * `Err(ReaderError::Stream)` if reading from the stream fails
    /// * `Err(ReaderError::Fragment)` if a captured subtree cannot be parsed;
    ///   with lenient fragments only markup that is not well-formed fails
    ///
    /// # Errors
    /// Any error ends the session; the reader itself stays usable.
    pub fn dispatch<S: StreamSource + ?Sized>(&mut self, stream: &mut S) -> Result<DispatchSummary> {
        if self.registry.is_empty() {
            tracing::debug!("no callbacks registered, skipping stream");
            return Ok(DispatchSummary::skipped());
        }

        let span = tracing::debug_span!("dispatch", paths = self.registry.len());
        let _guard = span.enter();

        let input = ChunkedInput::new(stream, &self.options);
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);

        let mut session =
            Session::new(&self.registry).strict_fragments(self.options.strict_fragments);
        let mut buf = Vec::new();

        let outcome = loop {
            let event_start = reader.buffer_position();
            reader.get_mut().settle_lines(event_start);

            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(err)) => return Err(ReaderError::Stream(owned_io_error(err))),
                Err(err) => {
                    let line = reader.get_ref().line_at(reader.error_position());
                    return Err(parse_error(line, err.to_string()));
                }
            };

            let step = match event {
                Event::Start(start) => start_element(&mut session, &start),
                Event::Empty(start) => match start_element(&mut session, &start) {
                    Ok(Control::StopStream) => Ok(Control::StopStream),
                    Ok(_) => decode_name(&start).and_then(|name| session.end_element(name)),
                    Err(fault) => Err(fault),
                },
                Event::End(end) => std::str::from_utf8(end.name().into_inner())
                    .map_err(Fault::from)
                    .and_then(|name| session.end_element(name)),
                Event::Text(text) => text
                    .unescape()
                    .map_err(Fault::from)
                    .and_then(|text| session.text(&text))
                    .map(|()| Control::Continue),
                Event::CData(cdata) => std::str::from_utf8(&cdata)
                    .map(|content| session.cdata(content))
                    .map(|()| Control::Continue)
                    .map_err(Fault::from),
                Event::Comment(comment) => std::str::from_utf8(&comment)
                    .map(|content| session.markup(&format!("<!--{content}-->")))
                    .map(|()| Control::Continue)
                    .map_err(Fault::from),
                Event::PI(pi) => std::str::from_utf8(&pi)
                    .map(|content| session.markup(&format!("<?{content}?>")))
                    .map(|()| Control::Continue)
                    .map_err(Fault::from),
                Event::Eof => match session.finish() {
                    Ok(()) => break Outcome::Completed,
                    Err(fault) => Err(fault),
                },
                // Declarations and doctypes carry nothing to dispatch.
                _ => Ok(Control::Continue),
            };

            match step {
                Ok(Control::StopStream) => {
                    tracing::debug!(path = %session.current_path(), "stream processing stopped by callback");
                    break Outcome::Stopped;
                }
                Ok(_) => {}
                Err(fault) => {
                    let line = reader.get_ref().line_at(event_start);
                    return Err(fault_to_error(fault, line));
                }
            }
            buf.clear();
        };

        let summary = DispatchSummary {
            outcome,
            elements: session.elements(),
            payloads: session.payloads(),
            bytes_read: reader.get_ref().bytes_read(),
        };
        tracing::debug!(
            outcome = ?summary.outcome,
            elements = summary.elements,
            payloads = summary.payloads,
            bytes = summary.bytes_read,
            "dispatch finished"
        );
        Ok(summary)
    }
}

fn decode_name<'a>(start: &'a BytesStart<'_>) -> std::result::Result<&'a str, Fault> {
    Ok(std::str::from_utf8(start.name().into_inner())?)
}

fn start_element(session: &mut Session<'_>, start: &BytesStart<'_>) -> std::result::Result<Control, Fault> {
    let name = decode_name(start)?;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    session.start_element(name, &attributes)
}

fn parse_error(line: u64, message: String) -> ReaderError {
    ReaderError::Parse { line, message }
}

fn fault_to_error(fault: Fault, line: u64) -> ReaderError {
    match fault {
        Fault::Syntax(message) => parse_error(line, message),
        Fault::Fragment { path, source } => ReaderError::Fragment { path, source },
    }
}

fn owned_io_error(err: Arc<io::Error>) -> io::Error {
    Arc::try_unwrap(err).unwrap_or_else(|shared| io::Error::new(shared.kind(), shared.to_string()))
}
