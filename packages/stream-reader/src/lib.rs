//! xml-path-stream - Dispatch parts of large XML documents by path while streaming.
//!
//! This crate reads an XML document chunk by chunk and hands every element
//! subtree or attribute whose absolute path has been registered to the
//! callbacks registered for it, without ever building the whole document in
//! memory.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use xml_path_stream::{Callback, Control, XmlPath, XmlStream, XmlStreamReader};
//!
//! let mut reader = XmlStreamReader::new();
//! reader.register_callback(
//!     &XmlPath::new("/feed/entry/@id").unwrap(),
//!     &Callback::from_fn(|payload| {
//!         println!("entry {}", payload.as_attribute().map_or("", |a| a.value()));
//!         Control::Continue
//!     }),
//! );
//!
//! let mut stream = XmlStream::new(Cursor::new(r#"<feed><entry id="1"/></feed>"#)).unwrap();
//! let summary = reader.dispatch(&mut stream).unwrap();
//! assert_eq!(summary.payloads, 1);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration constants, options and path validation
//! - [`error`]: Error types and Result alias
//! - [`path`]: Validated path patterns
//! - [`registry`]: Callbacks and the path → callback registry
//! - [`stream`]: Stream sources the dispatcher pulls from
//! - [`payload`]: What callbacks receive
//! - [`materialize`]: Fragment markup to payload conversion
//! - [`dispatcher`]: The streaming dispatcher
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod materialize;
pub mod path;
pub mod payload;
pub mod registry;
pub mod stream;

// Re-export commonly used items
pub use config::{validate_path, ReaderOptions};
pub use dispatcher::{DispatchSummary, Outcome, XmlStreamReader};
pub use error::{ReaderError, Result};
pub use path::XmlPath;
pub use payload::{Attribute, Element, Fragment, Namespace, Node, Payload};
pub use registry::{Callback, CallbackRegistry, Control, PathHandler};
pub use stream::{BufferedXmlStream, FileXmlStream, StreamSource, XmlStream};
