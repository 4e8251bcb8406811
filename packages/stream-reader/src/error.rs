//! Error types for the stream reader.
//!
//! A single `ReaderError` covers the three failure classes callers see:
//! invalid path patterns (construction time), unusable streams (construction
//! time) and malformed XML (surfaced from `dispatch`).

use thiserror::Error;

/// Main error type for the stream reader library.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Path pattern does not match the path grammar.
    #[error("Invalid path '{0}'. Expected /segment[/segment...][/@attribute] (e.g., /catalog/book/@id)")]
    InvalidPath(String),

    /// Stream content cannot be XML.
    #[error("Stream is no valid XML document: {0}")]
    InvalidStream(String),

    /// Stream source could not be opened.
    #[error("Stream {source_name} is not readable: {source}")]
    StreamUnavailable {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an open stream failed mid-session.
    #[error("Failed to read from stream: {0}")]
    Stream(#[source] std::io::Error),

    /// Malformed XML encountered while dispatching.
    #[error("{message} At line: {line}")]
    Parse { line: u64, message: String },

    /// A buffered fragment could not be turned into a payload.
    #[error("Failed to materialize fragment for {path}: {source}")]
    Fragment {
        path: String,
        #[source]
        source: roxmltree::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error.
    #[error("YAML serialization failed: {0}")]
    YamlSerialization(#[from] serde_yaml_ng::Error),
}

impl ReaderError {
    /// Line number reported by a parse error, if this is one.
    #[must_use]
    pub fn line(&self) -> Option<u64> {
        match self {
            Self::Parse { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;
