//! Byte sources the dispatcher pulls XML from.
//!
//! A [`StreamSource`] hands out chunks on request and reports whether the end
//! has been reached. Both bundled sources check at construction that the
//! content can be XML at all: the first byte after leading whitespace (and an
//! optional UTF-8 byte order mark) must be `<`.

mod buffered;
mod seekable;

use std::io;

use crate::error::{ReaderError, Result};

pub use buffered::BufferedXmlStream;
pub use seekable::{FileXmlStream, XmlStream};

/// UTF-8 byte order mark.
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A chunked byte source.
///
/// `read` may return fewer bytes than requested. Returning `0` while
/// `is_eof()` is `false` means "no data yet": the dispatcher keeps polling.
/// Returning `0` once `is_eof()` is `true` ends the session.
pub trait StreamSource {
    /// Read up to `buf.len()` bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether the end of the stream has been reached.
    fn is_eof(&self) -> bool;

    /// Move back to the start of the stream, if the source supports it.
    fn rewind(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream cannot be rewound",
        ))
    }
}

/// XML whitespace as allowed before the document element.
pub(crate) fn is_xml_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Check the first significant byte of a stream.
pub(crate) fn check_first_byte(first: Option<u8>) -> Result<()> {
    match first {
        Some(b'<') => Ok(()),
        Some(byte) => Err(ReaderError::InvalidStream(format!(
            "does not start with '<' (found {:?})",
            char::from(byte)
        ))),
        None => Err(ReaderError::InvalidStream("stream is empty".to_string())),
    }
}
