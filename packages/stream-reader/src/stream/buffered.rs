//! Forward-only streams over buffered readers such as stdin.

use std::io::{self, BufRead};

use super::{check_first_byte, is_xml_whitespace, StreamSource, UTF8_BOM};
use crate::error::{ReaderError, Result};

/// Stream over any `BufRead` source that cannot seek.
///
/// Validation peeks into the reader's buffer. Leading whitespace and a UTF-8
/// byte order mark are consumed while doing so; the document itself is not.
#[derive(Debug)]
pub struct BufferedXmlStream<R> {
    inner: R,
    eof: bool,
}

impl<R: BufRead> BufferedXmlStream<R> {
    /// Wrap a buffered reader, validating its first significant byte.
    pub fn new(inner: R) -> Result<Self> {
        let mut stream = Self { inner, eof: false };
        let first = stream.skip_leading_whitespace().map_err(ReaderError::Stream)?;
        check_first_byte(first)?;
        Ok(stream)
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn skip_leading_whitespace(&mut self) -> io::Result<Option<u8>> {
        let mut at_start = true;
        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(None);
            }
            if at_start {
                at_start = false;
                if available.starts_with(UTF8_BOM) {
                    self.inner.consume(UTF8_BOM.len());
                    continue;
                }
            }
            match available.iter().position(|b| !is_xml_whitespace(*b)) {
                Some(idx) => {
                    let byte = available[idx];
                    self.inner.consume(idx);
                    return Ok(Some(byte));
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> StreamSource for BufferedXmlStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = loop {
            match self.inner.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}
