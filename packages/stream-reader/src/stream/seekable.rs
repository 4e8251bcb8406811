//! Rewindable streams over files and other seekable readers.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::{check_first_byte, is_xml_whitespace, StreamSource, UTF8_BOM};
use crate::error::{ReaderError, Result};

/// Stream over a file on disk.
pub type FileXmlStream = XmlStream<File>;

/// Stream over any `Read + Seek` source.
///
/// Validation reads ahead and rewinds, so nothing the dispatcher sees is lost.
#[derive(Debug)]
pub struct XmlStream<R> {
    inner: R,
    eof: bool,
}

impl XmlStream<File> {
    /// Open a file as an XML stream.
    ///
    /// # Errors
    /// * `StreamUnavailable` if the file cannot be opened for reading
    /// * `InvalidStream` if it does not start with `<`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReaderError::StreamUnavailable {
            source_name: format!("\"{}\"", path.display()),
            source,
        })?;
        let metadata = file
            .metadata()
            .map_err(|source| ReaderError::StreamUnavailable {
                source_name: format!("\"{}\"", path.display()),
                source,
            })?;
        if !metadata.is_file() {
            return Err(ReaderError::StreamUnavailable {
                source_name: format!("\"{}\"", path.display()),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        tracing::debug!(path = %path.display(), "opened file stream");
        Self::new(file)
    }
}

impl<R: Read + Seek> XmlStream<R> {
    /// Wrap a seekable reader, validating its first significant byte.
    pub fn new(inner: R) -> Result<Self> {
        let mut stream = Self { inner, eof: false };
        stream.validate()?;
        Ok(stream)
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn validate(&mut self) -> Result<()> {
        self.rewind().map_err(ReaderError::Stream)?;
        let first = first_significant_byte(&mut self.inner).map_err(ReaderError::Stream)?;
        self.rewind().map_err(ReaderError::Stream)?;
        check_first_byte(first)
    }
}

impl<R: Read + Seek> StreamSource for XmlStream<R> {
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

    fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.eof = false;
        Ok(())
    }
}

/// First byte that is neither whitespace nor part of a leading BOM.
fn first_significant_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 512];
    let mut at_start = true;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let mut chunk = &buf[..n];
        if at_start {
            chunk = chunk.strip_prefix(UTF8_BOM).unwrap_or(chunk);
            at_start = false;
        }
        if let Some(&byte) = chunk.iter().find(|b| !is_xml_whitespace(**b)) {
            return Ok(Some(byte));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn stream(content: &str) -> Result<XmlStream<Cursor<Vec<u8>>>> {
        XmlStream::new(Cursor::new(content.as_bytes().to_vec()))
    }

    fn read_all(stream: &mut impl StreamSource) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 && stream.is_eof() {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_accepts_xml() {
        assert!(stream("<root/>").is_ok());
        assert!(stream("  \n\t<root/>").is_ok());
        assert!(stream("<?xml version=\"1.0\"?><root/>").is_ok());
        assert!(stream("\u{feff}<root/>").is_ok());
    }

    #[test]
    fn test_rejects_non_xml() {
        assert!(matches!(
            stream("hello <root/>"),
            Err(ReaderError::InvalidStream(_))
        ));
        assert!(matches!(stream("{}"), Err(ReaderError::InvalidStream(_))));
        assert!(matches!(stream(""), Err(ReaderError::InvalidStream(_))));
        assert!(matches!(stream("   \n"), Err(ReaderError::InvalidStream(_))));
    }

    #[test]
    fn test_validation_does_not_consume() {
        let mut stream = stream("  <root>text</root>").unwrap();
        assert!(!stream.is_eof());
        assert_eq!(read_all(&mut stream), b"  <root>text</root>");
        assert!(stream.is_eof());
    }

    #[test]
    fn test_rewind() {
        let mut stream = stream("<a/>").unwrap();
        assert_eq!(read_all(&mut stream), b"<a/>");
        stream.rewind().unwrap();
        assert!(!stream.is_eof());
        assert_eq!(read_all(&mut stream), b"<a/>");
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<root><child/></root>").unwrap();

        let mut stream = XmlStream::open(file.path()).unwrap();
        assert_eq!(read_all(&mut stream), b"<root><child/></root>");
    }

    #[test]
    fn test_open_missing_file() {
        let result = XmlStream::open("/definitely/not/here.xml");
        assert!(matches!(
            result,
            Err(ReaderError::StreamUnavailable { .. })
        ));
    }

    #[test]
    fn test_open_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = XmlStream::open(dir.path());
        assert!(matches!(
            result,
            Err(ReaderError::StreamUnavailable { .. })
        ));
    }

    #[test]
    fn test_open_non_xml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name,value\n").unwrap();

        let result = XmlStream::open(file.path());
        assert!(matches!(result, Err(ReaderError::InvalidStream(_))));
    }
}
