//! Chunked pull input feeding the tokenizer.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};
use std::time::Duration;

use crate::config::{ReaderOptions, MIN_CHUNK_SIZE};
use crate::stream::StreamSource;

/// Maps stream offsets to 1-based line numbers.
///
/// Newlines before the start of the current event are folded into a counter,
/// only newer ones are kept individually.
#[derive(Debug, Default)]
pub(crate) struct LineIndex {
    settled: u64,
    pending: VecDeque<u64>,
}

impl LineIndex {
    /// Record the newlines of `bytes`, which start at stream offset `offset`.
    pub(crate) fn record(&mut self, offset: u64, bytes: &[u8]) {
        self.pending
            .extend(memchr::memchr_iter(b'\n', bytes).map(|idx| offset + idx as u64));
    }

    /// Fold all newlines before `offset` into the counter.
    pub(crate) fn settle(&mut self, offset: u64) {
        while let Some(&newline) = self.pending.front() {
            if newline >= offset {
                break;
            }
            self.settled += 1;
            self.pending.pop_front();
        }
    }

    /// Line number of the byte at `offset`.
    pub(crate) fn line_at(&self, offset: u64) -> u64 {
        let pending = self
            .pending
            .iter()
            .take_while(|&&newline| newline < offset)
            .count() as u64;
        1 + self.settled + pending
    }
}

/// `BufRead` adapter pulling fixed-size chunks from a [`StreamSource`].
///
/// An empty read that is not at end of stream is treated as "no data yet"
/// and polled again; an empty read at end of stream ends the input.
pub(crate) struct ChunkedInput<'s, S: ?Sized> {
    source: &'s mut S,
    chunk: Vec<u8>,
    pos: usize,
    chunk_offset: u64,
    chunk_size: usize,
    poll_interval: Duration,
    exhausted: bool,
    bytes_read: u64,
    lines: LineIndex,
}

impl<'s, S: StreamSource + ?Sized> ChunkedInput<'s, S> {
    /// Chunk sizes below [`MIN_CHUNK_SIZE`] are raised to it; an empty chunk
    /// could never make progress.
    pub(crate) fn new(source: &'s mut S, options: &ReaderOptions) -> Self {
        Self {
            source,
            chunk: Vec::new(),
            pos: 0,
            chunk_offset: 0,
            chunk_size: options.chunk_size.max(MIN_CHUNK_SIZE),
            poll_interval: options.poll_interval,
            exhausted: false,
            bytes_read: 0,
            lines: LineIndex::default(),
        }
    }

    /// Total number of bytes pulled from the source.
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Line number of the byte at stream offset `offset`.
    pub(crate) fn line_at(&self, offset: u64) -> u64 {
        self.lines.line_at(offset)
    }

    /// Forget line bookkeeping before `offset`.
    pub(crate) fn settle_lines(&mut self, offset: u64) {
        self.lines.settle(offset);
    }

    fn fetch(&mut self) -> io::Result<()> {
        self.chunk_offset += self.chunk.len() as u64;
        self.chunk.clear();
        self.pos = 0;
        self.chunk.resize(self.chunk_size, 0);

        let n = match self.source.read(&mut self.chunk) {
            Ok(n) => n,
            Err(e) => {
                self.chunk.clear();
                return Err(e);
            }
        };
        self.chunk.truncate(n);

        if n > 0 {
            self.bytes_read += n as u64;
            self.lines.record(self.chunk_offset, &self.chunk);
            tracing::trace!(bytes = n, offset = self.chunk_offset, "read chunk");
        } else if self.source.is_eof() {
            self.exhausted = true;
            tracing::trace!(total = self.bytes_read, "end of stream");
        } else if self.poll_interval.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.poll_interval);
        }
        Ok(())
    }
}

impl<S: StreamSource + ?Sized> BufRead for ChunkedInput<'_, S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.chunk.len() && !self.exhausted {
            self.fetch()?;
        }
        Ok(&self.chunk[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.chunk.len());
    }
}

impl<S: StreamSource + ?Sized> Read for ChunkedInput<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source yielding scripted reads; `None` is an empty "not yet" read.
    struct Scripted {
        reads: VecDeque<Option<&'static [u8]>>,
        eof: bool,
        calls: usize,
    }

    impl Scripted {
        fn new(reads: Vec<Option<&'static [u8]>>) -> Self {
            Self {
                reads: reads.into(),
                eof: false,
                calls: 0,
            }
        }
    }

    impl StreamSource for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.reads.pop_front() {
                Some(Some(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(None) => Ok(0),
                None => {
                    self.eof = true;
                    Ok(0)
                }
            }
        }

        fn is_eof(&self) -> bool {
            self.eof
        }
    }

    #[test]
    fn test_line_index() {
        let mut lines = LineIndex::default();
        lines.record(0, b"ab\ncd\n");
        lines.record(6, b"ef\ng");

        assert_eq!(lines.line_at(0), 1);
        assert_eq!(lines.line_at(2), 1);
        assert_eq!(lines.line_at(3), 2);
        assert_eq!(lines.line_at(6), 3);
        assert_eq!(lines.line_at(9), 4);

        lines.settle(6);
        assert_eq!(lines.line_at(6), 3);
        assert_eq!(lines.line_at(9), 4);
    }

    #[test]
    fn test_polls_through_empty_reads() {
        let mut source = Scripted::new(vec![None, Some(b"<a>"), None, None, Some(b"</a>")]);
        let options = ReaderOptions::default().with_chunk_size(64);
        let mut input = ChunkedInput::new(&mut source, &options);

        let mut out = Vec::new();
        input.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"<a></a>");
        assert_eq!(input.bytes_read(), 7);
        drop(input);
        assert_eq!(source.calls, 6);
    }

    #[test]
    fn test_lines_across_chunks() {
        let mut source = Scripted::new(vec![Some(b"<a>\n<b>"), Some(b"\n\n</b>")]);
        let options = ReaderOptions::default();
        let mut input = ChunkedInput::new(&mut source, &options);

        let mut out = Vec::new();
        input.read_to_end(&mut out).unwrap();

        assert_eq!(input.line_at(0), 1);
        assert_eq!(input.line_at(4), 2);
        assert_eq!(input.line_at(9), 4);
    }

    #[test]
    fn test_zero_chunk_size_still_progresses() {
        let mut source = Scripted::new(vec![Some(b"<a></a>")]);
        let options = ReaderOptions {
            chunk_size: 0,
            poll_interval: Duration::ZERO,
            strict_fragments: false,
        };
        let mut input = ChunkedInput::new(&mut source, &options);

        let mut out = Vec::new();
        input.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"<a></a>");
        assert_eq!(input.chunk_size, MIN_CHUNK_SIZE);
    }

    #[test]
    fn test_read_error_propagates() {
        struct Failing;

        impl StreamSource for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }

            fn is_eof(&self) -> bool {
                false
            }
        }

        let mut source = Failing;
        let options = ReaderOptions::default();
        let mut input = ChunkedInput::new(&mut source, &options);

        let err = input.fill_buf().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
