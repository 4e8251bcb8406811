//! Configuration constants, runtime options and validation functions.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{ReaderError, Result};

/// Default number of bytes requested from a stream per read (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Smallest chunk size accepted by [`ReaderOptions::with_chunk_size`].
pub const MIN_CHUNK_SIZE: usize = 64;

/// Pause between polls when a stream reports "no data yet".
///
/// Zero means the reader only yields the thread between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::ZERO;

/// Path pattern grammar: one or more element segments, optionally followed by
/// a single attribute segment.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/[A-Za-z][A-Za-z0-9_-]*)+(/@[A-Za-z][A-Za-z0-9_-]*)?$").expect("valid regex")
});

/// Validate a path pattern.
///
/// # Arguments
/// * `path` - Slash-separated element path, optionally ending in `/@attribute`
///
/// # Returns
/// * `Ok(())` if the path matches the grammar
/// * `Err(ReaderError::InvalidPath)` otherwise
///
/// # Examples
/// ```
/// use xml_path_stream::config::validate_path;
///
/// assert!(validate_path("/catalog/book").is_ok());
/// assert!(validate_path("/catalog/book/@id").is_ok());
/// assert!(validate_path("/catalog/*").is_err());
/// assert!(validate_path("/catalog/book[1]").is_err());
/// ```
pub fn validate_path(path: &str) -> Result<()> {
    if PATH_PATTERN.is_match(path) {
        Ok(())
    } else {
        Err(ReaderError::InvalidPath(path.to_string()))
    }
}

/// Runtime options for a dispatch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Bytes requested from the stream per read.
    pub chunk_size: usize,
    /// Pause between polls of a stream that has no data yet.
    pub poll_interval: Duration,
    /// Fail the session when a captured fragment does not parse standalone,
    /// instead of delivering it with unresolved prefixes left as written.
    pub strict_fragments: bool,
}

impl ReaderOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            strict_fragments: false,
        }
    }

    /// Set the chunk size, clamped to [`MIN_CHUNK_SIZE`].
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Choose between failing and recovering on fragments that do not parse.
    #[must_use]
    pub fn with_strict_fragments(mut self, strict: bool) -> Self {
        self.strict_fragments = strict;
        self
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::new()
    }
}
