//! Validated path patterns.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::config::validate_path;
use crate::error::{ReaderError, Result};

/// Separator between an element path and its attribute segment.
pub(crate) const ATTRIBUTE_SEPARATOR: &str = "/@";

/// An exact element or attribute location in a document.
///
/// Element paths look like `/catalog/book`, attribute paths like
/// `/catalog/book/@id`. The string is validated once at construction and
/// never changes afterwards; two paths are equal when their strings are.
///
/// # Examples
/// ```
/// use xml_path_stream::XmlPath;
///
/// let path = XmlPath::new("/catalog/book/@id").unwrap();
/// assert_eq!(path.as_str(), "/catalog/book/@id");
/// assert!(path.is_attribute());
/// assert_eq!(path.element_path(), "/catalog/book");
/// assert_eq!(path.attribute_name(), Some("id"));
///
/// assert!(XmlPath::new("/catalog/book[1]").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XmlPath {
    path: String,
}

impl XmlPath {
    /// Create a path, failing with `ReaderError::InvalidPath` on bad syntax.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self { path })
    }

    /// The canonical path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether this path addresses an attribute.
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        self.path.contains(ATTRIBUTE_SEPARATOR)
    }

    /// The element part of the path (the whole path for element paths).
    #[must_use]
    pub fn element_path(&self) -> &str {
        match self.path.find(ATTRIBUTE_SEPARATOR) {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }

    /// The attribute name for attribute paths.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        self.path
            .find(ATTRIBUTE_SEPARATOR)
            .map(|idx| &self.path[idx + ATTRIBUTE_SEPARATOR.len()..])
    }

    /// Number of element segments in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.element_path().matches('/').count()
    }
}

impl fmt::Display for XmlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for XmlPath {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for XmlPath {
    type Error = ReaderError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for XmlPath {
    type Error = ReaderError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl AsRef<str> for XmlPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

// Hash and Eq are derived from the single `path` field, so lookups by `&str`
// agree with lookups by `XmlPath`.
impl Borrow<str> for XmlPath {
    fn borrow(&self) -> &str {
        &self.path
    }
}
