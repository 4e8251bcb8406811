//! Callback registry mapping path patterns to ordered callback lists.

use std::collections::HashMap;

use super::handler::Callback;
use crate::path::XmlPath;

/// Registry mapping path patterns to callbacks.
///
/// Each path keeps its callbacks in registration order, which is also the
/// order they fire in. A callback is stored at most once per path; paths
/// whose last callback is removed disappear from the registry.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<XmlPath, Vec<Callback>>,
}

impl CallbackRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }

    /// Register a callback for a path.
    ///
    /// Returns `false` if the callback was already registered for the path.
    pub fn register(&mut self, path: XmlPath, callback: &Callback) -> bool {
        let callbacks = self.callbacks.entry(path).or_default();
        if callbacks.iter().any(|existing| existing.same(callback)) {
            return false;
        }
        callbacks.push(callback.clone());
        true
    }

    /// Remove a callback from one path, or from every path when `path` is `None`.
    pub fn deregister(&mut self, callback: &Callback, path: Option<&XmlPath>) {
        match path {
            Some(path) => {
                if let Some(callbacks) = self.callbacks.get_mut(path) {
                    callbacks.retain(|existing| !existing.same(callback));
                }
            }
            None => {
                for callbacks in self.callbacks.values_mut() {
                    callbacks.retain(|existing| !existing.same(callback));
                }
            }
        }
        self.callbacks.retain(|_, callbacks| !callbacks.is_empty());
    }

    /// Remove a path together with all of its callbacks.
    pub fn deregister_path(&mut self, path: &XmlPath) {
        self.callbacks.remove(path);
    }

    /// Callbacks registered for exactly `path`, in firing order.
    #[must_use]
    pub fn lookup(&self, path: &str) -> &[Callback] {
        self.callbacks.get(path).map_or(&[], Vec::as_slice)
    }

    /// Check if any callback is registered for exactly `path`.
    #[must_use]
    pub fn is_registered(&self, path: &str) -> bool {
        self.callbacks.contains_key(path)
    }

    /// Check if `callback` is registered for `path`.
    #[must_use]
    pub fn contains(&self, path: &XmlPath, callback: &Callback) -> bool {
        self.lookup(path.as_str())
            .iter()
            .any(|existing| existing.same(callback))
    }

    /// Check if the registry has no paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// All registered paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&XmlPath> {
        let mut paths: Vec<_> = self.callbacks.keys().collect();
        paths.sort();
        paths
    }
}
