//! Path handler trait and callback handles.

use std::fmt;
use std::sync::Arc;

use crate::payload::Payload;

/// Signal returned by a callback after it has seen a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Keep going: run the next callback for this path.
    #[default]
    Continue,
    /// Skip the remaining callbacks for this occurrence of the path.
    StopPath,
    /// Abort the whole dispatch session.
    StopStream,
}

/// Trait for path handlers.
///
/// Handlers receive a payload for every occurrence of the path they are
/// registered on and tell the dispatcher how to proceed. Plain closures
/// `Fn(&Payload) -> Control` implement this trait.
pub trait PathHandler: Send + Sync {
    /// Process the payload and return the control signal.
    fn handle(&self, payload: &Payload) -> Control;
}

impl<F> PathHandler for F
where
    F: Fn(&Payload) -> Control + Send + Sync,
{
    fn handle(&self, payload: &Payload) -> Control {
        self(payload)
    }
}

/// Shared handle to a registered handler.
///
/// Identity is the handle's allocation: clones of one `Callback` are the same
/// callback, two `Callback`s built from equal closures are not.
#[derive(Clone)]
pub struct Callback(Arc<dyn PathHandler>);

impl Callback {
    /// Wrap a handler.
    #[must_use]
    pub fn new(handler: impl PathHandler + 'static) -> Self {
        Self(Arc::new(handler))
    }

    /// Wrap a closure.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Payload) -> Control + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Whether both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Callback) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Invoke the handler.
    pub fn call(&self, payload: &Payload) -> Control {
        self.0.handle(payload)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
