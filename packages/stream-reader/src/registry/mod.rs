//! Callback registry for path-based dispatch.
//!
//! Callbacks are registered for exact element or attribute paths. The
//! dispatcher looks paths up by their string form while streaming and fires
//! the callbacks of a path in the order they were registered.

mod core;
mod handler;

pub use self::core::CallbackRegistry;
pub use handler::{Callback, Control, PathHandler};
