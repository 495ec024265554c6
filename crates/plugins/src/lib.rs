//! Plugin handlers
//!
//! The handler trait providers implement, the registry the router looks
//! handlers up in, and the built-in `exec` provider.

#![warn(missing_docs)]

pub mod handler;
pub mod registry;
pub mod builtin;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use handler::{ActionHandler, HandlerKey, HandlerParams};
pub use registry::{required_handlers, HandlerRegistry, RegistryError};
pub use builtin::{register_exec, EXEC_TYPE};
