//! Execution layer - action selection, operation routing, and run scheduling.

#![warn(missing_docs)]

pub mod error;
pub mod selector;
pub mod router;
pub mod scheduler;

pub use error::{ErrorDetail, NotFoundError, RouterError, RunError};
pub use selector::{is_wildcard, select_actions, select_from_graph, Named};
pub use router::{ActionRouter, KindRouter, OperationOutcome};
pub use scheduler::{ActionOutcome, FailurePolicy, RunConfig, RunReport, Scheduler};
