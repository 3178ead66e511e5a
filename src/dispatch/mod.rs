//! Off-caller dispatch of payment submissions.

pub mod context;
pub mod executor;

pub use context::{RequestContext, with_context};
pub use executor::BoundedExecutor;
