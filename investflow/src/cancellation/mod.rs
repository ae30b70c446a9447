//! Cooperative cancellation of a running plan.

mod token;

pub use token::{CancelCallback, CancellationToken};
