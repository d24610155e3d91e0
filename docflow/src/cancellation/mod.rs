//! Cooperative cancellation for guarded operations.
//!
//! The timeout guard hands a [`CancellationToken`] to operations that spawn
//! work outside their own future, and cancels it when the deadline passes.

mod token;

pub use token::CancellationToken;
