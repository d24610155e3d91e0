//! Resilience primitives for calls to external dependencies.
//!
//! - [`TimeoutGuard`] bounds a single attempt.
//! - [`RetryPolicy`] re-invokes an operation with exponential backoff.
//! - [`CircuitBreaker`] fails fast while a dependency is unhealthy.
//! - [`GuardedCall`] composes the three for one dependency.
//!
//! Breakers are shared state; resolve them through a [`BreakerRegistry`].

mod circuit_breaker;
mod guarded;
mod registry;
mod retry;
mod timeout;

pub use circuit_breaker::{
    BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use guarded::{CallReport, GuardedCall};
pub use registry::BreakerRegistry;
pub use retry::{JitterStrategy, RetryConfig, RetryDecision, RetryPolicy};
pub use timeout::{run_with_timeout, TimeoutGuard};
