//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound platform call:
//!     → circuit_breaker.rs (fail fast when the platform circuit is open)
//!     → retries.rs (retry transient failures with backoff)
//!     → timeouts.rs (deadline per attempt)
//!     → transport
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for transient failures, never for security rejections
//! - Circuit breaker prevents cascading failures
//! - All resilience pieces are composable async wrappers

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreakerRegistry, CircuitSettings, CircuitSnapshot, CircuitState};
pub use retries::{retry, RetryPolicy};
pub use timeouts::with_timeout;
