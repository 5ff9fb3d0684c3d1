//! Resilience patterns guarding the execution pipeline.

pub mod circuit_breaker;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, Outcome};
