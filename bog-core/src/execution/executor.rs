//! The executor adapter seam: one operation, `execute`, wrapping a
//! fallible downstream call. `SimulatedExecutor` is the default, replaceable
//! implementation.

use crate::core::types::{now_micros, Fill, Order};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// A failed execution attempt, classified for the pipeline's retry policy.
/// Transient errors are eligible for retry; permanent errors are not.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("transient execution failure: {0}")]
    Transient(String),
    #[error("permanent execution failure: {0}")]
    Permanent(String),
}

/// The adapter seam to downstream market connectivity. Replaceable:
/// production deployments bind a real connectivity adapter here; this core
/// only ships the simulated default.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, order: &Order) -> Result<Fill, ExecutionError>;
}

/// How the simulated executor classifies an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Simulates a small latency and a configurable failure probability,
/// classifying injected failures as transient by default. Tests that
/// need deterministic behavior use `always_fail` / `always_succeed`.
pub struct SimulatedExecutor {
    latency: Duration,
    failure_probability: f64,
    failure_kind: FailureKind,
}

impl SimulatedExecutor {
    pub fn new(latency: Duration, failure_probability: f64) -> Self {
        Self {
            latency,
            failure_probability,
            failure_kind: FailureKind::Transient,
        }
    }

    pub fn with_failure_kind(mut self, kind: FailureKind) -> Self {
        self.failure_kind = kind;
        self
    }

    pub fn always_succeed() -> Self {
        Self::new(Duration::from_millis(1), 0.0)
    }

    pub fn always_fail(kind: FailureKind) -> Self {
        Self::new(Duration::from_millis(1), 1.0).with_failure_kind(kind)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), 0.02)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, order: &Order) -> Result<Fill, ExecutionError> {
        tokio::time::sleep(self.latency).await;

        let roll: f64 = rand::thread_rng().gen();
        if roll < self.failure_probability {
            return Err(match self.failure_kind {
                FailureKind::Transient => {
                    ExecutionError::Transient("downstream temporarily unavailable".into())
                }
                FailureKind::Permanent => {
                    ExecutionError::Permanent("downstream rejected order".into())
                }
            });
        }

        Ok(Fill {
            quantity: order.quantity,
            price: order.limit_price,
            timestamp: now_micros(),
        })
    }
}
