//! The composition root: wires the event log, position store, risk engine,
//! idempotency index, circuit breaker, execution pipeline and order
//! coordinator into a single handle.
//!
//! An explicit, constructible struct rather than module-global singletons:
//! every dependency is an `Arc`, nothing is reached for through a `static`.

use crate::core::errors::CoordinatorError;
use crate::core::types::{OrderId, SubmitRequest};
use crate::coordinator::{OrderCoordinator, SubmitResponse};
use crate::event_log::EventLog;
use crate::execution::{Executor, ExecutionPipeline, PipelineConfig};
use crate::idempotency::IdempotencyIndex;
use crate::position::PositionStore;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::risk::RiskConfig;
use crate::risk::RiskEngine;
use std::sync::Arc;

/// Configuration needed to assemble an [`Engine`]. Everything downstream of
/// identifier and event generation is parameterized here rather than hidden
/// behind compile-time Cargo features.
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub pipeline: PipelineConfig,
    pub event_log_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            pipeline: PipelineConfig::default(),
            event_log_capacity: None,
        }
    }
}

/// The trading control core, assembled once at process start and shared as
/// an `Arc<Engine>` by every caller-facing adapter (HTTP, CLI, in-process
/// test harness).
pub struct Engine {
    pub event_log: Arc<EventLog>,
    pub positions: Arc<PositionStore>,
    pub risk: Arc<RiskEngine>,
    pub idempotency: Arc<IdempotencyIndex>,
    pub breaker: Arc<CircuitBreaker>,
    pub coordinator: Arc<OrderCoordinator>,
}

impl Engine {
    pub fn new(executor: Arc<dyn Executor>, config: EngineConfig) -> Self {
        let event_log = Arc::new(match config.event_log_capacity {
            Some(capacity) => EventLog::new(Box::new(
                crate::event_log::InMemoryEventStore::with_capacity(capacity),
            )),
            None => EventLog::in_memory(),
        });
        let positions = Arc::new(PositionStore::new());
        let risk = Arc::new(RiskEngine::new(positions.clone(), event_log.clone(), config.risk));
        let idempotency = Arc::new(IdempotencyIndex::new());
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));
        let pipeline = Arc::new(ExecutionPipeline::new(
            executor,
            breaker.clone(),
            positions.clone(),
            event_log.clone(),
            config.pipeline,
        ));
        let coordinator = Arc::new(OrderCoordinator::new(
            event_log.clone(),
            risk.clone(),
            idempotency.clone(),
            pipeline,
        ));

        Self {
            event_log,
            positions,
            risk,
            idempotency,
            breaker,
            coordinator,
        }
    }

    /// Convenience delegate so callers don't need to reach through
    /// `engine.coordinator` for the common case.
    pub async fn submit(
        &self,
        request: SubmitRequest,
        user_id: &str,
    ) -> Result<SubmitResponse, CoordinatorError> {
        self.coordinator.submit(request, user_id).await
    }

    pub fn order(&self, order_id: OrderId) -> Option<crate::core::types::Order> {
        self.coordinator.get(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use crate::execution::SimulatedExecutor;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn end_to_end_submission_reaches_executed_and_updates_position() {
        let executor = Arc::new(SimulatedExecutor::always_succeed());
        let engine = Engine::new(executor, EngineConfig::default());

        let request = SubmitRequest {
            client_order_id: None,
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: dec!(10),
            limit_price: dec!(150),
            strategy: "demo".into(),
        };

        let response = engine.submit(request, "trader1").await.unwrap();
        let order_id = match response {
            SubmitResponse::Approved { order_id, .. } => order_id,
            other => panic!("expected Approved, got {other:?}"),
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let order = engine.order(order_id).unwrap();
        assert_eq!(order.status, crate::core::types::OrderStatus::Executed);

        let position = engine.positions.position("AAPL").unwrap();
        assert_eq!(position.quantity, dec!(10));
    }

    #[tokio::test]
    async fn kill_switch_rejects_new_submissions() {
        let executor = Arc::new(SimulatedExecutor::always_succeed());
        let engine = Engine::new(executor, EngineConfig::default());
        engine.risk.set_kill_switch(true, "ops1").unwrap();

        let request = SubmitRequest {
            client_order_id: None,
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: dec!(10),
            limit_price: dec!(150),
            strategy: "demo".into(),
        };

        let response = engine.submit(request, "trader1").await.unwrap();
        assert!(matches!(response, SubmitResponse::Rejected { .. }));
    }
}
