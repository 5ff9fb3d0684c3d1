//! The order coordinator: the single writer for order lifecycle
//! events, driving each order through the state machine and handing
//! approved orders to the execution pipeline.

use crate::core::errors::{CoordinatorError, ValidationError};
use crate::core::types::{
    now_micros, CorrelationId, Order, OrderId, OrderStatus, Side, SubmitRequest,
};
use crate::event_log::{EventLog, EventPayload, EventType};
use crate::execution::pipeline::ExecutionPipeline;
use crate::idempotency::{compute_fingerprint, ClaimOutcome, IdempotencyIndex};
use crate::risk::{RiskEngine, Violation};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Synchronous response to a submission. A risk rejection or a duplicate
/// claim is a normal outcome here, not a `CoordinatorError`: only malformed
/// input or log-append failure are.
#[derive(Debug, Clone)]
pub enum SubmitResponse {
    Approved {
        order_id: OrderId,
        correlation_id: CorrelationId,
    },
    Rejected {
        order_id: OrderId,
        correlation_id: CorrelationId,
        violations: Vec<Violation>,
    },
    Duplicate {
        order_id: OrderId,
    },
}

fn validate(request: &SubmitRequest, user_id: &str) -> Result<(), ValidationError> {
    if request.quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity(request.quantity.to_string()));
    }
    if request.limit_price < Decimal::ZERO {
        return Err(ValidationError::NegativePrice(request.limit_price.to_string()));
    }
    if request.symbol.trim().is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    Ok(())
}

/// The coordinator's current view of every order, keyed by id. Each order's
/// transitions are serialized through its own entry's mutex: the same
/// order_id never has two outstanding transitions.
struct OrderTable {
    orders: DashMap<OrderId, Mutex<Order>>,
}

impl OrderTable {
    fn new() -> Self {
        Self { orders: DashMap::new() }
    }

    fn insert(&self, order: Order) {
        self.orders.insert(order.order_id, Mutex::new(order));
    }

    fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(&order_id).map(|m| m.lock().clone())
    }

    /// Moves `order_id` to `status`, rejecting a transition that isn't legal
    /// per `OrderStatus::can_transition_to` rather than applying it blindly.
    /// Illegal transitions return `CoordinatorError::IllegalTransition`
    /// rather than panicking.
    fn transition(&self, order_id: OrderId, status: OrderStatus) -> Result<(), CoordinatorError> {
        let Some(entry) = self.orders.get(&order_id) else {
            return Err(CoordinatorError::OrderNotFound(order_id));
        };
        let mut order = entry.lock();
        if !order.status.can_transition_to(status) {
            return Err(CoordinatorError::IllegalTransition {
                order_id,
                from: order.status,
                to: status,
            });
        }
        order.status = status;
        order.updated_at = now_micros();
        Ok(())
    }

    fn record_fill_price(&self, order_id: OrderId, price: Decimal) {
        if let Some(entry) = self.orders.get(&order_id) {
            let mut order = entry.lock();
            order.filled_price = Some(price);
        }
    }
}

pub struct OrderCoordinator {
    event_log: Arc<EventLog>,
    risk: Arc<RiskEngine>,
    idempotency: Arc<IdempotencyIndex>,
    pipeline: Arc<ExecutionPipeline>,
    orders: Arc<OrderTable>,
}

impl OrderCoordinator {
    pub fn new(
        event_log: Arc<EventLog>,
        risk: Arc<RiskEngine>,
        idempotency: Arc<IdempotencyIndex>,
        pipeline: Arc<ExecutionPipeline>,
    ) -> Self {
        Self {
            event_log,
            risk,
            idempotency,
            pipeline,
            orders: Arc::new(OrderTable::new()),
        }
    }

    /// Drives a submission synchronously through identifier assignment,
    /// idempotency claim and risk check, then hands an approved order to the
    /// execution pipeline as an independent spawned task.
    pub async fn submit(
        &self,
        request: SubmitRequest,
        user_id: &str,
    ) -> Result<SubmitResponse, CoordinatorError> {
        validate(&request, user_id)?;

        let order_id = OrderId::generate();
        let correlation_id = CorrelationId::generate();

        // The idempotency claim happens before ORDER_CREATED is emitted so a
        // duplicate submission produces neither a second order nor a second
        // ORDER_CREATED event. See DESIGN.md for why this differs from the
        // literal step ordering described elsewhere.
        let fingerprint = compute_fingerprint(
            user_id,
            &request.symbol,
            request.side,
            request.quantity,
            request.limit_price,
            request.client_order_id.as_deref(),
            order_id.0,
        );
        if let ClaimOutcome::Duplicate(prior) = self.idempotency.claim(fingerprint, order_id) {
            return Ok(SubmitResponse::Duplicate { order_id: prior });
        }

        let now = now_micros();
        let order = Order {
            order_id,
            client_order_id: request.client_order_id,
            correlation_id,
            symbol: request.symbol,
            side: request.side,
            quantity: request.quantity,
            limit_price: request.limit_price,
            user_id: user_id.to_string(),
            strategy: request.strategy,
            status: OrderStatus::Pending,
            filled_price: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(order.clone());

        self.event_log.append(
            correlation_id,
            Some(order_id),
            EventType::OrderCreated,
            EventPayload::OrderCreated {
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                limit_price: order.limit_price,
                client_order_id: order.client_order_id.clone(),
                strategy: order.strategy.clone(),
            },
            user_id,
        )?;

        self.orders.transition(order_id, OrderStatus::RiskCheck)?;
        self.event_log.append(
            correlation_id,
            Some(order_id),
            EventType::RiskCheckStarted,
            EventPayload::RiskCheckStarted,
            user_id,
        )?;

        let outcome = self.risk.check(&order);

        if !outcome.passed {
            self.orders.transition(order_id, OrderStatus::Rejected)?;
            self.event_log.append(
                correlation_id,
                Some(order_id),
                EventType::RiskCheckFailed,
                EventPayload::RiskCheckFailed {
                    violations: outcome.violations.clone(),
                },
                user_id,
            )?;
            return Ok(SubmitResponse::Rejected {
                order_id,
                correlation_id,
                violations: outcome.violations,
            });
        }

        self.orders.transition(order_id, OrderStatus::Approved)?;
        self.event_log.append(
            correlation_id,
            Some(order_id),
            EventType::RiskCheckPassed,
            EventPayload::RiskCheckPassed {
                daily_volume: outcome.daily_volume,
            },
            user_id,
        )?;

        self.orders.transition(order_id, OrderStatus::Executing)?;

        let pipeline = self.pipeline.clone();
        let orders = self.orders.clone();
        let mut executing_order = order.clone();
        executing_order.status = OrderStatus::Executing;
        tokio::spawn(async move {
            let outcome = pipeline.run(&executing_order).await;
            let final_status = match &outcome {
                crate::execution::PipelineOutcome::Completed { .. } => OrderStatus::Executed,
                crate::execution::PipelineOutcome::Failed { .. } => OrderStatus::Failed,
            };
            if let crate::execution::PipelineOutcome::Completed { fill, .. } = &outcome {
                orders.record_fill_price(executing_order.order_id, fill.price);
            }
            if let Err(err) = orders.transition(executing_order.order_id, final_status) {
                tracing::error!(order_id = %executing_order.order_id, %err, "illegal terminal transition");
            }
            info!(order_id = %executing_order.order_id, ?final_status, "order reached terminal state");
        });

        Ok(SubmitResponse::Approved { order_id, correlation_id })
    }

    /// Returns the coordinator's current view of an order, reconstructable
    /// at any time by folding its event chain.
    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionPipeline;
    use crate::position::PositionStore;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
    use crate::risk::RiskConfig;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn build_coordinator(
        executor: Arc<dyn crate::execution::Executor>,
        risk_config: RiskConfig,
    ) -> (OrderCoordinator, Arc<EventLog>) {
        let event_log = Arc::new(EventLog::in_memory());
        let positions = Arc::new(PositionStore::new());
        let risk = Arc::new(RiskEngine::new(positions.clone(), event_log.clone(), risk_config));
        let idempotency = Arc::new(IdempotencyIndex::new());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let pipeline = Arc::new(ExecutionPipeline::new(
            executor,
            breaker,
            positions,
            event_log.clone(),
            Default::default(),
        ));
        (
            OrderCoordinator::new(event_log.clone(), risk, idempotency, pipeline),
            event_log,
        )
    }

    fn request(symbol: &str, side: Side, quantity: Decimal, price: Decimal, client_order_id: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            client_order_id: client_order_id.map(String::from),
            symbol: symbol.into(),
            side,
            quantity,
            limit_price: price,
            strategy: "test".into(),
        }
    }

    #[tokio::test]
    async fn happy_path_buy_is_approved_and_eventually_executes() {
        let executor = Arc::new(crate::execution::SimulatedExecutor::always_succeed());
        let (coordinator, event_log) = build_coordinator(executor, RiskConfig::conservative());

        let response = coordinator
            .submit(request("AAPL", Side::Buy, dec!(100), dec!(150.50), None), "trader1")
            .await
            .unwrap();

        let order_id = match response {
            SubmitResponse::Approved { order_id, .. } => order_id,
            other => panic!("expected Approved, got {other:?}"),
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let order = coordinator.get(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Executed);

        let events = event_log.by_order(order_id);
        assert_eq!(events.first().unwrap().event_type, EventType::OrderCreated);
        assert!(events.iter().any(|e| e.event_type == EventType::ExecutionCompleted));
        assert!(events.iter().any(|e| e.event_type == EventType::PositionUpdated));
    }

    #[tokio::test]
    async fn position_limit_rejects_synchronously_with_no_execution_events() {
        let executor = Arc::new(crate::execution::SimulatedExecutor::always_succeed());
        let config = RiskConfig { max_position_size: dec!(1_000_000), ..RiskConfig::permissive() };
        let (coordinator, event_log) = build_coordinator(executor, config);

        let response = coordinator
            .submit(request("TSLA", Side::Buy, dec!(100_000), dec!(200), None), "trader1")
            .await
            .unwrap();

        let order_id = match response {
            SubmitResponse::Rejected { order_id, violations, .. } => {
                assert_eq!(violations, vec![Violation::PositionLimit]);
                order_id
            }
            other => panic!("expected Rejected, got {other:?}"),
        };

        let events = event_log.by_order(order_id);
        assert!(!events.iter().any(|e| e.event_type == EventType::ExecutionStarted));
    }

    #[tokio::test]
    async fn duplicate_client_order_id_short_circuits_without_new_order_created_event() {
        let executor = Arc::new(crate::execution::SimulatedExecutor::always_succeed());
        let (coordinator, event_log) = build_coordinator(executor, RiskConfig::conservative());

        let first = coordinator
            .submit(request("AAPL", Side::Buy, dec!(100), dec!(150), Some("k1")), "trader1")
            .await
            .unwrap();
        let first_id = match first {
            SubmitResponse::Approved { order_id, .. } => order_id,
            other => panic!("expected Approved, got {other:?}"),
        };

        let second = coordinator
            .submit(request("AAPL", Side::Buy, dec!(100), dec!(150), Some("k1")), "trader1")
            .await
            .unwrap();
        match second {
            SubmitResponse::Duplicate { order_id } => assert_eq!(order_id, first_id),
            other => panic!("expected Duplicate, got {other:?}"),
        }

        let created = event_log.by_type(EventType::OrderCreated, None, None);
        let for_first_user: Vec<_> = created.into_iter().filter(|e| e.order_id == Some(first_id)).collect();
        assert_eq!(for_first_user.len(), 1);
    }
}
