//! The execution pipeline: wraps the fallible downstream call in
//! idempotency, bounded retries with exponential backoff, and a circuit
//! breaker. Runs as a spawned `tokio` task per order, never inline in the
//! synchronous submission path.

use crate::core::types::{CorrelationId, Fill, Order, OrderId};
use crate::event_log::{EventLog, EventPayload, ExecutionFailureReason, EventType};
use crate::execution::executor::{Executor, ExecutionError};
use crate::position::PositionStore;
use crate::resilience::circuit_breaker::{Admission, CircuitBreaker, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Final outcome of a pipeline run, mostly useful so tests can `.await` the
/// pipeline directly instead of spawning it.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed { order_id: OrderId, fill: Fill },
    Failed { order_id: OrderId, reason: ExecutionFailureReason },
}

/// Orchestrates retries, timeouts and fill emission for one approved order.
/// Holds no exclusive lock across the executor call: `breaker`,
/// `positions` and `event_log` are all independently-locking `Arc` handles.
pub struct ExecutionPipeline {
    executor: Arc<dyn Executor>,
    breaker: Arc<CircuitBreaker>,
    positions: Arc<PositionStore>,
    event_log: Arc<EventLog>,
    config: PipelineConfig,
}

impl ExecutionPipeline {
    pub fn new(
        executor: Arc<dyn Executor>,
        breaker: Arc<CircuitBreaker>,
        positions: Arc<PositionStore>,
        event_log: Arc<EventLog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            breaker,
            positions,
            event_log,
            config,
        }
    }

    /// Runs the order to completion, emitting every `EXECUTION_*` /
    /// `POSITION_UPDATED` event along the way. The idempotency claim for
    /// this order was already made by the coordinator before `ORDER_CREATED`
    /// was emitted (see DESIGN.md); this stage does not re-claim.
    pub async fn run(&self, order: &Order) -> PipelineOutcome {
        let correlation_id = order.correlation_id;
        let order_id = order.order_id;

        self.emit(correlation_id, order_id, EventType::ExecutionStarted, EventPayload::ExecutionStarted { attempt: 1 });

        if self.breaker.allow() == Admission::Reject {
            warn!(%order_id, "execution pipeline rejected: breaker open");
            self.emit(
                correlation_id,
                order_id,
                EventType::ExecutionFailed,
                EventPayload::ExecutionFailed {
                    reason: ExecutionFailureReason::BreakerOpen,
                    attempts: 0,
                },
            );
            return PipelineOutcome::Failed {
                order_id,
                reason: ExecutionFailureReason::BreakerOpen,
            };
        }

        let mut attempt = 1;
        loop {
            let attempt_result = tokio::time::timeout(
                self.config.per_attempt_timeout,
                self.executor.execute(order),
            )
            .await;

            match attempt_result {
                Ok(Ok(fill)) => {
                    self.breaker.record(Outcome::Success);
                    self.emit(
                        correlation_id,
                        order_id,
                        EventType::ExecutionCompleted,
                        EventPayload::ExecutionCompleted { fill },
                    );

                    match self.positions.apply_fill(&order.symbol, order.side, fill.quantity, fill.price) {
                        Ok(position) => {
                            self.emit(
                                correlation_id,
                                order_id,
                                EventType::PositionUpdated,
                                EventPayload::PositionUpdated {
                                    symbol: order.symbol.clone(),
                                    quantity: position.quantity,
                                    average_price: position.average_price,
                                },
                            );
                        }
                        Err(err) => {
                            error!(%order_id, %err, "position store consistency violation");
                        }
                    }

                    info!(%order_id, attempt, "execution completed");
                    return PipelineOutcome::Completed { order_id, fill };
                }
                Ok(Err(ExecutionError::Transient(reason))) => {
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.backoff_base * 2u32.pow(attempt - 1)).await;
                        attempt += 1;
                        continue;
                    }
                    self.breaker.record(Outcome::Failure);
                    let failure = ExecutionFailureReason::Transient(reason);
                    self.emit(
                        correlation_id,
                        order_id,
                        EventType::ExecutionFailed,
                        EventPayload::ExecutionFailed { reason: failure.clone(), attempts: attempt },
                    );
                    return PipelineOutcome::Failed { order_id, reason: failure };
                }
                Ok(Err(ExecutionError::Permanent(reason))) => {
                    self.breaker.record(Outcome::Failure);
                    let failure = ExecutionFailureReason::Permanent(reason);
                    self.emit(
                        correlation_id,
                        order_id,
                        EventType::ExecutionFailed,
                        EventPayload::ExecutionFailed { reason: failure.clone(), attempts: attempt },
                    );
                    return PipelineOutcome::Failed { order_id, reason: failure };
                }
                Err(_elapsed) => {
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.backoff_base * 2u32.pow(attempt - 1)).await;
                        attempt += 1;
                        continue;
                    }
                    self.breaker.record(Outcome::Failure);
                    self.emit(
                        correlation_id,
                        order_id,
                        EventType::ExecutionFailed,
                        EventPayload::ExecutionFailed {
                            reason: ExecutionFailureReason::Timeout,
                            attempts: attempt,
                        },
                    );
                    return PipelineOutcome::Failed {
                        order_id,
                        reason: ExecutionFailureReason::Timeout,
                    };
                }
            }
        }
    }

    fn emit(
        &self,
        correlation_id: CorrelationId,
        order_id: OrderId,
        event_type: EventType,
        payload: EventPayload,
    ) {
        if let Err(err) = self
            .event_log
            .append(correlation_id, Some(order_id), event_type, payload, "execution-pipeline")
        {
            error!(%order_id, %err, "event log append failed during execution");
        }
    }
}
