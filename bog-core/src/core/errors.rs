//! Error types for order validation and coordination.

use crate::core::types::OrderId;
use thiserror::Error;

/// A malformed order submission. Permanent: never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(String),
    #[error("limit price must be non-negative, got {0}")]
    NegativePrice(String),
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("user_id must not be empty")]
    EmptyUserId,
}

/// Errors surfaced synchronously to the caller from `OrderCoordinator::submit`
/// and `OrderCoordinator::get`. A risk rejection or a duplicate claim is not
/// one of these: those are ordinary `Ok(SubmitResponse::..)` outcomes.
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),
    #[error("event log append failed: {0}")]
    EventLog(#[from] crate::event_log::EventLogError),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("illegal transition for order {order_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        order_id: OrderId,
        from: crate::core::types::OrderStatus,
        to: crate::core::types::OrderStatus,
    },
}
