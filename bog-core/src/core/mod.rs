//! Core identifiers and data types shared across every component.

pub mod errors;
pub mod types;

pub use errors::{CoordinatorError, ValidationError};
pub use types::{
    now_micros, CorrelationId, EventId, Fill, Order, OrderId, OrderStatus, Principal, Role, Side,
    SubmitRequest,
};
