//! bog-core: a trading control core providing a correlation-indexed event
//! log, a pre-trade risk engine, an idempotent and retrying execution
//! pipeline, and a position aggregator, wired together by the [`engine`]
//! composition root.
//!
//! ## Modules
//! - [`core`]: identifiers, orders, fills and the shared error taxonomy
//! - [`event_log`]: the append-only, correlation-indexed journal
//! - [`position`]: the position store and fill-averaging algorithm
//! - [`risk`]: the pre-trade risk engine and kill switch
//! - [`idempotency`]: duplicate-submission detection
//! - [`resilience`]: the circuit breaker guarding the execution pipeline
//! - [`execution`]: the retrying execution pipeline and executor adapter seam
//! - [`coordinator`]: the order state machine driver
//! - [`engine`]: the composition root assembling all of the above

pub mod core;
pub mod coordinator;
pub mod engine;
pub mod event_log;
pub mod execution;
pub mod idempotency;
pub mod position;
pub mod resilience;
pub mod risk;
pub mod utils;

pub use core::{CorrelationId, EventId, Order, OrderId, OrderStatus, Principal, Role, Side, SubmitRequest};
pub use coordinator::{OrderCoordinator, SubmitResponse};
pub use engine::{Engine, EngineConfig};
pub use event_log::{Event, EventLog, EventPayload, EventType};
pub use execution::{ExecutionPipeline, Executor, SimulatedExecutor};
pub use risk::{RiskConfig, RiskEngine, Violation};

/// Convenient single-import surface for adapter code (CLI, HTTP, tests).
pub mod prelude {
    pub use crate::core::{CorrelationId, Fill, Order, OrderId, OrderStatus, Side, SubmitRequest};
    pub use crate::coordinator::SubmitResponse;
    pub use crate::engine::{Engine, EngineConfig};
    pub use crate::event_log::{Event, EventPayload, EventType};
    pub use crate::execution::{Executor, SimulatedExecutor};
    pub use crate::risk::{RiskConfig, Violation};
    pub use crate::utils::init_logger;
}
