//! Core data types: identifiers, orders, principals and fills.
//!
//! Identifiers are `u128` newtypes generated from
//! `[timestamp:64][random:32][counter:32]`. This gives uniqueness across
//! threads and process restarts without a shared counter service.

use rust_decimal::Decimal;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

fn generate_id() -> u128 {
    use rand::Rng;

    thread_local! {
        static COUNTER: std::cell::Cell<u32> = std::cell::Cell::new(0);
        static RNG: std::cell::RefCell<rand::rngs::ThreadRng> = std::cell::RefCell::new(rand::thread_rng());
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random_part = RNG.with(|rng| rng.borrow_mut().gen::<u32>());
    let counter = COUNTER.with(|c| {
        let val = c.get();
        c.set(val.wrapping_add(1));
        val
    });

    ((timestamp as u128) << 64) | ((random_part as u128) << 32) | (counter as u128)
}

/// Returns the current wall-clock time as microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[repr(transparent)]
        pub struct $name(pub u128);

        impl $name {
            pub fn generate() -> Self {
                Self(generate_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }
    };
}

id_type!(OrderId);
id_type!(EventId);
id_type!(CorrelationId);

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to quantity when establishing/adjusting a position: +1 for
    /// BUY, -1 for SELL.
    pub fn sign(self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order lifecycle state. Transitions are linear and monotone; see
/// `OrderCoordinator` for the sites that perform them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    Pending,
    RiskCheck,
    Approved,
    Rejected,
    Executing,
    Executed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Rejected | OrderStatus::Executed | OrderStatus::Failed)
    }

    /// Whether `to` is a legal next state from `self` in the linear,
    /// monotone state machine (`PENDING -> RISK_CHECK ->
    /// {APPROVED, REJECTED}; APPROVED -> EXECUTING -> {EXECUTED, FAILED}`).
    /// Matched exhaustively rather than encoded as a typestate, since the
    /// coordinator must look orders up by id from type-erased shared storage
    /// across `.await` points.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, RiskCheck)
                | (RiskCheck, Approved)
                | (RiskCheck, Rejected)
                | (Approved, Executing)
                | (Executing, Executed)
                | (Executing, Failed)
        )
    }
}

/// An authenticated caller. Authentication itself happens in an outer
/// adapter; the core only ever sees the already-verified principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

/// Roles ordered so an outer permission check can compare with `>=`
/// (`Trader < RiskManager < Compliance < Admin`). The core never enforces
/// these itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Trader,
    RiskManager,
    Compliance,
    Admin,
}

/// A caller's request to submit an order, before identifiers are assigned.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Decimal,
    pub strategy: String,
}

/// An order. Created once; only `status`, `updated_at` and `filled_price`
/// mutate after creation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Order {
    pub order_id: OrderId,
    pub client_order_id: Option<String>,
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Decimal,
    pub user_id: String,
    pub strategy: String,
    pub status: OrderStatus,
    pub filled_price: Option<Decimal>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// `quantity × limit_price`.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.limit_price
    }
}

/// A completed fill returned by the execution adapter.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Fill {
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
}
