//! The event log: an append-only, correlation-indexed journal that is the
//! single source of truth for reconstructing order and position state.
//!
//! The log is defined against the [`EventStore`] trait so a persistent
//! adapter can be substituted without touching callers. [`InMemoryEventStore`]
//! is the memory-resident default: a primary `Vec<Event>` plus `HashMap`
//! indices by correlation/order/type, guarded by a single `RwLock`: write
//! lock on append, read lock on query.

use crate::core::types::{now_micros, CorrelationId, EventId, Fill, OrderId};
use crate::risk::{RiskConfig, Violation};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// The closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum EventType {
    OrderCreated,
    RiskCheckStarted,
    RiskCheckPassed,
    RiskCheckFailed,
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    RiskConfigUpdated,
    KillSwitchToggled,
    PositionUpdated,
}

/// Reason an `EXECUTION_FAILED` event was emitted.
#[derive(Debug, Clone, serde::Serialize)]
pub enum ExecutionFailureReason {
    BreakerOpen,
    Timeout,
    Transient(String),
    Permanent(String),
}

/// A typed payload, one variant per event kind.
#[derive(Debug, Clone, serde::Serialize)]
pub enum EventPayload {
    OrderCreated {
        symbol: String,
        side: crate::core::types::Side,
        quantity: Decimal,
        limit_price: Decimal,
        client_order_id: Option<String>,
        strategy: String,
    },
    RiskCheckStarted,
    RiskCheckPassed {
        daily_volume: Decimal,
    },
    RiskCheckFailed {
        violations: Vec<Violation>,
    },
    ExecutionStarted {
        attempt: u32,
    },
    ExecutionCompleted {
        fill: Fill,
    },
    ExecutionFailed {
        reason: ExecutionFailureReason,
        attempts: u32,
    },
    RiskConfigUpdated {
        config: RiskConfig,
    },
    KillSwitchToggled {
        enabled: bool,
    },
    PositionUpdated {
        symbol: String,
        quantity: Decimal,
        average_price: Decimal,
    },
}

/// An immutable event record. Never mutated or deleted after append.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Event {
    pub event_id: EventId,
    pub event_type: EventType,
    pub correlation_id: CorrelationId,
    pub order_id: Option<OrderId>,
    /// Microseconds since the Unix epoch, strictly increasing across appends.
    pub timestamp: i64,
    pub payload: EventPayload,
    pub user_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventLogError {
    /// The configured capacity of a memory-bound deployment has been
    /// exceeded. Fatal to the order in progress: callers propagate
    /// rather than catch it.
    #[error("event log capacity ({capacity}) exceeded")]
    Overflow { capacity: usize },
}

/// Backing store trait so a persistent adapter can be substituted without
/// touching callers.
pub trait EventStore: Send + Sync {
    fn append(&self, event: Event) -> Result<EventId, EventLogError>;
    fn by_correlation(&self, correlation_id: CorrelationId) -> Vec<Event>;
    fn by_order(&self, order_id: OrderId) -> Vec<Event>;
    fn by_type(&self, event_type: EventType, since: Option<i64>, until: Option<i64>) -> Vec<Event>;
    fn recent(&self, limit: usize) -> Vec<Event>;
}

#[derive(Default)]
struct Indices {
    events: Vec<Event>,
    by_correlation: HashMap<CorrelationId, Vec<usize>>,
    by_order: HashMap<OrderId, Vec<usize>>,
    by_type: HashMap<EventType, Vec<usize>>,
    last_timestamp: i64,
}

/// Memory-resident default `EventStore`. Unbounded growth is an accepted
/// trade-off for a reference/demo core unless `with_capacity` is used.
pub struct InMemoryEventStore {
    inner: RwLock<Indices>,
    capacity: Option<usize>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
            capacity: None,
        }
    }

    /// Reject further appends past `capacity` with `EventLogError::Overflow`,
    /// the default memory-bound overflow policy.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, mut event: Event) -> Result<EventId, EventLogError> {
        // Timestamp assignment and insertion happen under the same write
        // lock so two concurrent appends can never have their vector/index
        // position disagree with their timestamp order.
        let mut guard = self.inner.write();

        if let Some(capacity) = self.capacity {
            if guard.events.len() >= capacity {
                return Err(EventLogError::Overflow { capacity });
            }
        }

        let now = now_micros();
        let assigned = if now > guard.last_timestamp { now } else { guard.last_timestamp + 1 };
        guard.last_timestamp = assigned;
        event.timestamp = assigned;

        let idx = guard.events.len();
        guard.by_correlation.entry(event.correlation_id).or_default().push(idx);
        if let Some(order_id) = event.order_id {
            guard.by_order.entry(order_id).or_default().push(idx);
        }
        guard.by_type.entry(event.event_type).or_default().push(idx);
        let event_id = event.event_id;
        guard.events.push(event);
        Ok(event_id)
    }

    fn by_correlation(&self, correlation_id: CorrelationId) -> Vec<Event> {
        let guard = self.inner.read();
        guard
            .by_correlation
            .get(&correlation_id)
            .map(|idxs| idxs.iter().map(|&i| guard.events[i].clone()).collect())
            .unwrap_or_default()
    }

    fn by_order(&self, order_id: OrderId) -> Vec<Event> {
        let guard = self.inner.read();
        guard
            .by_order
            .get(&order_id)
            .map(|idxs| idxs.iter().map(|&i| guard.events[i].clone()).collect())
            .unwrap_or_default()
    }

    fn by_type(&self, event_type: EventType, since: Option<i64>, until: Option<i64>) -> Vec<Event> {
        let guard = self.inner.read();
        guard
            .by_type
            .get(&event_type)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &guard.events[i])
                    .filter(|e| since.map_or(true, |s| e.timestamp >= s))
                    .filter(|e| until.map_or(true, |u| e.timestamp <= u))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn recent(&self, limit: usize) -> Vec<Event> {
        let guard = self.inner.read();
        let len = guard.events.len();
        let start = len.saturating_sub(limit);
        guard.events[start..].iter().rev().cloned().collect()
    }
}

/// Thin convenience wrapper matching the `EventLog` name used throughout the
/// spec, so call sites read `event_log.append(..)` rather than reaching
/// through a trait object directly.
pub struct EventLog {
    store: Box<dyn EventStore>,
}

impl EventLog {
    pub fn new(store: Box<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryEventStore::new()))
    }

    pub fn append(
        &self,
        correlation_id: CorrelationId,
        order_id: Option<OrderId>,
        event_type: EventType,
        payload: EventPayload,
        user_id: impl Into<String>,
    ) -> Result<EventId, EventLogError> {
        let event = Event {
            event_id: EventId::generate(),
            event_type,
            correlation_id,
            order_id,
            timestamp: 0, // assigned by the store on append
            payload,
            user_id: user_id.into(),
        };
        self.store.append(event)
    }

    pub fn by_correlation(&self, correlation_id: CorrelationId) -> Vec<Event> {
        self.store.by_correlation(correlation_id)
    }

    pub fn by_order(&self, order_id: OrderId) -> Vec<Event> {
        self.store.by_order(order_id)
    }

    pub fn by_type(&self, event_type: EventType, since: Option<i64>, until: Option<i64>) -> Vec<Event> {
        self.store.by_type(event_type, since, until)
    }

    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.store.recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> EventPayload {
        EventPayload::RiskCheckStarted
    }

    #[test]
    fn append_assigns_strictly_increasing_timestamps() {
        let log = EventLog::in_memory();
        let corr = CorrelationId::generate();
        let mut last = i64::MIN;
        for _ in 0..50 {
            log.append(corr, None, EventType::RiskCheckStarted, sample_payload(), "u1")
                .unwrap();
        }
        for event in log.by_correlation(corr) {
            assert!(event.timestamp > last);
            last = event.timestamp;
        }
    }

    #[test]
    fn by_correlation_is_append_ordered() {
        let log = EventLog::in_memory();
        let corr = CorrelationId::generate();
        log.append(corr, None, EventType::OrderCreated, EventPayload::RiskCheckStarted, "u1")
            .unwrap();
        log.append(corr, None, EventType::RiskCheckStarted, EventPayload::RiskCheckStarted, "u1")
            .unwrap();
        let events = log.by_correlation(corr);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::OrderCreated);
        assert_eq!(events[1].event_type, EventType::RiskCheckStarted);
    }

    #[test]
    fn recent_returns_newest_first() {
        let log = EventLog::in_memory();
        let corr = CorrelationId::generate();
        for _ in 0..5 {
            log.append(corr, None, EventType::RiskCheckStarted, sample_payload(), "u1")
                .unwrap();
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);
    }

    #[test]
    fn overflow_is_rejected_past_capacity() {
        let store = InMemoryEventStore::with_capacity(1);
        let log = EventLog::new(Box::new(store));
        let corr = CorrelationId::generate();
        log.append(corr, None, EventType::RiskCheckStarted, sample_payload(), "u1")
            .unwrap();
        let err = log
            .append(corr, None, EventType::RiskCheckStarted, sample_payload(), "u1")
            .unwrap_err();
        assert!(matches!(err, EventLogError::Overflow { capacity: 1 }));
    }

    #[test]
    fn by_type_filters_by_time_window() {
        let log = EventLog::in_memory();
        let corr = CorrelationId::generate();
        log.append(corr, None, EventType::RiskCheckStarted, sample_payload(), "u1")
            .unwrap();
        let all = log.by_type(EventType::RiskCheckStarted, None, None);
        assert_eq!(all.len(), 1);
        let future_only = log.by_type(EventType::RiskCheckStarted, Some(i64::MAX), None);
        assert!(future_only.is_empty());
    }
}
