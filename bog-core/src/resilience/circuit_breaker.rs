//! Circuit breaker pattern gating the execution pipeline. Tracks
//! consecutive failures and trips to `Open` to stop hammering a failing
//! downstream, re-admitting exactly one probe per `Open -> HalfOpen` cycle.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Exactly one probe is admitted per `Open -> HalfOpen` cycle: the
/// transition itself is a single `compare_exchange` on `state`, and
/// `probe_in_flight` guards against a second caller racing the same expiry
/// window.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    probe_in_flight: AtomicBool,
    expiry: Mutex<Option<Instant>>,
    transition_count: AtomicU64,
    last_transition: Mutex<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
            expiry: Mutex::new(None),
            transition_count: AtomicU64::new(0),
            last_transition: Mutex::new(Instant::now()),
        }
    }

    fn record_transition(&self, to: CircuitState) {
        self.transition_count.fetch_add(1, Ordering::AcqRel);
        *self.last_transition.lock() = Instant::now();
        match to {
            CircuitState::Open => warn!("circuit breaker OPEN"),
            CircuitState::HalfOpen => info!("circuit breaker HALF_OPEN (probe admitted)"),
            CircuitState::Closed => info!("circuit breaker CLOSED"),
        }
    }

    /// Asks the breaker for admission.
    pub fn allow(&self) -> Admission {
        match self.state().into() {
            CircuitState::Closed => Admission::Admit,
            CircuitState::HalfOpen => Admission::Reject,
            CircuitState::Open => {
                let expired = self.expiry.lock().map(|e| Instant::now() >= e).unwrap_or(false);
                if !expired {
                    return Admission::Reject;
                }
                // Exactly one caller wins this CAS and becomes the probe.
                let won = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if won {
                    self.probe_in_flight.store(true, Ordering::Release);
                    self.record_transition(CircuitState::HalfOpen);
                    Admission::Admit
                } else {
                    Admission::Reject
                }
            }
        }
    }

    /// Records the outcome of an admitted call.
    pub fn record(&self, outcome: Outcome) {
        match (self.state().into(), outcome) {
            (CircuitState::Closed, Outcome::Success) => {
                self.failure_count.store(0, Ordering::Release);
            }
            (CircuitState::Closed, Outcome::Failure) => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    *self.expiry.lock() = Some(Instant::now() + self.config.open_duration);
                    self.state.store(CircuitState::Open as u8, Ordering::Release);
                    self.record_transition(CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, Outcome::Success) => {
                self.failure_count.store(0, Ordering::Release);
                self.probe_in_flight.store(false, Ordering::Release);
                self.state.store(CircuitState::Closed as u8, Ordering::Release);
                self.record_transition(CircuitState::Closed);
            }
            (CircuitState::HalfOpen, Outcome::Failure) => {
                self.failure_count.store(0, Ordering::Release);
                self.probe_in_flight.store(false, Ordering::Release);
                *self.expiry.lock() = Some(Instant::now() + self.config.open_duration);
                self.state.store(CircuitState::Open as u8, Ordering::Release);
                self.record_transition(CircuitState::Open);
            }
            (CircuitState::Open, _) => {
                // Outcomes can't normally be recorded while Open since
                // `allow()` rejects every caller that isn't the probe.
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count.load(Ordering::Acquire)
    }
}
