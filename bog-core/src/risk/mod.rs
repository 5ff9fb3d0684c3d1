//! The risk engine: a pre-trade gate that evaluates quantitative limits
//! atomically against live position state, with an override kill switch.

use crate::core::types::{now_micros, CorrelationId, Order};
use crate::event_log::{EventLog, EventPayload, EventType};
use crate::position::PositionStore;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// A limit breach. `KillSwitchActive` always appears alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Violation {
    KillSwitchActive,
    PositionLimit,
    DailyVolumeLimit,
    NetExposureLimit,
    GrossExposureLimit,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("limit '{field}' must be >= 0")]
    NegativeLimit { field: &'static str },
    #[error("actor identity must not be empty")]
    MissingActor,
    /// The config/kill-switch change itself applied, but recording it to the
    /// event log failed. Surfaced to the caller rather than silently
    /// swallowed: every failure path emits an event.
    #[error("failed to record config change: {0}")]
    EventLog(#[from] crate::event_log::EventLogError),
}

/// Process-wide risk configuration. Mutated only through
/// `RiskEngine::update_limits` / `set_kill_switch`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RiskConfig {
    pub max_position_size: Decimal,
    pub max_daily_volume: Decimal,
    pub max_net_exposure: Decimal,
    pub max_gross_exposure: Decimal,
    pub kill_switch_enabled: bool,
}

impl RiskConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_position_size < Decimal::ZERO {
            return Err(ConfigError::NegativeLimit { field: "max_position_size" });
        }
        if self.max_daily_volume < Decimal::ZERO {
            return Err(ConfigError::NegativeLimit { field: "max_daily_volume" });
        }
        if self.max_net_exposure < Decimal::ZERO {
            return Err(ConfigError::NegativeLimit { field: "max_net_exposure" });
        }
        if self.max_gross_exposure < Decimal::ZERO {
            return Err(ConfigError::NegativeLimit { field: "max_gross_exposure" });
        }
        Ok(())
    }

    /// Tight institutional limits, a conservative default profile.
    pub fn conservative() -> Self {
        Self {
            max_position_size: Decimal::new(100_000, 0),
            max_daily_volume: Decimal::new(1_000_000, 0),
            max_net_exposure: Decimal::new(250_000, 0),
            max_gross_exposure: Decimal::new(500_000, 0),
            kill_switch_enabled: false,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_position_size: Decimal::new(5_000_000, 0),
            max_daily_volume: Decimal::new(50_000_000, 0),
            max_net_exposure: Decimal::new(10_000_000, 0),
            max_gross_exposure: Decimal::new(20_000_000, 0),
            kill_switch_enabled: false,
        }
    }

    /// Effectively unlimited, for tests that only want to exercise a single
    /// limit at a time.
    pub fn permissive() -> Self {
        Self {
            max_position_size: Decimal::new(i64::MAX / 4, 0),
            max_daily_volume: Decimal::new(i64::MAX / 4, 0),
            max_net_exposure: Decimal::new(i64::MAX / 4, 0),
            max_gross_exposure: Decimal::new(i64::MAX / 4, 0),
            kill_switch_enabled: false,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Outcome of `RiskEngine::check`.
#[derive(Debug, Clone)]
pub struct RiskCheckOutcome {
    pub passed: bool,
    pub violations: Vec<Violation>,
    /// Daily volume after this check, already incremented if `passed`.
    pub daily_volume: Decimal,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RiskMetrics {
    pub net_exposure: Decimal,
    pub gross_exposure: Decimal,
    pub daily_volume: Decimal,
    pub kill_switch_enabled: bool,
    pub position_count: usize,
}

struct RiskState {
    config: RiskConfig,
    daily_volume: Decimal,
    /// UTC day number (epoch seconds / 86400) the counter last reset on.
    volume_day: i64,
}

fn utc_day(now_micros: i64) -> i64 {
    now_micros.div_euclid(86_400_000_000)
}

/// Evaluates limits in a fixed, documented order and owns the process-wide
/// config, kill switch and daily-volume counter, all behind a single mutex.
/// Grouping them avoids ordering issues during rollover and limit-check
/// atomicity.
pub struct RiskEngine {
    positions: Arc<PositionStore>,
    event_log: Arc<EventLog>,
    state: Mutex<RiskState>,
}

impl RiskEngine {
    pub fn new(positions: Arc<PositionStore>, event_log: Arc<EventLog>, config: RiskConfig) -> Self {
        Self {
            positions,
            event_log,
            state: Mutex::new(RiskState {
                config,
                daily_volume: Decimal::ZERO,
                volume_day: utc_day(now_micros()),
            }),
        }
    }

    /// Evaluates `order` against every limit, accumulating all violations
    /// (kill switch excepted, which short-circuits). Performs the
    /// daily-volume rollover check and, on success, the volume increment
    /// itself inside the same critical section as the check, closing the
    /// race window between checking and incrementing the counter.
    pub fn check(&self, order: &Order) -> RiskCheckOutcome {
        let mut state = self.state.lock();

        let today = utc_day(now_micros());
        if state.volume_day != today {
            state.daily_volume = Decimal::ZERO;
            state.volume_day = today;
        }

        if state.config.kill_switch_enabled {
            return RiskCheckOutcome {
                passed: false,
                violations: vec![Violation::KillSwitchActive],
                daily_volume: state.daily_volume,
            };
        }

        let mut violations = Vec::new();
        let order_notional = order.notional();

        let existing = self.positions.position(&order.symbol);
        let projected = crate::position::apply_fill_pure(
            existing,
            order.side,
            order.quantity,
            order.limit_price,
            now_micros(),
        );
        let projected = match projected {
            Ok(p) => p,
            Err(_) => {
                // Structurally unreachable: order.quantity is validated > 0
                // before check() is ever called.
                return RiskCheckOutcome {
                    passed: false,
                    violations: vec![Violation::PositionLimit],
                    daily_volume: state.daily_volume,
                };
            }
        };

        if projected.signed_notional().abs() > state.config.max_position_size {
            violations.push(Violation::PositionLimit);
        }

        if state.daily_volume + order_notional > state.config.max_daily_volume {
            violations.push(Violation::DailyVolumeLimit);
        }

        let mut snapshot = self.positions.snapshot();
        snapshot.insert(order.symbol.clone(), projected);

        let net_exposure: Decimal = snapshot.values().map(|p| p.signed_notional()).sum();
        let gross_exposure: Decimal = snapshot.values().map(|p| p.signed_notional().abs()).sum();

        if net_exposure.abs() > state.config.max_net_exposure {
            violations.push(Violation::NetExposureLimit);
        }
        if gross_exposure > state.config.max_gross_exposure {
            violations.push(Violation::GrossExposureLimit);
        }

        let passed = violations.is_empty();
        if passed {
            state.daily_volume += order_notional;
        }

        RiskCheckOutcome {
            passed,
            violations,
            daily_volume: state.daily_volume,
        }
    }

    /// Atomically replaces the risk configuration, appending
    /// `RISK_CONFIG_UPDATED`.
    pub fn update_limits(
        &self,
        new_config: RiskConfig,
        actor: &str,
    ) -> Result<(), ConfigError> {
        if actor.trim().is_empty() {
            return Err(ConfigError::MissingActor);
        }
        new_config.validate()?;

        {
            let mut state = self.state.lock();
            state.config = new_config;
        }

        self.event_log
            .append(
                CorrelationId::generate(),
                None,
                EventType::RiskConfigUpdated,
                EventPayload::RiskConfigUpdated { config: new_config },
                actor,
            )
            .map_err(|err| {
                error!(%err, "failed to record RISK_CONFIG_UPDATED");
                err
            })?;
        Ok(())
    }

    /// Toggles the kill switch, appending `KILL_SWITCH_TOGGLED`. Idempotent
    /// in effect but emits one event per call.
    pub fn set_kill_switch(&self, enabled: bool, actor: &str) -> Result<(), ConfigError> {
        if actor.trim().is_empty() {
            return Err(ConfigError::MissingActor);
        }

        {
            let mut state = self.state.lock();
            state.config.kill_switch_enabled = enabled;
        }

        self.event_log
            .append(
                CorrelationId::generate(),
                None,
                EventType::KillSwitchToggled,
                EventPayload::KillSwitchToggled { enabled },
                actor,
            )
            .map_err(|err| {
                error!(%err, "failed to record KILL_SWITCH_TOGGLED");
                err
            })?;
        Ok(())
    }

    pub fn metrics(&self) -> RiskMetrics {
        let state = self.state.lock();
        let snapshot = self.positions.snapshot();
        let net_exposure: Decimal = snapshot.values().map(|p| p.signed_notional()).sum();
        let gross_exposure: Decimal = snapshot.values().map(|p| p.signed_notional().abs()).sum();
        RiskMetrics {
            net_exposure,
            gross_exposure,
            daily_volume: state.daily_volume,
            kill_switch_enabled: state.config.kill_switch_enabled,
            position_count: snapshot.len(),
        }
    }

    pub fn config(&self) -> RiskConfig {
        self.state.lock().config
    }
}
