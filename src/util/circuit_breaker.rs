use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Serializable breaker settings (config.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    300 // 5 minutes
}

fn default_half_open_max_calls() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-venue circuit breaker.
///
/// Closed → Open after `failure_threshold` consecutive failures. Open rejects
/// calls until `recovery_timeout` has elapsed, then lets calls through in
/// HalfOpen; `half_open_max_calls` successes close it again, any failure
/// re-opens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure_time: None,
        }
    }

    /// Check whether a call may go through right now
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.remaining_open().is_zero() {
                    info!("[BREAKER {}] Entering half-open state, probing venue", self.name);
                    self.state = BreakerState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful API call
    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.half_open_max_calls {
                    info!("[BREAKER {}] Closed again, venue recovered", self.name);
                    self.state = BreakerState::Closed;
                    self.consecutive_failures = 0;
                    self.last_failure_time = None;
                }
            }
            _ => {
                self.consecutive_failures = 0;
                self.last_failure_time = None;
            }
        }
    }

    /// Record a failed API call
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            BreakerState::HalfOpen => {
                warn!(
                    "[BREAKER {}] Probe failed, re-opening ({} consecutive failures)",
                    self.name, self.consecutive_failures
                );
                self.state = BreakerState::Open;
            }
            BreakerState::Closed if self.consecutive_failures >= self.failure_threshold => {
                warn!(
                    "[BREAKER {}] Opened after {} consecutive failures, pausing for {}s",
                    self.name,
                    self.consecutive_failures,
                    self.recovery_timeout.as_secs()
                );
                self.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Time left before an open breaker lets a probe through
    pub fn remaining_open(&self) -> Duration {
        match (self.state, self.last_failure_time) {
            (BreakerState::Open, Some(last)) => self.recovery_timeout.saturating_sub(last.elapsed()),
            _ => Duration::ZERO,
        }
    }
}
