use crate::config::BreakerConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open { retry_in: Duration },
    /// Reset deadline passed; the next attempt decides the state.
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: VecDeque<Instant>,
    open_until: Option<Instant>,
}

/// Per-server circuit breakers, shared by every caller of the registry.
///
/// `closed -> open` once `failure_threshold` failures land inside the trailing
/// window. While open every check fails fast. After the reset deadline the
/// next attempt goes through; success closes the breaker, failure re-opens it
/// for another reset period.
pub struct CircuitBreakers {
    states: DashMap<Uuid, BreakerState>,
    config: BreakerConfig,
}

impl CircuitBreakers {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            states: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// `Err(retry_in)` while the breaker is open.
    pub fn check(&self, server_id: Uuid) -> Result<(), Duration> {
        match self.status(server_id) {
            BreakerStatus::Open { retry_in } => Err(retry_in),
            BreakerStatus::Closed | BreakerStatus::HalfOpen => Ok(()),
        }
    }

    pub fn status(&self, server_id: Uuid) -> BreakerStatus {
        let Some(state) = self.states.get(&server_id) else {
            return BreakerStatus::Closed;
        };

        match state.open_until {
            None => BreakerStatus::Closed,
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    BreakerStatus::Open {
                        retry_in: until - now,
                    }
                } else {
                    BreakerStatus::HalfOpen
                }
            }
        }
    }

    pub fn record_success(&self, server_id: Uuid) {
        let Some(mut state) = self.states.get_mut(&server_id) else {
            return;
        };

        match state.open_until {
            Some(until) if Instant::now() < until => {}
            Some(_) => {
                state.open_until = None;
                state.failures.clear();
                info!(%server_id, "Circuit closed after successful trial");
            }
            None => state.failures.clear(),
        }
    }

    /// Records a failure and returns `true` if this failure opened the breaker.
    pub fn record_failure(&self, server_id: Uuid) -> bool {
        let now = Instant::now();
        let reset_after = self.config.reset_after();
        let mut state = self.states.entry(server_id).or_default();

        if let Some(until) = state.open_until {
            if now >= until {
                state.open_until = Some(now + reset_after);
                warn!(
                    %server_id,
                    reset_secs = reset_after.as_secs(),
                    "Trial request failed, circuit re-opened"
                );
                return true;
            }
            // Late failures from calls started before the breaker opened.
            return false;
        }

        let window = self.config.window();
        state.failures.push_back(now);
        while let Some(oldest) = state.failures.front() {
            if now.duration_since(*oldest) > window {
                state.failures.pop_front();
            } else {
                break;
            }
        }

        if state.failures.len() >= self.config.failure_threshold.max(1) {
            state.failures.clear();
            state.open_until = Some(now + reset_after);
            warn!(
                %server_id,
                threshold = self.config.failure_threshold,
                window_secs = window.as_secs(),
                reset_secs = reset_after.as_secs(),
                "Circuit opened"
            );
            return true;
        }

        false
    }
}
