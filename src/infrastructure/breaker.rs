use crate::config::BreakerConfig;
use log::*;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Request outcomes observed during the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerRejection {
    #[error("circuit breaker is open")]
    Open,
    #[error("circuit breaker is half-open and its trial requests are in flight")]
    TooManyRequests,
}

/// Admission ticket returned by [`CircuitBreaker::admit`]. Outcomes reported with a
/// ticket from an earlier generation are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// A three-state circuit breaker shared by every gateway call.
///
/// While closed it counts outcomes and trips once at least `min_requests` were seen
/// and the failure ratio reaches `failure_ratio`; the counts are cleared every
/// `interval`. Open rejects everything for `cooldown`, after which half-open admits
/// up to `max_requests` trials. That many consecutive successes close the breaker
/// and any failure opens it again.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, mut config: BreakerConfig) -> Self {
        // Half-open with no trial slots would never leave that state.
        config.max_requests = config.max_requests.max(1);
        let mut inner = Inner {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        Self::new_generation(&config, &mut inner, Instant::now());
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    pub fn admit(&self) -> Result<Ticket, BreakerRejection> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        match inner.state {
            CircuitState::Open => return Err(BreakerRejection::Open),
            CircuitState::HalfOpen if inner.counts.requests >= self.config.max_requests => {
                return Err(BreakerRejection::TooManyRequests);
            }
            _ => {}
        }
        inner.counts.on_request();
        Ok(Ticket {
            generation: inner.generation,
        })
    }

    pub fn record(&self, ticket: Ticket, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        if ticket.generation != inner.generation {
            return;
        }
        if success {
            self.on_success(&mut inner, now);
        } else {
            self.on_failure(&mut inner, now);
        }
    }

    fn on_success(&self, inner: &mut Inner, now: Instant) {
        inner.counts.on_success();
        if inner.state == CircuitState::HalfOpen
            && inner.counts.consecutive_successes >= self.config.max_requests
        {
            self.set_state(inner, CircuitState::Closed, now);
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant) {
        inner.counts.on_failure();
        match inner.state {
            CircuitState::Closed if self.ready_to_trip(&inner.counts) => {
                self.set_state(inner, CircuitState::Open, now);
            }
            CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now),
            _ => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.min_requests
            && f64::from(counts.total_failures) / f64::from(counts.requests)
                >= self.config.failure_ratio
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            CircuitState::Closed if expired => Self::new_generation(&self.config, inner, now),
            CircuitState::Open if expired => self.set_state(inner, CircuitState::HalfOpen, now),
            _ => {}
        }
    }

    fn set_state(&self, inner: &mut Inner, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }
        let previous = inner.state;
        inner.state = state;
        Self::new_generation(&self.config, inner, now);
        match state {
            CircuitState::Open => warn!("Circuit breaker '{}': {previous:?} -> {state:?}", self.name),
            _ => info!("Circuit breaker '{}': {previous:?} -> {state:?}", self.name),
        }
    }

    fn new_generation(config: &BreakerConfig, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed if config.interval.is_zero() => None,
            CircuitState::Closed => Some(now + config.interval),
            CircuitState::Open => Some(now + config.cooldown),
            CircuitState::HalfOpen => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
