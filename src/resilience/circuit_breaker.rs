//! Circuit breaker for platform protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: platform assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls probe recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after recovery timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails, or more trials than allowed
//! ```
//!
//! # Design Decisions
//! - One breaker per service name, held in a registry
//! - State transitions happen under a per-service mutex; I/O does not
//! - A permit that is dropped without an outcome counts as a failure
//! - Outcomes are tagged with the generation they were admitted under;
//!   results from an earlier generation are ignored

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for CircuitSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }
}

#[derive(Debug)]
struct CircuitData {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_attempts: u32,
    generation: u64,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub seconds_since_last_failure: Option<u64>,
    pub half_open_attempts: u32,
    pub generation: u64,
}

/// Failure-tracking gate for one service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    settings: CircuitSettings,
    data: Mutex<CircuitData>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, settings: CircuitSettings) -> Self {
        Self {
            service: service.into(),
            settings,
            data: Mutex::new(CircuitData {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                opened_at: None,
                half_open_attempts: 0,
                generation: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn lock(&self) -> MutexGuard<'_, CircuitData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, data: &mut CircuitData, to: CircuitState, now: Instant) {
        let from = data.state;
        data.state = to;
        data.generation += 1;
        match to {
            CircuitState::Open => data.opened_at = Some(now),
            CircuitState::HalfOpen => data.half_open_attempts = 0,
            CircuitState::Closed => {
                data.consecutive_failures = 0;
                data.opened_at = None;
            }
        }
        metrics::record_circuit_state(&self.service, to.gauge_value());
        if to == CircuitState::Open {
            tracing::warn!(service = %self.service, from = ?from, failures = data.consecutive_failures, "Circuit opened");
        } else {
            tracing::info!(service = %self.service, from = ?from, to = ?to, "Circuit state changed");
        }
    }

    /// Promote Open to HalfOpen once the recovery timeout has passed.
    fn refresh(&self, data: &mut CircuitData, now: Instant) {
        if data.state == CircuitState::Open {
            let elapsed = data.opened_at.map_or(Duration::MAX, |at| now.duration_since(at));
            if elapsed >= self.settings.recovery_timeout {
                self.transition(data, CircuitState::HalfOpen, now);
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut data = self.lock();
        self.refresh(&mut data, Instant::now());
        data.state
    }

    /// Admit one call, or fail with `CircuitOpen`.
    pub fn acquire(self: &Arc<Self>) -> GatewayResult<CircuitPermit> {
        let now = Instant::now();
        let mut data = self.lock();
        self.refresh(&mut data, now);

        match data.state {
            CircuitState::Closed => {}
            CircuitState::Open => return Err(self.rejection(&data, now)),
            CircuitState::HalfOpen => {
                data.half_open_attempts += 1;
                if data.half_open_attempts > self.settings.half_open_max_calls {
                    self.transition(&mut data, CircuitState::Open, now);
                    return Err(self.rejection(&data, now));
                }
            }
        }

        Ok(CircuitPermit {
            breaker: Arc::clone(self),
            generation: data.generation,
            completed: false,
        })
    }

    fn rejection(&self, data: &CircuitData, now: Instant) -> GatewayError {
        let elapsed = data.opened_at.map_or(Duration::ZERO, |at| now.duration_since(at));
        metrics::record_circuit_rejection(&self.service);
        GatewayError::CircuitOpen {
            service: self.service.clone(),
            retry_after: self.settings.recovery_timeout.saturating_sub(elapsed),
        }
    }

    fn on_success(&self, generation: u64) {
        let now = Instant::now();
        let mut data = self.lock();
        if data.generation != generation {
            return;
        }
        match data.state {
            CircuitState::Closed => data.consecutive_failures = 0,
            CircuitState::HalfOpen => self.transition(&mut data, CircuitState::Closed, now),
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let now = Instant::now();
        let mut data = self.lock();
        if data.generation != generation {
            return;
        }
        data.last_failure = Some(now);
        match data.state {
            CircuitState::Closed => {
                data.consecutive_failures += 1;
                if data.consecutive_failures >= self.settings.failure_threshold {
                    self.transition(&mut data, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                data.consecutive_failures += 1;
                self.transition(&mut data, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    /// Run an operation through the breaker.
    ///
    /// Only errors that indicate the service is unhealthy count as failures.
    pub async fn call<T, F, Fut>(self: &Arc<Self>, operation: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        match &result {
            Err(e) if e.trips_circuit() => permit.failure(),
            _ => permit.success(),
        }
        result
    }

    pub fn reset(&self) {
        let mut data = self.lock();
        data.last_failure = None;
        self.transition(&mut data, CircuitState::Closed, Instant::now());
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let mut data = self.lock();
        self.refresh(&mut data, now);
        CircuitSnapshot {
            service: self.service.clone(),
            state: data.state,
            consecutive_failures: data.consecutive_failures,
            seconds_since_last_failure: data.last_failure.map(|at| now.duration_since(at).as_secs()),
            half_open_attempts: data.half_open_attempts,
            generation: data.generation,
        }
    }
}

/// Admission token for one call.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unreported records a failure.
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    completed: bool,
}

impl CircuitPermit {
    pub fn success(mut self) {
        self.completed = true;
        self.breaker.on_success(self.generation);
    }

    pub fn failure(mut self) {
        self.completed = true;
        self.breaker.on_failure(self.generation);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(service = %self.breaker.service, "Circuit permit dropped without outcome");
            self.breaker.on_failure(self.generation);
        }
    }
}

/// Breakers keyed by service name, created lazily.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    settings: CircuitSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: CircuitSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(CircuitSettings::from(config))
    }

    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.breakers
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(service, self.settings)))
                .value(),
        )
    }

    /// Run `operation` through the breaker for `service`.
    pub async fn execute<T, F, Fut>(&self, service: &str, operation: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.breaker(service).call(operation).await
    }

    /// Current state; services never called are Closed.
    pub fn state(&self, service: &str) -> CircuitState {
        self.breakers
            .get(service)
            .map_or(CircuitState::Closed, |b| b.state())
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    /// Force a breaker back to Closed. Returns false for unknown services.
    pub fn reset(&self, service: &str) -> bool {
        match self.breakers.get(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn open_circuits(&self) -> usize {
        self.breakers
            .iter()
            .filter(|b| b.state() == CircuitState::Open)
            .count()
    }
}
