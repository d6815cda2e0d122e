use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use lapak_core::Intent;

use crate::provider::{IntentProvider, ProviderError};

const FAILURE_THRESHOLD: u32 = 5;
const RESET_AFTER: Duration = Duration::from_secs(60);

/// Consecutive-failure circuit breaker. Opens after five failures in a row
/// and closes again one minute after the last failure.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD, RESET_AFTER)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState { consecutive_failures: 0, last_failure: None }),
            threshold,
            reset_after,
        }
    }

    /// True while the breaker refuses calls. Checking after the reset
    /// window has passed closes the breaker as a side effect.
    pub fn is_open(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.consecutive_failures < self.threshold {
            return false;
        }

        let elapsed = state.last_failure.map(|at| at.elapsed()).unwrap_or(self.reset_after);
        if elapsed >= self.reset_after {
            state.consecutive_failures = 0;
            state.last_failure = None;
            return false;
        }

        true
    }

    pub fn record_success(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.consecutive_failures = 0;
        state.last_failure = None;
    }

    pub fn record_failure(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());
    }
}

/// Wraps a provider with a circuit breaker. An open breaker short-circuits
/// to [`ProviderError::CircuitOpen`] without touching the network.
pub struct BreakerGuardedProvider {
    inner: Arc<dyn IntentProvider>,
    breaker: CircuitBreaker,
}

impl BreakerGuardedProvider {
    pub fn new(inner: Arc<dyn IntentProvider>) -> Self {
        Self { inner, breaker: CircuitBreaker::default() }
    }

    pub fn with_breaker(inner: Arc<dyn IntentProvider>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl IntentProvider for BreakerGuardedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError> {
        if self.breaker.is_open() {
            warn!(provider = self.inner.name(), "circuit breaker open, skipping call");
            return Err(ProviderError::CircuitOpen { provider: self.inner.name() });
        }

        match self.inner.extract_intent(text).await {
            Ok(intent) => {
                self.breaker.record_success();
                Ok(intent)
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }
}
