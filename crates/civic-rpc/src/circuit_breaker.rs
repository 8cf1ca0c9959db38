use civic_types::{CircuitBreakerConfig, CircuitState};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Mutable breaker state, kept under one lock so transitions are atomic.
#[derive(Debug)]
struct BreakerState {
	state: CircuitState,
	/// Failures since the circuit last closed or saw a success.
	failure_count: u32,
	/// Consecutive successes while half-open.
	success_count: u32,
	/// When the circuit last opened.
	opened_at: Option<Instant>,
}

impl BreakerState {
	fn closed() -> Self {
		Self {
			state: CircuitState::Closed,
			failure_count: 0,
			success_count: 0,
			opened_at: None,
		}
	}
}

/// Point-in-time copy of a breaker's state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
	pub state: CircuitState,
	pub failure_count: u32,
	pub success_count: u32,
}

/// Per-provider failure gate with `Closed`, `Open` and `HalfOpen` states.
///
/// A closed circuit admits every request. After `failure_threshold` failures
/// it opens and rejects requests until `timeout` has elapsed; the next
/// [`allow_request`](Self::allow_request) then moves it to half-open. While
/// half-open every request is a probe: `success_threshold` consecutive
/// successes close the circuit, any failure reopens it.
///
/// A disabled breaker admits everything and ignores outcomes.
pub struct CircuitBreaker {
	/// Owner name, used in log events.
	name: String,
	config: CircuitBreakerConfig,
	inner: RwLock<BreakerState>,
}

impl CircuitBreaker {
	pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
		Self {
			name: name.into(),
			config,
			inner: RwLock::new(BreakerState::closed()),
		}
	}

	pub fn config(&self) -> &CircuitBreakerConfig {
		&self.config
	}

	/// Decides whether a request may proceed.
	///
	/// This is the only method that performs the `Open` -> `HalfOpen`
	/// transition, once the open timeout has elapsed.
	pub async fn allow_request(&self) -> bool {
		if !self.config.enabled {
			return true;
		}

		// Common case under a read lock
		{
			let inner = self.inner.read().await;
			match inner.state {
				CircuitState::Closed | CircuitState::HalfOpen => return true,
				CircuitState::Open => {
					if !self.timeout_elapsed(inner.opened_at) {
						return false;
					}
				},
			}
		}

		// Re-check under the write lock, another task may have transitioned
		let mut inner = self.inner.write().await;
		match inner.state {
			CircuitState::Closed | CircuitState::HalfOpen => true,
			CircuitState::Open => {
				if self.timeout_elapsed(inner.opened_at) {
					inner.state = CircuitState::HalfOpen;
					inner.success_count = 0;
					tracing::warn!(provider = %self.name, "circuit breaker half-open, admitting probe");
					true
				} else {
					false
				}
			},
		}
	}

	fn timeout_elapsed(&self, opened_at: Option<Instant>) -> bool {
		match opened_at {
			Some(opened_at) => opened_at.elapsed() >= self.config.timeout(),
			None => true,
		}
	}

	/// Records a successful request.
	pub async fn record_success(&self) {
		if !self.config.enabled {
			return;
		}

		let mut inner = self.inner.write().await;
		match inner.state {
			CircuitState::Closed => {
				inner.failure_count = 0;
			},
			CircuitState::HalfOpen => {
				inner.success_count += 1;
				if inner.success_count >= self.config.success_threshold {
					*inner = BreakerState::closed();
					tracing::info!(provider = %self.name, "circuit breaker closed after successful probes");
				}
			},
			CircuitState::Open => {},
		}
	}

	/// Records a failed request.
	pub async fn record_failure(&self) {
		if !self.config.enabled {
			return;
		}

		let mut inner = self.inner.write().await;
		inner.failure_count = inner.failure_count.saturating_add(1);
		match inner.state {
			CircuitState::Closed => {
				if inner.failure_count >= self.config.failure_threshold {
					inner.state = CircuitState::Open;
					inner.opened_at = Some(Instant::now());
					tracing::warn!(
						provider = %self.name,
						threshold = self.config.failure_threshold,
						"circuit breaker opened after reaching failure threshold"
					);
				}
			},
			CircuitState::HalfOpen => {
				inner.state = CircuitState::Open;
				inner.success_count = 0;
				inner.opened_at = Some(Instant::now());
				tracing::warn!(provider = %self.name, "circuit breaker reopened by failed probe");
			},
			CircuitState::Open => {},
		}
	}

	/// Returns the current state without triggering any transition.
	pub async fn state(&self) -> CircuitState {
		self.inner.read().await.state
	}

	pub async fn failure_count(&self) -> u32 {
		self.inner.read().await.failure_count
	}

	pub async fn snapshot(&self) -> CircuitSnapshot {
		let inner = self.inner.read().await;
		CircuitSnapshot {
			state: inner.state,
			failure_count: inner.failure_count,
			success_count: inner.success_count,
		}
	}

	/// Forces the breaker back to closed with cleared counters.
	pub async fn reset(&self) {
		*self.inner.write().await = BreakerState::closed();
	}
}
