//! RPC provider types shared between the manager, configuration and callers.
//!
//! This module defines the static provider description, circuit breaker
//! settings, health and metrics snapshots, per-call options and the trace
//! records kept by the RPC manager.

use crate::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Static description of one upstream RPC endpoint.
///
/// Everything except `enabled` is fixed once the provider is constructed.
/// `enabled` is only the initial value; the manager toggles a runtime flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderConfig {
	/// Unique provider name.
	pub name: String,
	/// Endpoint used for mainnet calls.
	pub mainnet_url: String,
	/// Endpoint used for testnet calls. `None` means testnet is unsupported.
	#[serde(default)]
	pub testnet_url: Option<String>,
	/// Selection priority, lower values are tried first.
	#[serde(default = "default_priority")]
	pub priority: u32,
	/// Per-attempt timeout in milliseconds. Falls back to the manager default.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	/// Retry budget advertised by this provider.
	#[serde(default = "default_provider_max_retries")]
	pub max_retries: u32,
	/// Whether the provider starts enabled.
	#[serde(default = "default_true")]
	pub enabled: bool,
}

fn default_priority() -> u32 {
	100
}

fn default_provider_max_retries() -> u32 {
	1
}

fn default_true() -> bool {
	true
}

impl ProviderConfig {
	/// Creates an enabled mainnet-only provider with default priority.
	pub fn new(name: impl Into<String>, mainnet_url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			mainnet_url: mainnet_url.into(),
			testnet_url: None,
			priority: default_priority(),
			timeout_ms: None,
			max_retries: default_provider_max_retries(),
			enabled: true,
		}
	}

	pub fn with_testnet_url(mut self, url: impl Into<String>) -> Self {
		self.testnet_url = Some(url.into());
		self
	}

	pub fn with_priority(mut self, priority: u32) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.timeout_ms = Some(timeout_ms);
		self
	}

	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	/// Returns the endpoint for `network`, if this provider serves it.
	pub fn url_for(&self, network: Network) -> Option<&str> {
		match network {
			Network::Mainnet => Some(self.mainnet_url.as_str()).filter(|url| !url.is_empty()),
			Network::Testnet => self.testnet_url.as_deref().filter(|url| !url.is_empty()),
		}
	}

	/// Networks this provider has an endpoint for.
	pub fn networks(&self) -> Vec<Network> {
		Network::ALL
			.into_iter()
			.filter(|network| self.url_for(*network).is_some())
			.collect()
	}
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
	/// Consecutive failures that open a closed circuit.
	#[serde(default = "default_failure_threshold")]
	pub failure_threshold: u32,
	/// Consecutive half-open successes that close the circuit.
	#[serde(default = "default_success_threshold")]
	pub success_threshold: u32,
	/// Milliseconds spent open before a probe is admitted.
	#[serde(default = "default_breaker_timeout_ms")]
	pub timeout_ms: u64,
	/// Disabled breakers admit every request and ignore outcomes.
	#[serde(default = "default_true")]
	pub enabled: bool,
}

fn default_failure_threshold() -> u32 {
	5
}

fn default_success_threshold() -> u32 {
	2
}

fn default_breaker_timeout_ms() -> u64 {
	60_000
}

impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: default_failure_threshold(),
			success_threshold: default_success_threshold(),
			timeout_ms: default_breaker_timeout_ms(),
			enabled: true,
		}
	}
}

impl CircuitBreakerConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

/// Circuit breaker state machine.
///
/// - `Closed` -> `Open`: failure count reaches the threshold
/// - `Open` -> `HalfOpen`: timeout elapsed and a request is attempted
/// - `HalfOpen` -> `Closed`: success threshold reached
/// - `HalfOpen` -> `Open`: any failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

impl fmt::Display for CircuitState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			CircuitState::Closed => "closed",
			CircuitState::Open => "open",
			CircuitState::HalfOpen => "half-open",
		};
		f.write_str(label)
	}
}

/// Coarse provider health derived from success rate and circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unhealthy,
}

/// Success rate (percent) at or below which a provider is unhealthy.
pub const UNHEALTHY_SUCCESS_RATE: f64 = 50.0;
/// Success rate (percent) below which a provider is degraded.
pub const DEGRADED_SUCCESS_RATE: f64 = 90.0;

impl HealthStatus {
	/// Classifies a provider from its windowed success rate and circuit state.
	///
	/// Monotonic in both inputs: a lower rate or a more restrictive circuit
	/// never yields a better status.
	pub fn classify(success_rate: f64, circuit: CircuitState) -> Self {
		if circuit == CircuitState::Open || success_rate <= UNHEALTHY_SUCCESS_RATE {
			HealthStatus::Unhealthy
		} else if circuit == CircuitState::HalfOpen || success_rate < DEGRADED_SUCCESS_RATE {
			HealthStatus::Degraded
		} else {
			HealthStatus::Healthy
		}
	}
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			HealthStatus::Healthy => "healthy",
			HealthStatus::Degraded => "degraded",
			HealthStatus::Unhealthy => "unhealthy",
		};
		f.write_str(label)
	}
}

/// Health snapshot of one provider on one network.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderHealth {
	pub provider: String,
	pub network: Network,
	/// Attempts recorded since the last reset.
	pub total_requests: u64,
	/// Percentage of successful attempts in the retained sample window.
	pub success_rate: f64,
	/// Mean latency of successful attempts in the window, in milliseconds.
	pub average_latency_ms: f64,
	/// 95th percentile latency of successful attempts in the window.
	pub p95_latency_ms: u64,
	pub status: HealthStatus,
	pub circuit_breaker_state: CircuitState,
}

/// Manager-wide call counters combined with per-provider health.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RpcMetrics {
	pub total_calls: u64,
	pub successful_calls: u64,
	pub failed_calls: u64,
	/// Successful calls by the provider that served them.
	pub calls_by_provider: BTreeMap<String, u64>,
	pub calls_by_method: BTreeMap<String, u64>,
	pub calls_by_network: BTreeMap<Network, u64>,
	/// provider -> network -> health
	pub provider_health: BTreeMap<String, BTreeMap<Network, ProviderHealth>>,
}

/// Provider selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
	/// Ascending priority, skipping disabled and unavailable providers.
	#[default]
	Priority,
}

/// RPC manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcManagerConfig {
	#[serde(default)]
	pub strategy: SelectionStrategy,
	#[serde(default)]
	pub default_network: Network,
	/// Per-attempt timeout used when neither the call nor the provider sets one.
	#[serde(default = "default_manager_timeout_ms")]
	pub default_timeout_ms: u64,
	/// Failover attempts allowed after the first attempt of a call.
	#[serde(default = "default_manager_max_retries")]
	pub default_max_retries: u32,
	/// Whether call counters are updated.
	#[serde(default = "default_true")]
	pub enable_metrics: bool,
	/// Whether per-call events are logged.
	#[serde(default = "default_true")]
	pub enable_logging: bool,
}

fn default_manager_timeout_ms() -> u64 {
	10_000
}

fn default_manager_max_retries() -> u32 {
	3
}

impl Default for RpcManagerConfig {
	fn default() -> Self {
		Self {
			strategy: SelectionStrategy::default(),
			default_network: Network::default(),
			default_timeout_ms: default_manager_timeout_ms(),
			default_max_retries: default_manager_max_retries(),
			enable_metrics: true,
			enable_logging: true,
		}
	}
}

/// Per-call overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CallOptions {
	#[serde(default)]
	pub network: Option<Network>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	/// Provider to try before the priority order.
	#[serde(default)]
	pub preferred_provider: Option<String>,
	#[serde(default)]
	pub max_retries: Option<u32>,
}

impl CallOptions {
	pub fn with_network(mut self, network: Network) -> Self {
		self.network = Some(network);
		self
	}

	pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.timeout_ms = Some(timeout_ms);
		self
	}

	pub fn with_preferred_provider(mut self, name: impl Into<String>) -> Self {
		self.preferred_provider = Some(name.into());
		self
	}

	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = Some(max_retries);
		self
	}
}

/// Successful call result tagged with the provider that served it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcResponse<T = serde_json::Value> {
	pub data: T,
	pub provider: String,
	pub network: Network,
	/// True when at least one earlier attempt in this call failed.
	pub is_retry: bool,
	/// 1-based index of the attempt that succeeded.
	pub attempt_number: u32,
}

/// One provider attempt inside a call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttemptRecord {
	pub provider: String,
	pub success: bool,
	pub latency_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Attempted although the provider's circuit denied the request.
	#[serde(default)]
	pub bypassed_circuit: bool,
}

/// Final outcome of a traced call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TraceOutcome {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provider: Option<String>,
	pub is_retry: bool,
	pub attempt_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Diagnostic record of one `call()` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestTrace {
	pub id: String,
	pub method: String,
	pub network: Network,
	pub started_at: DateTime<Utc>,
	pub duration_ms: u64,
	pub attempts: Vec<AttemptRecord>,
	pub outcome: TraceOutcome,
}

/// Provider listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderInfo {
	pub name: String,
	pub priority: u32,
	pub enabled: bool,
	pub networks: Vec<Network>,
	pub timeout_ms: Option<u64>,
	pub max_retries: u32,
	pub circuit_breaker_state: CircuitState,
}
