//! A single upstream RPC endpoint.

use crate::circuit_breaker::CircuitBreaker;
use crate::health::HealthWindow;
use crate::{RpcError, RpcTransport};
use civic_types::{
	CircuitBreakerConfig, CircuitState, Network, ProviderConfig, ProviderHealth, ProviderInfo,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// One upstream endpoint together with its breaker and health windows.
///
/// The static description is fixed at construction; only the enabled flag,
/// the breaker and the health windows change afterwards.
pub struct RpcProvider {
	config: ProviderConfig,
	enabled: AtomicBool,
	transport: Arc<dyn RpcTransport>,
	breaker: CircuitBreaker,
	health: RwLock<BTreeMap<Network, HealthWindow>>,
}

impl std::fmt::Debug for RpcProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RpcProvider")
			.field("name", &self.config.name)
			.field("priority", &self.config.priority)
			.field("enabled", &self.is_enabled())
			.finish()
	}
}

impl RpcProvider {
	pub fn new(
		config: ProviderConfig,
		breaker_config: CircuitBreakerConfig,
		transport: Arc<dyn RpcTransport>,
	) -> Self {
		Self {
			enabled: AtomicBool::new(config.enabled),
			breaker: CircuitBreaker::new(config.name.clone(), breaker_config),
			health: RwLock::new(BTreeMap::new()),
			transport,
			config,
		}
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	pub fn config(&self) -> &ProviderConfig {
		&self.config
	}

	pub fn priority(&self) -> u32 {
		self.config.priority
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}

	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.store(enabled, Ordering::Release);
	}

	pub fn supports(&self, network: Network) -> bool {
		self.config.url_for(network).is_some()
	}

	pub fn circuit_breaker(&self) -> &CircuitBreaker {
		&self.breaker
	}

	pub async fn allow_request(&self) -> bool {
		self.breaker.allow_request().await
	}

	pub async fn circuit_state(&self) -> CircuitState {
		self.breaker.state().await
	}

	/// Gated call: checks network support and the breaker before executing.
	pub async fn call(
		&self,
		method: &str,
		params: &Value,
		network: Network,
		timeout: Duration,
	) -> Result<Value, RpcError> {
		if !self.supports(network) {
			return Err(RpcError::UnsupportedNetwork {
				provider: self.name().to_string(),
				network,
			});
		}
		if !self.allow_request().await {
			return Err(RpcError::CircuitOpen {
				provider: self.name().to_string(),
			});
		}
		self.execute(method, params, network, timeout).await
	}

	/// Runs one attempt without consulting the breaker gate.
	///
	/// The outcome is always recorded in the breaker and in the health window
	/// of `network`.
	pub async fn execute(
		&self,
		method: &str,
		params: &Value,
		network: Network,
		timeout: Duration,
	) -> Result<Value, RpcError> {
		let url = self
			.config
			.url_for(network)
			.ok_or_else(|| RpcError::UnsupportedNetwork {
				provider: self.name().to_string(),
				network,
			})?;

		let started = Instant::now();
		let result = tokio::time::timeout(timeout, self.transport.request(method, params, url, timeout)).await;
		let latency_ms = civic_types::saturating_millis(started.elapsed());

		let result = match result {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(error)) => Err(RpcError::Transport {
				provider: self.name().to_string(),
				error,
			}),
			Err(_) => Err(RpcError::Timeout {
				provider: self.name().to_string(),
				timeout_ms: civic_types::saturating_millis(timeout),
			}),
		};

		match &result {
			Ok(_) => {
				self.breaker.record_success().await;
				self.health
					.write()
					.await
					.entry(network)
					.or_default()
					.record_success(latency_ms);
			},
			Err(error) => {
				tracing::debug!(provider = %self.name(), %network, method, latency_ms, error = %error, "RPC attempt failed");
				self.breaker.record_failure().await;
				self.health
					.write()
					.await
					.entry(network)
					.or_default()
					.record_failure(latency_ms);
			},
		}

		result
	}

	/// Health snapshot for one network.
	pub async fn health(&self, network: Network) -> ProviderHealth {
		let health = self.health.read().await;
		let circuit = self.breaker.state().await;
		match health.get(&network) {
			Some(window) => window.snapshot(self.name(), network, circuit),
			None => HealthWindow::new().snapshot(self.name(), network, circuit),
		}
	}

	/// Health snapshots for every network this provider serves.
	pub async fn health_by_network(&self) -> BTreeMap<Network, ProviderHealth> {
		let health = self.health.read().await;
		let circuit = self.breaker.state().await;
		let empty = HealthWindow::new();
		self.config
			.networks()
			.into_iter()
			.map(|network| {
				let window = health.get(&network).unwrap_or(&empty);
				(network, window.snapshot(self.name(), network, circuit))
			})
			.collect()
	}

	/// Clears health windows and closes the breaker.
	pub async fn reset_health(&self) {
		self.health.write().await.clear();
		self.breaker.reset().await;
	}

	pub async fn info(&self) -> ProviderInfo {
		ProviderInfo {
			name: self.config.name.clone(),
			priority: self.config.priority,
			enabled: self.is_enabled(),
			networks: self.config.networks(),
			timeout_ms: self.config.timeout_ms,
			max_retries: self.config.max_retries,
			circuit_breaker_state: self.breaker.state().await,
		}
	}
}
