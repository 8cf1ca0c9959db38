//! Provider orchestration: selection, failover, metrics and traces.

use crate::provider::RpcProvider;
use crate::trace::{TraceBuffer, TRACE_CAPACITY};
use crate::{ProviderFailure, RpcError};
use arc_swap::ArcSwap;
use chrono::Utc;
use civic_types::{
	AttemptRecord, CallOptions, Network, ProviderInfo, RequestTrace, RpcManagerConfig, RpcMetrics,
	RpcResponse, TraceOutcome,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Call counters and trace history, updated together once per call.
#[derive(Debug, Default)]
struct Ledger {
	total_calls: u64,
	successful_calls: u64,
	failed_calls: u64,
	calls_by_provider: BTreeMap<String, u64>,
	calls_by_method: BTreeMap<String, u64>,
	calls_by_network: BTreeMap<Network, u64>,
	traces: TraceBuffer,
}

/// Result of running the candidate chain for one call.
struct ChainOutcome {
	attempts: Vec<AttemptRecord>,
	result: Result<(Value, String), RpcError>,
}

/// Routes logical RPC calls across a prioritized set of providers.
///
/// Providers are tried in ascending priority order, with the preferred
/// provider of a call moved to the front. A provider whose circuit denies
/// the request is skipped; if every candidate is denied, the highest-ranked
/// one is attempted anyway so a call never fails without trying. Failed
/// attempts fail over to the next candidate until the retry budget is spent.
///
/// The provider list is an atomically swapped snapshot: calls iterate over
/// the list they started with while providers are added or removed.
pub struct RpcManager {
	providers: ArcSwap<Vec<Arc<RpcProvider>>>,
	config: RpcManagerConfig,
	ledger: Mutex<Ledger>,
}

impl std::fmt::Debug for RpcManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let providers = self.providers.load();
		let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
		f.debug_struct("RpcManager")
			.field("providers", &names)
			.field("config", &self.config)
			.finish()
	}
}

impl RpcManager {
	/// Creates a manager, rejecting duplicate provider names.
	pub fn new(config: RpcManagerConfig, providers: Vec<RpcProvider>) -> Result<Self, RpcError> {
		let mut list: Vec<Arc<RpcProvider>> = Vec::with_capacity(providers.len());
		for provider in providers {
			if list.iter().any(|p| p.name() == provider.name()) {
				return Err(RpcError::DuplicateProvider(provider.name().to_string()));
			}
			list.push(Arc::new(provider));
		}

		Ok(Self {
			providers: ArcSwap::from_pointee(list),
			config,
			ledger: Mutex::new(Ledger::default()),
		})
	}

	pub fn config(&self) -> &RpcManagerConfig {
		&self.config
	}

	/// Executes `method` with failover and returns the first successful result.
	pub async fn call(
		&self,
		method: &str,
		params: Value,
		options: CallOptions,
	) -> Result<RpcResponse, RpcError> {
		let network = options.network.unwrap_or(self.config.default_network);
		let started_at = Utc::now();
		let started = Instant::now();

		let candidates = self.candidates(network, options.preferred_provider.as_deref());
		let chain = if candidates.is_empty() {
			ChainOutcome {
				attempts: Vec::new(),
				result: Err(RpcError::NoProvidersAvailable { network }),
			}
		} else {
			self.run_chain(method, &params, network, &options, &candidates)
				.await
		};

		let attempt_number = chain.attempts.len() as u32;
		let is_retry = attempt_number > 1;
		let duration_ms = civic_types::saturating_millis(started.elapsed());

		let result = chain.result.map(|(data, provider)| RpcResponse {
			data,
			provider,
			network,
			is_retry,
			attempt_number,
		});

		let trace = RequestTrace {
			id: Uuid::new_v4().to_string(),
			method: method.to_string(),
			network,
			started_at,
			duration_ms,
			attempts: chain.attempts,
			outcome: TraceOutcome {
				success: result.is_ok(),
				provider: result.as_ref().ok().map(|r| r.provider.clone()),
				is_retry,
				attempt_number,
				error: result.as_ref().err().map(ToString::to_string),
			},
		};
		self.record_call(method, network, result.as_ref().ok().map(|r| r.provider.as_str()), trace)
			.await;

		if self.config.enable_logging {
			match &result {
				Ok(response) => tracing::debug!(
					method,
					%network,
					provider = %response.provider,
					attempt = attempt_number,
					duration_ms,
					"RPC call succeeded"
				),
				Err(error) => tracing::warn!(method, %network, duration_ms, error = %error, "RPC call failed"),
			}
		}

		result
	}

	/// Like [`call`](Self::call), deserializing the result into `T`.
	pub async fn call_as<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
		options: CallOptions,
	) -> Result<RpcResponse<T>, RpcError> {
		let response = self.call(method, params, options).await?;
		let data = serde_json::from_value(response.data)
			.map_err(|e| RpcError::Deserialization(e.to_string()))?;
		Ok(RpcResponse {
			data,
			provider: response.provider,
			network: response.network,
			is_retry: response.is_retry,
			attempt_number: response.attempt_number,
		})
	}

	async fn run_chain(
		&self,
		method: &str,
		params: &Value,
		network: Network,
		options: &CallOptions,
		candidates: &[Arc<RpcProvider>],
	) -> ChainOutcome {
		let retries = options
			.max_retries
			.unwrap_or(self.config.default_max_retries) as usize;
		let max_attempts = retries.saturating_add(1);
		let mut attempts = Vec::new();
		let mut failures = Vec::new();

		for provider in candidates {
			if attempts.len() >= max_attempts {
				break;
			}
			if !provider.allow_request().await {
				if self.config.enable_logging {
					tracing::debug!(provider = %provider.name(), method, "Skipping provider with open circuit");
				}
				continue;
			}
			if let Some(data) = self
				.attempt(provider, method, params, network, options, false, &mut attempts, &mut failures)
				.await
			{
				return ChainOutcome {
					attempts,
					result: Ok((data, provider.name().to_string())),
				};
			}
		}

		if attempts.is_empty() {
			// Every circuit denied the call, try the best candidate regardless
			let provider = &candidates[0];
			tracing::warn!(provider = %provider.name(), method, "All circuits open, forcing attempt");
			if let Some(data) = self
				.attempt(provider, method, params, network, options, true, &mut attempts, &mut failures)
				.await
			{
				return ChainOutcome {
					attempts,
					result: Ok((data, provider.name().to_string())),
				};
			}
		}

		ChainOutcome {
			attempts,
			result: Err(RpcError::AllProvidersFailed {
				method: method.to_string(),
				failures,
			}),
		}
	}

	#[allow(clippy::too_many_arguments)]
	async fn attempt(
		&self,
		provider: &RpcProvider,
		method: &str,
		params: &Value,
		network: Network,
		options: &CallOptions,
		bypassed_circuit: bool,
		attempts: &mut Vec<AttemptRecord>,
		failures: &mut Vec<ProviderFailure>,
	) -> Option<Value> {
		let timeout = self.timeout_for(provider, options);
		let started = Instant::now();
		let result = provider.execute(method, params, network, timeout).await;
		let latency_ms = civic_types::saturating_millis(started.elapsed());

		match result {
			Ok(data) => {
				attempts.push(AttemptRecord {
					provider: provider.name().to_string(),
					success: true,
					latency_ms,
					error: None,
					bypassed_circuit,
				});
				Some(data)
			},
			Err(error) => {
				if self.config.enable_logging {
					tracing::info!(provider = %provider.name(), method, error = %error, "Provider attempt failed, failing over");
				}
				let message = error.to_string();
				attempts.push(AttemptRecord {
					provider: provider.name().to_string(),
					success: false,
					latency_ms,
					error: Some(message.clone()),
					bypassed_circuit,
				});
				failures.push(ProviderFailure {
					provider: provider.name().to_string(),
					error: message,
				});
				None
			},
		}
	}

	/// Per-attempt timeout: call option, then provider setting, then manager default.
	fn timeout_for(&self, provider: &RpcProvider, options: &CallOptions) -> Duration {
		let timeout_ms = options
			.timeout_ms
			.or(provider.config().timeout_ms)
			.unwrap_or(self.config.default_timeout_ms);
		Duration::from_millis(timeout_ms)
	}

	/// Enabled providers serving `network`, preferred first, then by priority.
	fn candidates(&self, network: Network, preferred: Option<&str>) -> Vec<Arc<RpcProvider>> {
		let snapshot = self.providers.load_full();
		let mut candidates: Vec<Arc<RpcProvider>> = snapshot
			.iter()
			.filter(|p| p.is_enabled() && p.supports(network))
			.cloned()
			.collect();
		candidates.sort_by_key(|p| p.priority());

		if let Some(name) = preferred {
			if let Some(index) = candidates.iter().position(|p| p.name() == name) {
				let provider = candidates.remove(index);
				candidates.insert(0, provider);
			}
		}

		candidates
	}

	async fn record_call(
		&self,
		method: &str,
		network: Network,
		provider: Option<&str>,
		trace: RequestTrace,
	) {
		let mut ledger = self.ledger.lock().await;
		if self.config.enable_metrics {
			ledger.total_calls += 1;
			*ledger.calls_by_method.entry(method.to_string()).or_default() += 1;
			*ledger.calls_by_network.entry(network).or_default() += 1;
			match provider {
				Some(provider) => {
					ledger.successful_calls += 1;
					*ledger
						.calls_by_provider
						.entry(provider.to_string())
						.or_default() += 1;
				},
				None => ledger.failed_calls += 1,
			}
		}
		ledger.traces.push(trace);
	}

	/// Snapshot of call counters and per-network health of every provider.
	pub async fn metrics(&self) -> RpcMetrics {
		let mut metrics = {
			let ledger = self.ledger.lock().await;
			RpcMetrics {
				total_calls: ledger.total_calls,
				successful_calls: ledger.successful_calls,
				failed_calls: ledger.failed_calls,
				calls_by_provider: ledger.calls_by_provider.clone(),
				calls_by_method: ledger.calls_by_method.clone(),
				calls_by_network: ledger.calls_by_network.clone(),
				provider_health: BTreeMap::new(),
			}
		};

		for provider in self.providers.load().iter() {
			metrics
				.provider_health
				.insert(provider.name().to_string(), provider.health_by_network().await);
		}
		metrics
	}

	/// Up to `limit` most recent traces, newest first.
	pub async fn traces(&self, limit: usize) -> Vec<RequestTrace> {
		self.ledger
			.lock()
			.await
			.traces
			.recent(limit.min(TRACE_CAPACITY))
	}

	/// Adds a provider at runtime.
	pub fn add_provider(&self, provider: RpcProvider) -> Result<(), RpcError> {
		let name = provider.name().to_string();
		let provider = Arc::new(provider);
		let mut duplicate = false;
		self.providers.rcu(|current| {
			duplicate = current.iter().any(|p| p.name() == name);
			let mut next = (**current).clone();
			if !duplicate {
				next.push(provider.clone());
			}
			next
		});

		if duplicate {
			return Err(RpcError::DuplicateProvider(name));
		}
		tracing::info!(provider = %name, "Added RPC provider");
		Ok(())
	}

	/// Removes a provider at runtime. Calls already holding it finish normally.
	pub fn remove_provider(&self, name: &str) -> Result<(), RpcError> {
		let mut found = false;
		self.providers.rcu(|current| {
			found = current.iter().any(|p| p.name() == name);
			current
				.iter()
				.filter(|p| p.name() != name)
				.cloned()
				.collect::<Vec<_>>()
		});

		if !found {
			return Err(RpcError::ProviderNotFound(name.to_string()));
		}
		tracing::info!(provider = %name, "Removed RPC provider");
		Ok(())
	}

	pub fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), RpcError> {
		let provider = self
			.provider(name)
			.ok_or_else(|| RpcError::ProviderNotFound(name.to_string()))?;
		provider.set_enabled(enabled);
		tracing::info!(provider = %name, enabled, "Updated RPC provider state");
		Ok(())
	}

	/// Clears every provider's health windows and closes their circuits.
	pub async fn reset_all_health(&self) {
		for provider in self.providers.load().iter() {
			provider.reset_health().await;
		}
		tracing::info!("Reset health of all RPC providers");
	}

	pub fn provider(&self, name: &str) -> Option<Arc<RpcProvider>> {
		self.providers
			.load()
			.iter()
			.find(|p| p.name() == name)
			.cloned()
	}

	/// Static listing of every provider, in priority order.
	pub async fn providers(&self) -> Vec<ProviderInfo> {
		let mut providers: Vec<Arc<RpcProvider>> = self.providers.load().iter().cloned().collect();
		providers.sort_by_key(|p| p.priority());
		let mut infos = Vec::with_capacity(providers.len());
		for provider in providers {
			infos.push(provider.info().await);
		}
		infos
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::mock::MockTransport;
	use civic_types::{CircuitBreakerConfig, CircuitState, ProviderConfig};
	use serde_json::json;

	fn provider(name: &str, priority: u32, transport: Arc<MockTransport>) -> RpcProvider {
		RpcProvider::new(
			ProviderConfig::new(name, format!("https://{}.example", name))
				.with_testnet_url(format!("https://{}-test.example", name))
				.with_priority(priority),
			CircuitBreakerConfig {
				failure_threshold: 3,
				success_threshold: 2,
				timeout_ms: 100,
				enabled: true,
			},
			transport,
		)
	}

	struct Fixture {
		manager: RpcManager,
		transports: Vec<Arc<MockTransport>>,
	}

	/// Three providers p1..p3 with priorities 1..3; `failing` marks which fail.
	fn fixture(failing: [bool; 3]) -> Fixture {
		let transports: Vec<Arc<MockTransport>> = failing
			.iter()
			.enumerate()
			.map(|(i, fails)| {
				let transport = MockTransport::succeeding(json!({ "served_by": format!("p{}", i + 1) }));
				transport.set_failing(*fails);
				Arc::new(transport)
			})
			.collect();
		let providers = transports
			.iter()
			.enumerate()
			.map(|(i, t)| provider(&format!("p{}", i + 1), i as u32 + 1, t.clone()))
			.collect();
		Fixture {
			manager: RpcManager::new(RpcManagerConfig::default(), providers).unwrap(),
			transports,
		}
	}

	#[tokio::test]
	async fn test_healthy_providers_use_lowest_priority() {
		let f = fixture([false, false, false]);
		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p1");
		assert_eq!(response.attempt_number, 1);
		assert!(!response.is_retry);
		assert_eq!(response.network, Network::Mainnet);
	}

	#[tokio::test]
	async fn test_failover_to_next_provider() {
		let f = fixture([true, false, false]);
		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p2");
		assert_eq!(response.attempt_number, 2);
		assert!(response.is_retry);
		assert_eq!(response.data["served_by"], "p2");

		let p1 = f.manager.provider("p1").unwrap();
		assert_eq!(p1.circuit_breaker().failure_count().await, 1);
		assert_eq!(f.transports[2].calls(), 0);
	}

	#[tokio::test]
	async fn test_all_failures_are_reported() {
		let f = fixture([true, true, true]);
		let err = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap_err();
		match err {
			RpcError::AllProvidersFailed { method, failures } => {
				assert_eq!(method, "status");
				let names: Vec<_> = failures.iter().map(|f| f.provider.as_str()).collect();
				assert_eq!(names, vec!["p1", "p2", "p3"]);
			},
			other => panic!("unexpected error: {}", other),
		}

		let metrics = f.manager.metrics().await;
		assert_eq!(metrics.failed_calls, 1);
		assert_eq!(metrics.successful_calls, 0);
	}

	#[tokio::test]
	async fn test_max_retries_limits_attempts() {
		let f = fixture([true, true, false]);
		let err = f
			.manager
			.call("status", Value::Null, CallOptions::default().with_max_retries(1))
			.await
			.unwrap_err();
		assert!(matches!(err, RpcError::AllProvidersFailed { ref failures, .. } if failures.len() == 2));
		assert_eq!(f.transports[2].calls(), 0);
	}

	#[tokio::test]
	async fn test_preferred_provider_goes_first() {
		let f = fixture([false, false, false]);
		let response = f
			.manager
			.call("status", Value::Null, CallOptions::default().with_preferred_provider("p3"))
			.await
			.unwrap();
		assert_eq!(response.provider, "p3");
		assert_eq!(response.attempt_number, 1);
	}

	#[tokio::test]
	async fn test_preferred_provider_is_not_tried_twice() {
		let f = fixture([true, true, true]);
		let _ = f
			.manager
			.call("status", Value::Null, CallOptions::default().with_preferred_provider("p2"))
			.await;
		assert_eq!(f.transports[1].calls(), 1);
		let trace = &f.manager.traces(1).await[0];
		let order: Vec<_> = trace.attempts.iter().map(|a| a.provider.as_str()).collect();
		assert_eq!(order, vec!["p2", "p1", "p3"]);
	}

	#[tokio::test]
	async fn test_disabled_provider_is_skipped() {
		let f = fixture([false, false, false]);
		f.manager.set_provider_enabled("p1", false).unwrap();
		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p2");
		assert_eq!(response.attempt_number, 1);
		assert_eq!(f.transports[0].calls(), 0);

		assert!(matches!(
			f.manager.set_provider_enabled("nope", true),
			Err(RpcError::ProviderNotFound(_))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_open_circuit_is_skipped() {
		let f = fixture([true, false, false]);
		for _ in 0..3 {
			f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		}
		let p1 = f.manager.provider("p1").unwrap();
		assert_eq!(p1.circuit_state().await, CircuitState::Open);

		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p2");
		// Skipped providers do not count as attempts
		assert_eq!(response.attempt_number, 1);
		assert_eq!(f.transports[0].calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_forced_attempt_when_every_circuit_is_open() {
		let f = fixture([true, true, true]);
		for _ in 0..3 {
			let _ = f.manager.call("status", Value::Null, CallOptions::default()).await;
		}
		for transport in &f.transports {
			transport.set_failing(false);
		}

		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p1");
		let trace = &f.manager.traces(1).await[0];
		assert_eq!(trace.attempts.len(), 1);
		assert!(trace.attempts[0].bypassed_circuit);
	}

	#[tokio::test]
	async fn test_unsupported_network_yields_no_providers() {
		let transport = Arc::new(MockTransport::succeeding(Value::Null));
		let manager = RpcManager::new(
			RpcManagerConfig::default(),
			vec![RpcProvider::new(
				ProviderConfig::new("main-only", "https://main.example"),
				CircuitBreakerConfig::default(),
				transport.clone(),
			)],
		)
		.unwrap();

		let err = manager
			.call("status", Value::Null, CallOptions::default().with_network(Network::Testnet))
			.await
			.unwrap_err();
		assert!(matches!(err, RpcError::NoProvidersAvailable { network: Network::Testnet }));
		assert_eq!(transport.calls(), 0);
		assert_eq!(manager.traces(10).await.len(), 1);
	}

	#[tokio::test]
	async fn test_traces_are_bounded_and_newest_first() {
		let f = fixture([false, false, false]);
		for i in 0..(TRACE_CAPACITY + 5) {
			f.manager
				.call(&format!("m{}", i), Value::Null, CallOptions::default())
				.await
				.unwrap();
		}
		assert_eq!(f.manager.traces(1_000).await.len(), TRACE_CAPACITY);
		let recent = f.manager.traces(3).await;
		assert_eq!(recent.len(), 3);
		assert_eq!(recent[0].method, format!("m{}", TRACE_CAPACITY + 4));
		assert!(recent[0].outcome.success);
	}

	#[tokio::test]
	async fn test_metrics_are_idempotent() {
		let f = fixture([true, false, false]);
		f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		f.manager
			.call("query", Value::Null, CallOptions::default().with_network(Network::Testnet))
			.await
			.unwrap();

		let first = f.manager.metrics().await;
		let second = f.manager.metrics().await;
		assert_eq!(first, second);
		assert_eq!(first.total_calls, 2);
		assert_eq!(first.successful_calls, 2);
		assert_eq!(first.calls_by_provider["p2"], 2);
		assert_eq!(first.calls_by_method["query"], 1);
		assert_eq!(first.calls_by_network[&Network::Testnet], 1);
		let p1_mainnet = &first.provider_health["p1"][&Network::Mainnet];
		assert_eq!(p1_mainnet.total_requests, 1);
		assert_eq!(p1_mainnet.success_rate, 0.0);
	}

	#[tokio::test]
	async fn test_metrics_disabled_still_traces() {
		let transport = Arc::new(MockTransport::succeeding(Value::Null));
		let manager = RpcManager::new(
			RpcManagerConfig {
				enable_metrics: false,
				..Default::default()
			},
			vec![provider("p1", 1, transport)],
		)
		.unwrap();
		manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(manager.metrics().await.total_calls, 0);
		assert_eq!(manager.traces(10).await.len(), 1);
	}

	#[tokio::test]
	async fn test_runtime_provider_management() {
		let f = fixture([true, true, true]);
		let fresh = Arc::new(MockTransport::succeeding(json!("ok")));
		f.manager.add_provider(provider("p0", 0, fresh.clone())).unwrap();
		assert!(matches!(
			f.manager.add_provider(provider("p0", 5, fresh.clone())),
			Err(RpcError::DuplicateProvider(_))
		));

		let response = f.manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(response.provider, "p0");

		f.manager.remove_provider("p0").unwrap();
		assert!(f.manager.provider("p0").is_none());
		assert!(matches!(
			f.manager.remove_provider("p0"),
			Err(RpcError::ProviderNotFound(_))
		));
		let names: Vec<_> = f.manager.providers().await.into_iter().map(|p| p.name).collect();
		assert_eq!(names, vec!["p1", "p2", "p3"]);
	}

	#[tokio::test]
	async fn test_reset_all_health_closes_circuits() {
		let f = fixture([true, true, true]);
		for _ in 0..3 {
			let _ = f.manager.call("status", Value::Null, CallOptions::default()).await;
		}
		f.manager.reset_all_health().await;
		let metrics = f.manager.metrics().await;
		for health in metrics.provider_health.values() {
			for snapshot in health.values() {
				assert_eq!(snapshot.total_requests, 0);
				assert_eq!(snapshot.circuit_breaker_state, CircuitState::Closed);
			}
		}
	}

	#[tokio::test]
	async fn test_duplicate_names_rejected_at_construction() {
		let transport = Arc::new(MockTransport::succeeding(Value::Null));
		let result = RpcManager::new(
			RpcManagerConfig::default(),
			vec![provider("a", 1, transport.clone()), provider("a", 2, transport)],
		);
		assert!(matches!(result, Err(RpcError::DuplicateProvider(_))));
	}

	#[tokio::test]
	async fn test_call_as_decodes_payload() {
		let f = fixture([false, false, false]);
		#[derive(serde::Deserialize)]
		struct Served {
			served_by: String,
		}
		let response = f
			.manager
			.call_as::<Served>("status", Value::Null, CallOptions::default())
			.await
			.unwrap();
		assert_eq!(response.data.served_by, "p1");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_calls_survive_provider_removal() {
		const CALLS: usize = 200;
		let slow = Arc::new(MockTransport::succeeding(json!("a")).with_latency(Duration::from_millis(20)));
		let backup = Arc::new(MockTransport::succeeding(json!("b")));
		let manager = Arc::new(
			RpcManager::new(
				RpcManagerConfig::default(),
				vec![provider("a", 1, slow.clone()), provider("b", 2, backup.clone())],
			)
			.unwrap(),
		);

		let handles: Vec<_> = (0..CALLS)
			.map(|_| {
				let manager = Arc::clone(&manager);
				tokio::spawn(async move { manager.call("status", Value::Null, CallOptions::default()).await })
			})
			.collect();

		while slow.calls() == 0 {
			tokio::task::yield_now().await;
		}
		manager.remove_provider("a").unwrap();

		let mut served_by_a = 0;
		for handle in handles {
			let response = handle.await.unwrap().unwrap();
			if response.provider == "a" {
				served_by_a += 1;
			}
		}
		// Calls already running against the removed provider complete on it
		assert!(served_by_a >= 1);
		assert!(manager.provider("a").is_none());

		let metrics = manager.metrics().await;
		assert_eq!(metrics.total_calls, CALLS as u64);
		assert_eq!(metrics.successful_calls, CALLS as u64);
		assert_eq!(metrics.calls_by_provider.values().sum::<u64>(), CALLS as u64);
		assert_eq!(manager.traces(1_000).await.len(), CALLS.min(TRACE_CAPACITY));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_disabling_provider_mid_call() {
		let slow = Arc::new(MockTransport::succeeding(json!("a")).with_latency(Duration::from_millis(50)));
		let backup = Arc::new(MockTransport::succeeding(json!("b")));
		let manager = Arc::new(
			RpcManager::new(
				RpcManagerConfig::default(),
				vec![provider("a", 1, slow.clone()), provider("b", 2, backup.clone())],
			)
			.unwrap(),
		);

		let in_flight = {
			let manager = Arc::clone(&manager);
			tokio::spawn(async move { manager.call("status", Value::Null, CallOptions::default()).await })
		};
		while slow.calls() == 0 {
			tokio::task::yield_now().await;
		}
		manager.set_provider_enabled("a", false).unwrap();

		let next = manager.call("status", Value::Null, CallOptions::default()).await.unwrap();
		assert_eq!(next.provider, "b");
		assert_eq!(in_flight.await.unwrap().unwrap().provider, "a");
		assert_eq!(slow.calls(), 1);
	}

	#[test]
	fn test_debug_lists_provider_names() {
		let f = fixture([false, false, false]);
		let debug = format!("{:?}", f.manager);
		assert!(debug.starts_with("RpcManager { providers: [\"p1\", \"p2\", \"p3\"]"));
	}
}
