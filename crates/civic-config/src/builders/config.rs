//! Builder for test and development configurations.

use crate::{Config, DeliveryConfig, ProviderEntry, RpcConfig, ServiceConfig};
use civic_types::{CircuitBreakerConfig, Network, PipelineConfig, ProviderConfig, RpcManagerConfig};
use std::collections::HashMap;

/// Fluent builder producing a valid [`Config`].
///
/// Starts with one mock provider and one email adapter.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	manager: RpcManagerConfig,
	circuit_breaker: CircuitBreakerConfig,
	providers: Vec<ProviderEntry>,
	adapters: HashMap<String, toml::Value>,
	pipeline: PipelineConfig,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut email = toml::map::Map::new();
		email.insert(
			"relay_endpoint".to_string(),
			toml::Value::String("https://relay.test".to_string()),
		);
		email.insert(
			"from_address".to_string(),
			toml::Value::String("noreply@civic.test".to_string()),
		);

		Self {
			service_id: "civic-test".to_string(),
			manager: RpcManagerConfig::default(),
			circuit_breaker: CircuitBreakerConfig::default(),
			providers: vec![mock_entry(ProviderConfig::new("mock", "https://mock.test"))],
			adapters: HashMap::from([("email".to_string(), toml::Value::Table(email))]),
			pipeline: PipelineConfig::default(),
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn default_network(mut self, network: Network) -> Self {
		self.manager.default_network = network;
		self
	}

	pub fn default_max_retries(mut self, retries: u32) -> Self {
		self.manager.default_max_retries = retries;
		self
	}

	pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
		self.circuit_breaker = config;
		self
	}

	/// Appends a provider using the named transport and no transport options.
	pub fn provider(mut self, provider: ProviderConfig, transport: &str) -> Self {
		self.providers.push(ProviderEntry {
			provider,
			transport: transport.to_string(),
			transport_options: None,
			circuit_breaker: None,
		});
		self
	}

	/// Replaces the provider list.
	pub fn providers(mut self, providers: Vec<ProviderEntry>) -> Self {
		self.providers = providers;
		self
	}

	pub fn adapter(mut self, name: &str, config: toml::Value) -> Self {
		self.adapters.insert(name.to_string(), config);
		self
	}

	pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
		self.pipeline = pipeline;
		self
	}

	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			rpc: RpcConfig {
				manager: self.manager,
				circuit_breaker: self.circuit_breaker,
				providers: self.providers,
			},
			delivery: DeliveryConfig {
				pipeline: self.pipeline,
				adapters: self.adapters,
			},
		}
	}
}

/// A provider entry backed by the mock transport answering `{"ok": true}`.
pub fn mock_entry(provider: ProviderConfig) -> ProviderEntry {
	let mut options = toml::map::Map::new();
	options.insert(
		"response".to_string(),
		toml::Value::String(r#"{"ok":true}"#.to_string()),
	);
	ProviderEntry {
		provider,
		transport: "mock".to_string(),
		transport_options: Some(toml::Value::Table(options)),
		circuit_breaker: None,
	}
}
