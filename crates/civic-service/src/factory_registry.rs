//! Factory registry for transport and adapter implementations.
//!
//! Configuration names implementations by string; this module maps those
//! names to the factories exported by the RPC and delivery crates.

use civic_config::Config;
use civic_delivery::{AdapterFactory, AdapterRegistry, DeliveryPipeline};
use civic_rpc::{RpcManager, RpcProvider, TransportFactory};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// All known implementation factories.
pub struct FactoryRegistry {
	pub transports: HashMap<String, TransportFactory>,
	pub adapters: HashMap<String, AdapterFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			transports: HashMap::new(),
			adapters: HashMap::new(),
		}
	}

	pub fn register_transport(&mut self, name: impl Into<String>, factory: TransportFactory) {
		self.transports.insert(name.into(), factory);
	}

	pub fn register_adapter(&mut self, name: impl Into<String>, factory: AdapterFactory) {
		self.adapters.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in civic_rpc::get_all_implementations() {
			tracing::debug!("Registering transport implementation: {}", name);
			registry.register_transport(name, factory);
		}

		for (name, factory) in civic_delivery::get_all_implementations() {
			tracing::debug!("Registering adapter implementation: {}", name);
			registry.register_adapter(name, factory);
		}

		registry
	})
}

fn available<V>(map: &HashMap<String, V>) -> String {
	let mut names: Vec<_> = map.keys().cloned().collect();
	names.sort();
	names.join(", ")
}

/// Builds the RPC manager and its providers from configuration.
pub fn build_rpc_manager(config: &Config) -> Result<RpcManager, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let mut providers = Vec::with_capacity(config.rpc.providers.len());

	for entry in &config.rpc.providers {
		let factory = registry.transports.get(&entry.transport).ok_or_else(|| {
			format!(
				"Unknown transport '{}' for provider '{}'. Available: [{}]",
				entry.transport,
				entry.provider.name,
				available(&registry.transports)
			)
		})?;
		let transport = factory(&entry.transport_config())?;
		providers.push(RpcProvider::new(
			entry.provider.clone(),
			config.rpc.circuit_breaker_for(entry),
			Arc::from(transport),
		));
		tracing::info!(
			provider = %entry.provider.name,
			transport = %entry.transport,
			priority = entry.provider.priority,
			"Configured RPC provider"
		);
	}

	Ok(RpcManager::new(config.rpc.manager.clone(), providers)?)
}

/// Builds the adapter registry from the configured adapter tables.
pub fn build_adapter_registry(
	config: &Config,
) -> Result<AdapterRegistry, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let mut adapters = AdapterRegistry::new();

	let mut names: Vec<_> = config.delivery.adapters.keys().collect();
	names.sort();
	for name in names {
		let factory = registry.adapters.get(name).ok_or_else(|| {
			format!(
				"Unknown adapter implementation '{}'. Available: [{}]",
				name,
				available(&registry.adapters)
			)
		})?;
		let adapter = factory(&config.delivery.adapters[name])?;
		tracing::info!(
			adapter = %name,
			countries = ?adapter.countries(),
			"Configured delivery adapter"
		);
		adapters.register(Arc::from(adapter));
	}

	Ok(adapters)
}

/// Builds the delivery pipeline over every configured adapter.
pub fn build_pipeline(config: &Config) -> Result<DeliveryPipeline, Box<dyn std::error::Error>> {
	let registry = build_adapter_registry(config)?;
	Ok(DeliveryPipeline::new(Arc::new(registry), config.delivery.pipeline))
}
