//! Multi-provider RPC layer for the civic delivery core.
//!
//! This crate routes logical RPC calls across a prioritized set of upstream
//! providers. Each provider owns a circuit breaker and rolling health
//! statistics; the [`RpcManager`] selects candidates, fails over on transport
//! errors, aggregates metrics and keeps a bounded trace history. The actual
//! wire transport is pluggable through [`RpcTransport`].

use async_trait::async_trait;
use civic_types::{ConfigSchema, ImplementationRegistry, Network};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod circuit_breaker;
pub mod health;
pub mod helpers;
pub mod manager;
pub mod provider;
pub mod trace;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot};
pub use health::{HealthWindow, HEALTH_WINDOW_SIZE};
pub use helpers::{AccountView, FunctionCallResult};
pub use manager::RpcManager;
pub use provider::RpcProvider;
pub use trace::{TraceBuffer, TRACE_CAPACITY};

/// Errors produced by a transport while talking to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	/// Connection, TLS or protocol failure before a response was read.
	#[error("HTTP error: {0}")]
	Http(String),
	/// Endpoint answered with a non-success status.
	#[error("HTTP status {status}: {body}")]
	Status { status: u16, body: String },
	/// Endpoint answered with a JSON-RPC error object.
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },
	/// Response body could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// One failed provider attempt, as reported in [`RpcError::AllProvidersFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
	pub provider: String,
	pub error: String,
}

impl fmt::Display for ProviderFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.provider, self.error)
	}
}

fn join_failures(failures: &[ProviderFailure]) -> String {
	failures
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("; ")
}

/// Errors that can occur while executing RPC calls or managing providers.
#[derive(Debug, Error)]
pub enum RpcError {
	/// The provider has no endpoint for the requested network.
	#[error("Provider '{provider}' does not support {network}")]
	UnsupportedNetwork { provider: String, network: Network },
	/// The provider's circuit breaker denied the request.
	#[error("Circuit open for provider '{provider}'")]
	CircuitOpen { provider: String },
	/// The provider was attempted and its transport failed.
	#[error("Provider '{provider}' failed: {error}")]
	Transport {
		provider: String,
		#[source]
		error: TransportError,
	},
	/// The provider was attempted and did not answer in time.
	#[error("Provider '{provider}' timed out after {timeout_ms}ms")]
	Timeout { provider: String, timeout_ms: u64 },
	/// Every eligible candidate was attempted and failed.
	#[error("All providers failed for '{method}': {}", join_failures(.failures))]
	AllProvidersFailed {
		method: String,
		failures: Vec<ProviderFailure>,
	},
	/// No enabled provider serves the requested network.
	#[error("No providers available for {network}")]
	NoProvidersAvailable { network: Network },
	#[error("Provider not found: {0}")]
	ProviderNotFound(String),
	#[error("Provider already registered: {0}")]
	DuplicateProvider(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The call succeeded but its payload did not have the expected shape.
	#[error("Failed to decode response: {0}")]
	Deserialization(String),
}

/// Wire transport used by a provider to reach its endpoint.
///
/// Implementations translate an abstract `(method, params)` call into a
/// concrete request against `url` and return the parsed result payload.
#[async_trait]
pub trait RpcTransport: Send + Sync {
	/// Returns the configuration schema for this transport implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Performs one request. Implementations should honor `timeout`; the
	/// provider also enforces it around the whole call.
	async fn request(
		&self,
		method: &str,
		params: &Value,
		url: &str,
		timeout: Duration,
	) -> Result<Value, TransportError>;
}

/// Type alias for transport factory functions.
pub type TransportFactory = fn(&toml::Value) -> Result<Box<dyn RpcTransport>, RpcError>;

/// Registry trait for transport implementations.
pub trait TransportRegistry: ImplementationRegistry<Factory = TransportFactory> {}

/// Get all registered transport implementations.
///
/// Returns (name, factory) pairs used by the service to resolve the
/// `transport` key of each configured provider.
pub fn get_all_implementations() -> Vec<(&'static str, TransportFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}
