//! Configuration for the civic delivery core.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}` references
//! are substituted from the environment before parsing, and the parsed
//! configuration is validated before it is handed out.
//!
//! ## Includes
//!
//! A file may pull other files in with `include = ["rpc.toml", ...]`. Every
//! top-level section must be defined by exactly one file.

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}

use civic_types::{CircuitBreakerConfig, PipelineConfig, ProviderConfig, RpcManagerConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// The text is not valid TOML or does not match the expected shape.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// The configuration parsed but breaks a rule.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub rpc: RpcConfig,
	pub delivery: DeliveryConfig,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Instance identifier, used in logs.
	pub id: String,
}

/// RPC manager settings and the provider list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
	#[serde(flatten)]
	pub manager: RpcManagerConfig,
	/// Breaker settings applied to providers without an override.
	#[serde(default)]
	pub circuit_breaker: CircuitBreakerConfig,
	#[serde(default)]
	pub providers: Vec<ProviderEntry>,
}

/// One configured provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEntry {
	#[serde(flatten)]
	pub provider: ProviderConfig,
	/// Name of the transport implementation, e.g. "http".
	#[serde(default = "default_transport")]
	pub transport: String,
	/// Transport-specific settings, validated by the transport's schema.
	#[serde(default)]
	pub transport_options: Option<toml::Value>,
	/// Per-provider breaker settings.
	#[serde(default)]
	pub circuit_breaker: Option<CircuitBreakerConfig>,
}

fn default_transport() -> String {
	"http".to_string()
}

impl ProviderEntry {
	/// Transport options, or an empty table when none are configured.
	pub fn transport_config(&self) -> toml::Value {
		self.transport_options
			.clone()
			.unwrap_or_else(|| toml::Value::Table(toml::map::Map::new()))
	}
}

impl RpcConfig {
	/// Breaker settings for `entry`, falling back to the shared settings.
	pub fn circuit_breaker_for(&self, entry: &ProviderEntry) -> CircuitBreakerConfig {
		entry.circuit_breaker.unwrap_or(self.circuit_breaker)
	}
}

/// Delivery pipeline settings and adapter configurations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	#[serde(flatten)]
	pub pipeline: PipelineConfig,
	/// Adapter name to its raw configuration table.
	#[serde(default)]
	pub adapters: HashMap<String, toml::Value>,
}

/// Substitutes `${VAR}` and `${VAR:-default}` references from the environment.
///
/// A reference to an unset variable without a default is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut output = String::with_capacity(input.len());
	let mut last = 0;
	for captures in pattern.captures_iter(input) {
		let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), captures.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		output.push_str(&input[last..whole.start()]);
		output.push_str(&value);
		last = whole.end();
	}
	output.push_str(&input[last..]);

	Ok(output)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path = Path::new(path);
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;

		loader::ConfigLoader::new(base_dir).load_config(file_name).await
	}

	/// Checks the rules a parsed configuration must satisfy.
	///
	/// Implementation-specific tables (`transport_options`, adapter tables) are
	/// validated later by the implementation's own schema.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		let rpc = &self.rpc;
		if rpc.manager.default_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"rpc.default_timeout_ms must be greater than 0".into(),
			));
		}
		validate_breaker("rpc.circuit_breaker", &rpc.circuit_breaker)?;

		if rpc.providers.is_empty() {
			return Err(ConfigError::Validation(
				"At least one RPC provider must be configured".into(),
			));
		}
		let mut names = HashSet::new();
		for entry in &rpc.providers {
			let provider = &entry.provider;
			if provider.name.trim().is_empty() {
				return Err(ConfigError::Validation("Provider name cannot be empty".into()));
			}
			if !names.insert(provider.name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate provider name '{}'",
					provider.name
				)));
			}
			if provider.mainnet_url.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Provider '{}' has an empty mainnet_url",
					provider.name
				)));
			}
			if provider
				.testnet_url
				.as_deref()
				.is_some_and(|url| url.trim().is_empty())
			{
				return Err(ConfigError::Validation(format!(
					"Provider '{}' has an empty testnet_url",
					provider.name
				)));
			}
			if provider.timeout_ms == Some(0) {
				return Err(ConfigError::Validation(format!(
					"Provider '{}' timeout_ms must be greater than 0",
					provider.name
				)));
			}
			if entry.transport.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Provider '{}' must name a transport",
					provider.name
				)));
			}
			if let Some(breaker) = &entry.circuit_breaker {
				validate_breaker(&format!("provider '{}' circuit_breaker", provider.name), breaker)?;
			}
		}

		let delivery = &self.delivery;
		if delivery.pipeline.recipient_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"delivery.recipient_timeout_ms must be greater than 0".into(),
			));
		}
		if delivery.pipeline.max_concurrent_deliveries == 0 {
			return Err(ConfigError::Validation(
				"delivery.max_concurrent_deliveries must be at least 1".into(),
			));
		}
		if delivery.adapters.is_empty() {
			return Err(ConfigError::Validation(
				"At least one delivery adapter must be configured".into(),
			));
		}

		Ok(())
	}
}

fn validate_breaker(context: &str, breaker: &CircuitBreakerConfig) -> Result<(), ConfigError> {
	if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
		return Err(ConfigError::Validation(format!(
			"{}: thresholds must be at least 1",
			context
		)));
	}
	if breaker.timeout_ms == 0 {
		return Err(ConfigError::Validation(format!(
			"{}: timeout_ms must be greater than 0",
			context
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
