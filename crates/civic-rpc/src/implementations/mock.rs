//! In-process transport for local development and tests.

use crate::{RpcError, RpcTransport, TransportError};
use async_trait::async_trait;
use civic_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct MockConfig {
	/// JSON text returned for every call.
	#[serde(default)]
	response: Option<String>,
	#[serde(default)]
	fail: bool,
	#[serde(default)]
	error_message: Option<String>,
	#[serde(default)]
	latency_ms: u64,
}

/// Answers every request with a canned value, or fails on demand.
pub struct MockTransport {
	response: Value,
	failing: AtomicBool,
	error_message: String,
	latency: Duration,
	calls: AtomicU64,
}

impl MockTransport {
	pub fn succeeding(response: Value) -> Self {
		Self {
			response,
			failing: AtomicBool::new(false),
			error_message: "mock failure".to_string(),
			latency: Duration::ZERO,
			calls: AtomicU64::new(0),
		}
	}

	pub fn failing(error_message: impl Into<String>) -> Self {
		Self {
			failing: AtomicBool::new(true),
			error_message: error_message.into(),
			..Self::succeeding(Value::Null)
		}
	}

	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::Release);
	}

	/// Number of requests received.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Acquire)
	}
}

/// Configuration schema for the mock transport.
pub struct MockTransportSchema;

impl ConfigSchema for MockTransportSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("response", FieldType::String).with_validator(|value| {
					serde_json::from_str::<Value>(value.as_str().unwrap_or_default())
						.map(|_| ())
						.map_err(|e| format!("response must be JSON: {}", e))
				}),
				Field::new("fail", FieldType::Boolean),
				Field::new("error_message", FieldType::String),
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl RpcTransport for MockTransport {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockTransportSchema)
	}

	async fn request(
		&self,
		method: &str,
		_params: &Value,
		url: &str,
		_timeout: Duration,
	) -> Result<Value, TransportError> {
		self.calls.fetch_add(1, Ordering::AcqRel);
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}
		if self.failing.load(Ordering::Acquire) {
			tracing::trace!(method, url, "Mock transport failing request");
			return Err(TransportError::Http(self.error_message.clone()));
		}
		Ok(self.response.clone())
	}
}

/// Factory function to create a mock transport from configuration.
pub fn create_transport(config: &toml::Value) -> Result<Box<dyn RpcTransport>, RpcError> {
	MockTransportSchema
		.validate(config)
		.map_err(|e| RpcError::Configuration(format!("Invalid mock transport configuration: {}", e)))?;
	let config: MockConfig = config
		.clone()
		.try_into()
		.map_err(|e| RpcError::Configuration(format!("Invalid mock transport configuration: {}", e)))?;

	let response = match config.response.as_deref() {
		Some(text) => serde_json::from_str(text)
			.map_err(|e| RpcError::Configuration(format!("Invalid mock response: {}", e)))?,
		None => Value::Null,
	};

	let transport = MockTransport {
		failing: AtomicBool::new(config.fail),
		error_message: config
			.error_message
			.unwrap_or_else(|| "mock failure".to_string()),
		..MockTransport::succeeding(response)
	}
	.with_latency(Duration::from_millis(config.latency_ms));
	Ok(Box::new(transport))
}

/// Registry for the mock transport implementation.
pub struct Registry;

impl civic_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::TransportFactory;

	fn factory() -> Self::Factory {
		create_transport
	}
}

impl crate::TransportRegistry for Registry {}
