//! JSON-RPC 2.0 transport over HTTP.
//!
//! Each request is a `POST` of `{jsonrpc, id, method, params}` to the
//! provider's endpoint. The `result` member is returned as-is; an `error`
//! member, a non-success status or an unreadable body become
//! [`TransportError`]s.

use crate::{RpcError, RpcTransport, TransportError};
use async_trait::async_trait;
use civic_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("civic-rpc/", env!("CARGO_PKG_VERSION"));

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
	code: i64,
	message: String,
	#[serde(default)]
	data: Option<Value>,
}

/// HTTP transport backed by a shared `reqwest` client.
pub struct HttpTransport {
	client: reqwest::Client,
	next_id: AtomicU64,
}

impl HttpTransport {
	pub fn new(client: reqwest::Client) -> Self {
		Self {
			client,
			next_id: AtomicU64::new(1),
		}
	}
}

/// Configuration schema for the HTTP transport.
///
/// All keys are optional:
/// - `user_agent`: value of the `User-Agent` header
/// - `connect_timeout_ms`: TCP connect timeout
/// - `headers`: table of static headers sent with every request
pub struct HttpTransportSchema;

impl ConfigSchema for HttpTransportSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("user_agent", FieldType::String),
				Field::new(
					"connect_timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("headers", FieldType::Table(Schema::new(vec![], vec![]))).with_validator(
					|value| match value.as_table() {
						Some(table) => table
							.iter()
							.find(|(_, v)| !v.is_str())
							.map_or(Ok(()), |(k, _)| Err(format!("header '{}' must be a string", k))),
						None => Err("headers must be a table".to_string()),
					},
				),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl RpcTransport for HttpTransport {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpTransportSchema)
	}

	async fn request(
		&self,
		method: &str,
		params: &Value,
		url: &str,
		timeout: Duration,
	) -> Result<Value, TransportError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(url)
			.timeout(timeout)
			.json(&body)
			.send()
			.await
			.map_err(|e| TransportError::Http(e.to_string()))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| TransportError::Http(e.to_string()))?;
		if !status.is_success() {
			return Err(TransportError::Status {
				status: status.as_u16(),
				body: text,
			});
		}

		parse_response(&text)
	}
}

fn parse_response(text: &str) -> Result<Value, TransportError> {
	let envelope: JsonRpcResponse =
		serde_json::from_str(text).map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

	if let Some(error) = envelope.error {
		let message = match error.data {
			Some(data) => format!("{} ({})", error.message, data),
			None => error.message,
		};
		return Err(TransportError::Rpc {
			code: error.code,
			message,
		});
	}

	envelope
		.result
		.ok_or_else(|| TransportError::InvalidResponse("missing result".to_string()))
}

fn build_headers(config: &toml::Value) -> Result<HeaderMap, RpcError> {
	let mut headers = HeaderMap::new();
	let Some(table) = config.get("headers").and_then(|v| v.as_table()) else {
		return Ok(headers);
	};
	for (name, value) in table {
		let name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|e| RpcError::Configuration(format!("Invalid header name '{}': {}", name, e)))?;
		let value = HeaderValue::from_str(value.as_str().unwrap_or_default())
			.map_err(|e| RpcError::Configuration(format!("Invalid value for header '{}': {}", name, e)))?;
		headers.insert(name, value);
	}
	Ok(headers)
}

/// Factory function to create an HTTP transport from configuration.
pub fn create_transport(config: &toml::Value) -> Result<Box<dyn RpcTransport>, RpcError> {
	HttpTransportSchema
		.validate(config)
		.map_err(|e| RpcError::Configuration(format!("Invalid http transport configuration: {}", e)))?;

	let user_agent = config
		.get("user_agent")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_USER_AGENT);

	let mut builder = reqwest::Client::builder()
		.user_agent(user_agent)
		.default_headers(build_headers(config)?);
	if let Some(ms) = config.get("connect_timeout_ms").and_then(|v| v.as_integer()) {
		builder = builder.connect_timeout(Duration::from_millis(ms as u64));
	}

	let client = builder
		.build()
		.map_err(|e| RpcError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
	Ok(Box::new(HttpTransport::new(client)))
}

/// Registry for the HTTP transport implementation.
pub struct Registry;

impl civic_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::TransportFactory;

	fn factory() -> Self::Factory {
		create_transport
	}
}

impl crate::TransportRegistry for Registry {}
