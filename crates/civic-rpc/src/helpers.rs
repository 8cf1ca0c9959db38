//! Typed wrappers for the protocol calls used by the certification layer.
//!
//! The manager treats methods and params as opaque; these helpers only build
//! params and decode results.

use crate::manager::RpcManager;
use crate::RpcError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use civic_types::{CallOptions, RpcResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Account state returned by a `view_account` query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountView {
	/// Balance in the smallest unit, as a decimal string.
	pub amount: String,
	#[serde(default)]
	pub locked: String,
	#[serde(default)]
	pub code_hash: String,
	#[serde(default)]
	pub storage_usage: u64,
	#[serde(default)]
	pub block_height: u64,
	#[serde(default)]
	pub block_hash: String,
}

/// Raw `call_function` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FunctionCallResult {
	/// UTF-8 bytes of the function's return value.
	pub result: Vec<u8>,
	#[serde(default)]
	pub logs: Vec<String>,
	#[serde(default)]
	pub block_height: u64,
	#[serde(default)]
	pub block_hash: String,
}

impl FunctionCallResult {
	/// Decodes the returned bytes as JSON.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
		serde_json::from_slice(&self.result).map_err(|e| RpcError::Deserialization(e.to_string()))
	}
}

impl RpcManager {
	/// Node status.
	pub async fn status(&self, options: CallOptions) -> Result<RpcResponse, RpcError> {
		self.call("status", json!([]), options).await
	}

	pub async fn view_account(
		&self,
		account_id: &str,
		options: CallOptions,
	) -> Result<RpcResponse<AccountView>, RpcError> {
		let params = json!({
			"request_type": "view_account",
			"finality": "final",
			"account_id": account_id,
		});
		self.call_as("query", params, options).await
	}

	/// Calls a view function with JSON `args` and decodes its JSON return value.
	pub async fn call_function<T: DeserializeOwned>(
		&self,
		account_id: &str,
		method_name: &str,
		args: &Value,
		options: CallOptions,
	) -> Result<RpcResponse<T>, RpcError> {
		let args = serde_json::to_vec(args).map_err(|e| RpcError::Deserialization(e.to_string()))?;
		let params = json!({
			"request_type": "call_function",
			"finality": "final",
			"account_id": account_id,
			"method_name": method_name,
			"args_base64": STANDARD.encode(args),
		});

		let response = self
			.call_as::<FunctionCallResult>("query", params, options)
			.await?;
		Ok(RpcResponse {
			data: response.data.decode()?,
			provider: response.provider,
			network: response.network,
			is_retry: response.is_retry,
			attempt_number: response.attempt_number,
		})
	}

	/// Status of a submitted transaction.
	pub async fn transaction_status(
		&self,
		tx_hash: &str,
		sender_id: &str,
		options: CallOptions,
	) -> Result<RpcResponse, RpcError> {
		self.call("tx", json!([tx_hash, sender_id]), options).await
	}
}
