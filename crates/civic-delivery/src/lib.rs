//! Message delivery for the civic core.
//!
//! A [`DeliveryPipeline`] fans one message out to a set of representatives
//! through the [`DeliveryAdapter`] registered for the sender's country and
//! the template's delivery method, and aggregates per-recipient outcomes
//! into a single report.

use async_trait::async_trait;
use civic_types::{
	AdapterCapabilities, AddressValidation, ConfigSchema, DeliveryMethod, ImplementationRegistry,
	PostalAddress, Representative, User,
};
use thiserror::Error;

pub mod pipeline;
pub mod registry;

/// Re-export implementations
pub mod implementations {
	pub mod cwc;
	pub mod email;
}

pub use pipeline::{personalize, DeliveryPipeline};
pub use registry::AdapterRegistry;

/// Errors that can occur during message delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The remote endpoint could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The remote endpoint refused the message.
	#[error("Delivery rejected ({status}): {message}")]
	Rejected { status: u16, message: String },
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	/// The representative lacks data the adapter needs, such as an email.
	#[error("Unsupported recipient {recipient}: {reason}")]
	UnsupportedRecipient { recipient: String, reason: String },
	#[error("Representative lookup failed: {0}")]
	Lookup(String),
	#[error("Delivery timed out after {0}ms")]
	Timeout(u64),
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// No adapter is registered for the country and method.
	#[error("No adapter available for country {country} and method {method}")]
	NoAdapterAvailable {
		country: String,
		method: DeliveryMethod,
	},
}

/// A personalized message ready to be handed to an adapter.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
	pub job_id: String,
	pub template_id: String,
	pub subject: String,
	pub body: String,
	pub sender: User,
}

/// Trait defining the interface for delivery adapters.
///
/// An adapter delivers messages for one or more countries through one or
/// more delivery methods, and optionally knows how to validate addresses and
/// find the representatives of an address.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
	/// Implementation name, as used in configuration.
	fn name(&self) -> &str;

	/// Upper-case ISO country codes served by this adapter.
	fn countries(&self) -> Vec<String>;

	fn methods(&self) -> Vec<DeliveryMethod>;

	/// Capabilities of this adapter for one of its countries.
	fn capabilities(&self, country_code: &str) -> AdapterCapabilities;

	/// Returns the configuration schema for this adapter implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Delivers `message` to one representative and returns the message id.
	async fn deliver_message(
		&self,
		message: &OutboundMessage,
		representative: &Representative,
	) -> Result<String, DeliveryError>;

	async fn validate_address(
		&self,
		address: &PostalAddress,
	) -> Result<AddressValidation, DeliveryError>;

	/// Representatives serving `address`.
	async fn lookup_representatives(
		&self,
		address: &PostalAddress,
	) -> Result<Vec<Representative>, DeliveryError>;
}

/// Type alias for adapter factory functions.
pub type AdapterFactory = fn(&toml::Value) -> Result<Box<dyn DeliveryAdapter>, DeliveryError>;

/// Registry trait for delivery adapter implementations.
pub trait AdapterImplementationRegistry: ImplementationRegistry<Factory = AdapterFactory> {}

/// Get all registered adapter implementations.
///
/// Returns (name, factory) pairs; the name matches the key of the adapter's
/// `[delivery.adapters.<name>]` configuration table.
pub fn get_all_implementations() -> Vec<(&'static str, AdapterFactory)> {
	use implementations::{cwc, email};

	vec![
		(cwc::Registry::NAME, cwc::Registry::factory()),
		(email::Registry::NAME, email::Registry::factory()),
	]
}
