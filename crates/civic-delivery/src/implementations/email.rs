//! Email delivery through an HTTP relay.
//!
//! Each recipient gets one `POST` of `{to, from, subject, body, reply_to}` to
//! the relay. Representatives come from a static directory in the adapter
//! configuration.

use crate::{DeliveryAdapter, DeliveryError, OutboundMessage};
use async_trait::async_trait;
use civic_types::{
	http_url_validator, AdapterCapabilities, AddressValidation, Chamber, ConfigSchema,
	DeliveryMethod, Field, FieldType, ImplementationRegistry, PostalAddress, Representative, Schema,
	ValidationError,
};
use serde::Deserialize;
use serde_json::json;

/// Configuration schema for the email adapter.
pub struct EmailAdapterSchema;

impl ConfigSchema for EmailAdapterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("relay_endpoint", FieldType::String).with_validator(http_url_validator),
				Field::new("from_address", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(address) if address.contains('@') => Ok(()),
						_ => Err("from_address must be an email address".to_string()),
					}
				}),
			],
			vec![
				Field::new("api_token", FieldType::String),
				Field::new("countries", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|value| match value.as_array() {
						Some(countries) if !countries.is_empty() => Ok(()),
						_ => Err("countries cannot be empty".to_string()),
					}),
				Field::new(
					"directory",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![
							Field::new("bioguide_id", FieldType::String),
							Field::new("name", FieldType::String),
							Field::new("state", FieldType::String),
							Field::new("chamber", FieldType::String),
						],
						vec![
							Field::new("country_code", FieldType::String),
							Field::new("email", FieldType::String),
						],
					)))),
				),
			],
		);
		schema.validate(config)
	}
}

#[derive(Debug, Clone, Deserialize)]
struct DirectoryEntry {
	#[serde(default = "default_country")]
	country_code: String,
	#[serde(flatten)]
	representative: Representative,
}

fn default_country() -> String {
	"US".to_string()
}

fn default_countries() -> Vec<String> {
	vec![default_country()]
}

#[derive(Debug, Clone, Deserialize)]
struct EmailConfig {
	relay_endpoint: String,
	from_address: String,
	#[serde(default)]
	api_token: Option<String>,
	#[serde(default = "default_countries")]
	countries: Vec<String>,
	#[serde(default)]
	directory: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
	id: String,
}

/// Email delivery adapter.
pub struct EmailAdapter {
	config: EmailConfig,
	client: reqwest::Client,
}

impl EmailAdapter {
	fn new(mut config: EmailConfig, client: reqwest::Client) -> Self {
		for country in config.countries.iter_mut() {
			*country = country.trim().to_ascii_uppercase();
		}
		Self { config, client }
	}

	/// Directory entries for a country and region, matched case-insensitively.
	fn directory_for(&self, country: &str, region: &str) -> Vec<Representative> {
		self.config
			.directory
			.iter()
			.filter(|entry| entry.country_code.eq_ignore_ascii_case(country.trim()))
			.filter(|entry| entry.representative.state.eq_ignore_ascii_case(region.trim()))
			.map(|entry| entry.representative.clone())
			.collect()
	}
}

#[async_trait]
impl DeliveryAdapter for EmailAdapter {
	fn name(&self) -> &str {
		Registry::NAME
	}

	fn countries(&self) -> Vec<String> {
		self.config.countries.clone()
	}

	fn methods(&self) -> Vec<DeliveryMethod> {
		vec![DeliveryMethod::Email]
	}

	fn capabilities(&self, country_code: &str) -> AdapterCapabilities {
		let mut chambers: Vec<Chamber> = self
			.config
			.directory
			.iter()
			.filter(|entry| entry.country_code.eq_ignore_ascii_case(country_code))
			.map(|entry| entry.representative.chamber)
			.collect();
		chambers.sort();
		chambers.dedup();

		AdapterCapabilities {
			adapter: Registry::NAME.to_string(),
			country_code: country_code.to_string(),
			methods: self.methods(),
			chambers,
			validates_addresses: true,
			looks_up_representatives: !self.config.directory.is_empty(),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmailAdapterSchema)
	}

	async fn deliver_message(
		&self,
		message: &OutboundMessage,
		representative: &Representative,
	) -> Result<String, DeliveryError> {
		let to = representative
			.email
			.as_deref()
			.ok_or_else(|| DeliveryError::UnsupportedRecipient {
				recipient: representative.bioguide_id.clone(),
				reason: "no email address on record".to_string(),
			})?;

		let payload = json!({
			"to": to,
			"from": self.config.from_address,
			"subject": message.subject,
			"body": message.body,
			"reply_to": message.sender.email,
		});
		let mut request = self.client.post(&self.config.relay_endpoint).json(&payload);
		if let Some(token) = &self.config.api_token {
			request = request.bearer_auth(token);
		}

		let response = request
			.send()
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(DeliveryError::Rejected {
				status: status.as_u16(),
				message: body,
			});
		}

		let relay: RelayResponse = response
			.json()
			.await
			.map_err(|e| DeliveryError::Network(format!("Invalid relay response: {}", e)))?;
		tracing::debug!(job_id = %message.job_id, recipient = %representative.bioguide_id, "Email relayed");
		Ok(relay.id)
	}

	async fn validate_address(
		&self,
		address: &PostalAddress,
	) -> Result<AddressValidation, DeliveryError> {
		let mut errors = Vec::new();
		for (field, value) in [
			("street", &address.street),
			("city", &address.city),
			("postal_code", &address.postal_code),
		] {
			if value.trim().is_empty() {
				errors.push(format!("{} is required", field));
			}
		}
		let country = address.country_code.trim().to_ascii_uppercase();
		if !self.config.countries.contains(&country) {
			errors.push(format!("country {} is not served", country));
		}

		Ok(AddressValidation {
			valid: errors.is_empty(),
			normalized: None,
			errors,
		})
	}

	async fn lookup_representatives(
		&self,
		address: &PostalAddress,
	) -> Result<Vec<Representative>, DeliveryError> {
		Ok(self.directory_for(&address.country_code, &address.state))
	}
}

/// Factory function to create an email adapter from configuration.
pub fn create_adapter(config: &toml::Value) -> Result<Box<dyn DeliveryAdapter>, DeliveryError> {
	EmailAdapterSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid email configuration: {}", e)))?;
	let config: EmailConfig = config
		.clone()
		.try_into()
		.map_err(|e| DeliveryError::Configuration(format!("Invalid email configuration: {}", e)))?;

	Ok(Box::new(EmailAdapter::new(config, reqwest::Client::new())))
}

/// Registry for the email adapter implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "email";
	type Factory = crate::AdapterFactory;

	fn factory() -> Self::Factory {
		create_adapter
	}
}

impl crate::AdapterImplementationRegistry for Registry {}
