//! Certified congressional delivery (Communicating With Congress).
//!
//! Messages are wrapped in a CWC XML envelope and posted to the House or
//! Senate endpoint depending on the recipient's chamber. Addresses must be
//! US addresses with a two-letter state and a ZIP or ZIP+4 code.

use crate::{DeliveryAdapter, DeliveryError, OutboundMessage};
use async_trait::async_trait;
use chrono::Utc;
use civic_types::{
	http_url_validator, xml_escape, AdapterCapabilities, AddressValidation, Chamber, ConfigSchema,
	DeliveryMethod, Field, FieldType, ImplementationRegistry, PostalAddress, Representative, Schema,
	ValidationError,
};
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

const COUNTRY_CODE: &str = "US";
const DEFAULT_DELIVERY_AGENT: &str = "Communique";

/// Configuration schema for the CWC adapter.
pub struct CwcAdapterSchema;

impl ConfigSchema for CwcAdapterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("house_endpoint", FieldType::String).with_validator(http_url_validator),
				Field::new("senate_endpoint", FieldType::String).with_validator(http_url_validator),
			],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new("delivery_agent", FieldType::String),
				Field::new("ack_email", FieldType::String),
				Field::new("directory_endpoint", FieldType::String)
					.with_validator(http_url_validator),
			],
		);
		schema.validate(config)
	}
}

#[derive(Debug, Clone, Deserialize)]
struct CwcConfig {
	house_endpoint: String,
	senate_endpoint: String,
	#[serde(default)]
	api_key: Option<String>,
	#[serde(default)]
	delivery_agent: Option<String>,
	#[serde(default)]
	ack_email: Option<String>,
	#[serde(default)]
	directory_endpoint: Option<String>,
}

/// Directory answers either a bare list or `{ "representatives": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectoryResponse {
	List(Vec<Representative>),
	Wrapped { representatives: Vec<Representative> },
}

/// CWC delivery adapter.
pub struct CwcAdapter {
	config: CwcConfig,
	client: reqwest::Client,
	zip_pattern: Regex,
	state_pattern: Regex,
}

impl CwcAdapter {
	fn new(config: CwcConfig, client: reqwest::Client) -> Result<Self, DeliveryError> {
		let zip_pattern = Regex::new(r"^\d{5}(-\d{4})?$")
			.map_err(|e| DeliveryError::Configuration(e.to_string()))?;
		let state_pattern =
			Regex::new(r"^[A-Z]{2}$").map_err(|e| DeliveryError::Configuration(e.to_string()))?;
		Ok(Self {
			config,
			client,
			zip_pattern,
			state_pattern,
		})
	}

	fn endpoint(&self, chamber: Chamber) -> &str {
		match chamber {
			Chamber::House => &self.config.house_endpoint,
			Chamber::Senate => &self.config.senate_endpoint,
		}
	}

	/// Builds the XML envelope for one recipient.
	fn envelope(&self, delivery_id: &str, message: &OutboundMessage, rep: &Representative) -> String {
		let sender = &message.sender;
		let (first_name, last_name) = split_name(&sender.name);
		let agent = self
			.config
			.delivery_agent
			.as_deref()
			.unwrap_or(DEFAULT_DELIVERY_AGENT);
		let ack_email = self.config.ack_email.as_deref().unwrap_or(&sender.email);

		format!(
			r#"<?xml version="1.0" encoding="UTF-8"?>
<CWC>
	<CWCVersion>2.0</CWCVersion>
	<Delivery>
		<DeliveryId>{delivery_id}</DeliveryId>
		<DeliveryDate>{date}</DeliveryDate>
		<DeliveryAgent>{agent}</DeliveryAgent>
		<DeliveryAgentAckEmailAddress>{ack}</DeliveryAgentAckEmailAddress>
		<CampaignId>{campaign}</CampaignId>
	</Delivery>
	<Recipient>
		<MemberOffice>{office}</MemberOffice>
	</Recipient>
	<Constituent>
		<FirstName>{first}</FirstName>
		<LastName>{last}</LastName>
		<Address1>{street}</Address1>
		<City>{city}</City>
		<StateAbbreviation>{state}</StateAbbreviation>
		<Zip>{zip}</Zip>
		<Email>{email}</Email>
	</Constituent>
	<Message>
		<Subject>{subject}</Subject>
		<ConstituentMessage>{body}</ConstituentMessage>
	</Message>
</CWC>
"#,
			delivery_id = xml_escape(delivery_id),
			date = Utc::now().format("%Y%m%d"),
			agent = xml_escape(agent),
			ack = xml_escape(ack_email),
			campaign = xml_escape(&message.template_id),
			office = xml_escape(&office_code(rep)),
			first = xml_escape(first_name),
			last = xml_escape(last_name),
			street = xml_escape(&sender.address.street),
			city = xml_escape(&sender.address.city),
			state = xml_escape(&sender.address.state.to_ascii_uppercase()),
			zip = xml_escape(&sender.address.postal_code),
			email = xml_escape(&sender.email),
			subject = xml_escape(&message.subject),
			body = xml_escape(&message.body),
		)
	}
}

/// Member office code: explicit when known, else derived from state and district.
fn office_code(rep: &Representative) -> String {
	if let Some(code) = &rep.office_code {
		return code.clone();
	}
	match (rep.chamber, rep.district.as_deref()) {
		(Chamber::House, Some(district)) => match district.parse::<u32>() {
			Ok(number) => format!("H{}{:02}", rep.state.to_ascii_uppercase(), number),
			Err(_) => format!("H{}{}", rep.state.to_ascii_uppercase(), district),
		},
		_ => rep.bioguide_id.clone(),
	}
}

/// Splits a full name at its last space.
fn split_name(name: &str) -> (&str, &str) {
	let name = name.trim();
	match name.rsplit_once(' ') {
		Some((first, last)) => (first.trim(), last),
		None => (name, ""),
	}
}

#[async_trait]
impl DeliveryAdapter for CwcAdapter {
	fn name(&self) -> &str {
		Registry::NAME
	}

	fn countries(&self) -> Vec<String> {
		vec![COUNTRY_CODE.to_string()]
	}

	fn methods(&self) -> Vec<DeliveryMethod> {
		vec![DeliveryMethod::Cwc]
	}

	fn capabilities(&self, country_code: &str) -> AdapterCapabilities {
		AdapterCapabilities {
			adapter: Registry::NAME.to_string(),
			country_code: country_code.to_string(),
			methods: self.methods(),
			chambers: vec![Chamber::House, Chamber::Senate],
			validates_addresses: true,
			looks_up_representatives: self.config.directory_endpoint.is_some(),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CwcAdapterSchema)
	}

	async fn deliver_message(
		&self,
		message: &OutboundMessage,
		representative: &Representative,
	) -> Result<String, DeliveryError> {
		let delivery_id = Uuid::new_v4().to_string();
		let envelope = self.envelope(&delivery_id, message, representative);

		let mut request = self
			.client
			.post(self.endpoint(representative.chamber))
			.header(reqwest::header::CONTENT_TYPE, "application/xml")
			.body(envelope);
		if let Some(key) = &self.config.api_key {
			request = request.query(&[("apikey", key)]);
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

		tracing::debug!(
			job_id = %message.job_id,
			recipient = %representative.bioguide_id,
			delivery_id = %civic_types::truncate_id(&delivery_id),
			"CWC message accepted"
		);
		Ok(delivery_id)
	}

	async fn validate_address(
		&self,
		address: &PostalAddress,
	) -> Result<AddressValidation, DeliveryError> {
		let normalized = PostalAddress {
			street: address.street.trim().to_string(),
			city: address.city.trim().to_string(),
			state: address.state.trim().to_ascii_uppercase(),
			postal_code: address.postal_code.trim().to_string(),
			country_code: address.country_code.trim().to_ascii_uppercase(),
		};

		let mut errors = Vec::new();
		if normalized.country_code != COUNTRY_CODE {
			errors.push(format!("country must be {}", COUNTRY_CODE));
		}
		if normalized.street.is_empty() {
			errors.push("street is required".to_string());
		}
		if normalized.city.is_empty() {
			errors.push("city is required".to_string());
		}
		if !self.state_pattern.is_match(&normalized.state) {
			errors.push(format!("'{}' is not a two-letter state code", address.state));
		}
		if !self.zip_pattern.is_match(&normalized.postal_code) {
			errors.push(format!("'{}' is not a ZIP or ZIP+4 code", address.postal_code));
		}

		Ok(AddressValidation {
			valid: errors.is_empty(),
			normalized: errors.is_empty().then_some(normalized),
			errors,
		})
	}

	async fn lookup_representatives(
		&self,
		address: &PostalAddress,
	) -> Result<Vec<Representative>, DeliveryError> {
		let endpoint = self
			.config
			.directory_endpoint
			.as_deref()
			.ok_or_else(|| DeliveryError::Lookup("no directory endpoint configured".to_string()))?;

		let response = self
			.client
			.get(endpoint)
			.query(&[
				("street", address.street.as_str()),
				("city", address.city.as_str()),
				("state", address.state.as_str()),
				("zip", address.postal_code.as_str()),
			])
			.send()
			.await
			.map_err(|e| DeliveryError::Lookup(e.to_string()))?;
		if !response.status().is_success() {
			return Err(DeliveryError::Lookup(format!(
				"directory answered {}",
				response.status()
			)));
		}

		let directory: DirectoryResponse = response
			.json()
			.await
			.map_err(|e| DeliveryError::Lookup(e.to_string()))?;
		Ok(match directory {
			DirectoryResponse::List(reps) => reps,
			DirectoryResponse::Wrapped { representatives } => representatives,
		})
	}
}

/// Factory function to create a CWC adapter from configuration.
pub fn create_adapter(config: &toml::Value) -> Result<Box<dyn DeliveryAdapter>, DeliveryError> {
	CwcAdapterSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid cwc configuration: {}", e)))?;
	let config: CwcConfig = config
		.clone()
		.try_into()
		.map_err(|e| DeliveryError::Configuration(format!("Invalid cwc configuration: {}", e)))?;

	Ok(Box::new(CwcAdapter::new(config, reqwest::Client::new())?))
}

/// Registry for the CWC adapter implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "cwc";
	type Factory = crate::AdapterFactory;

	fn factory() -> Self::Factory {
		create_adapter
	}
}

impl crate::AdapterImplementationRegistry for Registry {}
