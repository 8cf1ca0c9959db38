//! Message delivery types.
//!
//! These types describe what the delivery pipeline consumes (templates, users,
//! representatives, jobs) and what it produces (per-recipient outcomes and the
//! aggregated job report). Persistence of any of them belongs to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport a message is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
	/// Communicating With Congress certified delivery.
	Cwc,
	/// Plain email to the representative's office.
	Email,
}

impl DeliveryMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeliveryMethod::Cwc => "cwc",
			DeliveryMethod::Email => "email",
		}
	}
}

impl fmt::Display for DeliveryMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DeliveryMethod {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"cwc" | "certified" => Ok(DeliveryMethod::Cwc),
			"email" => Ok(DeliveryMethod::Email),
			other => Err(format!("Unknown delivery method '{}'", other)),
		}
	}
}

/// Legislative chamber of a representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
	House,
	Senate,
}

impl fmt::Display for Chamber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Chamber::House => f.write_str("house"),
			Chamber::Senate => f.write_str("senate"),
		}
	}
}

/// How far a template reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reach {
	/// Routed to the sender's own district representatives.
	DistrictBased,
	/// Addressed to named decision makers in a place.
	LocationSpecific,
	#[default]
	Universal,
}

/// Who a template should be delivered to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecipientConfig {
	#[serde(default)]
	pub reach: Reach,
	/// Whether congressional routing through CWC is requested.
	#[serde(default, alias = "cwcRouting")]
	pub cwc_routing: bool,
	/// Chambers to deliver to. Empty means every chamber.
	#[serde(default)]
	pub chambers: Vec<Chamber>,
	#[serde(default)]
	pub committees: Vec<String>,
}

impl RecipientConfig {
	/// Returns true if representatives of `chamber` should receive the message.
	pub fn includes(&self, chamber: Chamber) -> bool {
		self.chambers.is_empty() || self.chambers.contains(&chamber)
	}
}

/// Message template authored by a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Template {
	pub id: String,
	pub title: String,
	/// Subject line. Falls back to the title.
	#[serde(default)]
	pub subject: Option<String>,
	/// Body with `[Name]`-style placeholders.
	pub body: String,
	pub delivery_method: DeliveryMethod,
	#[serde(default)]
	pub recipient_config: RecipientConfig,
}

impl Template {
	pub fn subject_line(&self) -> &str {
		self.subject.as_deref().unwrap_or(&self.title)
	}
}

/// Postal address of a constituent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PostalAddress {
	pub street: String,
	pub city: String,
	/// State, province or region code.
	pub state: String,
	#[serde(alias = "zip")]
	pub postal_code: String,
	/// ISO 3166-1 alpha-2 country code.
	#[serde(default = "default_country_code")]
	pub country_code: String,
}

fn default_country_code() -> String {
	"US".to_string()
}

impl fmt::Display for PostalAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}, {}, {} {}",
			self.street, self.city, self.state, self.postal_code
		)
	}
}

/// Sender of a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
	pub id: String,
	pub name: String,
	pub email: String,
	pub address: PostalAddress,
}

impl User {
	pub fn country_code(&self) -> &str {
		&self.address.country_code
	}
}

/// An elected official who can receive messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Representative {
	/// Stable identifier (bioguide id for US Congress).
	pub bioguide_id: String,
	pub name: String,
	#[serde(default)]
	pub party: Option<String>,
	pub state: String,
	/// District for House members, `None` for senators.
	#[serde(default)]
	pub district: Option<String>,
	pub chamber: Chamber,
	/// Office code used by certified delivery endpoints.
	#[serde(default)]
	pub office_code: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
}

/// Representative metadata carried in delivery reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepresentativeSummary {
	pub bioguide_id: String,
	pub name: String,
	pub chamber: Chamber,
	pub state: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub district: Option<String>,
}

impl From<&Representative> for RepresentativeSummary {
	fn from(rep: &Representative) -> Self {
		Self {
			bioguide_id: rep.bioguide_id.clone(),
			name: rep.name.clone(),
			chamber: rep.chamber,
			state: rep.state.clone(),
			district: rep.district.clone(),
		}
	}
}

/// One "send this message to these recipients" unit of work.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeliveryJob {
	pub id: String,
	pub template: Template,
	pub user: User,
	/// Personal text merged into the template body.
	#[serde(default)]
	pub custom_message: Option<String>,
	pub created_at: DateTime<Utc>,
	/// Pre-resolved recipients. Looked up through the adapter when empty.
	#[serde(default)]
	pub representatives: Vec<Representative>,
}

/// Limits applied by the delivery pipeline to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
	/// Upper bound for a single recipient's delivery attempt.
	#[serde(default = "default_recipient_timeout_ms")]
	pub recipient_timeout_ms: u64,
	/// Deliveries in flight at once for one job.
	#[serde(default = "default_max_concurrent_deliveries")]
	pub max_concurrent_deliveries: usize,
}

fn default_recipient_timeout_ms() -> u64 {
	30_000
}

fn default_max_concurrent_deliveries() -> usize {
	8
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			recipient_timeout_ms: default_recipient_timeout_ms(),
			max_concurrent_deliveries: default_max_concurrent_deliveries(),
		}
	}
}

/// Result of delivering to a single representative, as reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryOutcome {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl DeliveryOutcome {
	pub fn delivered(message_id: impl Into<String>) -> Self {
		Self {
			success: true,
			message_id: Some(message_id.into()),
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			success: false,
			message_id: None,
			error: Some(error.into()),
		}
	}
}

/// Per-recipient entry of a delivery report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecipientResult {
	pub representative: RepresentativeSummary,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl RecipientResult {
	pub fn new(representative: &Representative, outcome: DeliveryOutcome) -> Self {
		Self {
			representative: representative.into(),
			success: outcome.success,
			message_id: outcome.message_id,
			error: outcome.error,
		}
	}
}

/// Aggregated report for a delivery job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryResult {
	pub job_id: String,
	/// Job-level success: at least one recipient accepted the message.
	pub success: bool,
	pub total_recipients: usize,
	pub successful_deliveries: usize,
	pub failed_deliveries: usize,
	pub results: Vec<RecipientResult>,
	pub duration_ms: u64,
}

impl DeliveryResult {
	/// Builds the report from per-recipient results, in recipient order.
	pub fn from_results(
		job_id: impl Into<String>,
		results: Vec<RecipientResult>,
		duration_ms: u64,
	) -> Self {
		let successful_deliveries = results.iter().filter(|r| r.success).count();
		let total_recipients = results.len();
		Self {
			job_id: job_id.into(),
			success: successful_deliveries > 0,
			total_recipients,
			successful_deliveries,
			failed_deliveries: total_recipients - successful_deliveries,
			results,
			duration_ms,
		}
	}
}

/// What one registered adapter can do.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdapterCapabilities {
	/// Implementation name, e.g. "cwc".
	pub adapter: String,
	pub country_code: String,
	pub methods: Vec<DeliveryMethod>,
	pub chambers: Vec<Chamber>,
	pub validates_addresses: bool,
	pub looks_up_representatives: bool,
}

/// Result of checking a constituent address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AddressValidation {
	pub valid: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub normalized: Option<PostalAddress>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rep(name: &str, chamber: Chamber) -> Representative {
		Representative {
			bioguide_id: format!("{}-id", name),
			name: name.to_string(),
			party: None,
			state: "CA".to_string(),
			district: None,
			chamber,
			office_code: None,
			email: None,
		}
	}

	#[test]
	fn test_partial_success_is_job_success() {
		let results = vec![
			RecipientResult::new(&rep("a", Chamber::House), DeliveryOutcome::delivered("m1")),
			RecipientResult::new(&rep("b", Chamber::Senate), DeliveryOutcome::failed("down")),
		];
		let report = DeliveryResult::from_results("job", results, 12);
		assert!(report.success);
		assert_eq!(report.successful_deliveries, 1);
		assert_eq!(report.failed_deliveries, 1);
		assert_eq!(report.total_recipients, 2);
	}

	#[test]
	fn test_pipeline_config_defaults() {
		let config: PipelineConfig = serde_json::from_str(r#"{"max_concurrent_deliveries":2}"#).unwrap();
		assert_eq!(config.max_concurrent_deliveries, 2);
		assert_eq!(config.recipient_timeout_ms, PipelineConfig::default().recipient_timeout_ms);
	}

	#[test]
	fn test_zero_recipients_is_job_failure() {
		let report = DeliveryResult::from_results("job", vec![], 0);
		assert!(!report.success);
		assert_eq!(report.failed_deliveries, 0);
	}

	#[test]
	fn test_recipient_config_accepts_camel_case_routing_flag() {
		let config: RecipientConfig = serde_json::from_str(
			r#"{"reach":"district-based","cwcRouting":true,"chambers":["house","senate"]}"#,
		)
		.unwrap();
		assert_eq!(config.reach, Reach::DistrictBased);
		assert!(config.cwc_routing);
		assert!(config.includes(Chamber::Senate));
	}

	#[test]
	fn test_empty_chambers_include_everyone() {
		let config = RecipientConfig::default();
		assert!(config.includes(Chamber::House));
		assert!(config.includes(Chamber::Senate));

		let senate_only = RecipientConfig {
			chambers: vec![Chamber::Senate],
			..Default::default()
		};
		assert!(!senate_only.includes(Chamber::House));
	}

	#[test]
	fn test_postal_address_accepts_zip_alias() {
		let address: PostalAddress = serde_json::from_str(
			r#"{"street":"1 Main St","city":"Springfield","state":"IL","zip":"62701"}"#,
		)
		.unwrap();
		assert_eq!(address.postal_code, "62701");
		assert_eq!(address.country_code, "US");
	}
}
