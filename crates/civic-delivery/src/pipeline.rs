//! Fan-out of one message to many representatives.

use crate::registry::AdapterRegistry;
use crate::{DeliveryAdapter, DeliveryError, OutboundMessage};
use civic_types::{
	DeliveryJob, DeliveryOutcome, DeliveryResult, PipelineConfig, RecipientResult, Representative,
	User,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Delivers jobs through the adapters of an [`AdapterRegistry`].
pub struct DeliveryPipeline {
	registry: Arc<AdapterRegistry>,
	config: PipelineConfig,
}

impl DeliveryPipeline {
	pub fn new(registry: Arc<AdapterRegistry>, config: PipelineConfig) -> Self {
		Self { registry, config }
	}

	pub fn registry(&self) -> &AdapterRegistry {
		&self.registry
	}

	/// Delivers `job` to every recipient concurrently.
	///
	/// Recipients are the job's pre-resolved representatives, or the adapter's
	/// lookup for the sender's address when there are none, restricted to the
	/// template's chambers. A failing or slow recipient only affects its own
	/// entry in the report. Errors are returned only when no delivery could be
	/// started: no adapter for the route, or a failed representative lookup.
	pub async fn deliver_to_representatives(
		&self,
		job: &DeliveryJob,
	) -> Result<DeliveryResult, DeliveryError> {
		let started = Instant::now();
		let adapter = self
			.registry
			.get_adapter(job.user.country_code(), job.template.delivery_method)?;

		let candidates = if job.representatives.is_empty() {
			adapter.lookup_representatives(&job.user.address).await?
		} else {
			job.representatives.clone()
		};
		let recipients: Vec<Representative> = candidates
			.into_iter()
			.filter(|rep| job.template.recipient_config.includes(rep.chamber))
			.collect();

		tracing::info!(
			job_id = %job.id,
			adapter = adapter.name(),
			recipients = recipients.len(),
			"Delivering message"
		);

		let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_deliveries.max(1)));
		let timeout = Duration::from_millis(self.config.recipient_timeout_ms);
		let deliveries = recipients.iter().map(|rep| {
			let adapter = Arc::clone(&adapter);
			let semaphore = Arc::clone(&semaphore);
			let message = OutboundMessage {
				job_id: job.id.clone(),
				template_id: job.template.id.clone(),
				subject: job.template.subject_line().to_string(),
				body: personalize(
					&job.template.body,
					&job.user,
					rep,
					job.custom_message.as_deref(),
				),
				sender: job.user.clone(),
			};
			async move {
				let outcome = deliver_one(adapter.as_ref(), &semaphore, &message, rep, timeout).await;
				RecipientResult::new(rep, outcome)
			}
		});
		let results = join_all(deliveries).await;

		let report = DeliveryResult::from_results(
			job.id.clone(),
			results,
			civic_types::saturating_millis(started.elapsed()),
		);
		tracing::info!(
			job_id = %job.id,
			successful = report.successful_deliveries,
			failed = report.failed_deliveries,
			duration_ms = report.duration_ms,
			"Delivery finished"
		);
		Ok(report)
	}
}

async fn deliver_one(
	adapter: &dyn DeliveryAdapter,
	semaphore: &Semaphore,
	message: &OutboundMessage,
	representative: &Representative,
	timeout: Duration,
) -> DeliveryOutcome {
	let _permit = match semaphore.acquire().await {
		Ok(permit) => permit,
		Err(e) => return DeliveryOutcome::failed(e.to_string()),
	};

	let result = tokio::time::timeout(timeout, adapter.deliver_message(message, representative))
		.await
		.unwrap_or_else(|_| Err(DeliveryError::Timeout(civic_types::saturating_millis(timeout))));

	match result {
		Ok(message_id) => DeliveryOutcome::delivered(message_id),
		Err(error) => {
			tracing::warn!(
				recipient = %representative.bioguide_id,
				error = %error,
				"Recipient delivery failed"
			);
			DeliveryOutcome::failed(error.to_string())
		},
	}
}

/// Fills the template placeholders for one recipient.
///
/// `[Personal Connection]` takes the custom message; without one, every line
/// holding the placeholder is dropped. The custom message is inserted last,
/// so placeholders typed into it stay literal.
pub fn personalize(
	body: &str,
	user: &User,
	representative: &Representative,
	custom_message: Option<&str>,
) -> String {
	let custom_message = custom_message.map(str::trim).filter(|m| !m.is_empty());
	let body = match custom_message {
		Some(_) => body.to_string(),
		None => body
			.lines()
			.filter(|line| !line.contains("[Personal Connection]"))
			.collect::<Vec<_>>()
			.join("\n"),
	};

	let filled = body
		.replace("[Representative Name]", &representative.name)
		.replace("[Name]", &user.name)
		.replace("[Address]", &user.address.to_string());
	match custom_message {
		Some(message) => filled.replace("[Personal Connection]", message),
		None => filled,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{representative, ScriptedAdapter};
	use chrono::Utc;
	use civic_types::{
		Chamber, DeliveryMethod, PostalAddress, RecipientConfig, Template,
	};

	fn user(country: &str) -> User {
		User {
			id: "u1".to_string(),
			name: "Ada Lovelace".to_string(),
			email: "ada@example.com".to_string(),
			address: PostalAddress {
				street: "1 Main St".to_string(),
				city: "Springfield".to_string(),
				state: "CA".to_string(),
				postal_code: "94105".to_string(),
				country_code: country.to_string(),
			},
		}
	}

	fn job(representatives: Vec<Representative>) -> DeliveryJob {
		DeliveryJob {
			id: "job-1".to_string(),
			template: Template {
				id: "t1".to_string(),
				title: "Fund libraries".to_string(),
				subject: None,
				body: "Dear [Representative Name],\n[Personal Connection]\nSincerely, [Name]".to_string(),
				delivery_method: DeliveryMethod::Cwc,
				recipient_config: RecipientConfig::default(),
			},
			user: user("US"),
			custom_message: Some("I run a reading club.".to_string()),
			created_at: Utc::now(),
			representatives,
		}
	}

	fn pipeline(adapter: ScriptedAdapter, config: PipelineConfig) -> (DeliveryPipeline, Arc<ScriptedAdapter>) {
		let adapter = Arc::new(adapter);
		let mut registry = AdapterRegistry::new();
		registry.register(adapter.clone());
		(DeliveryPipeline::new(Arc::new(registry), config), adapter)
	}

	#[tokio::test]
	async fn test_partial_failure_is_aggregated() {
		let mut adapter = ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc);
		adapter.failing.insert("b".to_string());
		let (pipeline, _) = pipeline(adapter, PipelineConfig::default());

		let reps = vec![
			representative("a", Chamber::House),
			representative("b", Chamber::Senate),
			representative("c", Chamber::Senate),
		];
		let result = pipeline.deliver_to_representatives(&job(reps)).await.unwrap();
		assert!(result.success);
		assert_eq!(result.total_recipients, 3);
		assert_eq!(result.successful_deliveries, 2);
		assert_eq!(result.failed_deliveries, 1);
		assert_eq!(result.results.len(), 3);
		assert_eq!(result.results[1].representative.bioguide_id, "b");
		assert!(result.results[1].error.as_deref().unwrap().contains("office unavailable"));
		assert_eq!(result.results[0].message_id.as_deref(), Some("msg-a"));
	}

	#[tokio::test]
	async fn test_all_failures_fail_the_job() {
		let mut adapter = ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc);
		adapter.failing.extend(["a".to_string(), "b".to_string()]);
		let (pipeline, _) = pipeline(adapter, PipelineConfig::default());

		let reps = vec![representative("a", Chamber::House), representative("b", Chamber::Senate)];
		let result = pipeline.deliver_to_representatives(&job(reps)).await.unwrap();
		assert!(!result.success);
		assert_eq!(result.failed_deliveries, 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_slow_recipient_times_out_alone() {
		let mut adapter = ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc);
		adapter.hanging.insert("slow".to_string());
		let config = PipelineConfig {
			recipient_timeout_ms: 500,
			max_concurrent_deliveries: 1,
		};
		let (pipeline, _) = pipeline(adapter, config);

		let reps = vec![representative("slow", Chamber::House), representative("fast", Chamber::Senate)];
		let result = pipeline.deliver_to_representatives(&job(reps)).await.unwrap();
		assert_eq!(result.successful_deliveries, 1);
		assert!(result.results[0].error.as_deref().unwrap().contains("timed out"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_recipients_time_out_concurrently() {
		let mut adapter = ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc);
		adapter.hanging.extend(["a".to_string(), "b".to_string(), "c".to_string()]);
		let config = PipelineConfig {
			recipient_timeout_ms: 1_000,
			..PipelineConfig::default()
		};
		let (pipeline, _) = pipeline(adapter, config);

		let reps = vec![
			representative("a", Chamber::House),
			representative("b", Chamber::Senate),
			representative("c", Chamber::Senate),
		];
		let started = Instant::now();
		let result = pipeline.deliver_to_representatives(&job(reps)).await.unwrap();
		let elapsed = started.elapsed();

		assert_eq!(result.failed_deliveries, 3);
		assert!(elapsed >= Duration::from_millis(1_000));
		assert!(elapsed < Duration::from_millis(2_000), "took {:?}", elapsed);
		assert!((1_000..2_000).contains(&result.duration_ms), "{}", result.duration_ms);
	}

	#[tokio::test]
	async fn test_missing_adapter() {
		let (pipeline, _) = pipeline(
			ScriptedAdapter::new("email", "CA", DeliveryMethod::Email),
			PipelineConfig::default(),
		);
		let err = pipeline
			.deliver_to_representatives(&job(vec![representative("a", Chamber::House)]))
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::NoAdapterAvailable { .. }));
	}

	#[tokio::test]
	async fn test_lookup_and_chamber_filter() {
		let mut adapter = ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc);
		adapter.directory = vec![
			representative("h1", Chamber::House),
			representative("s1", Chamber::Senate),
			representative("s2", Chamber::Senate),
		];
		let (pipeline, adapter) = pipeline(adapter, PipelineConfig::default());

		let mut job = job(vec![]);
		job.template.recipient_config.chambers = vec![Chamber::Senate];
		let result = pipeline.deliver_to_representatives(&job).await.unwrap();
		assert_eq!(result.total_recipients, 2);
		assert!(result.results.iter().all(|r| r.representative.chamber == Chamber::Senate));

		let delivered = adapter.delivered.lock().unwrap();
		assert!(delivered.iter().any(|(id, body)| id == "s1" && body.starts_with("Dear Rep s1,")));
	}

	#[tokio::test]
	async fn test_no_recipients_is_not_a_success() {
		let (pipeline, _) = pipeline(
			ScriptedAdapter::new("cwc", "US", DeliveryMethod::Cwc),
			PipelineConfig::default(),
		);
		let result = pipeline.deliver_to_representatives(&job(vec![])).await.unwrap();
		assert_eq!(result.total_recipients, 0);
		assert!(!result.success);
	}

	#[test]
	fn test_personalize_fills_placeholders() {
		let rep = representative("a", Chamber::House);
		let body = personalize(
			"Dear [Representative Name],\n[Personal Connection]\n[Name]\n[Address]",
			&user("US"),
			&rep,
			Some("  My story.  "),
		);
		assert_eq!(
			body,
			"Dear Rep a,\nMy story.\nAda Lovelace\n1 Main St, Springfield, CA 94105"
		);
	}

	#[test]
	fn test_personalize_keeps_placeholders_in_custom_message() {
		let rep = representative("a", Chamber::House);
		let body = personalize(
			"Dear [Representative Name],\n[Personal Connection]\n[Name]",
			&user("US"),
			&rep,
			Some("Ask [Name] at [Address] or [Representative Name]"),
		);
		assert_eq!(
			body,
			"Dear Rep a,\nAsk [Name] at [Address] or [Representative Name]\nAda Lovelace"
		);
	}

	#[test]
	fn test_personalize_drops_connection_line_without_message() {
		let rep = representative("a", Chamber::House);
		let body = personalize(
			"Dear [Representative Name],\nAs a constituent: [Personal Connection]\nThanks, [Name]",
			&user("US"),
			&rep,
			Some("   "),
		);
		assert_eq!(body, "Dear Rep a,\nThanks, Ada Lovelace");
	}
}
