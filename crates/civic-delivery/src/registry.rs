//! Lookup of delivery adapters by country and delivery method.

use crate::{DeliveryAdapter, DeliveryError};
use civic_types::{AdapterCapabilities, DeliveryMethod};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Maps `(country, method)` to the adapter that handles it.
///
/// Country codes are compared case-insensitively and stored upper case.
/// Registering a second adapter for the same pair replaces the first.
#[derive(Default)]
pub struct AdapterRegistry {
	routes: BTreeMap<(String, DeliveryMethod), Arc<dyn DeliveryAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut routes = f.debug_map();
		for ((country, method), adapter) in &self.routes {
			routes.entry(&format!("{}/{}", country, method), &adapter.name());
		}
		routes.finish()
	}
}

impl AdapterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Indexes `adapter` under every country and method it serves.
	pub fn register(&mut self, adapter: Arc<dyn DeliveryAdapter>) {
		for country in adapter.countries() {
			let country = country.to_ascii_uppercase();
			for method in adapter.methods() {
				if let Some(previous) = self
					.routes
					.insert((country.clone(), method), Arc::clone(&adapter))
				{
					tracing::warn!(
						country = %country,
						%method,
						replaced = previous.name(),
						adapter = adapter.name(),
						"Replacing delivery adapter"
					);
				}
			}
		}
		tracing::debug!(adapter = adapter.name(), "Registered delivery adapter");
	}

	pub fn get_adapter(
		&self,
		country: &str,
		method: DeliveryMethod,
	) -> Result<Arc<dyn DeliveryAdapter>, DeliveryError> {
		let country = country.trim().to_ascii_uppercase();
		self.routes
			.get(&(country.clone(), method))
			.cloned()
			.ok_or(DeliveryError::NoAdapterAvailable { country, method })
	}

	/// Countries with at least one adapter, sorted.
	pub fn supported_countries(&self) -> Vec<String> {
		self.routes
			.keys()
			.map(|(country, _)| country.clone())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect()
	}

	/// One entry per (country, adapter), sorted by country then adapter name.
	pub fn capabilities(&self) -> Vec<AdapterCapabilities> {
		let mut seen = BTreeMap::new();
		for ((country, _), adapter) in &self.routes {
			seen.entry((country.clone(), adapter.name().to_string()))
				.or_insert_with(|| adapter.capabilities(country));
		}
		seen.into_values().collect()
	}

	pub fn is_empty(&self) -> bool {
		self.routes.is_empty()
	}
}
