//! Registration contract for pluggable implementations.
//!
//! Transports and delivery adapters are selected by name from configuration.
//! Every implementation module exposes a `Registry` type implementing
//! [`ImplementationRegistry`] so the service can map configuration keys to
//! factory functions without hard-coding the list in several places.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Name used in configuration to select this implementation, for example
	/// `transport = "http"` or `[delivery.adapters.cwc]`.
	const NAME: &'static str;

	/// Factory function type of the component family.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
