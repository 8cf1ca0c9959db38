//! Common types for the civic delivery core.
//!
//! This crate holds the data model shared by the RPC layer, the delivery
//! pipeline, configuration and the service binary, together with the
//! configuration-schema framework and the implementation registry contract.

/// Message delivery types: templates, users, representatives, jobs and reports.
pub mod delivery;
/// Network identifiers.
pub mod networks;
/// Implementation registry contract.
pub mod registry;
/// RPC provider, health, metrics and trace types.
pub mod rpc;
/// Shared helpers.
pub mod utils;
/// Configuration schema validation.
pub mod validation;

pub use delivery::*;
pub use networks::Network;
pub use registry::ImplementationRegistry;
pub use rpc::*;
pub use utils::{saturating_millis, truncate_id, xml_escape};
pub use validation::*;
