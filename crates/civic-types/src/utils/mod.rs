//! Small helpers shared across crates.

pub mod formatting;
pub mod helpers;

pub use formatting::{truncate_id, xml_escape};
pub use helpers::saturating_millis;
