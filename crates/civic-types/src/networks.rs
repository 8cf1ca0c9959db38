//! Network identifiers for upstream RPC providers.
//!
//! Every provider exposes one endpoint per network it supports. A provider
//! without an endpoint for a network is simply not a candidate for calls on
//! that network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The network a logical RPC call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	/// Production network.
	#[default]
	Mainnet,
	/// Test network.
	Testnet,
}

impl Network {
	/// All known networks, in display order.
	pub const ALL: [Network; 2] = [Network::Mainnet, Network::Testnet];

	/// Returns the lowercase label used in configuration and metrics.
	pub fn as_str(&self) -> &'static str {
		match self {
			Network::Mainnet => "mainnet",
			Network::Testnet => "testnet",
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Network {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"mainnet" => Ok(Network::Mainnet),
			"testnet" => Ok(Network::Testnet),
			other => Err(format!("Unknown network '{}'", other)),
		}
	}
}
