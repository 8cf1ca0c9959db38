//! Command-line entry point for the civic delivery core.
//!
//! Loads the configuration, builds the RPC manager and the delivery pipeline
//! from the registered implementations, and runs one operation per
//! invocation.

use civic_config::Config;
use civic_types::{CallOptions, DeliveryJob, Network};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

mod factory_registry;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", global = true)]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Send one RPC call through the provider pool and print the result
	Call {
		/// RPC method name
		method: String,
		/// JSON parameters
		#[arg(long, default_value = "{}")]
		params: String,
		/// Target network, defaults to the configured one
		#[arg(long)]
		network: Option<Network>,
		/// Provider to try first
		#[arg(long)]
		provider: Option<String>,
		/// Per-attempt timeout in milliseconds
		#[arg(long)]
		timeout_ms: Option<u64>,
	},
	/// Deliver the job described by a JSON file
	Deliver {
		/// Path to the job JSON
		job: PathBuf,
	},
	/// List the configured adapters' capabilities
	Capabilities,
	/// List providers with their health per network
	Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	// stdout carries command output
	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Invalid config path: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	match args.command {
		Command::Call {
			method,
			params,
			network,
			provider,
			timeout_ms,
		} => {
			let params: serde_json::Value = serde_json::from_str(&params)
				.map_err(|e| format!("Invalid --params JSON: {}", e))?;
			let options = CallOptions {
				network,
				timeout_ms,
				preferred_provider: provider,
				max_retries: None,
			};

			let manager = factory_registry::build_rpc_manager(&config)?;
			let result = manager.call(&method, params, options).await;
			if let Ok(response) = &result {
				print_json(response)?;
			}
			if let Some(trace) = manager.traces(1).await.into_iter().next() {
				print_json(&trace)?;
			}
			result?;
		},
		Command::Deliver { job } => {
			let content = tokio::fs::read_to_string(&job).await?;
			let job: DeliveryJob = serde_json::from_str(&content)
				.map_err(|e| format!("Invalid job file {}: {}", job.display(), e))?;

			let pipeline = factory_registry::build_pipeline(&config)?;
			let result = pipeline.deliver_to_representatives(&job).await?;
			print_json(&result)?;
		},
		Command::Capabilities => {
			let registry = factory_registry::build_adapter_registry(&config)?;
			print_json(&registry.capabilities())?;
		},
		Command::Providers => {
			let manager = factory_registry::build_rpc_manager(&config)?;
			print_json(&manager.providers().await)?;
			print_json(&manager.metrics().await.provider_health)?;
		},
	}

	Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
