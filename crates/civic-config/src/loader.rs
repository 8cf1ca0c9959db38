//! Multi-file loading.
//!
//! The entry file may list other files under `include`. Each included file
//! contributes whole top-level sections; a section defined twice is an error.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with its includes.
pub struct ConfigLoader {
	/// Directory relative include paths are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read.
	loaded_files: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Reads `config_path`, merges its includes and parses the result.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let entry_path = self.resolve_path(config_path);
		let content = self.read_file(&entry_path).await?;
		let mut root: toml::Value = toml::from_str(&content)?;

		let includes = include_paths(&root)?;
		if includes.is_empty() {
			return content.parse();
		}

		let table = root
			.as_table_mut()
			.ok_or_else(|| ConfigError::Parse("Configuration root must be a table".into()))?;
		table.remove("include");
		for key in table.keys() {
			self.section_sources.insert(key.clone(), entry_path.clone());
		}

		for include in includes {
			let path = self.resolve_path(&include);
			let included: toml::Value = toml::from_str(&self.read_file(&path).await?)?;
			let Some(sections) = included.as_table() else {
				continue;
			};
			for (key, value) in sections {
				if let Some(previous) = self.section_sources.get(key) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}",
						key,
						previous.display(),
						path.display()
					)));
				}
				self.section_sources.insert(key.clone(), path.clone());
				table.insert(key.clone(), value.clone());
			}
		}

		let merged = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize merged configuration: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file once, substituting environment variables.
	async fn read_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
		let path = path.as_ref();
		if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		}
	}
}

/// `include` accepts a single path or an array of paths.
fn include_paths(root: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match root.get("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const SERVICE: &str = "[service]\nid = \"loader-test\"\n";

	const RPC: &str = r#"
[rpc]
default_network = "mainnet"

[[rpc.providers]]
name = "primary"
mainnet_url = "https://primary.example"
"#;

	const DELIVERY: &str = r#"
[delivery.adapters.email]
relay_endpoint = "https://relay.example"
from_address = "noreply@example.com"
"#;

	#[tokio::test]
	async fn test_single_file() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("civic.toml"),
			format!("{}{}{}", SERVICE, RPC, DELIVERY),
		)
		.unwrap();

		let config = ConfigLoader::new(dir.path()).load_config("civic.toml").await.unwrap();
		assert_eq!(config.service.id, "loader-test");
	}

	#[tokio::test]
	async fn test_includes_are_merged() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = [\"rpc.toml\", \"delivery.toml\"]\n{}", SERVICE),
		)
		.unwrap();
		fs::write(dir.path().join("rpc.toml"), RPC).unwrap();
		fs::write(dir.path().join("delivery.toml"), DELIVERY).unwrap();

		let config = ConfigLoader::new(dir.path()).load_config("main.toml").await.unwrap();
		assert_eq!(config.rpc.providers[0].provider.name, "primary");
		assert!(config.delivery.adapters.contains_key("email"));
	}

	#[tokio::test]
	async fn test_duplicate_section_rejected() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = \"rpc.toml\"\n{}{}{}", SERVICE, RPC, DELIVERY),
		)
		.unwrap();
		fs::write(dir.path().join("rpc.toml"), RPC).unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'rpc'"));
	}

	#[tokio::test]
	async fn test_self_include_rejected() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = \"main.toml\"\n{}", SERVICE),
		)
		.unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Circular include"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = \"absent.toml\"\n{}", SERVICE),
		)
		.unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}

	#[tokio::test]
	async fn test_from_file_resolves_relative_includes() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = [\"rpc.toml\"]\n{}{}", SERVICE, DELIVERY),
		)
		.unwrap();
		fs::write(dir.path().join("rpc.toml"), RPC).unwrap();

		let path = dir.path().join("main.toml");
		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.rpc.providers.len(), 1);
	}
}
