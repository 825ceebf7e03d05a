//! Cache configuration

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read cache config; path: '{}'", .path.display())]
	FileIO {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse cache config: {0}")]
	Parse(#[from] serde_json::Error),
}

/// Configuration of the whole VFS cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsCacheConfig {
	/// Name interner sizing
	pub name_cache: NameCacheConfig,

	/// Ordering used for a directory while its case sensitivity is still unknown
	pub default_case_sensitive: bool,

	/// Verify the sort and adopted-name invariants after every structural mutation,
	/// panicking on the first violation
	pub check_consistency: bool,

	/// Capture a backtrace together with the reason whenever an entry is invalidated
	pub track_invalidation: bool,

	/// Treat access policy denials as fatal instead of ignoring them
	pub enforce_access_policy: bool,
}

impl Default for VfsCacheConfig {
	fn default() -> Self {
		Self {
			name_cache: NameCacheConfig::default(),
			default_case_sensitive: !cfg!(any(target_os = "macos", target_os = "windows")),
			check_consistency: cfg!(debug_assertions),
			track_invalidation: cfg!(debug_assertions),
			enforce_access_policy: false,
		}
	}
}

/// Configuration for the sharded name cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameCacheConfig {
	/// Number of independent shards, rounded up to a power of two
	pub shards: usize,

	/// Names kept per shard before eviction kicks in
	pub shard_capacity: usize,

	/// Share of each shard given to the protected generation
	pub protected_percent: u8,

	/// Slots of the direct-mapped front array (0 = disabled)
	pub l1_slots: usize,
}

impl Default for NameCacheConfig {
	fn default() -> Self {
		Self {
			shards: 16,
			shard_capacity: 4096,
			protected_percent: 66,
			l1_slots: 1024,
		}
	}
}

impl VfsCacheConfig {
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(json).map_err(Into::into)
	}

	/// Load configuration from a JSON file, missing fields take their defaults
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		info!("Loading VFS cache config from {}", path.display());

		let json = fs::read_to_string(path).map_err(|source| ConfigError::FileIO {
			path: path.into(),
			source,
		})?;

		Self::from_json(&json)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_partial_json_keeps_defaults() {
		let config = VfsCacheConfig::from_json(
			r#"{ "name_cache": { "shards": 4 }, "enforce_access_policy": true }"#,
		)
		.expect("valid json");

		assert_eq!(config.name_cache.shards, 4);
		assert_eq!(config.name_cache.l1_slots, 1024);
		assert!(config.enforce_access_policy);
		assert_eq!(config.check_consistency, cfg!(debug_assertions));
	}

	#[test]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().expect("temp file");
		write!(file, r#"{{ "default_case_sensitive": false }}"#).expect("write");

		let config = VfsCacheConfig::load_from(file.path()).expect("valid config");
		assert!(!config.default_case_sensitive);
	}

	#[test]
	fn test_load_missing_file() {
		let dir = tempfile::tempdir().expect("temp dir");
		assert!(matches!(
			VfsCacheConfig::load_from(dir.path().join("nope.json")),
			Err(ConfigError::FileIO { .. })
		));
	}

	#[test]
	fn test_malformed_json() {
		assert!(matches!(
			VfsCacheConfig::from_json("{ not json"),
			Err(ConfigError::Parse(_))
		));
	}
}
