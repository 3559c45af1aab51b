//! Backend connection settings.
//!
//! Read from `$XDG_CONFIG_HOME/gridmen/config.toml` unless a path is given.
//! A missing file yields the defaults; `GRIDMEN_BASE_URL` overrides
//! `base_url` after the file is read.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::key::NodeKey;

/// Environment variable overriding [`BackendConfig::base_url`].
pub const BASE_URL_ENV: &str = "GRIDMEN_BASE_URL";

/// Connection settings for [`HttpBackend`](crate::HttpBackend) and the tree
/// built on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
	/// Scheme, host and port of the backend.
	#[serde(default = "default_base_url")]
	pub base_url: String,
	/// Path prefix every route is mounted under.
	#[serde(default = "default_api_prefix")]
	pub api_prefix: String,
	/// Per-request timeout in seconds.
	#[serde(default = "default_timeout")]
	pub timeout_secs: u64,
	/// Remote instance address that node infos are qualified with when this
	/// client acts as a lead delegate.
	#[serde(default)]
	pub lead_address: Option<String>,
	/// Key of the tree root.
	#[serde(default = "default_root_key")]
	pub root_key: String,
}

fn default_base_url() -> String {
	"http://127.0.0.1:8000".into()
}

fn default_api_prefix() -> String {
	"/api".into()
}

fn default_timeout() -> u64 {
	30
}

fn default_root_key() -> String {
	crate::key::ROOT_KEY.into()
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			base_url: default_base_url(),
			api_prefix: default_api_prefix(),
			timeout_secs: default_timeout(),
			lead_address: None,
			root_key: default_root_key(),
		}
	}
}

impl BackendConfig {
	/// Default config file location.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("gridmen").join("config.toml"))
	}

	/// Loads `path`, or the default location when `None`, then applies the
	/// environment override.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let path = path.map(Path::to_path_buf).or_else(Self::default_path);
		let config = match path {
			Some(path) => Self::read(&path)?,
			None => Self::default(),
		};
		Ok(config.with_base_url_override(std::env::var(BASE_URL_ENV).ok()))
	}

	/// Reads a config file. A missing file yields the defaults.
	pub fn read(path: &Path) -> Result<Self, ConfigError> {
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "no backend config, using defaults");
				return Ok(Self::default());
			}
			Err(error) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					error: Arc::new(error),
				});
			}
		};
		toml::from_str(&text).map_err(|error| ConfigError::Parse {
			path: path.to_path_buf(),
			message: error.to_string(),
		})
	}

	/// Replaces `base_url` when an override is present and non-empty.
	pub fn with_base_url_override(mut self, base_url: Option<String>) -> Self {
		if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
			self.base_url = url;
		}
		self
	}

	/// Base URL with the API prefix applied, always ending in `/` so route
	/// paths can be joined onto it.
	pub fn api_url(&self) -> Result<Url, ConfigError> {
		let prefix = self.api_prefix.trim_matches('/');
		let joined = if prefix.is_empty() {
			format!("{}/", self.base_url.trim_end_matches('/'))
		} else {
			format!("{}/{prefix}/", self.base_url.trim_end_matches('/'))
		};
		Url::parse(&joined).map_err(|error| ConfigError::InvalidUrl {
			url: joined,
			message: error.to_string(),
		})
	}

	/// Request timeout.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// Parsed root key.
	pub fn root_key(&self) -> Result<NodeKey, ConfigError> {
		Ok(NodeKey::new(self.root_key.clone())?)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn missing_file_yields_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = BackendConfig::read(&dir.path().join("absent.toml")).unwrap();
		assert_eq!(config, BackendConfig::default());
	}

	#[test]
	fn partial_file_fills_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "base_url = \"http://10.0.0.2:9000\"\nlead_address = \"http://127.0.0.1:8002\"\n").unwrap();

		let config = BackendConfig::read(&path).unwrap();
		assert_eq!(config.base_url, "http://10.0.0.2:9000");
		assert_eq!(config.lead_address.as_deref(), Some("http://127.0.0.1:8002"));
		assert_eq!(config.api_prefix, "/api");
		assert_eq!(config.timeout(), Duration::from_secs(30));
		assert!(config.root_key().unwrap().is_root());
	}

	#[test]
	fn malformed_file_reports_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();

		let err = BackendConfig::read(&path).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if p == &path));
	}

	#[test]
	fn api_url_normalizes_slashes() {
		let config = BackendConfig {
			base_url: "http://host:8000/".into(),
			api_prefix: "api/".into(),
			..Default::default()
		};
		assert_eq!(config.api_url().unwrap().as_str(), "http://host:8000/api/");

		let bare = BackendConfig {
			api_prefix: String::new(),
			..Default::default()
		};
		assert_eq!(bare.api_url().unwrap().as_str(), "http://127.0.0.1:8000/");
	}

	#[test]
	fn override_ignores_blank_values() {
		let config = BackendConfig::default().with_base_url_override(Some("  ".into()));
		assert_eq!(config.base_url, default_base_url());
		let config = config.with_base_url_override(Some("http://other:1".into()));
		assert_eq!(config.base_url, "http://other:1");
	}
}
