use std::path::PathBuf;
use std::sync::Arc;

use gridmen_cellset::DecodeError;
use thiserror::Error;

use crate::key::KeyError;

/// Failure of a remote namespace, lease or topology request.
///
/// Every variant names the operation that failed. The type is `Clone` so a
/// single failed request can be handed to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
	/// The request never produced a response.
	#[error("{operation}: transport failure: {message}")]
	Transport {
		/// Failed operation.
		operation: &'static str,
		/// Underlying transport message.
		message: String,
	},
	/// The backend answered with a non-success status.
	#[error("{operation}: backend returned {status}: {detail}")]
	Status {
		/// Failed operation.
		operation: &'static str,
		/// HTTP status code.
		status: u16,
		/// Backend-provided detail.
		detail: String,
	},
	/// The backend refused the lease or the lease-guarded operation.
	#[error("{operation}: access denied: {detail}")]
	Denied {
		/// Failed operation.
		operation: &'static str,
		/// Backend-provided detail.
		detail: String,
	},
	/// The backend acknowledged the request but reported failure.
	#[error("{operation}: rejected: {message}")]
	Rejected {
		/// Failed operation.
		operation: &'static str,
		/// Backend-provided message.
		message: String,
	},
	/// The response body could not be interpreted.
	#[error("{operation}: malformed response: {message}")]
	Payload {
		/// Failed operation.
		operation: &'static str,
		/// Parse failure description.
		message: String,
	},
	/// A cell-set buffer, outgoing or returned, failed to decode.
	#[error("{operation}: invalid cell set: {source}")]
	Cells {
		/// Failed operation.
		operation: &'static str,
		/// Decoder failure.
		#[source]
		source: DecodeError,
	},
	/// The backend returned a key that does not parse.
	#[error("{operation}: invalid node key: {source}")]
	Key {
		/// Failed operation.
		operation: &'static str,
		/// Key validation failure.
		#[source]
		source: KeyError,
	},
}

impl RemoteError {
	/// Name of the operation that failed.
	pub fn operation(&self) -> &'static str {
		match self {
			Self::Transport { operation, .. }
			| Self::Status { operation, .. }
			| Self::Denied { operation, .. }
			| Self::Rejected { operation, .. }
			| Self::Payload { operation, .. }
			| Self::Cells { operation, .. }
			| Self::Key { operation, .. } => operation,
		}
	}

	/// Returns true for lease denials.
	pub fn is_denied(&self) -> bool {
		matches!(self, Self::Denied { .. })
	}

	pub(crate) fn transport(operation: &'static str, error: impl std::fmt::Display) -> Self {
		Self::Transport {
			operation,
			message: error.to_string(),
		}
	}

	pub(crate) fn payload(operation: &'static str, error: impl std::fmt::Display) -> Self {
		Self::Payload {
			operation,
			message: error.to_string(),
		}
	}
}

/// Failure to load or interpret a [`BackendConfig`](crate::BackendConfig).
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
	/// The config file exists but could not be read.
	#[error("failed to read {}: {error}", path.display())]
	Io {
		/// Config file path.
		path: PathBuf,
		/// Underlying I/O error.
		error: Arc<std::io::Error>,
	},
	/// The config file is not valid TOML for [`BackendConfig`](crate::BackendConfig).
	#[error("failed to parse {}: {message}", path.display())]
	Parse {
		/// Config file path.
		path: PathBuf,
		/// TOML error message.
		message: String,
	},
	/// `base_url` or `api_prefix` do not form a valid URL.
	#[error("invalid backend url `{url}`: {message}")]
	InvalidUrl {
		/// Rejected URL text.
		url: String,
		/// Parser message.
		message: String,
	},
	/// The HTTP client could not be constructed.
	#[error("failed to build http client: {0}")]
	Client(String),
	/// `root_key` is not a valid node key.
	#[error("invalid root key: {0}")]
	RootKey(#[from] KeyError),
}
