//! Wire types exchanged with the namespace, lease and topology services.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::NodeKey;

/// Template name the backend reports for plain folders.
pub const DEFAULT_TEMPLATE: &str = "default";

fn default_template() -> String {
	DEFAULT_TEMPLATE.to_owned()
}

/// One child entry of a [`NodeSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
	/// Full key of the child.
	pub node_key: NodeKey,
	/// Template the child was mounted with.
	#[serde(default = "default_template", deserialize_with = "nullable_template")]
	pub template_name: String,
}

/// Authoritative listing of a node and its direct children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
	/// Key of the listed node.
	pub node_key: NodeKey,
	/// Template of the listed node.
	#[serde(default = "default_template", deserialize_with = "nullable_template")]
	pub template_name: String,
	/// Direct children, in backend order.
	#[serde(default)]
	pub children: Vec<ChildEntry>,
}

/// Half-open range of child indices for paged enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRange {
	/// First child index.
	pub start: usize,
	/// One past the last child index.
	pub end: usize,
}

/// Access mode of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseMode {
	/// Shared read access.
	#[serde(rename = "r")]
	Read,
	/// Exclusive write access.
	#[serde(rename = "w")]
	Write,
}

impl LeaseMode {
	/// Wire representation.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Read => "r",
			Self::Write => "w",
		}
	}
}

impl fmt::Display for LeaseMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Read => "read",
			Self::Write => "write",
		})
	}
}

/// Opaque lease token issued by the lock service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
	/// Wraps a token.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token text.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for LeaseId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Lease granted by the lock service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseGrant {
	/// Issued lease token.
	#[serde(rename = "lock_id")]
	pub lease_id: LeaseId,
	/// Echoed node key.
	pub node_key: NodeKey,
	/// Echoed access mode.
	#[serde(rename = "access_mode")]
	pub mode: LeaseMode,
}

/// Generic success/message acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
	/// Whether the backend applied the request.
	pub success: bool,
	/// Human-readable outcome.
	#[serde(default)]
	pub message: String,
}

/// Access token for a node on the backend, as used by requests that carry
/// more than one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeToken {
	/// Node key.
	pub node_key: String,
	/// Lease token, if the caller holds one.
	pub lock_id: Option<LeaseId>,
}

/// Region used to pick cells of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickRegion {
	/// A `.shp` or `.geojson` file readable by the backend.
	FeatureFile(String),
	/// Features stored in a vector node.
	VectorNode {
		/// Node info text of the vector node.
		node: String,
		/// Lease held on the vector node, if any.
		lease: Option<LeaseId>,
	},
}

impl PickRegion {
	pub(crate) fn to_wire(&self) -> serde_json::Value {
		match self {
			Self::FeatureFile(path) => serde_json::Value::String(path.clone()),
			Self::VectorNode { node, lease } => serde_json::json!({
				"node_key": node,
				"lock_id": lease,
			}),
		}
	}
}

fn nullable_template<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_template))
}
