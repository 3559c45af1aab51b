//! Hierarchical node keys and address-qualified node infos.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key of the namespace root.
pub const ROOT_KEY: &str = ".";

/// Separator between a remote instance address and a node key.
pub const ADDRESS_SEPARATOR: &str = "::";

/// Dotted hierarchical path identifying a node (`a.b.c` is a child of `a.b`).
///
/// The root is the distinguished key `.`; its children have single-segment
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeKey(String);

impl NodeKey {
	/// Validates and wraps a key.
	pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
		let value = value.into();
		validate_key(&value)?;
		Ok(Self(value))
	}

	/// The namespace root key.
	pub fn root() -> Self {
		Self(ROOT_KEY.to_owned())
	}

	/// Returns true for the root key.
	pub fn is_root(&self) -> bool {
		self.0 == ROOT_KEY
	}

	/// Raw key text.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Last path segment.
	pub fn name(&self) -> &str {
		if self.is_root() {
			return ROOT_KEY;
		}
		self.0.rsplit('.').next().unwrap_or(&self.0)
	}

	/// Parent key derived from the path, `None` for the root.
	pub fn parent(&self) -> Option<NodeKey> {
		if self.is_root() {
			return None;
		}
		match self.0.rsplit_once('.') {
			Some((parent, _)) => Some(Self(parent.to_owned())),
			None => Some(Self::root()),
		}
	}

	/// Key of a direct child named `name`.
	pub fn child(&self, name: &str) -> Result<NodeKey, KeyError> {
		if name.is_empty() || name.contains('.') {
			return Err(KeyError::InvalidSegment(name.to_owned()));
		}
		if self.is_root() {
			Self::new(name)
		} else {
			Self::new(format!("{}.{name}", self.0))
		}
	}

	/// Number of segments below the root.
	pub fn depth(&self) -> usize {
		if self.is_root() { 0 } else { self.0.split('.').count() }
	}

	/// Returns true if `other` lies strictly below this key.
	pub fn is_ancestor_of(&self, other: &NodeKey) -> bool {
		if self.is_root() {
			return !other.is_root();
		}
		other
			.0
			.strip_prefix(self.0.as_str())
			.is_some_and(|rest| rest.starts_with('.'))
	}
}

impl fmt::Display for NodeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for NodeKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl FromStr for NodeKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

impl TryFrom<String> for NodeKey {
	type Error = KeyError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<NodeKey> for String {
	fn from(key: NodeKey) -> Self {
		key.0
	}
}

/// A node key, optionally qualified with the address of the backend
/// instance that hosts it (`"<address>::<key>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeInfo {
	address: Option<String>,
	key: NodeKey,
}

impl NodeInfo {
	/// Addresses a node on the default backend.
	pub fn local(key: NodeKey) -> Self {
		Self { address: None, key }
	}

	/// Addresses a node on another backend instance.
	pub fn remote(address: impl Into<String>, key: NodeKey) -> Result<Self, KeyError> {
		let address = address.into();
		if address.is_empty() {
			return Err(KeyError::EmptyAddress);
		}
		Ok(Self {
			address: Some(address),
			key,
		})
	}

	/// Addresses `key` on `address` when given, locally otherwise.
	pub fn with_address(address: Option<&str>, key: NodeKey) -> Result<Self, KeyError> {
		match address {
			Some(address) => Self::remote(address, key),
			None => Ok(Self::local(key)),
		}
	}

	/// Addresses `key` on the same instance as `self`.
	pub fn for_key(&self, key: NodeKey) -> Self {
		Self {
			address: self.address.clone(),
			key,
		}
	}

	/// Remote instance address, if any.
	pub fn address(&self) -> Option<&str> {
		self.address.as_deref()
	}

	/// The bare node key.
	pub fn key(&self) -> &NodeKey {
		&self.key
	}
}

impl fmt::Display for NodeInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.address {
			Some(address) => write!(f, "{address}{ADDRESS_SEPARATOR}{}", self.key),
			None => write!(f, "{}", self.key),
		}
	}
}

impl FromStr for NodeInfo {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.rsplit_once(ADDRESS_SEPARATOR) {
			Some((address, key)) => Self::remote(address, NodeKey::new(key)?),
			None => Ok(Self::local(NodeKey::new(s)?)),
		}
	}
}

/// Errors raised when validating keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
	/// The key is empty.
	#[error("node key must not be empty")]
	Empty,
	/// The key has an empty path segment.
	#[error("node key `{0}` has an empty segment")]
	EmptySegment(String),
	/// A child name is empty or contains a dot.
	#[error("`{0}` is not a single path segment")]
	InvalidSegment(String),
	/// The key contains the address separator.
	#[error("node key `{0}` contains `::`")]
	ContainsSeparator(String),
	/// The address part of a node info is empty.
	#[error("remote address must not be empty")]
	EmptyAddress,
}

fn validate_key(value: &str) -> Result<(), KeyError> {
	if value.is_empty() {
		return Err(KeyError::Empty);
	}
	if value == ROOT_KEY {
		return Ok(());
	}
	if value.contains(ADDRESS_SEPARATOR) {
		return Err(KeyError::ContainsSeparator(value.to_owned()));
	}
	if value.split('.').any(str::is_empty) {
		return Err(KeyError::EmptySegment(value.to_owned()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(s: &str) -> NodeKey {
		NodeKey::new(s).unwrap()
	}

	#[test]
	fn parent_and_name_follow_segments() {
		assert_eq!(key("a.b.c").parent(), Some(key("a.b")));
		assert_eq!(key("a").parent(), Some(NodeKey::root()));
		assert_eq!(NodeKey::root().parent(), None);
		assert_eq!(key("a.b.c").name(), "c");
		assert_eq!(key("a.b.c").depth(), 3);
		assert_eq!(NodeKey::root().depth(), 0);
	}

	#[test]
	fn child_of_root_is_single_segment() {
		assert_eq!(NodeKey::root().child("x").unwrap(), key("x"));
		assert_eq!(key("x").child("temp").unwrap(), key("x.temp"));
		assert!(key("x").child("a.b").is_err());
	}

	#[test]
	fn rejects_malformed_keys() {
		assert_eq!(NodeKey::new(""), Err(KeyError::Empty));
		assert!(matches!(NodeKey::new("a..b"), Err(KeyError::EmptySegment(_))));
		assert!(matches!(NodeKey::new(".a"), Err(KeyError::EmptySegment(_))));
		assert!(matches!(NodeKey::new("h::a"), Err(KeyError::ContainsSeparator(_))));
	}

	#[test]
	fn ancestry() {
		assert!(key("a").is_ancestor_of(&key("a.b.c")));
		assert!(!key("a").is_ancestor_of(&key("ab.c")));
		assert!(!key("a").is_ancestor_of(&key("a")));
		assert!(NodeKey::root().is_ancestor_of(&key("a")));
	}

	#[test]
	fn node_info_round_trips_through_text() {
		let info: NodeInfo = "http://127.0.0.1:8002::schemaSet".parse().unwrap();
		assert_eq!(info.address(), Some("http://127.0.0.1:8002"));
		assert_eq!(info.key(), &key("schemaSet"));
		assert_eq!(info.to_string(), "http://127.0.0.1:8002::schemaSet");

		let local: NodeInfo = "root.schema".parse().unwrap();
		assert_eq!(local.address(), None);
		assert_eq!(local.to_string(), "root.schema");

		assert_eq!("::a".parse::<NodeInfo>(), Err(KeyError::EmptyAddress));
	}

	#[test]
	fn for_key_keeps_the_address() {
		let lead = NodeInfo::remote("http://10.0.0.2:8000", NodeKey::root()).unwrap();
		let child = lead.for_key(key("grids.g1"));
		assert_eq!(child.address(), Some("http://10.0.0.2:8000"));
		assert_eq!(child.key(), &key("grids.g1"));
		assert_eq!(NodeInfo::local(NodeKey::root()).for_key(key("a")).address(), None);
	}

	#[test]
	fn node_key_serializes_as_string() {
		let json = serde_json::to_string(&key("a.b")).unwrap();
		assert_eq!(json, "\"a.b\"");
		assert!(serde_json::from_str::<NodeKey>("\"a..b\"").is_err());
	}
}
