//! Async service traits consumed by the tree, the lock coordinator and the
//! topology editor.
//!
//! [`HttpBackend`](crate::HttpBackend) implements all three against the
//! backend REST surface. Tests substitute hand-written doubles.

use async_trait::async_trait;

use crate::Result;
use crate::key::{NodeInfo, NodeKey};
use crate::types::{Ack, ChildRange, LeaseGrant, LeaseId, LeaseMode, NodeSnapshot, PickRegion};

/// Server-authoritative node namespace.
#[async_trait]
pub trait NamespaceService: Send + Sync {
	/// Lists `node` and its direct children, optionally restricted to a range
	/// of child indices.
	async fn list_children(&self, node: &NodeInfo, range: Option<ChildRange>) -> Result<NodeSnapshot>;

	/// Mounts a resource at `node` with the given template and returns the
	/// key the backend assigned.
	async fn mount(&self, node: &NodeInfo, template_name: &str, params: Option<serde_json::Value>) -> Result<NodeKey>;

	/// Unmounts the resource at `node`.
	async fn unmount(&self, node: &NodeInfo) -> Result<()>;
}

/// Per-node read/write lease service.
#[async_trait]
pub trait LockService: Send + Sync {
	/// Requests a lease on `node` for the interface named by `capability`.
	async fn acquire_lease(&self, capability: &str, node: &NodeInfo, mode: LeaseMode) -> Result<LeaseGrant>;

	/// Returns a lease. A stale lease is answered with `success = false`.
	async fn release_lease(&self, node: &NodeInfo, lease: &LeaseId) -> Result<Ack>;
}

/// Bulk topology operations on a patch. Cell sets travel in both directions
/// as buffers in the `gridmen_cellset::encode` layout; implementations convert
/// to whatever their transport expects.
#[async_trait]
pub trait TopologyService: Send + Sync {
	/// Cells currently active in the patch.
	async fn activated_cells(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Vec<u8>>;

	/// Cells soft-deleted in the patch.
	async fn deleted_cells(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Vec<u8>>;

	/// Subdivides the given cells, returning their children.
	async fn subdivide(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Vec<u8>>;

	/// Merges the given cells, returning the resulting parents.
	async fn merge(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Vec<u8>>;

	/// Soft-deletes the given cells.
	async fn delete(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Ack>;

	/// Restores soft-deleted cells.
	async fn recover(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Ack>;

	/// Active cells intersecting `region`.
	async fn pick_by_region(&self, patch: &NodeInfo, lease: &LeaseId, region: &PickRegion) -> Result<Vec<u8>>;

	/// Persists the patch topology.
	async fn save(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Ack>;
}
