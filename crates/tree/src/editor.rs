//! Write-leased topology editing session on a patch node.
//!
//! A [`TopologyEditor`] holds a write lease on its patch for as long as it is
//! open. Selections are encoded with `gridmen-cellset` on the way out and
//! decoded on the way back; a malformed response fails the call instead of
//! returning partial cells.
//!
//! The editor registers a cleanup callback on its node, so closing the node
//! (for example when the tree drops it) also closes the editor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gridmen_cellset::{CellSelection, decode, encode};
use gridmen_lock::LockCoordinator;
use gridmen_remote::{Ack, LeaseId, LeaseMode, PickRegion, RemoteError, TopologyService};
use tracing::{debug, info};

use crate::node::ResourceNode;
use crate::template::TemplateKind;
use crate::{Error, Result};

const CLEANUP_NAME: &str = "topology-editor";

/// Topology editing session.
pub struct TopologyEditor {
	node: Arc<ResourceNode>,
	topology: Arc<dyn TopologyService>,
	locks: Arc<LockCoordinator>,
	closed: Arc<AtomicBool>,
}

impl TopologyEditor {
	/// Acquires a write lease on `node` and opens a session.
	///
	/// # Errors
	///
	/// [`Error::UnsupportedAction`] unless `node` is a persisted patch;
	/// [`Error::Lock`] if the lease cannot be acquired.
	pub async fn open(node: Arc<ResourceNode>, topology: Arc<dyn TopologyService>, locks: Arc<LockCoordinator>) -> Result<Self> {
		let capability = match (node.kind(), node.kind().capability()) {
			(TemplateKind::Patch, Some(capability)) if !node.is_temp() => capability,
			_ => {
				return Err(Error::UnsupportedAction {
					template: node.kind().name(),
					action: "edit topology".into(),
				});
			}
		};

		let lease = node.lock(&locks, capability, LeaseMode::Write).await?;
		info!(node = %node.key(), lease = %lease.lease_id, "topology editor opened");

		let closed = Arc::new(AtomicBool::new(false));
		let flag = closed.clone();
		node.register_cleanup(CLEANUP_NAME, move || flag.store(true, Ordering::SeqCst));

		Ok(Self {
			node,
			topology,
			locks,
			closed,
		})
	}

	/// Edited node.
	pub fn node(&self) -> &Arc<ResourceNode> {
		&self.node
	}

	/// Whether the session still holds its lease.
	pub fn is_open(&self) -> bool {
		!self.closed.load(Ordering::SeqCst) && self.node.lease_id().is_some()
	}

	fn lease(&self) -> Result<LeaseId> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::EditorClosed(self.node.key().clone()));
		}
		self.node
			.lease_id()
			.ok_or_else(|| Error::EditorClosed(self.node.key().clone()))
	}

	/// Cells currently active in the patch.
	pub async fn activated_cells(&self) -> Result<CellSelection> {
		let lease = self.lease()?;
		let bytes = self.topology.activated_cells(self.node.info(), &lease).await?;
		decode_cells("activated_cells", &bytes)
	}

	/// Cells soft-deleted in the patch.
	pub async fn deleted_cells(&self) -> Result<CellSelection> {
		let lease = self.lease()?;
		let bytes = self.topology.deleted_cells(self.node.info(), &lease).await?;
		decode_cells("deleted_cells", &bytes)
	}

	/// Subdivides `cells` and returns their children.
	pub async fn subdivide(&self, cells: &CellSelection) -> Result<CellSelection> {
		let lease = self.lease()?;
		debug!(node = %self.node.key(), cells = cells.len(), "subdivide");
		let bytes = self.topology.subdivide(self.node.info(), &lease, encode(cells)).await?;
		decode_cells("subdivide", &bytes)
	}

	/// Merges `cells` and returns the resulting parents.
	pub async fn merge(&self, cells: &CellSelection) -> Result<CellSelection> {
		let lease = self.lease()?;
		debug!(node = %self.node.key(), cells = cells.len(), "merge");
		let bytes = self.topology.merge(self.node.info(), &lease, encode(cells)).await?;
		decode_cells("merge", &bytes)
	}

	/// Soft-deletes `cells`.
	pub async fn delete(&self, cells: &CellSelection) -> Result<()> {
		let lease = self.lease()?;
		debug!(node = %self.node.key(), cells = cells.len(), "delete");
		let ack = self.topology.delete(self.node.info(), &lease, encode(cells)).await?;
		accept("delete", ack)
	}

	/// Restores soft-deleted `cells`.
	pub async fn recover(&self, cells: &CellSelection) -> Result<()> {
		let lease = self.lease()?;
		debug!(node = %self.node.key(), cells = cells.len(), "recover");
		let ack = self.topology.recover(self.node.info(), &lease, encode(cells)).await?;
		accept("recover", ack)
	}

	/// Active cells intersecting `region`.
	pub async fn pick_by_region(&self, region: &PickRegion) -> Result<CellSelection> {
		let lease = self.lease()?;
		let bytes = self.topology.pick_by_region(self.node.info(), &lease, region).await?;
		decode_cells("pick_by_region", &bytes)
	}

	/// Persists the patch topology.
	pub async fn save(&self) -> Result<()> {
		let lease = self.lease()?;
		let ack = self.topology.save(self.node.info(), &lease).await?;
		accept("save", ack)?;
		info!(node = %self.node.key(), "topology saved");
		Ok(())
	}

	/// Ends the session and releases the lease. The node's other cleanup
	/// callbacks are left in place.
	pub async fn close(self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.node.unregister_cleanup(CLEANUP_NAME);
		if self.node.lease_id().is_some() {
			self.node.unlock(&self.locks).await?;
		}
		info!(node = %self.node.key(), "topology editor closed");
		Ok(())
	}
}

fn decode_cells(operation: &'static str, bytes: &[u8]) -> Result<CellSelection> {
	decode(bytes).map_err(|source| RemoteError::Cells { operation, source }.into())
}

fn accept(operation: &'static str, ack: Ack) -> Result<()> {
	if ack.success {
		Ok(())
	} else {
		Err(RemoteError::Rejected {
			operation,
			message: ack.message,
		}
		.into())
	}
}

#[cfg(test)]
mod tests;
