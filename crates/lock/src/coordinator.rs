use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use gridmen_remote::{LeaseId, LeaseMode, LockService, NodeInfo, NodeKey};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::callbacks::{Callback, run_isolated};
use crate::{LockError, Result};

/// A lease this client holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
	/// Token issued by the lock service.
	pub lease_id: LeaseId,
	/// Key the service echoed back.
	pub node_key: NodeKey,
	/// Granted access mode.
	pub mode: LeaseMode,
	/// Interface the lease was requested for.
	pub capability: String,
}

/// Client-side ledger of leases and per-node release callbacks.
///
/// # Concurrency
///
/// - `leases`: `RwLock` over the ledger, never held across a backend call.
/// - `callbacks`: `Mutex` over the release registry; callbacks run after the
///   lock is dropped.
pub struct LockCoordinator {
	service: Arc<dyn LockService>,
	leases: RwLock<HashMap<NodeInfo, Lease>>,
	callbacks: Mutex<HashMap<NodeInfo, Vec<(String, Callback)>>>,
}

impl LockCoordinator {
	/// Creates a coordinator backed by `service`.
	pub fn new(service: Arc<dyn LockService>) -> Self {
		Self {
			service,
			leases: RwLock::new(HashMap::new()),
			callbacks: Mutex::new(HashMap::new()),
		}
	}

	/// Acquires a lease on `node` for the interface named `capability`.
	///
	/// # Errors
	///
	/// [`LockError::AlreadyHeld`] if a lease on `node` is already tracked,
	/// [`LockError::Remote`] if the service fails or denies the request.
	/// Nothing is recorded on failure.
	pub async fn acquire(&self, capability: &str, node: &NodeInfo, mode: LeaseMode) -> Result<Lease> {
		if let Some(held) = self.leases.read().get(node) {
			return Err(LockError::AlreadyHeld {
				node: node.clone(),
				lease: held.lease_id.clone(),
			});
		}

		let grant = self.service.acquire_lease(capability, node, mode).await?;
		let lease = Lease {
			lease_id: grant.lease_id,
			node_key: grant.node_key,
			mode: grant.mode,
			capability: capability.to_owned(),
		};

		let raced = match self.leases.write().entry(node.clone()) {
			Entry::Occupied(held) => Some(held.get().lease_id.clone()),
			Entry::Vacant(slot) => {
				slot.insert(lease.clone());
				None
			}
		};
		if let Some(held) = raced {
			// A concurrent acquire won; hand our grant back.
			if let Err(error) = self.service.release_lease(node, &lease.lease_id).await {
				warn!(node = %node, lease = %lease.lease_id, %error, "failed to return duplicate lease");
			}
			return Err(LockError::AlreadyHeld {
				node: node.clone(),
				lease: held,
			});
		}

		info!(node = %node, lease = %lease.lease_id, mode = %lease.mode, capability, "lease acquired");
		Ok(lease)
	}

	/// Releases `lease` on `node`.
	///
	/// Runs the node's release callbacks, forgets the tracked lease and
	/// informs the service. A stale lease (`success = false`) is logged and
	/// treated as released.
	///
	/// # Errors
	///
	/// [`LockError::Remote`] on transport or status failures. The callbacks
	/// have run and the lease is forgotten even then.
	pub async fn release(&self, node: &NodeInfo, lease: &LeaseId) -> Result<()> {
		let callbacks = self.callbacks.lock().remove(node).unwrap_or_default();
		if !callbacks.is_empty() {
			run_isolated("release", callbacks);
		}

		{
			let mut leases = self.leases.write();
			if leases.get(node).is_some_and(|held| &held.lease_id == lease) {
				leases.remove(node);
			}
		}

		let ack = self.service.release_lease(node, lease).await?;
		if ack.success {
			debug!(node = %node, lease = %lease, "lease released");
		} else {
			warn!(node = %node, lease = %lease, message = %ack.message, "stale lease release");
		}
		Ok(())
	}

	/// Releases whatever lease is tracked for `node`.
	///
	/// # Errors
	///
	/// [`LockError::NotHeld`] if no lease is tracked.
	pub async fn release_node(&self, node: &NodeInfo) -> Result<()> {
		let lease = self
			.active_lease(node)
			.ok_or_else(|| LockError::NotHeld(node.clone()))?;
		self.release(node, &lease.lease_id).await
	}

	/// Registers a callback run when `node`'s lease is released. A callback
	/// with the same name replaces the previous one.
	pub fn on_release(&self, node: &NodeInfo, name: impl Into<String>, callback: impl FnOnce() + Send + 'static) {
		let name = name.into();
		let mut registry = self.callbacks.lock();
		let entries = registry.entry(node.clone()).or_default();
		entries.retain(|(existing, _)| existing != &name);
		entries.push((name, Box::new(callback)));
	}

	/// Lease currently tracked for `node`.
	pub fn active_lease(&self, node: &NodeInfo) -> Option<Lease> {
		self.leases.read().get(node).cloned()
	}

	/// Number of tracked leases.
	pub fn active_count(&self) -> usize {
		self.leases.read().len()
	}

	/// Releases every tracked lease.
	///
	/// Attempts all of them and returns the first error.
	pub async fn release_all(&self) -> Result<()> {
		let held: Vec<(NodeInfo, LeaseId)> = self
			.leases
			.read()
			.iter()
			.map(|(node, lease)| (node.clone(), lease.lease_id.clone()))
			.collect();

		let mut first_error = None;
		for (node, lease) in held {
			if let Err(error) = self.release(&node, &lease).await {
				warn!(node = %node, lease = %lease, %error, "lease release failed during shutdown");
				first_error.get_or_insert(error);
			}
		}
		first_error.map_or(Ok(()), Err)
	}
}
