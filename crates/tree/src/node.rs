//! Cached vertex of the resource tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gridmen_lock::{Callback, Lease, LockCoordinator, LockError, run_isolated};
use gridmen_remote::{LeaseId, LeaseMode, NodeInfo, NodeKey};
use parking_lot::Mutex;
use tracing::debug;

use crate::template::{TemplateDef, TemplateKind};

/// One node of the resource tree.
///
/// Key, node info and template kind are fixed at construction. Everything
/// else sits behind a node-local mutex; the children map is only mutated by
/// the owning [`ResourceTree`](crate::ResourceTree).
pub struct ResourceNode {
	key: NodeKey,
	info: NodeInfo,
	kind: TemplateKind,
	inner: Mutex<NodeInner>,
}

struct NodeInner {
	aligned: bool,
	is_temp: bool,
	lease: Option<LeaseId>,
	parent: Option<NodeKey>,
	children: HashMap<NodeKey, Arc<ResourceNode>>,
	views: HashMap<String, serde_json::Value>,
	cleanup: Vec<(String, Callback)>,
}

impl ResourceNode {
	/// Temporary nodes start aligned since there is nothing to fetch for them.
	pub(crate) fn new(key: NodeKey, info: NodeInfo, kind: TemplateKind, is_temp: bool) -> Arc<Self> {
		Arc::new(Self {
			key,
			info,
			kind,
			inner: Mutex::new(NodeInner {
				aligned: is_temp,
				is_temp,
				lease: None,
				parent: None,
				children: HashMap::new(),
				views: HashMap::new(),
				cleanup: Vec::new(),
			}),
		})
	}

	/// Hierarchical key.
	pub fn key(&self) -> &NodeKey {
		&self.key
	}

	/// Key qualified with the backend address requests go to.
	pub fn info(&self) -> &NodeInfo {
		&self.info
	}

	/// Template kind.
	pub fn kind(&self) -> TemplateKind {
		self.kind
	}

	/// Capability table entry of this node's template.
	pub fn template(&self) -> &'static TemplateDef {
		self.kind.def()
	}

	/// Whether children have been fetched at least once.
	pub fn is_aligned(&self) -> bool {
		self.inner.lock().aligned
	}

	/// Whether the node exists only in this client.
	pub fn is_temp(&self) -> bool {
		self.inner.lock().is_temp
	}

	/// Lease currently held on this node.
	pub fn lease_id(&self) -> Option<LeaseId> {
		self.inner.lock().lease.clone()
	}

	/// Parent key, `None` for the root or a detached node.
	pub fn parent_key(&self) -> Option<NodeKey> {
		self.inner.lock().parent.clone()
	}

	/// Children sorted by key.
	pub fn children(&self) -> Vec<Arc<ResourceNode>> {
		let mut children: Vec<_> = self.inner.lock().children.values().cloned().collect();
		children.sort_by(|a, b| a.key.cmp(&b.key));
		children
	}

	/// Child with `key`.
	pub fn child(&self, key: &NodeKey) -> Option<Arc<ResourceNode>> {
		self.inner.lock().children.get(key).cloned()
	}

	/// Number of children.
	pub fn child_count(&self) -> usize {
		self.inner.lock().children.len()
	}

	/// Per-view state stored under `view`.
	pub fn view_state(&self, view: &str) -> Option<serde_json::Value> {
		self.inner.lock().views.get(view).cloned()
	}

	/// Stores per-view state; it survives reconciliation as long as the node does.
	pub fn set_view_state(&self, view: impl Into<String>, state: serde_json::Value) {
		self.inner.lock().views.insert(view.into(), state);
	}

	/// Registers a callback run on [`close`](Self::close). A callback with the
	/// same name replaces the previous one.
	pub fn register_cleanup(&self, name: impl Into<String>, callback: impl FnOnce() + Send + 'static) {
		let name = name.into();
		let mut inner = self.inner.lock();
		inner.cleanup.retain(|(existing, _)| existing != &name);
		inner.cleanup.push((name, Box::new(callback)));
	}

	/// Drops a registered cleanup callback without running it.
	pub fn unregister_cleanup(&self, name: &str) -> bool {
		let mut inner = self.inner.lock();
		let before = inner.cleanup.len();
		inner.cleanup.retain(|(existing, _)| existing != name);
		inner.cleanup.len() != before
	}

	/// Number of registered cleanup callbacks.
	pub fn cleanup_count(&self) -> usize {
		self.inner.lock().cleanup.len()
	}

	/// Acquires a lease for `capability` and records it on the node.
	///
	/// # Errors
	///
	/// [`LockError::AlreadyHeld`] if the node already holds a lease; the
	/// coordinator's error otherwise. The node holds no lease on failure.
	pub async fn lock(&self, locks: &LockCoordinator, capability: &str, mode: LeaseMode) -> Result<Lease, LockError> {
		if let Some(lease) = self.lease_id() {
			return Err(LockError::AlreadyHeld {
				node: self.info.clone(),
				lease,
			});
		}
		let lease = locks.acquire(capability, &self.info, mode).await?;
		self.inner.lock().lease = Some(lease.lease_id.clone());
		Ok(lease)
	}

	/// Releases the held lease without running cleanup callbacks.
	///
	/// # Errors
	///
	/// [`LockError::NotHeld`] if no lease is held. The lease id is cleared
	/// before the release request is sent.
	pub async fn unlock(&self, locks: &LockCoordinator) -> Result<(), LockError> {
		let lease = self
			.inner
			.lock()
			.lease
			.take()
			.ok_or_else(|| LockError::NotHeld(self.info.clone()))?;
		locks.release(&self.info, &lease).await
	}

	/// Runs every cleanup callback, then releases the held lease.
	///
	/// A panicking callback is logged and the rest still run. The lease id
	/// is cleared even when the release request fails.
	pub async fn close(&self, locks: &LockCoordinator) -> Result<(), LockError> {
		let (callbacks, lease) = {
			let mut inner = self.inner.lock();
			(std::mem::take(&mut inner.cleanup), inner.lease.take())
		};
		if !callbacks.is_empty() {
			run_isolated(self.key.as_str(), callbacks);
		}
		match lease {
			Some(lease) => {
				debug!(node = %self.key, lease = %lease, "releasing lease on close");
				locks.release(&self.info, &lease).await
			}
			None => Ok(()),
		}
	}

	pub(crate) fn set_aligned(&self, aligned: bool) {
		self.inner.lock().aligned = aligned;
	}

	pub(crate) fn set_temp(&self, is_temp: bool) {
		self.inner.lock().is_temp = is_temp;
	}

	pub(crate) fn set_parent(&self, parent: Option<NodeKey>) {
		self.inner.lock().parent = parent;
	}

	pub(crate) fn insert_child(&self, child: Arc<ResourceNode>) {
		self.inner.lock().children.insert(child.key.clone(), child);
	}

	pub(crate) fn remove_child(&self, key: &NodeKey) -> Option<Arc<ResourceNode>> {
		self.inner.lock().children.remove(key)
	}

	pub(crate) fn take_children(&self) -> HashMap<NodeKey, Arc<ResourceNode>> {
		std::mem::take(&mut self.inner.lock().children)
	}

	pub(crate) fn replace_children(&self, children: HashMap<NodeKey, Arc<ResourceNode>>) {
		self.inner.lock().children = children;
	}
}

impl fmt::Debug for ResourceNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("ResourceNode")
			.field("key", &self.key)
			.field("kind", &self.kind)
			.field("aligned", &inner.aligned)
			.field("is_temp", &inner.is_temp)
			.field("lease", &inner.lease)
			.field("children", &inner.children.len())
			.finish()
	}
}
