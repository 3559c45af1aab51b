//! Scripted namespace and lease doubles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use gridmen_lock::LockCoordinator;
use gridmen_remote::{
	Ack, ChildEntry, ChildRange, LeaseGrant, LeaseId, LeaseMode, LockService, NamespaceService, NodeInfo, NodeKey, NodeSnapshot,
	RemoteError,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::ResourceTree;

pub fn key(raw: &str) -> NodeKey {
	NodeKey::new(raw).unwrap()
}

/// Namespace whose listings are scripted per key.
///
/// Fetches are counted on entry. A gated key blocks its fetch until the gate
/// is notified. Listings are read after the gate opens unless
/// [`MockNamespace::snapshot_on_request`] was called.
#[derive(Default)]
pub struct MockNamespace {
	listings: Mutex<HashMap<NodeKey, Vec<(NodeKey, String)>>>,
	fetches: Mutex<HashMap<NodeKey, usize>>,
	gates: Mutex<HashMap<NodeKey, Arc<Notify>>>,
	failing: Mutex<HashSet<NodeKey>>,
	renames: Mutex<HashMap<NodeKey, NodeKey>>,
	early_snapshot: AtomicBool,
	pub mounted: Mutex<Vec<(NodeKey, String)>>,
	pub unmounted: Mutex<Vec<NodeKey>>,
}

impl MockNamespace {
	/// Replaces the children reported for `parent`.
	pub fn set_children(&self, parent: &str, children: &[(&str, &str)]) {
		let children = children.iter().map(|(k, template)| (key(k), (*template).to_owned())).collect();
		self.listings.lock().insert(key(parent), children);
	}

	/// Reads listings when a fetch is issued, before any gate.
	pub fn snapshot_on_request(&self) {
		self.early_snapshot.store(true, Ordering::SeqCst);
	}

	fn listing(&self, node: &NodeKey) -> Vec<ChildEntry> {
		self.listings
			.lock()
			.get(node)
			.cloned()
			.unwrap_or_default()
			.into_iter()
			.map(|(node_key, template_name)| ChildEntry { node_key, template_name })
			.collect()
	}

	pub fn fetches(&self, node: &str) -> usize {
		self.fetches.lock().get(&key(node)).copied().unwrap_or(0)
	}

	/// Blocks fetches of `node` until the returned gate is notified.
	pub fn gate(&self, node: &str) -> Arc<Notify> {
		let gate = Arc::new(Notify::new());
		self.gates.lock().insert(key(node), gate.clone());
		gate
	}

	pub fn ungate(&self, node: &str) {
		self.gates.lock().remove(&key(node));
	}

	pub fn fail(&self, node: &str, failing: bool) {
		let mut set = self.failing.lock();
		if failing {
			set.insert(key(node));
		} else {
			set.remove(&key(node));
		}
	}

	/// Makes the backend assign `assigned` when `requested` is mounted.
	pub fn rename_on_mount(&self, requested: &str, assigned: &str) {
		self.renames.lock().insert(key(requested), key(assigned));
	}

	fn detach_from_listing(&self, node: &NodeKey) {
		if let Some(parent) = node.parent()
			&& let Some(children) = self.listings.lock().get_mut(&parent)
		{
			children.retain(|(child, _)| child != node);
		}
	}
}

#[async_trait]
impl NamespaceService for MockNamespace {
	async fn list_children(&self, node: &NodeInfo, _range: Option<ChildRange>) -> gridmen_remote::Result<NodeSnapshot> {
		*self.fetches.lock().entry(node.key().clone()).or_default() += 1;
		let early = self
			.early_snapshot
			.load(Ordering::SeqCst)
			.then(|| self.listing(node.key()));

		let gate = self.gates.lock().get(node.key()).cloned();
		if let Some(gate) = gate {
			gate.notified().await;
		}

		if self.failing.lock().contains(node.key()) {
			return Err(RemoteError::Transport {
				operation: "list_children",
				message: "connection refused".into(),
			});
		}

		let children = early.unwrap_or_else(|| self.listing(node.key()));
		Ok(NodeSnapshot {
			node_key: node.key().clone(),
			template_name: "default".into(),
			children,
		})
	}

	async fn mount(&self, node: &NodeInfo, template_name: &str, _params: Option<serde_json::Value>) -> gridmen_remote::Result<NodeKey> {
		let assigned = self.renames.lock().get(node.key()).cloned().unwrap_or_else(|| node.key().clone());
		if let Some(parent) = assigned.parent() {
			self.listings
				.lock()
				.entry(parent)
				.or_default()
				.push((assigned.clone(), template_name.to_owned()));
		}
		self.mounted.lock().push((assigned.clone(), template_name.to_owned()));
		Ok(assigned)
	}

	async fn unmount(&self, node: &NodeInfo) -> gridmen_remote::Result<()> {
		self.detach_from_listing(node.key());
		self.unmounted.lock().push(node.key().clone());
		Ok(())
	}
}

/// Lock service that grants everything and counts releases.
///
/// A release is counted once it gets past the release gate, if any.
#[derive(Default)]
pub struct GrantAll {
	issued: AtomicUsize,
	release_gate: Mutex<Option<Arc<Notify>>>,
	pub released: AtomicUsize,
}

impl GrantAll {
	/// Blocks releases until the returned gate is notified.
	pub fn gate_releases(&self) -> Arc<Notify> {
		let gate = Arc::new(Notify::new());
		*self.release_gate.lock() = Some(gate.clone());
		gate
	}
}

#[async_trait]
impl LockService for GrantAll {
	async fn acquire_lease(&self, _capability: &str, node: &NodeInfo, mode: LeaseMode) -> gridmen_remote::Result<LeaseGrant> {
		let n = self.issued.fetch_add(1, Ordering::SeqCst);
		Ok(LeaseGrant {
			lease_id: LeaseId::new(format!("lease-{n}")),
			node_key: node.key().clone(),
			mode,
		})
	}

	async fn release_lease(&self, _node: &NodeInfo, _lease: &LeaseId) -> gridmen_remote::Result<Ack> {
		let gate = self.release_gate.lock().clone();
		if let Some(gate) = gate {
			gate.notified().await;
		}
		self.released.fetch_add(1, Ordering::SeqCst);
		Ok(Ack {
			success: true,
			message: String::new(),
		})
	}
}

pub struct Harness {
	pub tree: ResourceTree,
	pub namespace: Arc<MockNamespace>,
	pub lock_service: Arc<GrantAll>,
	pub locks: Arc<LockCoordinator>,
}

impl Harness {
	pub fn new() -> Self {
		let namespace = Arc::new(MockNamespace::default());
		let lock_service = Arc::new(GrantAll::default());
		let locks = Arc::new(LockCoordinator::new(lock_service.clone()));
		Self {
			tree: ResourceTree::new(namespace.clone(), locks.clone()),
			namespace,
			lock_service,
			locks,
		}
	}

	/// Harness whose root lists `children`, already aligned.
	pub async fn with_root_children(children: &[(&str, &str)]) -> Self {
		let h = Self::new();
		h.namespace.set_children(".", children);
		h.tree.align_node(h.tree.root(), false).await.unwrap();
		h
	}

	pub fn node(&self, raw: &str) -> Arc<crate::ResourceNode> {
		self.tree.get(&key(raw)).unwrap_or_else(|| panic!("`{raw}` not in tree"))
	}

	pub fn child_keys(&self, raw: &str) -> Vec<String> {
		self.node(raw).children().iter().map(|c| c.key().to_string()).collect()
	}

	/// Counts subscriber notifications.
	pub fn notifications(&self) -> (Arc<AtomicUsize>, crate::Subscription) {
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		let subscription = self.tree.subscribe(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		(count, subscription)
	}
}
