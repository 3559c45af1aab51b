//! Client-side cache of the backend node namespace.
//!
//! # Purpose
//!
//! - Mirror a server-authoritative hierarchy of resources, loading children lazily as nodes are expanded.
//! - Reconcile fresh backend snapshots into the cache without losing local state: temporary nodes, expansion, selection, node identity, leases and per-view context.
//! - Exclude rendering and form handling; callers receive [`ViewDescriptor`]s and change notifications.
//!
//! # Mental model
//!
//! - [`ResourceTree`] owns a flat index (`scene`) of every known node by key. A node is reachable iff it is in the index.
//! - Each [`ResourceNode`] owns its children map; the parent link is a key and never an ownership edge.
//! - Alignment fetches a node's children and merges them: reported children keep their existing handle, unreported temporary children survive, everything else leaves the tree.
//! - Leaving the tree closes the node: cleanup callbacks run and its lease is released.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`ResourceTree`] | Session-scoped cache | MUST be the only writer of children maps and the flat index | `ResourceTree::new` |
//! | [`ResourceNode`] | One cached vertex | MUST appear in at most one children map | `ResourceTree::merge`, `ResourceTree::add_local_node` |
//! | [`Subscription`] | Change callback registration | Unsubscribes on drop | `ResourceTree::subscribe` |
//! | [`MenuOutcome`] | Result of a menu action | - | `ResourceTree::handle_menu_action` |
//!
//! # Invariants
//!
//! 1. Nodes reported in consecutive snapshots MUST keep their handle (pointer equality).
//!    - Enforced in: `ResourceTree::merge`
//!    - Tested by: `tree::tests::reconcile::refresh_replaces_missing_and_keeps_identity`
//!    - Failure symptom: open views lose their context and leases leak on refresh.
//!
//! 2. Temporary nodes MUST survive any number of parent alignments until removed or mounted.
//!    - Enforced in: `ResourceTree::merge`
//!    - Tested by: `tree::tests::reconcile::temp_node_survives_forced_alignment`
//!    - Failure symptom: a half-filled creation form loses its node.
//!
//! 3. Alignment of one key MUST issue at most one concurrent fetch.
//!    - Enforced in: `ResourceTree::align_node`
//!    - Tested by: `tree::tests::singleflight::concurrent_alignment_fetches_once`
//!    - Failure symptom: overlapping merges clobber each other's children.
//!
//! 4. A forced alignment MUST reflect a listing fetched after it was called.
//!    - Enforced in: `ResourceTree::align_node`
//!    - Tested by: `tree::tests::singleflight::forced_alignment_refetches_after_in_flight_one`
//!    - Failure symptom: `refresh` after a write misses the write.
//!
//! 5. A merge MUST NOT run for a node that left the tree while its fetch was in flight.
//!    - Enforced in: `ResourceTree::fetch_and_merge`
//!    - Tested by: `tree::tests::singleflight::removed_node_is_not_resurrected`
//!    - Failure symptom: deleted subtrees reappear in the index.
//!
//! 6. A failed fetch MUST leave the node, its children and `aligned` unchanged.
//!    - Enforced in: `ResourceTree::fetch_and_merge`
//!    - Tested by: `tree::tests::reconcile::failed_fetch_changes_nothing`
//!
//! # Concurrency and ordering
//!
//! - Lock order is tree state, then node. Neither is held across an `.await`.
//! - The in-flight map is a sync mutex; a leader removes its entry before publishing, so later callers always issue a fresh fetch.
//! - A leader publishes its result before closing the nodes its merge dropped. Closing runs on a spawned task after the tree lock is released, so it completes even if the caller is cancelled; release failures are logged.
//! - A forced alignment that finds a fetch in flight waits for it, then issues or joins a fetch that started after it arrived.
//!
//! # Failure modes and recovery
//!
//! - Backend unreachable: alignment returns [`Error::Remote`]; retry by calling it again.
//! - Leader cancelled mid-fetch: waiters receive [`Error::AlignCancelled`] and the key can be aligned again.
//! - Leader cancelled while closing dropped nodes: its merge is already published and the leases are still released.

mod align;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use gridmen_lock::LockCoordinator;
use gridmen_remote::{NamespaceService, NodeInfo, NodeKey};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::node::ResourceNode;
use crate::template::{MenuEffect, TemplateKind, ViewDescriptor};
use crate::{Error, Result};

/// Child name given to temporary nodes created from a menu without a name.
pub const NEW_NODE_NAME: &str = "untitled";

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Subscribers {
	next_id: u64,
	callbacks: HashMap<u64, Callback>,
}

/// Registration returned by [`ResourceTree::subscribe`]; dropping it
/// unsubscribes.
pub struct Subscription {
	id: u64,
	subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
	/// Removes the callback now.
	pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(subscribers) = self.subscribers.upgrade() {
			subscribers.lock().callbacks.remove(&self.id);
		}
	}
}

/// Result of [`ResourceTree::handle_menu_action`].
#[derive(Debug, Clone)]
pub enum MenuOutcome {
	/// A temporary child was created.
	Created(Arc<ResourceNode>),
	/// The node was removed.
	Removed,
	/// A view should be opened.
	Opened(ViewDescriptor),
	/// The node was realigned.
	Refreshed,
}

pub(crate) struct TreeState {
	scene: HashMap<NodeKey, Arc<ResourceNode>>,
	expanded: HashSet<NodeKey>,
	selected: Option<NodeKey>,
}

impl TreeState {
	fn contains(&self, node: &Arc<ResourceNode>) -> bool {
		self.scene.get(node.key()).is_some_and(|indexed| Arc::ptr_eq(indexed, node))
	}

	/// Removes `node` and everything below it from the index, expansion and
	/// selection. Returns the removed nodes, deepest first.
	fn detach_subtree(&mut self, node: &Arc<ResourceNode>) -> Vec<Arc<ResourceNode>> {
		let mut stack = vec![node.clone()];
		let mut removed = Vec::new();
		while let Some(current) = stack.pop() {
			stack.extend(current.children());
			if self.contains(&current) {
				self.scene.remove(current.key());
			}
			self.expanded.remove(current.key());
			if self.selected.as_ref() == Some(current.key()) {
				self.selected = None;
			}
			removed.push(current);
		}
		removed.reverse();
		removed
	}
}

/// Session-scoped cache of the backend namespace.
///
/// # Concurrency
///
/// - `state`: `RwLock` over the flat index, expansion set and selection.
/// - `inflight`: sync `Mutex` gating one fetch per key.
/// - `subscribers`: shared with [`Subscription`] guards; callbacks run with no lock held.
pub struct ResourceTree {
	namespace: Arc<dyn NamespaceService>,
	locks: Arc<LockCoordinator>,
	root: Arc<ResourceNode>,
	state: RwLock<TreeState>,
	inflight: align::InFlightMap,
	subscribers: Arc<Mutex<Subscribers>>,
}

impl ResourceTree {
	/// Creates a tree rooted at `.` on the default backend.
	pub fn new(namespace: Arc<dyn NamespaceService>, locks: Arc<LockCoordinator>) -> Self {
		let root = ResourceNode::new(NodeKey::root(), NodeInfo::local(NodeKey::root()), TemplateKind::Default, false);
		Self::from_root(namespace, locks, root)
	}

	/// Creates a tree rooted at `root_key` whose requests address the
	/// instance at `lead_address` when given.
	///
	/// # Errors
	///
	/// [`Error::Key`] for an empty lead address.
	pub fn with_root(
		namespace: Arc<dyn NamespaceService>,
		locks: Arc<LockCoordinator>,
		root_key: NodeKey,
		lead_address: Option<String>,
	) -> Result<Self> {
		let info = NodeInfo::with_address(lead_address.as_deref(), root_key.clone())?;
		let root = ResourceNode::new(root_key, info, TemplateKind::Default, false);
		Ok(Self::from_root(namespace, locks, root))
	}

	fn from_root(namespace: Arc<dyn NamespaceService>, locks: Arc<LockCoordinator>, root: Arc<ResourceNode>) -> Self {
		let mut scene = HashMap::new();
		scene.insert(root.key().clone(), root.clone());
		Self {
			namespace,
			locks,
			root,
			state: RwLock::new(TreeState {
				scene,
				expanded: HashSet::new(),
				selected: None,
			}),
			inflight: Arc::new(Mutex::new(HashMap::new())),
			subscribers: Arc::new(Mutex::new(Subscribers::default())),
		}
	}

	/// Root node.
	pub fn root(&self) -> &Arc<ResourceNode> {
		&self.root
	}

	/// Lease coordinator used when closing nodes.
	pub fn locks(&self) -> &Arc<LockCoordinator> {
		&self.locks
	}

	/// Remote instance address this tree delegates to.
	pub fn lead_address(&self) -> Option<&str> {
		self.root.info().address()
	}

	/// Node indexed under `key`.
	pub fn get(&self, key: &NodeKey) -> Option<Arc<ResourceNode>> {
		self.state.read().scene.get(key).cloned()
	}

	/// Currently selected node.
	pub fn selected_node(&self) -> Option<Arc<ResourceNode>> {
		let state = self.state.read();
		state.selected.as_ref().and_then(|key| state.scene.get(key).cloned())
	}

	/// Whether `key`'s children are shown.
	pub fn is_node_expanded(&self, key: &NodeKey) -> bool {
		self.state.read().expanded.contains(key)
	}

	/// Number of indexed nodes, root included.
	pub fn len(&self) -> usize {
		self.state.read().scene.len()
	}

	/// Always false; the root is indexed from construction.
	pub fn is_empty(&self) -> bool {
		self.state.read().scene.is_empty()
	}

	/// Whether any indexed node is temporary.
	pub fn temp_node_exists(&self) -> bool {
		self.temp_node().is_some()
	}

	fn temp_node(&self) -> Option<Arc<ResourceNode>> {
		self.state.read().scene.values().find(|node| node.is_temp()).cloned()
	}

	/// Registers a callback fired after every visible mutation.
	pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
		let mut subscribers = self.subscribers.lock();
		let id = subscribers.next_id;
		subscribers.next_id += 1;
		subscribers.callbacks.insert(id, Arc::new(callback));
		Subscription {
			id,
			subscribers: Arc::downgrade(&self.subscribers),
		}
	}

	fn notify(&self) {
		let callbacks: Vec<Callback> = self.subscribers.lock().callbacks.values().cloned().collect();
		for callback in callbacks {
			callback();
		}
	}

	fn ensure_member(&self, node: &Arc<ResourceNode>) -> Result<()> {
		if self.state.read().contains(node) {
			Ok(())
		} else {
			Err(Error::NotInTree(node.key().clone()))
		}
	}

	/// Every node is addressed on the root's instance.
	fn new_node(&self, key: NodeKey, kind: TemplateKind, is_temp: bool) -> Arc<ResourceNode> {
		let info = self.root.info().for_key(key.clone());
		ResourceNode::new(key, info, kind, is_temp)
	}

	/// Closes `nodes` on a spawned task, so dropping the caller mid-release
	/// does not strand their leases.
	async fn close_nodes(&self, nodes: Vec<Arc<ResourceNode>>) {
		if nodes.is_empty() {
			return;
		}
		let locks = self.locks.clone();
		let closing = tokio::spawn(async move {
			for node in nodes {
				if let Err(error) = node.close(&locks).await {
					warn!(node = %node.key(), %error, "failed to release lease of removed node");
				}
			}
		});
		if let Err(error) = closing.await {
			warn!(%error, "closing removed nodes failed");
		}
	}

	/// Aligns every ancestor of `target` that is not expanded, root first,
	/// and marks the chain expanded.
	pub async fn expand_node(&self, target: &Arc<ResourceNode>) -> Result<()> {
		self.ensure_member(target)?;
		let chain = {
			let state = self.state.read();
			let mut chain = vec![target.clone()];
			let mut parent = target.parent_key();
			while let Some(key) = parent {
				let Some(node) = state.scene.get(&key) else { break };
				parent = node.parent_key();
				chain.push(node.clone());
			}
			chain.reverse();
			chain
		};

		let result = self.expand_chain(chain).await;
		self.notify();
		result
	}

	async fn expand_chain(&self, chain: Vec<Arc<ResourceNode>>) -> Result<()> {
		for node in chain {
			if self.is_node_expanded(node.key()) {
				continue;
			}
			self.align_node(&node, false).await?;
			self.state.write().expanded.insert(node.key().clone());
		}
		Ok(())
	}

	/// Collapses an expanded node unless `force_open`, expands it otherwise.
	pub async fn toggle_node_expansion(&self, node: &Arc<ResourceNode>, force_open: bool) -> Result<()> {
		self.ensure_member(node)?;
		if self.is_node_expanded(node.key()) && !force_open {
			self.state.write().expanded.remove(node.key());
			self.notify();
			return Ok(());
		}
		self.expand_node(node).await
	}

	/// Creates a temporary node under `parent` (root when `None`).
	///
	/// Returns the existing node unchanged when `key` is already indexed.
	/// Callers ensure at most one temporary node exists.
	///
	/// # Errors
	///
	/// [`Error::NotInTree`] if `parent` is not indexed.
	pub fn add_local_node(&self, key: NodeKey, kind: TemplateKind, parent: Option<&NodeKey>) -> Result<Arc<ResourceNode>> {
		let node = {
			let mut state = self.state.write();
			if let Some(existing) = state.scene.get(&key) {
				return Ok(existing.clone());
			}
			let parent_key = parent.unwrap_or(self.root.key());
			let parent = state
				.scene
				.get(parent_key)
				.cloned()
				.ok_or_else(|| Error::NotInTree(parent_key.clone()))?;

			let node = self.new_node(key.clone(), kind, true);
			node.set_parent(Some(parent.key().clone()));
			parent.insert_child(node.clone());
			state.scene.insert(key, node.clone());
			node
		};
		debug!(node = %node.key(), kind = %kind, "temporary node added");
		self.notify();
		Ok(node)
	}

	/// Force-aligns the root, then every expanded node, parents first.
	///
	/// Notifies once. The first error aborts the refresh.
	pub async fn refresh(&self) -> Result<()> {
		let result = self.refresh_all().await;
		self.notify();
		result
	}

	async fn refresh_all(&self) -> Result<()> {
		let root = self.root.clone();
		self.align_node(&root, true).await?;

		let mut expanded: Vec<NodeKey> = self.state.read().expanded.iter().cloned().collect();
		expanded.sort_by_key(|key| (key.depth(), key.clone()));
		for key in expanded {
			if key == *root.key() {
				continue;
			}
			if let Some(node) = self.get(&key) {
				self.align_node(&node, true).await?;
			}
		}
		Ok(())
	}

	/// Removes `node` and its subtree, realigns the parent and closes every
	/// removed node.
	///
	/// # Errors
	///
	/// [`Error::RootRemoval`] for the root. A parent realign error is returned
	/// after the removed nodes were closed and subscribers notified.
	pub async fn remove_node(&self, node: &Arc<ResourceNode>) -> Result<()> {
		if Arc::ptr_eq(node, &self.root) {
			return Err(Error::RootRemoval);
		}
		self.ensure_member(node)?;

		let (parent, removed) = self.detach(node);
		info!(node = %node.key(), removed = removed.len(), "removing node");

		let realign = match &parent {
			Some(parent) => self.align_node(parent, true).await,
			None => Ok(()),
		};
		self.close_nodes(removed).await;
		self.notify();
		realign
	}

	fn detach(&self, node: &Arc<ResourceNode>) -> (Option<Arc<ResourceNode>>, Vec<Arc<ResourceNode>>) {
		let mut state = self.state.write();
		let parent = node.parent_key().and_then(|key| state.scene.get(&key).cloned());
		if let Some(parent) = &parent {
			parent.remove_child(node.key());
		}
		node.set_parent(None);
		let removed = state.detach_subtree(node);
		(parent, removed)
	}

	/// Selects `node`.
	pub fn click_node(&self, node: &Arc<ResourceNode>) -> Result<()> {
		self.ensure_member(node)?;
		self.state.write().selected = Some(node.key().clone());
		self.notify();
		Ok(())
	}

	/// Selects `node`; folders toggle expansion, other kinds return their
	/// edit view, or their check view when they have no editor.
	pub async fn double_click_node(&self, node: &Arc<ResourceNode>) -> Result<Option<ViewDescriptor>> {
		self.ensure_member(node)?;
		self.state.write().selected = Some(node.key().clone());

		if node.kind().is_folder() {
			self.toggle_node_expansion(node, false).await?;
			return Ok(None);
		}

		let template = node.template();
		let view = template.edit.or(template.check).map(|factory| factory(node));
		self.notify();
		Ok(view)
	}

	/// Executes the template menu item `action` on `node`.
	///
	/// `child_name` names the temporary child created by
	/// [`MenuEffect::CreateChild`]; it defaults to [`NEW_NODE_NAME`].
	///
	/// # Errors
	///
	/// [`Error::UnsupportedAction`] if the template does not offer `action`
	/// for this node, [`Error::TempNodeExists`] when creating a second
	/// temporary node, [`Error::NodeExists`] when the child key is taken, and
	/// any error of the underlying operation.
	pub async fn handle_menu_action(
		&self,
		node: &Arc<ResourceNode>,
		action: &str,
		child_name: Option<&str>,
	) -> Result<MenuOutcome> {
		self.ensure_member(node)?;
		let template = node.template();
		let effect = template.resolve(node, action).ok_or_else(|| Error::UnsupportedAction {
			template: node.kind().name(),
			action: action.to_owned(),
		})?;
		debug!(node = %node.key(), action, ?effect, "menu action");

		match effect {
			MenuEffect::CreateChild(kind) => {
				if let Some(temp) = self.temp_node() {
					return Err(Error::TempNodeExists(temp.key().clone()));
				}
				let key = node.key().child(child_name.unwrap_or(NEW_NODE_NAME))?;
				self.expand_node(node).await?;
				if self.get(&key).is_some() {
					return Err(Error::NodeExists(key));
				}
				let child = self.add_local_node(key, kind, Some(node.key()))?;
				Ok(MenuOutcome::Created(child))
			}
			MenuEffect::Delete => {
				if !node.is_temp() {
					self.namespace.unmount(node.info()).await?;
				}
				self.remove_node(node).await?;
				Ok(MenuOutcome::Removed)
			}
			MenuEffect::Open(view) => {
				let factory = template.view(view).ok_or_else(|| Error::UnsupportedAction {
					template: node.kind().name(),
					action: view.name().to_owned(),
				})?;
				Ok(MenuOutcome::Opened(factory(node)))
			}
			MenuEffect::Refresh => {
				let result = self.align_node(node, true).await;
				self.notify();
				result.map(|()| MenuOutcome::Refreshed)
			}
		}
	}

	/// Mounts a temporary node on the backend and realigns its parent.
	///
	/// When the backend assigns the requested key the node keeps its handle
	/// and loses its temporary flag; otherwise the temporary node is replaced
	/// by the one the backend reports. Returns the mounted node.
	///
	/// # Errors
	///
	/// [`Error::NotTemp`] if `node` is already persisted.
	pub async fn mount_local_node(&self, node: &Arc<ResourceNode>, params: Option<serde_json::Value>) -> Result<Arc<ResourceNode>> {
		self.ensure_member(node)?;
		if !node.is_temp() {
			return Err(Error::NotTemp(node.key().clone()));
		}

		let mounted = self.namespace.mount(node.info(), node.kind().name(), params).await?;
		info!(node = %node.key(), mounted = %mounted, "mounted");

		let parent = if &mounted == node.key() {
			node.set_temp(false);
			node.set_aligned(false);
			node.parent_key().and_then(|key| self.get(&key))
		} else {
			let (parent, removed) = self.detach(node);
			self.close_nodes(removed).await;
			parent
		};

		let realign = match &parent {
			Some(parent) => self.align_node(parent, true).await,
			None => Ok(()),
		};
		self.notify();
		realign?;
		self.get(&mounted).ok_or(Error::NotInTree(mounted))
	}

	/// Expanded keys, sorted.
	pub fn expanded_keys(&self) -> Vec<NodeKey> {
		let mut keys: Vec<_> = self.state.read().expanded.iter().cloned().collect();
		keys.sort();
		keys
	}
}
