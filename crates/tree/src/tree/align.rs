//! Per-key alignment de-duplication and the three-way child merge.

use std::collections::HashMap;
use std::sync::Arc;

use gridmen_remote::{NodeKey, NodeSnapshot};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::{ResourceTree, TreeState};
use crate::node::ResourceNode;
use crate::template::TemplateKind;
use crate::{Error, Result};

type AlignResult = Arc<Result<()>>;

/// Tracking state for an alignment in progress.
pub(super) struct InFlightAlign {
	tx: watch::Sender<Option<AlignResult>>,
	rx: watch::Receiver<Option<AlignResult>>,
}

pub(super) type InFlightMap = Arc<Mutex<HashMap<NodeKey, Arc<InFlightAlign>>>>;

/// Guard that publishes the leader's result and un-wedges the in-flight map
/// if the leader is dropped before finishing.
struct AlignGuard {
	key: NodeKey,
	inflight_map: InFlightMap,
	inflight: Arc<InFlightAlign>,
	completed: bool,
}

impl AlignGuard {
	fn complete(mut self, result: Result<()>) -> Result<()> {
		self.completed = true;
		// Remove before publishing so a later caller starts a fresh fetch
		// instead of reading this result.
		self.inflight_map.lock().remove(&self.key);
		let _ = self.inflight.tx.send(Some(Arc::new(result.clone())));
		result
	}
}

impl Drop for AlignGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		self.inflight_map.lock().remove(&self.key);
		let _ = self
			.inflight
			.tx
			.send(Some(Arc::new(Err(Error::AlignCancelled(self.key.clone())))));
	}
}

async fn wait_for(inflight: &InFlightAlign, key: &NodeKey) -> Result<()> {
	let mut rx = inflight.rx.clone();
	loop {
		let published = rx.borrow().as_ref().cloned();
		if let Some(result) = published {
			return (*result).clone();
		}
		if rx.changed().await.is_err() {
			return Err(Error::AlignCancelled(key.clone()));
		}
	}
}

impl ResourceTree {
	/// Fetches `node`'s children and merges them into the cache.
	///
	/// With `force = false` an already aligned node returns immediately
	/// without a backend call. Concurrent alignments of one key share a single
	/// fetch: the first caller leads, the rest wait for its result. A forced
	/// caller never settles for a fetch that was issued before it arrived; it
	/// waits for that one, then joins or leads the next.
	///
	/// # Errors
	///
	/// [`Error::NotInTree`] if `node` is not the handle indexed under its key,
	/// [`Error::Remote`] if the fetch fails. On failure the node and its
	/// `aligned` flag are unchanged.
	pub async fn align_node(&self, node: &Arc<ResourceNode>, force: bool) -> Result<()> {
		self.ensure_member(node)?;
		if node.is_aligned() && !force {
			return Ok(());
		}

		let mut stale_ok = !force;
		loop {
			let (inflight, is_leader) = self.join_or_lead(node.key());
			if is_leader {
				return self.lead_alignment(node, inflight).await;
			}

			trace!(node = %node.key(), force, "joining in-flight alignment");
			let result = wait_for(&inflight, node.key()).await;
			if stale_ok {
				return result;
			}
			// Any entry present from here on was inserted after the one just
			// awaited, so its fetch started after this call.
			stale_ok = true;
			self.ensure_member(node)?;
		}
	}

	fn join_or_lead(&self, key: &NodeKey) -> (Arc<InFlightAlign>, bool) {
		let mut map = self.inflight.lock();
		match map.get(key) {
			Some(existing) => (existing.clone(), false),
			None => {
				let (tx, rx) = watch::channel(None);
				let created = Arc::new(InFlightAlign { tx, rx });
				map.insert(key.clone(), created.clone());
				(created, true)
			}
		}
	}

	async fn lead_alignment(&self, node: &Arc<ResourceNode>, inflight: Arc<InFlightAlign>) -> Result<()> {
		let guard = AlignGuard {
			key: node.key().clone(),
			inflight_map: self.inflight.clone(),
			inflight,
			completed: false,
		};
		let (result, dropped) = match self.fetch_and_merge(node).await {
			Ok(dropped) => (Ok(()), dropped),
			Err(error) => (Err(error), Vec::new()),
		};
		let result = guard.complete(result);

		if !dropped.is_empty() {
			debug!(node = %node.key(), dropped = dropped.len(), "children removed by backend");
			self.close_nodes(dropped).await;
		}
		result
	}

	/// Returns the nodes the merge removed from the tree.
	async fn fetch_and_merge(&self, node: &Arc<ResourceNode>) -> Result<Vec<Arc<ResourceNode>>> {
		debug!(node = %node.info(), "aligning");
		let snapshot = self.namespace.list_children(node.info(), None).await?;

		let mut state = self.state.write();
		if !state.contains(node) {
			debug!(node = %node.key(), "node left the tree during fetch, skipping merge");
			return Ok(Vec::new());
		}
		Ok(self.merge(&mut state, node, snapshot))
	}

	/// Three-way merge of `snapshot` into `node`'s children.
	///
	/// Returns every node that left the tree, subtrees included.
	fn merge(&self, state: &mut TreeState, node: &Arc<ResourceNode>, snapshot: NodeSnapshot) -> Vec<Arc<ResourceNode>> {
		let mut previous = node.take_children();
		let mut next = HashMap::with_capacity(snapshot.children.len());

		for entry in snapshot.children {
			let key = entry.node_key;
			let child = if let Some(child) = previous.remove(&key) {
				child
			} else if let Some(existing) = state.scene.get(&key).cloned() {
				if let Some(old_parent) = existing.parent_key()
					&& &old_parent != node.key()
					&& let Some(old_parent) = state.scene.get(&old_parent)
				{
					old_parent.remove_child(&key);
				}
				existing
			} else {
				let kind = TemplateKind::from_name(&entry.template_name);
				let created = self.new_node(key.clone(), kind, false);
				state.scene.insert(key.clone(), created.clone());
				created
			};
			child.set_parent(Some(node.key().clone()));
			next.insert(key, child);
		}

		let mut dropped = Vec::new();
		for (key, child) in previous {
			if child.is_temp() {
				next.insert(key, child);
			} else {
				dropped.extend(state.detach_subtree(&child));
			}
		}

		node.replace_children(next);
		node.set_aligned(true);
		dropped
	}
}
