//! Subcommand implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use gridmen_cellset::CellSelection;
use gridmen_lock::LockCoordinator;
use gridmen_remote::{BackendConfig, HttpBackend, LeaseMode, NamespaceService, NodeInfo, NodeKey};
use gridmen_tree::{ResourceNode, ResourceTree, TemplateKind, TopologyEditor};
use tracing::debug;

use crate::cli::Command;

/// Backend handles shared by every subcommand.
struct Session {
	backend: Arc<HttpBackend>,
	locks: Arc<LockCoordinator>,
	tree: ResourceTree,
	lead_address: Option<String>,
}

impl Session {
	fn connect(config: &BackendConfig) -> anyhow::Result<Self> {
		let backend = Arc::new(HttpBackend::new(config)?);
		debug!(api = %backend.api_url(), "backend client ready");
		let locks = Arc::new(LockCoordinator::new(backend.clone()));
		let tree = ResourceTree::with_root(backend.clone(), locks.clone(), config.root_key()?, config.lead_address.clone())?;
		Ok(Self {
			backend,
			locks,
			tree,
			lead_address: config.lead_address.clone(),
		})
	}

	/// Aligns every ancestor of `key` below the root and returns its node.
	async fn locate(&self, key: &NodeKey) -> anyhow::Result<Arc<ResourceNode>> {
		let root = self.tree.root().clone();
		if key == root.key() {
			return Ok(root);
		}
		if !root.key().is_ancestor_of(key) {
			bail!("`{key}` is not below the root `{}`", root.key());
		}

		let mut chain = Vec::new();
		let mut current = key.parent();
		while let Some(ancestor) = current {
			if &ancestor == root.key() {
				break;
			}
			current = ancestor.parent();
			chain.push(ancestor);
		}
		chain.push(root.key().clone());
		chain.reverse();

		for ancestor in chain {
			let node = self.tree.get(&ancestor).with_context(|| format!("`{ancestor}` does not exist"))?;
			self.tree.align_node(&node, false).await?;
		}
		self.tree.get(key).with_context(|| format!("`{key}` does not exist"))
	}
}

pub async fn run(config: &BackendConfig, command: Command) -> anyhow::Result<()> {
	let session = Session::connect(config)?;
	match command {
		Command::Tree { depth } => print_tree(&session, depth).await,
		Command::Lock { node, write } => {
			let mode = if write { LeaseMode::Write } else { LeaseMode::Read };
			probe_lease(&session, &NodeKey::new(node)?, mode).await
		}
		Command::Cells { patch, deleted } => summarize_cells(&session, &NodeKey::new(patch)?, deleted).await,
	}
}

async fn print_tree(session: &Session, depth: usize) -> anyhow::Result<()> {
	let mut stack = vec![(session.tree.root().clone(), 0usize)];
	while let Some((node, level)) = stack.pop() {
		println!("{}", tree_line(node.key(), node.kind(), level));
		if level >= depth {
			continue;
		}
		session.tree.align_node(&node, false).await?;
		stack.extend(node.children().into_iter().rev().map(|child| (child, level + 1)));
	}
	Ok(())
}

async fn probe_lease(session: &Session, key: &NodeKey, mode: LeaseMode) -> anyhow::Result<()> {
	let info = NodeInfo::with_address(session.lead_address.as_deref(), key.clone())?;
	let snapshot = session.backend.list_children(&info, None).await?;
	let kind = TemplateKind::from_name(&snapshot.template_name);
	let Some(capability) = kind.capability() else {
		bail!("`{key}` is a {kind} node and cannot be leased");
	};

	let lease = session.locks.acquire(capability, &info, mode).await?;
	println!("{} lease {} on {} ({capability})", lease.mode, lease.lease_id, lease.node_key);
	session.locks.release(&info, &lease.lease_id).await?;
	println!("released");
	Ok(())
}

async fn summarize_cells(session: &Session, key: &NodeKey, deleted: bool) -> anyhow::Result<()> {
	let node = session.locate(key).await?;
	let editor = TopologyEditor::open(node, session.backend.clone(), session.locks.clone()).await?;

	let cells = if deleted {
		editor.deleted_cells().await
	} else {
		editor.activated_cells().await
	};
	// Release the lease before reporting a fetch failure.
	editor.close().await?;
	let cells = cells?;

	let state = if deleted { "deleted" } else { "active" };
	println!("{key}: {} {state} cells", cells.len());
	for (level, count) in cells_per_level(&cells) {
		println!("  level {level:>2}: {count}");
	}
	Ok(())
}

pub(crate) fn tree_line(key: &NodeKey, kind: TemplateKind, level: usize) -> String {
	let label = if level == 0 { key.as_str() } else { key.name() };
	format!("{}{label} [{kind}]", "  ".repeat(level))
}

pub(crate) fn cells_per_level(cells: &CellSelection) -> BTreeMap<u8, usize> {
	let mut histogram = BTreeMap::new();
	for level in cells.levels() {
		*histogram.entry(*level).or_default() += 1;
	}
	histogram
}
