use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use gridmen_cellset::{CellSelection, decode, encode};
use gridmen_lock::{LockCoordinator, LockError};
use gridmen_remote::{Ack, LeaseGrant, LeaseId, LeaseMode, LockService, NodeInfo, NodeKey, PickRegion, RemoteError, TopologyService};
use pretty_assertions::assert_eq;

use super::TopologyEditor;
use crate::Error;
use crate::node::ResourceNode;
use crate::template::TemplateKind;

#[derive(Default)]
struct StubLocks {
	acquired: AtomicUsize,
	released: AtomicUsize,
}

#[async_trait]
impl LockService for StubLocks {
	async fn acquire_lease(&self, _capability: &str, node: &NodeInfo, mode: LeaseMode) -> gridmen_remote::Result<LeaseGrant> {
		let n = self.acquired.fetch_add(1, Ordering::SeqCst);
		Ok(LeaseGrant {
			lease_id: LeaseId::new(format!("lease-{n}")),
			node_key: node.key().clone(),
			mode,
		})
	}

	async fn release_lease(&self, _node: &NodeInfo, _lease: &LeaseId) -> gridmen_remote::Result<Ack> {
		self.released.fetch_add(1, Ordering::SeqCst);
		Ok(ok())
	}
}

/// Echoes submitted cells back from subdivide/merge and serves a fixed
/// active set. `garbage` makes every cell response undecodable.
#[derive(Default)]
struct StubTopology {
	garbage: AtomicBool,
	reject: AtomicBool,
	saves: AtomicUsize,
}

impl StubTopology {
	fn cells(&self, bytes: Vec<u8>) -> gridmen_remote::Result<Vec<u8>> {
		if self.garbage.load(Ordering::SeqCst) {
			return Ok(vec![0xff; 3]);
		}
		Ok(bytes)
	}

	fn ack(&self) -> gridmen_remote::Result<Ack> {
		if self.reject.load(Ordering::SeqCst) {
			return Ok(Ack {
				success: false,
				message: "cells already deleted".into(),
			});
		}
		Ok(ok())
	}
}

#[async_trait]
impl TopologyService for StubTopology {
	async fn activated_cells(&self, _patch: &NodeInfo, _lease: &LeaseId) -> gridmen_remote::Result<Vec<u8>> {
		self.cells(encode(&selection(&[(1, 0), (1, 1), (2, 9)])))
	}

	async fn deleted_cells(&self, _patch: &NodeInfo, _lease: &LeaseId) -> gridmen_remote::Result<Vec<u8>> {
		self.cells(encode(&CellSelection::empty()))
	}

	async fn subdivide(&self, _patch: &NodeInfo, _lease: &LeaseId, cells: Vec<u8>) -> gridmen_remote::Result<Vec<u8>> {
		self.cells(cells)
	}

	async fn merge(&self, _patch: &NodeInfo, _lease: &LeaseId, cells: Vec<u8>) -> gridmen_remote::Result<Vec<u8>> {
		self.cells(cells)
	}

	async fn delete(&self, _patch: &NodeInfo, _lease: &LeaseId, cells: Vec<u8>) -> gridmen_remote::Result<Ack> {
		decode(&cells).map_err(|source| RemoteError::Cells {
			operation: "delete",
			source,
		})?;
		self.ack()
	}

	async fn recover(&self, _patch: &NodeInfo, _lease: &LeaseId, _cells: Vec<u8>) -> gridmen_remote::Result<Ack> {
		self.ack()
	}

	async fn pick_by_region(&self, _patch: &NodeInfo, _lease: &LeaseId, _region: &PickRegion) -> gridmen_remote::Result<Vec<u8>> {
		self.cells(encode(&selection(&[(2, 9)])))
	}

	async fn save(&self, _patch: &NodeInfo, _lease: &LeaseId) -> gridmen_remote::Result<Ack> {
		self.saves.fetch_add(1, Ordering::SeqCst);
		self.ack()
	}
}

fn ok() -> Ack {
	Ack {
		success: true,
		message: String::new(),
	}
}

fn selection(cells: &[(u8, u32)]) -> CellSelection {
	let (levels, ids) = cells.iter().copied().unzip();
	CellSelection::new(levels, ids).unwrap()
}

fn node(key: &str, kind: TemplateKind, temp: bool) -> Arc<ResourceNode> {
	let key = NodeKey::new(key).unwrap();
	ResourceNode::new(key.clone(), NodeInfo::local(key), kind, temp)
}

struct Harness {
	locks: Arc<LockCoordinator>,
	lock_service: Arc<StubLocks>,
	topology: Arc<StubTopology>,
}

impl Harness {
	fn new() -> Self {
		let lock_service = Arc::new(StubLocks::default());
		Self {
			locks: Arc::new(LockCoordinator::new(lock_service.clone())),
			lock_service,
			topology: Arc::new(StubTopology::default()),
		}
	}

	async fn open(&self, node: &Arc<ResourceNode>) -> crate::Result<TopologyEditor> {
		TopologyEditor::open(node.clone(), self.topology.clone(), self.locks.clone()).await
	}
}

#[tokio::test]
async fn open_takes_write_lease_and_close_returns_it() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);

	let editor = h.open(&patch).await.unwrap();
	assert!(editor.is_open());
	assert_eq!(patch.lease_id(), Some(LeaseId::new("lease-0")));
	assert_eq!(h.locks.active_lease(patch.info()).map(|l| l.mode), Some(LeaseMode::Write));
	assert_eq!(patch.cleanup_count(), 1);

	editor.close().await.unwrap();
	assert_eq!(patch.lease_id(), None);
	assert_eq!(patch.cleanup_count(), 0);
	assert_eq!(h.locks.active_count(), 0);
	assert_eq!(h.lock_service.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_persisted_patches_can_be_edited() {
	let h = Harness::new();
	for candidate in [
		node("s", TemplateKind::Schema, false),
		node("s.p", TemplateKind::Patch, true),
		node("v", TemplateKind::Vector, false),
	] {
		assert!(matches!(h.open(&candidate).await, Err(Error::UnsupportedAction { .. })));
	}
	assert_eq!(h.lock_service.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_editor_on_same_patch_is_refused() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);
	let _first = h.open(&patch).await.unwrap();
	assert!(matches!(
		h.open(&patch).await,
		Err(Error::Lock(LockError::AlreadyHeld { .. }))
	));
}

#[tokio::test]
async fn cell_operations_round_trip_through_codec() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);
	let editor = h.open(&patch).await.unwrap();

	let active = editor.activated_cells().await.unwrap();
	assert_eq!(active, selection(&[(1, 0), (1, 1), (2, 9)]));
	assert!(editor.deleted_cells().await.unwrap().is_empty());

	let picked = selection(&[(1, 1)]);
	assert_eq!(editor.subdivide(&picked).await.unwrap(), picked);
	assert_eq!(editor.merge(&picked).await.unwrap(), picked);
	editor.delete(&picked).await.unwrap();
	editor.recover(&picked).await.unwrap();

	let region = PickRegion::FeatureFile("area.geojson".into());
	assert_eq!(editor.pick_by_region(&region).await.unwrap(), selection(&[(2, 9)]));

	editor.save().await.unwrap();
	assert_eq!(h.topology.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_response_is_a_cells_error() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);
	let editor = h.open(&patch).await.unwrap();
	h.topology.garbage.store(true, Ordering::SeqCst);

	match editor.activated_cells().await {
		Err(Error::Remote(RemoteError::Cells { operation, .. })) => assert_eq!(operation, "activated_cells"),
		other => panic!("expected decode failure, got {other:?}"),
	}
}

#[tokio::test]
async fn negative_ack_is_rejected() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);
	let editor = h.open(&patch).await.unwrap();
	h.topology.reject.store(true, Ordering::SeqCst);

	match editor.recover(&selection(&[(1, 0)])).await {
		Err(Error::Remote(RemoteError::Rejected { operation, message })) => {
			assert_eq!(operation, "recover");
			assert_eq!(message, "cells already deleted");
		}
		other => panic!("expected rejection, got {other:?}"),
	}
}

#[tokio::test]
async fn closing_the_node_closes_the_editor() {
	let h = Harness::new();
	let patch = node("s.p", TemplateKind::Patch, false);
	let editor = h.open(&patch).await.unwrap();

	patch.close(&h.locks).await.unwrap();
	assert!(!editor.is_open());
	assert!(matches!(editor.save().await, Err(Error::EditorClosed(_))));
	assert_eq!(h.topology.saves.load(Ordering::SeqCst), 0);

	// Nothing left to release.
	editor.close().await.unwrap();
	assert_eq!(h.lock_service.released.load(Ordering::SeqCst), 1);
}
