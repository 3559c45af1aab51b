use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gridmen_remote::LeaseMode;

use super::helpers::{Harness, key};
use crate::{Error, TemplateKind};

#[tokio::test]
async fn root_cannot_be_removed() {
	let h = Harness::with_root_children(&[]).await;
	assert!(matches!(h.tree.remove_node(h.tree.root()).await, Err(Error::RootRemoval)));
	assert_eq!(h.tree.len(), 1);
}

#[tokio::test]
async fn remove_closes_subtree_and_realigns_parent() {
	let h = Harness::with_root_children(&[("s", "schema"), ("t", "schema")]).await;
	h.namespace.set_children("s", &[("s.p", "patch")]);
	h.tree.expand_node(&h.node("s")).await.unwrap();

	let s = h.node("s");
	let p = h.node("s.p");
	p.lock(&h.locks, "ipatch", LeaseMode::Write).await.unwrap();
	let closed = Arc::new(AtomicBool::new(false));
	let flag = closed.clone();
	p.register_cleanup("form", move || flag.store(true, Ordering::SeqCst));
	h.tree.click_node(&p).unwrap();

	h.namespace.set_children(".", &[("t", "schema")]);
	h.tree.remove_node(&s).await.unwrap();

	assert!(h.tree.get(&key("s")).is_none());
	assert!(h.tree.get(&key("s.p")).is_none());
	assert!(closed.load(Ordering::SeqCst));
	assert_eq!(p.lease_id(), None);
	assert_eq!(h.lock_service.released.load(Ordering::SeqCst), 1);
	assert!(h.tree.selected_node().is_none());
	assert!(!h.tree.is_node_expanded(&key("s")));
	assert_eq!(h.child_keys("."), vec!["t"]);
	assert_eq!(h.namespace.fetches("."), 2);
}

#[tokio::test]
async fn temp_node_removal_skips_backend() {
	let h = Harness::with_root_children(&[]).await;
	let draft = h.tree.add_local_node(key("draft"), TemplateKind::Schema, None).unwrap();
	assert!(h.tree.temp_node_exists());

	h.tree.remove_node(&draft).await.unwrap();
	assert!(!h.tree.temp_node_exists());
	assert!(h.namespace.unmounted.lock().is_empty());
	assert!(matches!(h.tree.remove_node(&draft).await, Err(Error::NotInTree(_))));
}

#[tokio::test]
async fn local_node_needs_indexed_parent() {
	let h = Harness::with_root_children(&[]).await;
	let err = h
		.tree
		.add_local_node(key("ghost.child"), TemplateKind::Patch, Some(&key("ghost")))
		.unwrap_err();
	assert!(matches!(err, Error::NotInTree(k) if k == key("ghost")));
}
