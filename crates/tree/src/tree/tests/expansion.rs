use std::sync::atomic::Ordering;

use gridmen_remote::LeaseMode;
use pretty_assertions::assert_eq;

use super::helpers::{Harness, key};
use crate::{TemplateKind, ViewKind};

#[tokio::test]
async fn expand_aligns_each_collapsed_ancestor_once() {
	let h = Harness::with_root_children(&[("a", "default")]).await;
	h.namespace.set_children("a", &[("a.b", "default")]);
	h.namespace.set_children("a.b", &[("a.b.c", "schema")]);
	h.tree.align_node(&h.node("a"), false).await.unwrap();

	let b = h.node("a.b");
	h.tree.expand_node(&b).await.unwrap();

	assert_eq!(h.tree.expanded_keys(), vec![key("."), key("a"), key("a.b")]);
	assert_eq!(h.child_keys("a.b"), vec!["a.b.c"]);
	assert_eq!(h.namespace.fetches("."), 1);
	assert_eq!(h.namespace.fetches("a"), 1);
	assert_eq!(h.namespace.fetches("a.b"), 1);
}

#[tokio::test]
async fn toggle_collapses_then_reexpands_without_fetching() {
	let h = Harness::with_root_children(&[("a", "default")]).await;
	let a = h.node("a");
	let (count, _subscription) = h.notifications();

	h.tree.toggle_node_expansion(&a, false).await.unwrap();
	assert!(h.tree.is_node_expanded(a.key()));

	h.tree.toggle_node_expansion(&a, false).await.unwrap();
	assert!(!h.tree.is_node_expanded(a.key()));

	h.tree.toggle_node_expansion(&a, true).await.unwrap();
	h.tree.toggle_node_expansion(&a, true).await.unwrap();
	assert!(h.tree.is_node_expanded(a.key()));

	assert_eq!(h.namespace.fetches("a"), 1);
	assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn failed_expansion_still_notifies() {
	let h = Harness::with_root_children(&[("a", "default")]).await;
	let a = h.node("a");
	h.namespace.fail("a", true);
	let (count, _subscription) = h.notifications();

	assert!(h.tree.expand_node(&a).await.is_err());
	assert!(!h.tree.is_node_expanded(a.key()));
	assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropped_subscription_stops_notifications() {
	let h = Harness::with_root_children(&[("a", "default")]).await;
	let (count, subscription) = h.notifications();

	h.tree.click_node(&h.node("a")).unwrap();
	subscription.unsubscribe();
	h.tree.click_node(h.tree.root()).unwrap();

	assert_eq!(count.load(Ordering::SeqCst), 1);
	assert_eq!(h.tree.selected_node().map(|n| n.key().clone()), Some(key(".")));
}

#[tokio::test]
async fn double_click_opens_editor_or_toggles_folder() {
	let h = Harness::with_root_children(&[("f", "default"), ("s", "schema"), ("p", "patch")]).await;

	assert_eq!(h.tree.double_click_node(&h.node("f")).await.unwrap(), None);
	assert!(h.tree.is_node_expanded(&key("f")));

	let edit = h.tree.double_click_node(&h.node("p")).await.unwrap().unwrap();
	assert_eq!(edit.view, ViewKind::Edit);
	assert_eq!(edit.template, TemplateKind::Patch);
	assert_eq!(edit.lease, Some(LeaseMode::Write));

	let check = h.tree.double_click_node(&h.node("s")).await.unwrap().unwrap();
	assert_eq!(check.view, ViewKind::Check);
	assert_eq!(check.node, key("s"));
	assert_eq!(h.tree.selected_node().map(|n| n.key().clone()), Some(key("s")));
}
