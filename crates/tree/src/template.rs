//! Template kinds and their static capability table.
//!
//! Every node is tagged with a [`TemplateKind`]. Behavior that varies by kind
//! (menu contents, menu-action handling, check/create/edit views and the lease
//! capability tag) is looked up in [`TEMPLATES`] rather than dispatched
//! through a trait object.

use std::fmt;

use gridmen_remote::{DEFAULT_TEMPLATE, LeaseMode, NodeKey};
use tracing::warn;

use crate::node::ResourceNode;

/// Closed set of resource templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
	/// Plain folder.
	Default,
	/// Grid schema (projection, base point, subdivision rules).
	Schema,
	/// Editable grid patch under a schema.
	Patch,
	/// Assembled grid.
	Grid,
	/// Vector feature collection.
	Vector,
}

impl TemplateKind {
	/// Every kind, in table order.
	pub const ALL: [TemplateKind; 5] = [Self::Default, Self::Schema, Self::Patch, Self::Grid, Self::Vector];

	/// Parses a backend template name. Unknown names fall back to
	/// [`TemplateKind::Default`] with a warning.
	pub fn from_name(name: &str) -> Self {
		match Self::ALL.into_iter().find(|kind| kind.name() == name) {
			Some(kind) => kind,
			None => {
				warn!(template = name, "unknown template, treating as folder");
				Self::Default
			}
		}
	}

	/// Backend template name.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Default => DEFAULT_TEMPLATE,
			Self::Schema => "schema",
			Self::Patch => "patch",
			Self::Grid => "grid",
			Self::Vector => "vector",
		}
	}

	/// Capability table entry for this kind.
	pub fn def(self) -> &'static TemplateDef {
		match self {
			Self::Default => &TEMPLATES[0],
			Self::Schema => &TEMPLATES[1],
			Self::Patch => &TEMPLATES[2],
			Self::Grid => &TEMPLATES[3],
			Self::Vector => &TEMPLATES[4],
		}
	}

	/// Lease capability tag, `None` for folders.
	pub fn capability(self) -> Option<&'static str> {
		self.def().capability
	}

	/// Returns true for folders.
	pub const fn is_folder(self) -> bool {
		matches!(self, Self::Default)
	}
}

impl fmt::Display for TemplateKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// View slot of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
	/// Read-only inspection.
	Check,
	/// Form that fills in a temporary node before mounting.
	Create,
	/// Editing session.
	Edit,
}

impl ViewKind {
	/// Lowercase name.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Check => "check",
			Self::Create => "create",
			Self::Edit => "edit",
		}
	}
}

/// Instruction for the presentation layer to open a view on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDescriptor {
	/// Slot the view fills.
	pub view: ViewKind,
	/// Template of the node.
	pub template: TemplateKind,
	/// Node the view is bound to.
	pub node: NodeKey,
	/// Lease the view should hold while open.
	pub lease: Option<LeaseMode>,
}

/// Builds a view descriptor for a node.
pub type ViewFactory = fn(&ResourceNode) -> ViewDescriptor;

/// Effect of a menu item, executed by
/// [`ResourceTree::handle_menu_action`](crate::ResourceTree::handle_menu_action).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEffect {
	/// Create a temporary child of the given kind.
	CreateChild(TemplateKind),
	/// Unmount (unless temporary) and remove the node.
	Delete,
	/// Open a view.
	Open(ViewKind),
	/// Force-realign the node.
	Refresh,
}

/// When a menu item is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuWhen {
	/// Always.
	Always,
	/// Only for nodes the backend knows about.
	Persisted,
	/// Only for temporary nodes.
	Temp,
}

/// One context-menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItemDef {
	/// Stable action identifier.
	pub action: &'static str,
	/// Display label.
	pub label: &'static str,
	/// What selecting the item does.
	pub effect: MenuEffect,
	/// Visibility condition.
	pub when: MenuWhen,
}

impl MenuItemDef {
	fn visible_for(&self, node: &ResourceNode) -> bool {
		match self.when {
			MenuWhen::Always => true,
			MenuWhen::Persisted => !node.is_temp(),
			MenuWhen::Temp => node.is_temp(),
		}
	}
}

/// Capability set of one template kind.
pub struct TemplateDef {
	/// Kind this entry describes.
	pub kind: TemplateKind,
	/// Interface tag used when acquiring leases.
	pub capability: Option<&'static str>,
	/// Every menu item the template can show.
	pub menu: &'static [MenuItemDef],
	/// Items to show for a given node.
	pub render_menu: fn(&TemplateDef, &ResourceNode) -> Vec<&'static MenuItemDef>,
	/// Resolves a selected action to its effect, `None` if unsupported.
	pub handle_action: fn(&TemplateDef, &ResourceNode, &str) -> Option<MenuEffect>,
	/// Read-only view.
	pub check: Option<ViewFactory>,
	/// Creation form.
	pub create: Option<ViewFactory>,
	/// Editing view.
	pub edit: Option<ViewFactory>,
}

impl fmt::Debug for TemplateDef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemplateDef")
			.field("kind", &self.kind)
			.field("capability", &self.capability)
			.field("menu", &self.menu.len())
			.finish()
	}
}

impl TemplateDef {
	/// Menu for `node`.
	pub fn menu_for(&self, node: &ResourceNode) -> Vec<&'static MenuItemDef> {
		(self.render_menu)(self, node)
	}

	/// Effect of selecting `action` on `node`.
	pub fn resolve(&self, node: &ResourceNode, action: &str) -> Option<MenuEffect> {
		(self.handle_action)(self, node, action)
	}

	/// View factory for a slot.
	pub fn view(&self, view: ViewKind) -> Option<ViewFactory> {
		match view {
			ViewKind::Check => self.check,
			ViewKind::Create => self.create,
			ViewKind::Edit => self.edit,
		}
	}
}

fn visible_items(def: &TemplateDef, node: &ResourceNode) -> Vec<&'static MenuItemDef> {
	def.menu.iter().filter(|item| item.visible_for(node)).collect()
}

fn visible_action(def: &TemplateDef, node: &ResourceNode, action: &str) -> Option<MenuEffect> {
	def.menu
		.iter()
		.find(|item| item.action == action && item.visible_for(node))
		.map(|item| item.effect)
}

/// Temporary nodes open their creation form in place of any other view.
fn temp_aware_action(def: &TemplateDef, node: &ResourceNode, action: &str) -> Option<MenuEffect> {
	match visible_action(def, node, action)? {
		MenuEffect::Open(_) if node.is_temp() && def.create.is_some() => Some(MenuEffect::Open(ViewKind::Create)),
		effect => Some(effect),
	}
}

fn check_view(node: &ResourceNode) -> ViewDescriptor {
	descriptor(node, ViewKind::Check, Some(LeaseMode::Read))
}

fn create_view(node: &ResourceNode) -> ViewDescriptor {
	descriptor(node, ViewKind::Create, None)
}

fn edit_view(node: &ResourceNode) -> ViewDescriptor {
	descriptor(node, ViewKind::Edit, Some(LeaseMode::Write))
}

fn descriptor(node: &ResourceNode, view: ViewKind, lease: Option<LeaseMode>) -> ViewDescriptor {
	ViewDescriptor {
		view,
		template: node.kind(),
		node: node.key().clone(),
		lease,
	}
}

const fn item(action: &'static str, label: &'static str, effect: MenuEffect, when: MenuWhen) -> MenuItemDef {
	MenuItemDef {
		action,
		label,
		effect,
		when,
	}
}

const DELETE: MenuItemDef = item("delete", "Delete", MenuEffect::Delete, MenuWhen::Always);
const REFRESH: MenuItemDef = item("refresh", "Refresh", MenuEffect::Refresh, MenuWhen::Persisted);

/// Capability table, indexed in [`TemplateKind::ALL`] order.
pub static TEMPLATES: [TemplateDef; 5] = [
	TemplateDef {
		kind: TemplateKind::Default,
		capability: None,
		menu: &[
			item("new-schema", "New Schema", MenuEffect::CreateChild(TemplateKind::Schema), MenuWhen::Persisted),
			item("new-vector", "New Vector", MenuEffect::CreateChild(TemplateKind::Vector), MenuWhen::Persisted),
			REFRESH,
		],
		render_menu: visible_items,
		handle_action: visible_action,
		check: None,
		create: None,
		edit: None,
	},
	TemplateDef {
		kind: TemplateKind::Schema,
		capability: Some("ischema"),
		menu: &[
			item("open", "Check Schema", MenuEffect::Open(ViewKind::Check), MenuWhen::Always),
			item("new-patch", "New Patch", MenuEffect::CreateChild(TemplateKind::Patch), MenuWhen::Persisted),
			REFRESH,
			DELETE,
		],
		render_menu: visible_items,
		handle_action: temp_aware_action,
		check: Some(check_view),
		create: Some(create_view),
		edit: None,
	},
	TemplateDef {
		kind: TemplateKind::Patch,
		capability: Some("ipatch"),
		menu: &[
			item("open", "Edit Topology", MenuEffect::Open(ViewKind::Edit), MenuWhen::Always),
			item("check", "Check Patch", MenuEffect::Open(ViewKind::Check), MenuWhen::Persisted),
			DELETE,
		],
		render_menu: visible_items,
		handle_action: temp_aware_action,
		check: Some(check_view),
		create: Some(create_view),
		edit: Some(edit_view),
	},
	TemplateDef {
		kind: TemplateKind::Grid,
		capability: Some("igrid"),
		menu: &[
			item("open", "Check Grid", MenuEffect::Open(ViewKind::Check), MenuWhen::Always),
			DELETE,
		],
		render_menu: visible_items,
		handle_action: temp_aware_action,
		check: Some(check_view),
		create: Some(create_view),
		edit: None,
	},
	TemplateDef {
		kind: TemplateKind::Vector,
		capability: Some("ivector"),
		menu: &[
			item("open", "Edit Features", MenuEffect::Open(ViewKind::Edit), MenuWhen::Always),
			DELETE,
		],
		render_menu: visible_items,
		handle_action: temp_aware_action,
		check: Some(check_view),
		create: Some(create_view),
		edit: Some(edit_view),
	},
];

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use gridmen_remote::NodeInfo;
	use pretty_assertions::assert_eq;

	use super::*;

	fn node(key: &str, kind: TemplateKind, temp: bool) -> Arc<ResourceNode> {
		let key = NodeKey::new(key).unwrap();
		ResourceNode::new(key.clone(), NodeInfo::local(key), kind, temp)
	}

	#[test]
	fn table_is_indexed_by_kind() {
		for kind in TemplateKind::ALL {
			assert_eq!(kind.def().kind, kind);
			assert_eq!(TemplateKind::from_name(kind.name()), kind);
		}
	}

	#[test]
	fn unknown_template_is_a_folder() {
		assert_eq!(TemplateKind::from_name("mystery"), TemplateKind::Default);
	}

	#[test]
	fn capability_tags() {
		assert_eq!(TemplateKind::Default.capability(), None);
		assert_eq!(TemplateKind::Patch.capability(), Some("ipatch"));
		assert_eq!(TemplateKind::Vector.capability(), Some("ivector"));
	}

	#[test]
	fn temp_nodes_hide_persisted_items_and_open_create_form() {
		let temp = node("s.p", TemplateKind::Patch, true);
		let actions: Vec<_> = temp.template().menu_for(&temp).iter().map(|i| i.action).collect();
		assert_eq!(actions, vec!["open", "delete"]);
		assert_eq!(temp.template().resolve(&temp, "open"), Some(MenuEffect::Open(ViewKind::Create)));
		assert_eq!(temp.template().resolve(&temp, "check"), None);

		let saved = node("s.p", TemplateKind::Patch, false);
		assert_eq!(saved.template().resolve(&saved, "open"), Some(MenuEffect::Open(ViewKind::Edit)));
	}

	#[test]
	fn views_carry_lease_mode() {
		let patch = node("s.p", TemplateKind::Patch, false);
		let edit = (patch.template().edit.unwrap())(&patch);
		assert_eq!(edit.lease, Some(LeaseMode::Write));
		assert_eq!(edit.node.as_str(), "s.p");
		assert!(TemplateKind::Schema.def().view(ViewKind::Edit).is_none());
	}
}
