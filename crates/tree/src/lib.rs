//! Resource tree cache and topology editing for gridmen.
//!
//! [`ResourceTree`] mirrors the backend node namespace, loading children
//! lazily and reconciling fresh snapshots without losing local state.
//! Behavior per node kind comes from the static [`template::TEMPLATES`]
//! table. [`TopologyEditor`] drives lease-guarded cell operations on a patch.

#![warn(missing_docs)]

mod editor;
mod error;
mod node;
pub mod template;
mod tree;

pub use editor::TopologyEditor;
pub use error::Error;
pub use node::ResourceNode;
pub use template::{MenuEffect, TemplateKind, ViewDescriptor, ViewKind};
pub use tree::{MenuOutcome, NEW_NODE_NAME, ResourceTree, Subscription};

/// Result alias for tree operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
