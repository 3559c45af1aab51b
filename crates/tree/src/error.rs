use gridmen_lock::LockError;
use gridmen_remote::{KeyError, NodeKey, RemoteError};
use thiserror::Error;

/// Resource tree and topology editing failures.
///
/// `Clone` so that callers joining an in-flight alignment receive the
/// leader's error.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The node handle is not the one indexed under its key.
	#[error("node `{0}` is not in this tree")]
	NotInTree(NodeKey),
	/// The root cannot be removed.
	#[error("the root node cannot be removed")]
	RootRemoval,
	/// An unpersisted node already exists.
	#[error("temporary node `{0}` must be mounted or removed first")]
	TempNodeExists(NodeKey),
	/// A node with the requested key already exists.
	#[error("node `{0}` already exists")]
	NodeExists(NodeKey),
	/// The operation requires a temporary node.
	#[error("node `{0}` is not temporary")]
	NotTemp(NodeKey),
	/// The node's template does not offer the requested action or view.
	#[error("template `{template}` does not support `{action}`")]
	UnsupportedAction {
		/// Template name.
		template: &'static str,
		/// Requested action or view.
		action: String,
	},
	/// The editing session no longer holds its lease.
	#[error("editor for `{0}` is closed")]
	EditorClosed(NodeKey),
	/// The alignment leader was dropped before publishing a result.
	#[error("alignment of `{0}` was cancelled")]
	AlignCancelled(NodeKey),
	/// A node key could not be built.
	#[error(transparent)]
	Key(#[from] KeyError),
	/// A backend request failed.
	#[error(transparent)]
	Remote(#[from] RemoteError),
	/// A lease operation failed.
	#[error(transparent)]
	Lock(#[from] LockError),
}
