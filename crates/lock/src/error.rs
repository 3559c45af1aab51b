use gridmen_remote::{LeaseId, NodeInfo, RemoteError};
use thiserror::Error;

/// Lease coordination failures.
#[derive(Debug, Clone, Error)]
pub enum LockError {
	/// A lease is already held on the node.
	#[error("node `{node}` already holds lease {lease}")]
	AlreadyHeld {
		/// Leased node.
		node: NodeInfo,
		/// Lease currently held.
		lease: LeaseId,
	},
	/// No lease is held on the node.
	#[error("node `{0}` holds no lease")]
	NotHeld(NodeInfo),
	/// The lock service failed or denied the request.
	#[error(transparent)]
	Remote(#[from] RemoteError),
}
