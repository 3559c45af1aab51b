//! Lease coordination for gridmen nodes.
//!
//! # Mental model
//!
//! - The backend grants read (`r`) or write (`w`) leases per node through a
//!   [`LockService`](gridmen_remote::LockService). Leases are the only
//!   cross-client exclusion mechanism; nothing here enforces them locally.
//! - [`LockCoordinator`] is the client-side ledger: at most one tracked
//!   [`Lease`] per [`NodeInfo`](gridmen_remote::NodeInfo), plus a registry of
//!   named release callbacks per node.
//! - Releasing a lease runs that node's callbacks first, forgets the lease,
//!   then tells the backend. A stale release (`success = false`) is logged and
//!   treated as done.
//!
//! # Invariants
//!
//! 1. A failed acquire MUST record nothing.
//!    - Enforced in: `LockCoordinator::acquire`
//!    - Tested by: `tests::denied_acquire_records_nothing`
//! 2. Release callbacks MUST all run even when one panics.
//!    - Enforced in: [`run_isolated`]
//!    - Tested by: `tests::panicking_release_callback_does_not_skip_others`
//! 3. The ledger MUST NOT be locked across a backend call.
//!    - Enforced in: `LockCoordinator::acquire`, `LockCoordinator::release`

mod callbacks;
mod coordinator;
mod error;

pub use callbacks::{Callback, run_isolated};
pub use coordinator::{Lease, LockCoordinator};
pub use error::LockError;

/// Result alias for lease operations.
pub type Result<T, E = LockError> = std::result::Result<T, E>;
