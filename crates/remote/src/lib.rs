//! Remote interfaces of the gridmen backend.
//!
//! The backend hosts a hierarchical namespace of resources (folders, schemas,
//! patches, grids, vectors), a per-node lease service and bulk topology
//! operations on patches. This crate defines:
//!
//! - [`NodeKey`] and [`NodeInfo`], the addressing scheme shared by every route;
//! - the wire types exchanged with the backend ([`NodeSnapshot`],
//!   [`LeaseGrant`], [`Ack`], [`PickRegion`]);
//! - the async service traits [`NamespaceService`], [`LockService`] and
//!   [`TopologyService`];
//! - [`HttpBackend`], a `reqwest` implementation of all three;
//! - [`BackendConfig`], loaded from TOML.
//!
//! Every failure is a [`RemoteError`] naming the operation that failed. No
//! request is retried.
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod key;
mod service;
mod types;

pub use config::{BASE_URL_ENV, BackendConfig};
pub use error::{ConfigError, RemoteError};
pub use http::HttpBackend;
pub use key::{ADDRESS_SEPARATOR, KeyError, NodeInfo, NodeKey, ROOT_KEY};
pub use service::{LockService, NamespaceService, TopologyService};
pub use types::{
	Ack, ChildEntry, ChildRange, DEFAULT_TEMPLATE, LeaseGrant, LeaseId, LeaseMode, NodeSnapshot,
	NodeToken, PickRegion,
};

/// Result alias for remote requests.
pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
