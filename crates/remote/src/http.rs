//! REST client for the backend's namespace, lease and patch routes.

use async_trait::async_trait;
use gridmen_cellset::{decode, decode_backend, encode, encode_backend};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::Result;
use crate::config::BackendConfig;
use crate::error::{ConfigError, RemoteError};
use crate::key::{NodeInfo, NodeKey};
use crate::service::{LockService, NamespaceService, TopologyService};
use crate::types::{Ack, ChildRange, LeaseGrant, LeaseId, LeaseMode, NodeSnapshot, NodeToken, PickRegion};

const OCTET_STREAM: &str = "application/octet-stream";

/// [`NamespaceService`], [`LockService`] and [`TopologyService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
	client: Client,
	api: Url,
}

#[derive(Deserialize)]
struct MountResponse {
	#[serde(default = "yes")]
	success: bool,
	#[serde(default)]
	message: String,
	node_key: Option<NodeKey>,
}

#[derive(Deserialize)]
struct LockResponse {
	lock_id: LeaseId,
	node_key: Option<NodeKey>,
	access_mode: Option<LeaseMode>,
}

fn yes() -> bool {
	true
}

impl HttpBackend {
	/// Builds a client for the backend described by `config`.
	pub fn new(config: &BackendConfig) -> std::result::Result<Self, ConfigError> {
		let api = config.api_url()?;
		let client = Client::builder()
			.timeout(config.timeout())
			.build()
			.map_err(|e| ConfigError::Client(e.to_string()))?;
		Ok(Self { client, api })
	}

	/// Base URL every route is joined onto.
	pub fn api_url(&self) -> &Url {
		&self.api
	}

	fn endpoint(&self, operation: &'static str, route: &str, query: &[(&str, &str)]) -> Result<Url> {
		let mut url = self.api.join(route).map_err(|e| RemoteError::transport(operation, e))?;
		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}
		Ok(url)
	}

	fn patch_endpoint(&self, operation: &'static str, route: &str, patch: &NodeInfo, lease: &LeaseId) -> Result<Url> {
		let node_key = patch.to_string();
		self.endpoint(operation, route, &[("node_key", node_key.as_str()), ("lock_id", lease.as_str())])
	}

	async fn get(&self, operation: &'static str, url: Url) -> Result<Response> {
		debug!(operation, url = %url, "GET");
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| RemoteError::transport(operation, e))?;
		check_status(operation, response).await
	}

	async fn post_bytes(&self, operation: &'static str, url: Url, body: Vec<u8>) -> Result<Response> {
		debug!(operation, url = %url, bytes = body.len(), "POST");
		let response = self
			.client
			.post(url)
			.header(CONTENT_TYPE, OCTET_STREAM)
			.body(body)
			.send()
			.await
			.map_err(|e| RemoteError::transport(operation, e))?;
		check_status(operation, response).await
	}

	async fn post_json(&self, operation: &'static str, url: Url, body: &serde_json::Value) -> Result<Response> {
		debug!(operation, url = %url, "POST");
		let response = self
			.client
			.post(url)
			.json(body)
			.send()
			.await
			.map_err(|e| RemoteError::transport(operation, e))?;
		check_status(operation, response).await
	}
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let body = response.text().await.unwrap_or_default();
	Err(classify_status(operation, status, &body))
}

fn classify_status(operation: &'static str, status: StatusCode, body: &str) -> RemoteError {
	let detail = extract_detail(body);
	match status {
		StatusCode::FORBIDDEN | StatusCode::LOCKED => RemoteError::Denied { operation, detail },
		_ => RemoteError::Status {
			operation,
			status: status.as_u16(),
			detail,
		},
	}
}

/// Pulls a human-readable message out of an error body.
///
/// Understands FastAPI's `{"detail": "..."}` and validation-error
/// `{"detail": [{"msg": "..."}]}` shapes and falls back to `error`, `message`
/// or the raw body.
fn extract_detail(body: &str) -> String {
	let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
		return body.trim().to_owned();
	};
	match value.get("detail") {
		Some(serde_json::Value::String(detail)) => return detail.clone(),
		Some(serde_json::Value::Array(items)) => {
			let messages: Vec<&str> = items.iter().filter_map(|item| item.get("msg")?.as_str()).collect();
			if !messages.is_empty() {
				return messages.join("; ");
			}
		}
		_ => {}
	}
	value
		.get("error")
		.or_else(|| value.get("message"))
		.and_then(|v| v.as_str())
		.map_or_else(|| body.trim().to_owned(), str::to_owned)
}

/// Reads a backend-layout cell buffer and re-encodes it in the
/// self-describing layout the service traits carry.
async fn read_cells(operation: &'static str, response: Response) -> Result<Vec<u8>> {
	let body = response.bytes().await.map_err(|e| RemoteError::transport(operation, e))?;
	from_backend_cells(operation, &body)
}

fn from_backend_cells(operation: &'static str, body: &[u8]) -> Result<Vec<u8>> {
	let cells = decode_backend(body).map_err(|source| RemoteError::Cells { operation, source })?;
	Ok(encode(&cells))
}

fn to_backend_cells(operation: &'static str, cells: &[u8]) -> Result<Vec<u8>> {
	let cells = decode(cells).map_err(|source| RemoteError::Cells { operation, source })?;
	Ok(encode_backend(&cells))
}

async fn read_json<T: serde::de::DeserializeOwned>(operation: &'static str, response: Response) -> Result<T> {
	let body = response.bytes().await.map_err(|e| RemoteError::transport(operation, e))?;
	serde_json::from_slice(&body).map_err(|e| RemoteError::payload(operation, e))
}

#[async_trait]
impl NamespaceService for HttpBackend {
	async fn list_children(&self, node: &NodeInfo, range: Option<ChildRange>) -> Result<NodeSnapshot> {
		const OP: &str = "list_children";
		let node_key = node.to_string();
		let bounds = range.map(|range| (range.start.to_string(), range.end.to_string()));
		let mut query = vec![("node_key", node_key.as_str())];
		if let Some((start, end)) = &bounds {
			query.push(("child_start_index", start.as_str()));
			query.push(("child_end_index", end.as_str()));
		}
		let url = self.endpoint(OP, "noodle/node", &query)?;
		read_json(OP, self.get(OP, url).await?).await
	}

	async fn mount(&self, node: &NodeInfo, template_name: &str, params: Option<serde_json::Value>) -> Result<NodeKey> {
		const OP: &str = "mount";
		let url = self.endpoint(OP, "noodle/node/mount", &[])?;
		let body = serde_json::json!({
			"node_key": node.to_string(),
			"template_name": template_name,
			"mount_params": params,
		});
		let reply: MountResponse = read_json(OP, self.post_json(OP, url, &body).await?).await?;
		if !reply.success {
			return Err(RemoteError::Rejected {
				operation: OP,
				message: reply.message,
			});
		}
		Ok(reply.node_key.unwrap_or_else(|| node.key().clone()))
	}

	async fn unmount(&self, node: &NodeInfo) -> Result<()> {
		const OP: &str = "unmount";
		let node_key = node.to_string();
		let url = self.endpoint(OP, "noodle/node/unmount", &[("node_key", node_key.as_str())])?;
		let response = self
			.client
			.post(url)
			.send()
			.await
			.map_err(|e| RemoteError::transport(OP, e))?;
		let ack: Ack = read_json(OP, check_status(OP, response).await?).await?;
		if ack.success {
			Ok(())
		} else {
			Err(RemoteError::Rejected {
				operation: OP,
				message: ack.message,
			})
		}
	}
}

#[async_trait]
impl LockService for HttpBackend {
	async fn acquire_lease(&self, capability: &str, node: &NodeInfo, mode: LeaseMode) -> Result<LeaseGrant> {
		const OP: &str = "acquire_lease";
		let node_key = node.to_string();
		let url = self.endpoint(
			OP,
			"noodle/node/lock",
			&[("icrm_tag", capability), ("node_key", node_key.as_str()), ("access_mode", mode.as_str())],
		)?;
		let reply: LockResponse = read_json(OP, self.get(OP, url).await?).await?;
		Ok(LeaseGrant {
			lease_id: reply.lock_id,
			node_key: reply.node_key.unwrap_or_else(|| node.key().clone()),
			mode: reply.access_mode.unwrap_or(mode),
		})
	}

	async fn release_lease(&self, node: &NodeInfo, lease: &LeaseId) -> Result<Ack> {
		const OP: &str = "release_lease";
		let node_key = node.to_string();
		let url = self.endpoint(OP, "noodle/node/unlock", &[("node_key", node_key.as_str()), ("lock_id", lease.as_str())])?;
		read_json(OP, self.get(OP, url).await?).await
	}
}

#[async_trait]
impl TopologyService for HttpBackend {
	async fn activated_cells(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Vec<u8>> {
		const OP: &str = "activated_cells";
		let url = self.patch_endpoint(OP, "patch/activate-info", patch, lease)?;
		read_cells(OP, self.get(OP, url).await?).await
	}

	async fn deleted_cells(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Vec<u8>> {
		const OP: &str = "deleted_cells";
		let url = self.patch_endpoint(OP, "patch/deleted-info", patch, lease)?;
		read_cells(OP, self.get(OP, url).await?).await
	}

	async fn subdivide(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Vec<u8>> {
		const OP: &str = "subdivide";
		let url = self.patch_endpoint(OP, "patch/subdivide", patch, lease)?;
		let body = to_backend_cells(OP, &cells)?;
		read_cells(OP, self.post_bytes(OP, url, body).await?).await
	}

	async fn merge(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Vec<u8>> {
		const OP: &str = "merge";
		let url = self.patch_endpoint(OP, "patch/merge", patch, lease)?;
		let body = to_backend_cells(OP, &cells)?;
		read_cells(OP, self.post_bytes(OP, url, body).await?).await
	}

	async fn delete(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Ack> {
		const OP: &str = "delete";
		let url = self.patch_endpoint(OP, "patch/delete", patch, lease)?;
		let body = to_backend_cells(OP, &cells)?;
		read_json(OP, self.post_bytes(OP, url, body).await?).await
	}

	async fn recover(&self, patch: &NodeInfo, lease: &LeaseId, cells: Vec<u8>) -> Result<Ack> {
		const OP: &str = "recover";
		let url = self.patch_endpoint(OP, "patch/restore", patch, lease)?;
		let body = to_backend_cells(OP, &cells)?;
		read_json(OP, self.post_bytes(OP, url, body).await?).await
	}

	async fn pick_by_region(&self, patch: &NodeInfo, lease: &LeaseId, region: &PickRegion) -> Result<Vec<u8>> {
		const OP: &str = "pick_by_region";
		let url = self.endpoint(OP, "patch/pick", &[])?;
		let body = pick_request(patch, lease, region);
		read_cells(OP, self.post_json(OP, url, &body).await?).await
	}

	async fn save(&self, patch: &NodeInfo, lease: &LeaseId) -> Result<Ack> {
		const OP: &str = "save";
		let url = self.patch_endpoint(OP, "patch/save", patch, lease)?;
		read_json(OP, self.get(OP, url).await?).await
	}
}

fn pick_request(patch: &NodeInfo, lease: &LeaseId, region: &PickRegion) -> serde_json::Value {
	let patch_token = NodeToken {
		node_key: patch.to_string(),
		lock_id: Some(lease.clone()),
	};
	serde_json::json!({
		"patch_token": patch_token,
		"file_or_feature_token": region.to_wire(),
	})
}
