use std::sync::Arc;

use axum::{
	Json,
	body::Bytes,
	extract::{Path, Query, State},
	http::{HeaderMap, HeaderValue, header},
	response::{IntoResponse, Response},
};
use palisade_core::Error;
use palisade_service::Services;
use serde::Deserialize;
use serde_json::json;

use crate::extract::AuthUser;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
	filename: Option<String>,
}

/// `POST /_matrix/media/v3/upload`. Buffers the whole request body in memory
/// and stores it under a freshly generated media id, per the in-memory-only
/// scope of this server — no quota or streaming to disk.
pub async fn upload(
	State(services): State<Arc<Services>>,
	_auth: AuthUser,
	Query(query): Query<UploadQuery>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Json<serde_json::Value>, Error> {
	if body.len() > services.max_request_size {
		return Err(Error::BadJson("upload exceeds max_request_size".to_owned()));
	}

	let content_type = headers
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.map(str::to_owned);

	let mxc = services
		.store
		.create_media(content_type, query.filename, body.to_vec());

	Ok(Json(json!({ "content_uri": mxc })))
}

/// `GET /_matrix/media/v3/download/{serverName}/{mediaId}` and the legacy
/// `/download/{serverName}/{mediaId}/{fileName}` variant.
pub async fn download(
	State(services): State<Arc<Services>>,
	Path((_server_name, media_id)): Path<(String, String)>,
) -> Result<Response, Error> {
	let item = services
		.store
		.get_media(&media_id)
		.ok_or(Error::NotFound("media not found"))?;

	let mut response = item.bytes.into_response();
	let content_type = item
		.content_type
		.as_deref()
		.unwrap_or("application/octet-stream");
	if let Ok(value) = HeaderValue::from_str(content_type) {
		response.headers_mut().insert(header::CONTENT_TYPE, value);
	}
	if let Some(filename) = item.filename {
		if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{filename}\"")) {
			response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
		}
	}

	Ok(response)
}

/// `GET /_matrix/media/v3/download/{serverName}/{mediaId}/{fileName}` — same
/// lookup, file name taken from the path instead of the stored metadata.
pub async fn download_named(
	State(services): State<Arc<Services>>,
	Path((server_name, media_id, _file_name)): Path<(String, String, String)>,
) -> Result<Response, Error> {
	download(State(services), Path((server_name, media_id))).await
}
