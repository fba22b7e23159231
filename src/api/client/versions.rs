use axum::Json;
use serde_json::{Value, json};

/// `GET /_matrix/client/versions`.
pub async fn get_supported_versions() -> Json<Value> {
	Json(json!({
		"versions": ["r0.6.1", "v1.1", "v1.2", "v1.3", "v1.4", "v1.5"],
		"unstable_features": {},
	}))
}
