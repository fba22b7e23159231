use std::sync::Arc;

use axum::{Json, extract::State};
use palisade_core::Error;
use palisade_service::Services;
use serde_json::{Value, json};

use crate::extract::AuthUser;

/// `GET /_matrix/client/v3/login`.
pub async fn get_login_types() -> Json<Value> {
	Json(json!({ "flows": [{ "type": "m.login.password" }] }))
}

/// `POST /_matrix/client/v3/login`. Accepts either the current
/// `identifier: {type: "m.id.user", user: lp}` shape or the deprecated
/// top-level `user` field, matching what real clients still send.
pub async fn login(
	State(services): State<Arc<Services>>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let localpart = body
		.get("identifier")
		.and_then(|id| id.get("user"))
		.and_then(Value::as_str)
		.or_else(|| body.get("user").and_then(Value::as_str))
		.ok_or(Error::BadJson("missing user identifier".to_owned()))?;

	let password = body
		.get("password")
		.and_then(Value::as_str)
		.ok_or(Error::BadJson("missing password".to_owned()))?;

	let device_id = body
		.get("device_id")
		.and_then(Value::as_str)
		.map(ruma::OwnedDeviceId::from);

	let initial_device_display_name = body
		.get("initial_device_display_name")
		.and_then(Value::as_str)
		.map(str::to_owned);

	let result = services
		.auth
		.login(localpart, password, device_id, initial_device_display_name)?;

	Ok(Json(json!({
		"user_id": result.user_id,
		"access_token": result.access_token,
		"device_id": result.device_id,
		"home_server": services.store.server_name,
	})))
}

/// `POST /_matrix/client/v3/logout`.
pub async fn logout(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
) -> Result<Json<Value>, Error> {
	services.auth.logout(&auth.user_id, &auth.device_id)?;
	Ok(Json(json!({})))
}

/// `GET /_matrix/client/v3/account/whoami`.
pub async fn whoami(auth: AuthUser) -> Json<Value> {
	Json(json!({
		"user_id": auth.user_id,
		"device_id": auth.device_id,
	}))
}
