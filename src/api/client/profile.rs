use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use palisade_core::Error;
use palisade_service::Services;
use serde_json::{Value, json};

use crate::extract::AuthUser;

fn parse_user(user_id: &str) -> Result<ruma::OwnedUserId, Error> {
	ruma::UserId::parse(user_id).map_err(Error::from)
}

/// `GET /_matrix/client/v3/profile/{userId}`.
pub async fn get_profile(
	State(services): State<Arc<Services>>,
	Path(user_id): Path<String>,
) -> Result<Json<Value>, Error> {
	let user_id = parse_user(&user_id)?;
	let (display_name, avatar_url) = services
		.store
		.profile(&user_id)
		.ok_or(Error::NotFound("user not found"))?;
	Ok(Json(json!({ "displayname": display_name, "avatar_url": avatar_url })))
}

/// `GET /_matrix/client/v3/profile/{userId}/displayname`.
pub async fn get_display_name(
	State(services): State<Arc<Services>>,
	Path(user_id): Path<String>,
) -> Result<Json<Value>, Error> {
	let user_id = parse_user(&user_id)?;
	let (display_name, _) = services
		.store
		.profile(&user_id)
		.ok_or(Error::NotFound("user not found"))?;
	Ok(Json(json!({ "displayname": display_name })))
}

/// `PUT /_matrix/client/v3/profile/{userId}/displayname`. Propagates to
/// every joined room via `RoomOps::update_profile`.
pub async fn set_display_name(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(_user_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let display_name = body
		.get("displayname")
		.and_then(Value::as_str)
		.map(str::to_owned);
	services
		.store
		.set_display_name(&auth.user_id, display_name.clone())?;
	let (_, avatar_url) = services.store.profile(&auth.user_id).unwrap_or((None, None));
	services
		.room_ops
		.update_profile(&auth.user_id, display_name, avatar_url)?;
	Ok(Json(json!({})))
}

/// `GET /_matrix/client/v3/profile/{userId}/avatar_url`.
pub async fn get_avatar_url(
	State(services): State<Arc<Services>>,
	Path(user_id): Path<String>,
) -> Result<Json<Value>, Error> {
	let user_id = parse_user(&user_id)?;
	let (_, avatar_url) = services
		.store
		.profile(&user_id)
		.ok_or(Error::NotFound("user not found"))?;
	Ok(Json(json!({ "avatar_url": avatar_url })))
}

/// `PUT /_matrix/client/v3/profile/{userId}/avatar_url`.
pub async fn set_avatar_url(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(_user_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let avatar_url = body.get("avatar_url").and_then(Value::as_str).map(str::to_owned);
	services
		.store
		.set_avatar_url(&auth.user_id, avatar_url.clone())?;
	let (display_name, _) = services.store.profile(&auth.user_id).unwrap_or((None, None));
	services
		.room_ops
		.update_profile(&auth.user_id, display_name, avatar_url)?;
	Ok(Json(json!({})))
}
