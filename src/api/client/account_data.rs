use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use palisade_core::Error;
use palisade_service::Services;
use serde_json::Value;

use crate::extract::AuthUser;

/// `GET /_matrix/client/v3/user/{userId}/account_data/{type}`.
pub async fn get_global(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((_user_id, event_type)): Path<(String, String)>,
) -> Result<Json<Value>, Error> {
	let data = services.store.global_account_data(&auth.user_id);
	data.get(&event_type)
		.cloned()
		.map(Json)
		.ok_or(Error::NotFound("account data not found"))
}

/// `PUT /_matrix/client/v3/user/{userId}/account_data/{type}`.
pub async fn set_global(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((_user_id, event_type)): Path<(String, String)>,
	Json(content): Json<Value>,
) -> Json<Value> {
	services
		.store
		.set_global_account_data(auth.user_id, event_type, content);
	Json(serde_json::json!({}))
}

/// `GET /_matrix/client/v3/user/{userId}/rooms/{roomId}/account_data/{type}`.
pub async fn get_room(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((_user_id, room_id, event_type)): Path<(String, String, String)>,
) -> Result<Json<Value>, Error> {
	let room_id = ruma::RoomId::parse(room_id).map_err(Error::from)?;
	let data = services.store.room_account_data(&auth.user_id, &room_id);
	data.get(&event_type)
		.cloned()
		.map(Json)
		.ok_or(Error::NotFound("account data not found"))
}

/// `PUT /_matrix/client/v3/user/{userId}/rooms/{roomId}/account_data/{type}`.
pub async fn set_room(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((_user_id, room_id, event_type)): Path<(String, String, String)>,
	Json(content): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = ruma::RoomId::parse(room_id).map_err(Error::from)?;
	services
		.store
		.set_room_account_data(auth.user_id, room_id, event_type, content);
	Ok(Json(serde_json::json!({})))
}
