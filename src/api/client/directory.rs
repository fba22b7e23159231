use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use palisade_core::Error;
use palisade_service::Services;
use serde_json::{Value, json};

use crate::extract::AuthUser;

/// `GET /_matrix/client/v3/directory/room/{roomAlias}`.
pub async fn resolve_alias(
	State(services): State<Arc<Services>>,
	Path(room_alias): Path<String>,
) -> Result<Json<Value>, Error> {
	let alias = ruma::RoomAliasId::parse(&room_alias).map_err(Error::from)?;
	let room_id = services
		.store
		.resolve_alias(alias)
		.ok_or(Error::NotFound("alias not found"))?;
	Ok(Json(json!({
		"room_id": room_id,
		"servers": [services.store.server_name.as_str()],
	})))
}

/// `GET/PUT /_matrix/client/v3/directory/list/room/{roomId}`.
pub async fn get_visibility(
	State(services): State<Arc<Services>>,
	Path(room_id): Path<String>,
) -> Result<Json<Value>, Error> {
	let room_id = ruma::RoomId::parse(room_id).map_err(Error::from)?;
	let published = services.room_ops.visibility(&room_id.into())?;
	Ok(Json(json!({ "visibility": if published { "public" } else { "private" } })))
}

pub async fn set_visibility(
	State(services): State<Arc<Services>>,
	_auth: AuthUser,
	Path(room_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = ruma::RoomId::parse(room_id).map_err(Error::from)?;
	let published = body.get("visibility").and_then(Value::as_str) == Some("public");
	services.room_ops.set_visibility(&room_id.into(), published)?;
	Ok(Json(json!({})))
}

/// `GET /_matrix/client/v3/publicRooms`.
pub async fn public_rooms(State(services): State<Arc<Services>>) -> Json<Value> {
	let rooms: Vec<Value> = services
		.room_ops
		.public_rooms()
		.into_iter()
		.map(|room_id| {
			let name = services
				.store
				.with_room(&room_id, |room| room.name.clone())
				.ok()
				.flatten();
			let topic = services
				.store
				.with_room(&room_id, |room| room.topic.clone())
				.ok()
				.flatten();
			let member_count = services
				.store
				.with_room(&room_id, |room| room.members.len())
				.unwrap_or(0);

			json!({
				"room_id": room_id,
				"name": name,
				"topic": topic,
				"num_joined_members": member_count,
				"world_readable": false,
				"guest_can_join": false,
			})
		})
		.collect();

	Json(json!({ "chunk": rooms, "total_room_count_estimate": rooms.len() }))
}
