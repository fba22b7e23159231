use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use palisade_core::Error;
use palisade_service::{
	Services,
	room_ops::{CreateRoomRequest, Preset},
};
use ruma::{OwnedRoomId, OwnedUserId};
use serde_json::{Value, json};

use crate::extract::AuthUser;

/// `POST /_matrix/client/v3/createRoom`.
pub async fn create_room(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let visibility_public = body.get("visibility").and_then(Value::as_str) == Some("public");

	let preset = match body.get("preset").and_then(Value::as_str) {
		| Some("public_chat") => Preset::PublicChat,
		| Some("trusted_private_chat") => Preset::TrustedPrivateChat,
		| Some("private_chat") | None if visibility_public => Preset::PublicChat,
		| _ => Preset::PrivateChat,
	};

	let invite = body
		.get("invite")
		.and_then(Value::as_array)
		.map(|v| {
			v.iter()
				.filter_map(Value::as_str)
				.filter_map(|s| ruma::UserId::parse(s).ok())
				.collect()
		})
		.unwrap_or_default();

	let name = body.get("name").and_then(Value::as_str).map(str::to_owned);
	let topic = body.get("topic").and_then(Value::as_str).map(str::to_owned);
	let is_direct = body.get("is_direct").and_then(Value::as_bool).unwrap_or(false);
	let room_alias_name = body
		.get("room_alias_name")
		.and_then(Value::as_str)
		.map(str::to_owned);
	let creation_content = body.get("creation_content").cloned();
	let power_level_content_override = body.get("power_level_content_override").cloned();
	let initial_state = body
		.get("initial_state")
		.and_then(Value::as_array)
		.map(|entries| {
			entries
				.iter()
				.filter_map(|entry| {
					let event_type = entry.get("type").and_then(Value::as_str)?.to_owned();
					let state_key = entry
						.get("state_key")
						.and_then(Value::as_str)
						.unwrap_or("")
						.to_owned();
					let content = entry.get("content").cloned().unwrap_or_else(|| json!({}));
					Some((event_type, state_key, content))
				})
				.collect()
		})
		.unwrap_or_default();

	let room_id = services.room_ops.create_room(CreateRoomRequest {
		creator: auth.user_id,
		preset,
		name,
		topic,
		visibility_public,
		invite,
		is_direct,
		room_alias_name,
		initial_state,
		creation_content,
		power_level_content_override,
	})?;

	Ok(Json(json!({ "room_id": room_id })))
}

fn parse_room_id(room_id: &str) -> Result<OwnedRoomId, Error> {
	ruma::RoomId::parse(room_id)
		.map(Into::into)
		.map_err(Error::from)
}

/// Resolves a `roomIdOrAlias` path segment, following `#alias:server` through
/// the alias directory when it isn't already a raw room id.
fn parse_room_id_or_alias(services: &Services, room_id_or_alias: &str) -> Result<OwnedRoomId, Error> {
	if room_id_or_alias.starts_with('#') {
		let alias = ruma::RoomAliasId::parse(room_id_or_alias).map_err(Error::from)?;
		services
			.store
			.resolve_alias(alias)
			.ok_or(Error::NotFound("alias not found"))
	} else {
		parse_room_id(room_id_or_alias)
	}
}

/// `POST /_matrix/client/v3/rooms/{roomId}/join` and `/join/{roomIdOrAlias}`.
pub async fn join_room(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id_or_alias): Path<String>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id_or_alias(&services, &room_id_or_alias)?;
	services.room_ops.join(&room_id, &auth.user_id)?;
	Ok(Json(json!({ "room_id": room_id })))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/leave`.
pub async fn leave_room(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id): Path<String>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	services.room_ops.leave(&room_id, &auth.user_id)?;
	Ok(Json(json!({})))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/invite`.
pub async fn invite(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let target = parse_user_id(&body)?;
	services.room_ops.invite(&room_id, &auth.user_id, &target)?;
	Ok(Json(json!({})))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/kick`.
pub async fn kick(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let target = parse_user_id(&body)?;
	services.room_ops.kick(&room_id, &auth.user_id, &target)?;
	Ok(Json(json!({})))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/ban`.
pub async fn ban(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let target = parse_user_id(&body)?;
	services.room_ops.ban(&room_id, &auth.user_id, &target)?;
	Ok(Json(json!({})))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/unban`.
pub async fn unban(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path(room_id): Path<String>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let target = parse_user_id(&body)?;
	services.room_ops.unban(&room_id, &auth.user_id, &target)?;
	Ok(Json(json!({})))
}

fn parse_user_id(body: &Value) -> Result<OwnedUserId, Error> {
	let user_id = body
		.get("user_id")
		.and_then(Value::as_str)
		.ok_or(Error::BadJson("missing user_id".to_owned()))?;
	ruma::UserId::parse(user_id).map_err(Error::from)
}

fn age_wrap(services: &Services, event: palisade_store::Event) -> Value {
	let now = palisade_core::time::millis_since_unix_epoch();
	let mut unsigned = json!({ "age": now.saturating_sub(event.origin_server_ts) });
	if let Some(redacted_because) = &event.redacted_because {
		if let Some(redaction) = services.store.get_event(redacted_because) {
			unsigned["redacted_because"] = json!({
				"event_id": redaction.event_id,
				"sender": redaction.sender,
				"content": redaction.content,
				"origin_server_ts": redaction.origin_server_ts,
			});
		}
	}

	json!({
		"event_id": event.event_id,
		"type": event.event_type,
		"sender": event.sender,
		"room_id": event.room_id,
		"origin_server_ts": event.origin_server_ts,
		"content": event.content,
		"state_key": event.state_key,
		"unsigned": unsigned,
	})
}

/// `PUT /_matrix/client/v3/rooms/{roomId}/send/{eventType}/{txnId}`.
pub async fn send_message(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((room_id, event_type, txn_id)): Path<(String, String, String)>,
	Json(content): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let event_id = services.event_ops.send_message(
		&room_id,
		&auth.user_id,
		&auth.device_id,
		&txn_id,
		event_type,
		content,
	)?;
	Ok(Json(json!({ "event_id": event_id })))
}

/// `PUT /_matrix/client/v3/rooms/{roomId}/state/{eventType}/{stateKey}`.
pub async fn send_state(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((room_id, event_type, state_key)): Path<(String, String, String)>,
	Json(content): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let event_id = services
		.event_ops
		.send_state(&room_id, &auth.user_id, event_type, state_key, content)?;
	Ok(Json(json!({ "event_id": event_id })))
}

/// `PUT /_matrix/client/v3/rooms/{roomId}/redact/{eventId}/{txnId}`.
pub async fn redact(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((room_id, event_id, _txn_id)): Path<(String, String, String)>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let target = ruma::EventId::parse(event_id)
		.map(Into::into)
		.map_err(Error::from)?;
	let reason = body.get("reason").and_then(Value::as_str).map(str::to_owned);

	let redaction_id = services
		.event_ops
		.redact(&room_id, &auth.user_id, &target, reason)?;
	Ok(Json(json!({ "event_id": redaction_id })))
}

/// `GET /_matrix/client/v3/rooms/{roomId}/event/{eventId}` — used by clients
/// to fetch a single event, including after a redaction, to display the
/// wrapped `unsigned.redacted_because`.
pub async fn get_event(
	State(services): State<Arc<Services>>,
	_auth: AuthUser,
	Path((room_id, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let event_id = ruma::EventId::parse(event_id)
		.map(Into::into)
		.map_err(Error::from)?;
	let event = services.event_ops.get_event(&room_id, &event_id)?;
	Ok(Json(age_wrap(&services, event)))
}

/// `POST /_matrix/client/v3/rooms/{roomId}/receipt/{receiptType}/{eventId}`.
pub async fn set_receipt(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Path((room_id, receipt_type, event_id)): Path<(String, String, String)>,
) -> Result<Json<Value>, Error> {
	let room_id = parse_room_id(&room_id)?;
	let event_id = ruma::EventId::parse(event_id)
		.map(Into::into)
		.map_err(Error::from)?;
	services
		.store
		.set_receipt(&room_id, auth.user_id.clone(), receipt_type, event_id)?;
	services.store.notify_joined(&room_id)?;

	Ok(Json(json!({})))
}
