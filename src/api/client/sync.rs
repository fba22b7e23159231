use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::extract::{Query, State};
use palisade_core::{Error, time::millis_since_unix_epoch};
use palisade_service::{
	Services,
	sync::{MAX_TIMEOUT, SyncEngine},
};
use ruma::OwnedRoomId;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::extract::AuthUser;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
	since: Option<String>,
	#[serde(default)]
	timeout: u64,
	#[serde(default)]
	full_state: bool,
}

fn event_json(services: &Services, event: &palisade_store::Event, now: u64) -> Value {
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

fn stripped_state(event: &palisade_store::Event) -> Value {
	json!({
		"type": event.event_type,
		"state_key": event.state_key,
		"content": event.content,
		"sender": event.sender,
	})
}

fn heroes(services: &Services, room_id: &OwnedRoomId, me: &ruma::UserId) -> Vec<Value> {
	services
		.store
		.with_room(room_id, |room| {
			room.members
				.iter()
				.filter(|(m, membership)| {
					m.as_str() != me.as_str()
						&& matches!(
							**membership,
							palisade_store::Membership::Join | palisade_store::Membership::Invite
						)
				})
				.take(5)
				.map(|(m, _)| json!(m))
				.collect()
		})
		.unwrap_or_default()
}

/// `GET /_matrix/client/v3/sync`. Builds the response via `SyncEngine`, then
/// maps it onto the documented wire shape: `rooms.join`/`rooms.invite` maps
/// keyed by room id, each with `timeline`, `state`, `ephemeral`,
/// `account_data`, `summary` and `unread_notifications`.
pub async fn sync(
	State(services): State<Arc<Services>>,
	auth: AuthUser,
	Query(query): Query<SyncQuery>,
) -> Result<axum::Json<Value>, Error> {
	let timeout = Duration::from_millis(query.timeout).min(MAX_TIMEOUT);

	let engine: &SyncEngine = &services.sync;
	let response = engine.sync(&auth.user_id, query.since.as_deref(), timeout).await?;

	let now = millis_since_unix_epoch();

	let mut join = serde_json::Map::new();
	for room in &response.joined {
		let timeline_events: Vec<Value> =
			room.timeline.iter().map(|e| event_json(&services, e, now)).collect();
		let state_events: Vec<Value> = room.state.iter().map(|e| event_json(&services, e, now)).collect();

		let ephemeral = response
			.receipts
			.get(&room.room_id)
			.map(|receipts| {
				let mut by_event: HashMap<String, serde_json::Map<String, Value>> = HashMap::new();
				for ((user_id, receipt_type), receipt) in receipts {
					let per_type = by_event.entry(receipt.event_id.to_string()).or_default();
					let per_user = per_type
						.entry(receipt_type.clone())
						.or_insert_with(|| json!({}));
					per_user[user_id.as_str()] = json!({ "ts": receipt.ts });
				}
				let content: serde_json::Map<String, Value> = by_event
					.into_iter()
					.map(|(event_id, per_type)| (event_id, Value::Object(per_type)))
					.collect();
				json!([{ "type": "m.receipt", "content": content }])
			})
			.unwrap_or_else(|| json!([]));

		let joined_count = services
			.store
			.with_room(&room.room_id, |r| {
				r.members.values().filter(|m| **m == palisade_store::Membership::Join).count()
			})
			.unwrap_or(0);
		let invited_count = services
			.store
			.with_room(&room.room_id, |r| {
				r.members.values().filter(|m| **m == palisade_store::Membership::Invite).count()
			})
			.unwrap_or(0);

		join.insert(room.room_id.to_string(), json!({
			"timeline": { "events": timeline_events, "limited": false },
			"state": { "events": state_events },
			"ephemeral": { "events": ephemeral },
			"account_data": { "events": account_data_events(&room.account_data) },
			"summary": {
				"m.heroes": heroes(&services, &room.room_id, &auth.user_id),
				"m.joined_member_count": joined_count,
				"m.invited_member_count": invited_count,
			},
			"unread_notifications": { "highlight_count": 0, "notification_count": 0 },
		}));
	}

	let mut invite = serde_json::Map::new();
	for room_id in &response.invited {
		let invite_state: Vec<Value> = services
			.store
			.with_room(room_id, |room| room.state.values().cloned().collect::<Vec<_>>())
			.unwrap_or_default()
			.into_iter()
			.filter_map(|event_id| services.store.get_event(&event_id))
			.map(|e| stripped_state(&e))
			.collect();

		invite.insert(room_id.to_string(), json!({
			"invite_state": { "events": invite_state },
		}));
	}

	Ok(axum::Json(json!({
		"next_batch": response.next_batch,
		"rooms": { "join": join, "invite": invite, "leave": {} },
		"account_data": { "events": account_data_events(&response.account_data) },
		"presence": { "events": [] },
		"to_device": { "events": [] },
	})))
}

fn account_data_events(data: &HashMap<String, Value>) -> Vec<Value> {
	data.iter()
		.map(|(event_type, content)| json!({ "type": event_type, "content": content }))
		.collect()
}
