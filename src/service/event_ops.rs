use std::sync::Arc;

use palisade_core::Error;
use palisade_core::Result;
use palisade_store::{Event, Membership};
use ruma::{OwnedDeviceId, OwnedEventId, OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde_json::Value;

/// Sending, reading and redacting room events. Grounded in a conduit-family
/// `PduBuilder`/`build_and_append_pdu` path and the dedicated
/// `redact_event_route`.
pub struct EventOps {
	store: Arc<palisade_store::Store>,
}

impl EventOps {
	#[must_use]
	pub fn new(store: Arc<palisade_store::Store>) -> Self { Self { store } }

	fn require_joined(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
		let joined = self
			.store
			.with_room(room_id, |room| room.membership(user_id) == Some(Membership::Join))?;
		if joined {
			Ok(())
		} else {
			Err(Error::Forbidden("not joined to this room"))
		}
	}

	/// `PUT /rooms/{roomId}/send/{eventType}/{txnId}`. Sender membership is
	/// checked before the txn-id dedup lookup, so a replayed transaction from
	/// a sender who has since been kicked or banned still fails `M_FORBIDDEN`
	/// rather than silently succeeding off a stale dedup entry. Dedup is
	/// keyed on `(device_id, txn_id)`, never a module-level map, so a retried
	/// request from the same device replays the original event id instead of
	/// creating a duplicate event.
	pub fn send_message(
		&self,
		room_id: &OwnedRoomId,
		sender: &OwnedUserId,
		device_id: &OwnedDeviceId,
		txn_id: &str,
		event_type: String,
		content: Value,
	) -> Result<OwnedEventId> {
		self.require_joined(room_id, sender)?;

		if let Some(event_id) = self.store.check_txn(sender, device_id, txn_id) {
			return Ok(event_id);
		}

		let event_id = self.store.append_event(
			room_id.clone(),
			sender.clone(),
			event_type,
			None,
			content,
			None,
		)?;

		self.store
			.record_txn(sender, device_id, txn_id, event_id.clone());
		self.store.notify_joined(room_id)?;

		Ok(event_id)
	}

	/// `PUT /rooms/{roomId}/state/{eventType}/{stateKey}`.
	pub fn send_state(
		&self,
		room_id: &OwnedRoomId,
		sender: &OwnedUserId,
		event_type: String,
		state_key: String,
		content: Value,
	) -> Result<OwnedEventId> {
		self.require_joined(room_id, sender)?;

		let event_id = self.store.append_event(
			room_id.clone(),
			sender.clone(),
			event_type,
			Some(state_key),
			content,
			None,
		)?;
		self.store.notify_joined(room_id)?;
		Ok(event_id)
	}

	pub fn get_event(&self, room_id: &RoomId, event_id: &OwnedEventId) -> Result<Event> {
		let event = self
			.store
			.get_event(event_id)
			.ok_or(Error::NotFound("event not found"))?;
		if event.room_id != room_id {
			return Err(Error::NotFound("event not found"));
		}
		Ok(event)
	}

	pub fn get_state(&self, room_id: &RoomId, event_type: &str, state_key: &str) -> Result<Event> {
		self.store
			.get_state_event(room_id, event_type, state_key)
			.ok_or(Error::NotFound("state event not found"))
	}

	/// `POST /rooms/{roomId}/redact/{eventId}/{txnId}`: appends an
	/// `m.room.redaction` event and clears the target event's content.
	pub fn redact(
		&self,
		room_id: &OwnedRoomId,
		sender: &OwnedUserId,
		target: &OwnedEventId,
		reason: Option<String>,
	) -> Result<OwnedEventId> {
		self.require_joined(room_id, sender)?;

		let target_event = self
			.store
			.get_event(target)
			.ok_or(Error::NotFound("event not found"))?;
		if &target_event.room_id != room_id {
			return Err(Error::NotFound("event not found"));
		}

		let content = match reason {
			| Some(reason) => serde_json::json!({ "reason": reason }),
			| None => serde_json::json!({}),
		};

		let redaction_id = self.store.append_event(
			room_id.clone(),
			sender.clone(),
			"m.room.redaction".to_owned(),
			None,
			content,
			Some(target.clone()),
		)?;

		self.store.redact_event(target, redaction_id.clone())?;
		self.store.notify_joined_or_invited(room_id)?;

		Ok(redaction_id)
	}
}

#[cfg(test)]
mod tests {
	use palisade_core::config::UserConfig;
	use palisade_store::Store;

	use super::*;

	fn room_with_member() -> (Arc<Store>, OwnedRoomId, OwnedUserId, OwnedDeviceId) {
		let server_name = ruma::ServerName::parse("example.invalid").unwrap().to_owned();
		let users = vec![UserConfig {
			localpart: "alice".to_owned(),
			password: "x".to_owned(),
			display_name: None,
		}];
		let store = Store::new(server_name, users).unwrap();
		let user_id = store.user_id("alice").unwrap();
		let (device_id, _token) = store.create_device(&user_id, None, None).unwrap();

		let room_id: OwnedRoomId = RoomId::new(&store.server_name).into();
		store.create_room(room_id.clone(), user_id.clone());
		store.set_membership(&room_id, user_id.clone(), Membership::Join).unwrap();

		(store, room_id, user_id, device_id)
	}

	#[test]
	fn send_message_requires_membership() {
		let (store, room_id, _user_id, device_id) = room_with_member();
		let event_ops = EventOps::new(store.clone());
		let stranger = store.user_id("stranger-not-a-user").unwrap();

		let result = event_ops.send_message(
			&room_id,
			&stranger,
			&device_id,
			"txn1",
			"m.room.message".to_owned(),
			serde_json::json!({ "body": "hi" }),
		);
		assert!(matches!(result, Err(Error::Forbidden(_))));
	}

	#[test]
	fn repeated_txn_id_replays_the_same_event() {
		let (store, room_id, user_id, device_id) = room_with_member();
		let event_ops = EventOps::new(store);

		let first = event_ops
			.send_message(
				&room_id,
				&user_id,
				&device_id,
				"txn1",
				"m.room.message".to_owned(),
				serde_json::json!({ "body": "hi" }),
			)
			.unwrap();
		let second = event_ops
			.send_message(
				&room_id,
				&user_id,
				&device_id,
				"txn1",
				"m.room.message".to_owned(),
				serde_json::json!({ "body": "a different body" }),
			)
			.unwrap();

		assert_eq!(first, second);
	}

	#[test]
	fn redact_clears_content_via_event_ops() {
		let (store, room_id, user_id, device_id) = room_with_member();
		let event_ops = EventOps::new(store);

		let event_id = event_ops
			.send_message(
				&room_id,
				&user_id,
				&device_id,
				"txn1",
				"m.room.message".to_owned(),
				serde_json::json!({ "body": "secret" }),
			)
			.unwrap();

		event_ops
			.redact(&room_id, &user_id, &event_id, Some("spam".to_owned()))
			.unwrap();

		let event = event_ops.get_event(&room_id, &event_id).unwrap();
		assert_eq!(event.content, serde_json::json!({}));
		assert!(event.redacted_because.is_some());
	}
}
