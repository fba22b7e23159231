use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use palisade_core::{
	Config, Error, Result,
	config::UserConfig,
	ids::{MEDIA_ID_LENGTH, TOKEN_LENGTH, random_string},
	time::millis_since_unix_epoch,
};
use ruma::{
	OwnedDeviceId, OwnedEventId, OwnedMxcUri, OwnedRoomAliasId, OwnedRoomId, OwnedServerName,
	OwnedUserId, RoomAliasId, RoomId, ServerName, UserId,
};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::model::{AccountDataItem, Device, Event, MediaItem, Membership, Receipt, Room, Seq, User};
use crate::notifier::Notifier;

#[derive(Default)]
struct Inner {
	seq: Seq,
	users: HashMap<String, User>,
	tokens: HashMap<String, (OwnedUserId, OwnedDeviceId)>,
	rooms: HashMap<OwnedRoomId, Room>,
	events: HashMap<OwnedEventId, Event>,
	aliases: HashMap<OwnedRoomAliasId, OwnedRoomId>,
	account_data_global: HashMap<OwnedUserId, HashMap<String, AccountDataItem>>,
	account_data_room: HashMap<(OwnedUserId, OwnedRoomId), HashMap<String, AccountDataItem>>,
	media: HashMap<String, MediaItem>,
	notifier: Notifier,
}

/// The entire homeserver's in-memory state behind a single coarse mutex.
/// Acceptable at the scale this server targets; a real concurrent
/// implementation would shard this the way a conduit-family `KeyValueDatabase`
/// shards across column families, but a single `Mutex` is simplest-correct
/// here and is explicitly permitted.
pub struct Store {
	inner: Mutex<Inner>,
	pub server_name: OwnedServerName,
}

impl Store {
	pub fn new(server_name: OwnedServerName, users: Vec<UserConfig>) -> Result<Arc<Self>> {
		let mut inner = Inner::default();
		for u in users {
			inner.users.insert(u.localpart.clone(), User {
				localpart: u.localpart,
				password: u.password,
				display_name: u.display_name,
				avatar_url: None,
				devices: HashMap::new(),
			});
		}

		Ok(Arc::new(Self { inner: Mutex::new(inner), server_name }))
	}

	pub fn from_config(config: &Config) -> Result<Arc<Self>> {
		let server_name = ServerName::parse(&config.server_name)
			.map_err(Error::from)?
			.to_owned();
		Self::new(server_name, config.users.clone())
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().expect("store mutex poisoned")
	}

	fn next_seq(inner: &mut Inner) -> Seq {
		inner.seq += 1;
		inner.seq
	}

	#[must_use]
	pub fn current_seq(&self) -> Seq { self.lock().seq }

	// ---- users / auth -------------------------------------------------

	#[must_use]
	pub fn user_id(&self, localpart: &str) -> Result<OwnedUserId> {
		UserId::parse_with_server_name(localpart, &self.server_name).map_err(Error::from)
	}

	pub fn find_user(&self, localpart: &str) -> Option<User> {
		self.lock().users.get(localpart).cloned()
	}

	pub fn verify_password(&self, localpart: &str, password: &str) -> Option<OwnedUserId> {
		let inner = self.lock();
		let user = inner.users.get(localpart)?;
		if user.password == password {
			Some(self.user_id(localpart).ok()?)
		} else {
			None
		}
	}

	pub fn create_device(
		&self,
		user_id: &UserId,
		device_id: Option<OwnedDeviceId>,
		display_name: Option<String>,
	) -> Result<(OwnedDeviceId, String)> {
		let mut inner = self.lock();
		let localpart = user_id.localpart().to_owned();
		let user = inner
			.users
			.get_mut(&localpart)
			.ok_or(Error::Forbidden("unknown user"))?;

		let device_id =
			device_id.unwrap_or_else(|| random_string(10).into());
		let token = random_string(TOKEN_LENGTH);

		user.devices.insert(device_id.clone(), Device {
			device_id: device_id.clone(),
			access_token: token.clone(),
			display_name,
			txn_map: HashMap::new(),
		});

		inner
			.tokens
			.insert(token.clone(), (user_id.to_owned(), device_id.clone()));

		Ok((device_id, token))
	}

	pub fn remove_device(&self, user_id: &UserId, device_id: &OwnedDeviceId) -> Result<()> {
		let mut inner = self.lock();
		let localpart = user_id.localpart().to_owned();
		if let Some(user) = inner.users.get_mut(&localpart) {
			if let Some(device) = user.devices.remove(device_id) {
				inner.tokens.remove(&device.access_token);
			}
		}
		Ok(())
	}

	pub fn device_by_token(&self, token: &str) -> Option<(OwnedUserId, OwnedDeviceId)> {
		self.lock().tokens.get(token).cloned()
	}

	/// Marks `txn_id` as seen for `device_id`, returning the prior event id
	/// if this transaction was already processed (so the caller can replay
	/// the original response instead of creating a duplicate event).
	pub fn check_txn(
		&self,
		user_id: &UserId,
		device_id: &OwnedDeviceId,
		txn_id: &str,
	) -> Option<OwnedEventId> {
		let inner = self.lock();
		inner
			.users
			.get(user_id.localpart())?
			.devices
			.get(device_id)?
			.txn_map
			.get(txn_id)
			.cloned()
	}

	pub fn record_txn(
		&self,
		user_id: &UserId,
		device_id: &OwnedDeviceId,
		txn_id: &str,
		event_id: OwnedEventId,
	) {
		let mut inner = self.lock();
		if let Some(user) = inner.users.get_mut(user_id.localpart()) {
			if let Some(device) = user.devices.get_mut(device_id) {
				device.txn_map.insert(txn_id.to_owned(), event_id);
			}
		}
	}

	pub fn profile(&self, user_id: &UserId) -> Option<(Option<String>, Option<String>)> {
		let inner = self.lock();
		let user = inner.users.get(user_id.localpart())?;
		Some((user.display_name.clone(), user.avatar_url.clone()))
	}

	pub fn set_display_name(&self, user_id: &UserId, display_name: Option<String>) -> Result<()> {
		let mut inner = self.lock();
		let user = inner
			.users
			.get_mut(user_id.localpart())
			.ok_or(Error::NotFound("user not found"))?;
		user.display_name = display_name;
		Ok(())
	}

	pub fn set_avatar_url(&self, user_id: &UserId, avatar_url: Option<String>) -> Result<()> {
		let mut inner = self.lock();
		let user = inner
			.users
			.get_mut(user_id.localpart())
			.ok_or(Error::NotFound("user not found"))?;
		user.avatar_url = avatar_url;
		Ok(())
	}

	// ---- rooms ---------------------------------------------------------

	pub fn create_room(&self, room_id: OwnedRoomId, creator: OwnedUserId) {
		let mut inner = self.lock();
		inner
			.rooms
			.entry(room_id.clone())
			.or_insert_with(|| Room::new(room_id, creator));
	}

	pub fn room_exists(&self, room_id: &RoomId) -> bool {
		self.lock().rooms.contains_key(room_id)
	}

	pub fn with_room<T>(&self, room_id: &RoomId, f: impl FnOnce(&Room) -> T) -> Result<T> {
		let inner = self.lock();
		let room = inner
			.rooms
			.get(room_id)
			.ok_or(Error::NotFound("room not found"))?;
		Ok(f(room))
	}

	pub fn with_room_mut<T>(
		&self,
		room_id: &RoomId,
		f: impl FnOnce(&mut Room) -> T,
	) -> Result<T> {
		let mut inner = self.lock();
		let room = inner
			.rooms
			.get_mut(room_id)
			.ok_or(Error::NotFound("room not found"))?;
		Ok(f(room))
	}

	pub fn public_rooms(&self) -> Vec<OwnedRoomId> {
		self.lock()
			.rooms
			.values()
			.filter(|r| r.published)
			.map(|r| r.room_id.clone())
			.collect()
	}

	// ---- aliases ---------------------------------------------------------

	/// Maps `alias` to `room_id`, per spec §3's "at most one room per alias"
	/// invariant. Fails if the alias already points at a different room.
	pub fn set_alias(&self, alias: OwnedRoomAliasId, room_id: OwnedRoomId) -> Result<()> {
		let mut inner = self.lock();
		if !inner.rooms.contains_key(&room_id) {
			return Err(Error::NotFound("room not found"));
		}
		if let Some(existing) = inner.aliases.get(&alias) {
			if *existing != room_id {
				return Err(Error::Forbidden("alias already in use"));
			}
		}
		inner.aliases.insert(alias, room_id);
		Ok(())
	}

	pub fn resolve_alias(&self, alias: &RoomAliasId) -> Option<OwnedRoomId> {
		self.lock().aliases.get(alias).cloned()
	}

	// ---- notification scopes -----------------------------------------------

	pub fn joined_members(&self, room_id: &RoomId) -> Vec<OwnedUserId> {
		self.lock()
			.rooms
			.get(room_id)
			.map(|r| {
				r.members
					.iter()
					.filter(|(_, m)| **m == Membership::Join)
					.map(|(u, _)| u.clone())
					.collect()
			})
			.unwrap_or_default()
	}

	pub fn joined_or_invited_members(&self, room_id: &RoomId) -> Vec<OwnedUserId> {
		self.lock()
			.rooms
			.get(room_id)
			.map(|r| {
				r.members
					.iter()
					.filter(|(_, m)| matches!(**m, Membership::Join | Membership::Invite))
					.map(|(u, _)| u.clone())
					.collect()
			})
			.unwrap_or_default()
	}

	/// Notifies every joined member of `room_id`. Per spec §4.3's
	/// "send event in room R -> notify every user with membership join".
	pub fn notify_joined(&self, room_id: &RoomId) -> Result<()> {
		let members = self.joined_members(room_id);
		let mut inner = self.lock();
		for member in members {
			inner.notifier.notify(&member);
		}
		Ok(())
	}

	/// Notifies every joined or invited member of `room_id`. Per spec §4.3's
	/// "join/leave/redact in room R -> notify every joined or invited member".
	pub fn notify_joined_or_invited(&self, room_id: &RoomId) -> Result<()> {
		let members = self.joined_or_invited_members(room_id);
		let mut inner = self.lock();
		for member in members {
			inner.notifier.notify(&member);
		}
		Ok(())
	}

	// ---- events ----------------------------------------------------------

	/// Appends a new event to `room_id`'s timeline, advancing the global
	/// sequence counter and, if `state_key` is set, updating resolved room
	/// state. Wakes every member of the room so their long-polling `/sync`
	/// requests observe the new event.
	#[allow(clippy::too_many_arguments)]
	pub fn append_event(
		&self,
		room_id: OwnedRoomId,
		sender: OwnedUserId,
		event_type: String,
		state_key: Option<String>,
		content: Value,
		redacts: Option<OwnedEventId>,
	) -> Result<OwnedEventId> {
		let mut inner = self.lock();

		if !inner.rooms.contains_key(&room_id) {
			return Err(Error::NotFound("room not found"));
		}

		let seq = Self::next_seq(&mut inner);
		let event_id = ruma::EventId::new(&self.server_name);

		let event = Event {
			event_id: event_id.clone(),
			room_id: room_id.clone(),
			sender,
			event_type: event_type.clone(),
			state_key: state_key.clone(),
			content,
			origin_server_ts: millis_since_unix_epoch(),
			seq,
			redacts,
			redacted_because: None,
		};

		inner.events.insert(event_id.clone(), event);

		let room = inner.rooms.get_mut(&room_id).expect("checked above");
		room.timeline.push(event_id.clone());
		if let Some(state_key) = state_key {
			room.state.insert((event_type, state_key), event_id.clone());
		}

		Ok(event_id)
	}

	pub fn set_membership(&self, room_id: &RoomId, user_id: OwnedUserId, membership: Membership) -> Result<()> {
		let mut inner = self.lock();
		let room = inner
			.rooms
			.get_mut(room_id)
			.ok_or(Error::NotFound("room not found"))?;
		room.members.insert(user_id.clone(), membership);
		inner.notifier.notify(&user_id);
		Ok(())
	}

	pub fn notify_user(&self, user_id: &OwnedUserId) { self.lock().notifier.notify(user_id); }

	pub fn get_event(&self, event_id: &OwnedEventId) -> Option<Event> {
		self.lock().events.get(event_id).cloned()
	}

	pub fn get_state_event(&self, room_id: &RoomId, event_type: &str, state_key: &str) -> Option<Event> {
		let inner = self.lock();
		let room = inner.rooms.get(room_id)?;
		let event_id = room
			.state
			.get(&(event_type.to_owned(), state_key.to_owned()))?;
		inner.events.get(event_id).cloned()
	}

	pub fn redact_event(&self, event_id: &OwnedEventId, redaction_id: OwnedEventId) -> Result<()> {
		let mut inner = self.lock();
		let event = inner
			.events
			.get_mut(event_id)
			.ok_or(Error::NotFound("event not found"))?;
		event.content = serde_json::json!({});
		event.redacted_because = Some(redaction_id);
		Ok(())
	}

	pub fn joined_rooms(&self, user_id: &UserId) -> Vec<OwnedRoomId> {
		self.lock()
			.rooms
			.values()
			.filter(|r| r.membership(user_id) == Some(Membership::Join))
			.map(|r| r.room_id.clone())
			.collect()
	}

	pub fn invited_rooms(&self, user_id: &UserId) -> Vec<OwnedRoomId> {
		self.lock()
			.rooms
			.values()
			.filter(|r| r.membership(user_id) == Some(Membership::Invite))
			.map(|r| r.room_id.clone())
			.collect()
	}

	pub fn events_since(&self, room_id: &RoomId, since: Seq) -> Vec<Event> {
		let inner = self.lock();
		let Some(room) = inner.rooms.get(room_id) else { return Vec::new() };
		room.timeline
			.iter()
			.filter_map(|id| inner.events.get(id))
			.filter(|e| e.seq > since)
			.cloned()
			.collect()
	}

	pub fn set_receipt(
		&self,
		room_id: &RoomId,
		user_id: OwnedUserId,
		receipt_type: String,
		event_id: OwnedEventId,
	) -> Result<()> {
		let mut inner = self.lock();
		Self::next_seq(&mut inner);
		let room = inner
			.rooms
			.get_mut(room_id)
			.ok_or(Error::NotFound("room not found"))?;
		room.receipts.insert(
			(user_id, receipt_type.clone()),
			Receipt { event_id, receipt_type, ts: millis_since_unix_epoch() },
		);
		Ok(())
	}

	pub fn room_receipts(&self, room_id: &RoomId) -> HashMap<(OwnedUserId, String), Receipt> {
		self.lock()
			.rooms
			.get(room_id)
			.map(|r| r.receipts.clone())
			.unwrap_or_default()
	}

	// ---- account data ----------------------------------------------------

	pub fn set_global_account_data(&self, user_id: OwnedUserId, event_type: String, content: Value) {
		let mut inner = self.lock();
		let seq = Self::next_seq(&mut inner);
		inner
			.account_data_global
			.entry(user_id.clone())
			.or_default()
			.insert(event_type, AccountDataItem { content, seq });
		inner.notifier.notify(&user_id);
	}

	pub fn global_account_data(&self, user_id: &UserId) -> HashMap<String, Value> {
		self.lock()
			.account_data_global
			.get(user_id)
			.map(|items| items.iter().map(|(k, v)| (k.clone(), v.content.clone())).collect())
			.unwrap_or_default()
	}

	/// For incremental sync: only the entries set since `since_seq`, per
	/// spec §4.1's documented `account_data_since` operation.
	pub fn global_account_data_since(&self, user_id: &UserId, since: Seq) -> HashMap<String, Value> {
		self.lock()
			.account_data_global
			.get(user_id)
			.map(|items| {
				items
					.iter()
					.filter(|(_, v)| v.seq > since)
					.map(|(k, v)| (k.clone(), v.content.clone()))
					.collect()
			})
			.unwrap_or_default()
	}

	pub fn set_room_account_data(
		&self,
		user_id: OwnedUserId,
		room_id: OwnedRoomId,
		event_type: String,
		content: Value,
	) {
		let mut inner = self.lock();
		let seq = Self::next_seq(&mut inner);
		inner
			.account_data_room
			.entry((user_id.clone(), room_id))
			.or_default()
			.insert(event_type, AccountDataItem { content, seq });
		inner.notifier.notify(&user_id);
	}

	pub fn room_account_data(&self, user_id: &UserId, room_id: &RoomId) -> HashMap<String, Value> {
		self.lock()
			.account_data_room
			.get(&(user_id.to_owned(), room_id.to_owned()))
			.map(|items| items.iter().map(|(k, v)| (k.clone(), v.content.clone())).collect())
			.unwrap_or_default()
	}

	pub fn room_account_data_since(
		&self,
		user_id: &UserId,
		room_id: &RoomId,
		since: Seq,
	) -> HashMap<String, Value> {
		self.lock()
			.account_data_room
			.get(&(user_id.to_owned(), room_id.to_owned()))
			.map(|items| {
				items
					.iter()
					.filter(|(_, v)| v.seq > since)
					.map(|(k, v)| (k.clone(), v.content.clone()))
					.collect()
			})
			.unwrap_or_default()
	}

	// ---- media -------------------------------------------------------------

	pub fn create_media(
		&self,
		content_type: Option<String>,
		filename: Option<String>,
		bytes: Vec<u8>,
	) -> OwnedMxcUri {
		let media_id = random_string(MEDIA_ID_LENGTH);
		let mxc: OwnedMxcUri = format!("mxc://{}/{media_id}", self.server_name)
			.try_into()
			.expect("server_name and media_id are both valid mxc segments");

		self.lock().media.insert(media_id, MediaItem {
			mxc: mxc.clone(),
			content_type,
			filename,
			bytes,
		});

		mxc
	}

	pub fn get_media(&self, media_id: &str) -> Option<MediaItem> {
		self.lock().media.get(media_id).cloned()
	}

	// ---- sync waiting ----------------------------------------------------

	pub fn register_waiter(&self, user_id: &OwnedUserId) -> oneshot::Receiver<()> {
		self.lock().notifier.register(user_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn server() -> Arc<Store> {
		let server_name = ServerName::parse("example.invalid").unwrap().to_owned();
		let users = vec![UserConfig {
			localpart: "alice".to_owned(),
			password: "secret".to_owned(),
			display_name: None,
		}];
		Store::new(server_name, users).unwrap()
	}

	#[test]
	fn verify_password_rejects_wrong_password() {
		let store = server();
		assert!(store.verify_password("alice", "wrong").is_none());
		assert!(store.verify_password("alice", "secret").is_some());
	}

	#[test]
	fn create_device_registers_a_usable_token() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let (device_id, token) = store.create_device(&user_id, None, None).unwrap();
		let (found_user, found_device) = store.device_by_token(&token).unwrap();
		assert_eq!(found_user, user_id);
		assert_eq!(found_device, device_id);
	}

	#[test]
	fn append_event_advances_sequence_and_updates_state() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let room_id = RoomId::new(&store.server_name);
		store.create_room(room_id.clone(), user_id.clone());
		store.set_membership(&room_id, user_id.clone(), Membership::Join).unwrap();

		let before = store.current_seq();
		let event_id = store
			.append_event(
				room_id.clone(),
				user_id,
				"m.room.name".to_owned(),
				Some(String::new()),
				serde_json::json!({ "name": "hi" }),
				None,
			)
			.unwrap();

		assert!(store.current_seq() > before);
		let state_event = store
			.get_state_event(&room_id, "m.room.name", "")
			.expect("state indexed");
		assert_eq!(state_event.event_id, event_id);
	}

	#[test]
	fn txn_dedup_returns_the_original_event_id() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let (device_id, _token) = store.create_device(&user_id, None, None).unwrap();
		assert!(store.check_txn(&user_id, &device_id, "txn1").is_none());

		let event_id = ruma::EventId::new(&store.server_name);
		store.record_txn(&user_id, &device_id, "txn1", event_id.clone());
		assert_eq!(store.check_txn(&user_id, &device_id, "txn1"), Some(event_id));
	}

	#[test]
	fn redact_event_clears_content_and_records_redaction() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let room_id = RoomId::new(&store.server_name);
		store.create_room(room_id.clone(), user_id.clone());
		store.set_membership(&room_id, user_id.clone(), Membership::Join).unwrap();

		let event_id = store
			.append_event(
				room_id,
				user_id,
				"m.room.message".to_owned(),
				None,
				serde_json::json!({ "body": "secret" }),
				None,
			)
			.unwrap();

		let redaction_id = ruma::EventId::new(&store.server_name);
		store.redact_event(&event_id, redaction_id.clone()).unwrap();

		let redacted = store.get_event(&event_id).unwrap();
		assert_eq!(redacted.content, serde_json::json!({}));
		assert_eq!(redacted.redacted_because, Some(redaction_id));
	}

	#[test]
	fn set_global_account_data_advances_sequence() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let before = store.current_seq();
		store.set_global_account_data(user_id.clone(), "m.push_rules".to_owned(), serde_json::json!({}));
		assert!(store.current_seq() > before);
		assert!(store.global_account_data(&user_id).contains_key("m.push_rules"));
	}

	#[test]
	fn global_account_data_since_only_reports_entries_set_after_the_cursor() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		store.set_global_account_data(user_id.clone(), "m.push_rules".to_owned(), serde_json::json!({}));
		let cursor = store.current_seq();
		store.set_global_account_data(user_id.clone(), "m.direct".to_owned(), serde_json::json!({}));

		let since = store.global_account_data_since(&user_id, cursor);
		assert!(!since.contains_key("m.push_rules"));
		assert!(since.contains_key("m.direct"));
	}

	#[test]
	fn alias_resolves_to_its_room_and_rejects_reassignment() {
		let store = server();
		let user_id = store.user_id("alice").unwrap();
		let room_id = RoomId::new(&store.server_name);
		let other_room_id = RoomId::new(&store.server_name);
		store.create_room(room_id.clone(), user_id.clone());
		store.create_room(other_room_id.clone(), user_id);

		let alias_string = format!("#room:{}", store.server_name);
		let alias = ruma::RoomAliasId::parse(&alias_string).unwrap();
		store.set_alias(alias.to_owned(), room_id.clone()).unwrap();
		assert_eq!(store.resolve_alias(alias), Some(room_id));

		assert!(store.set_alias(alias.to_owned(), other_room_id).is_err());
	}

	#[test]
	fn notify_joined_skips_invited_and_banned_members() {
		let store = server();
		let alice = store.user_id("alice").unwrap();
		let room_id = RoomId::new(&store.server_name);
		store.create_room(room_id.clone(), alice.clone());
		store.set_membership(&room_id, alice.clone(), Membership::Join).unwrap();

		let bob = UserId::parse_with_server_name("bob", &store.server_name).unwrap();
		store.set_membership(&room_id, bob.clone(), Membership::Ban).unwrap();

		assert_eq!(store.joined_members(&room_id), vec![alice]);
		assert!(store.notify_joined(&room_id).is_ok());
	}
}
