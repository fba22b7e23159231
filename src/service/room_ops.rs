use std::sync::Arc;

use palisade_core::{Error, Result};
use palisade_store::{Membership, Store};
use ruma::{OwnedRoomAliasId, OwnedRoomId, OwnedUserId, RoomAliasId, RoomId, UserId};
use serde_json::{Value, json};

const DEFAULT_POWER_LEVEL: i64 = 0;
const CREATOR_POWER_LEVEL: i64 = 100;
const DEFAULT_KICK_LEVEL: i64 = 50;
const DEFAULT_BAN_LEVEL: i64 = 50;
const DEFAULT_STATE_LEVEL: i64 = 50;
const DEFAULT_REDACT_LEVEL: i64 = 50;
const DEFAULT_INVITE_LEVEL: i64 = 0;
const DEFAULT_EVENTS_LEVEL: i64 = 0;
const ROOM_VERSION: &str = "10";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
	PrivateChat,
	PublicChat,
	TrustedPrivateChat,
}

/// One entry of a `createRoom` body's `initial_state` array: `(event_type,
/// state_key, content)`.
pub type InitialStateEvent = (String, String, Value);

pub struct CreateRoomRequest {
	pub creator: OwnedUserId,
	pub preset: Preset,
	pub name: Option<String>,
	pub topic: Option<String>,
	pub visibility_public: bool,
	pub invite: Vec<OwnedUserId>,
	pub is_direct: bool,
	pub room_alias_name: Option<String>,
	pub initial_state: Vec<InitialStateEvent>,
	pub creation_content: Option<Value>,
	pub power_level_content_override: Option<Value>,
}

/// Overwrites top-level keys of `base` with any object-valued keys present in
/// `override_content`, matching a conduit-family `power_level_content_override`
/// merge.
fn merge_override(mut base: Value, override_content: Option<&Value>) -> Value {
	if let Some(Value::Object(overrides)) = override_content {
		let Value::Object(base_map) = &mut base else { return base };
		for (key, value) in overrides {
			base_map.insert(key.clone(), value.clone());
		}
	}
	base
}

/// Room lifecycle: creation, the join-rules/guest-access/history-visibility
/// state sequence a fresh room needs, membership transitions, and the public
/// room directory. Grounded in a conduit-family `create_room_route`'s
/// ordered sequence of state events and `service/rooms/directory`.
pub struct RoomOps {
	store: Arc<Store>,
}

impl RoomOps {
	#[must_use]
	pub fn new(store: Arc<Store>) -> Self { Self { store } }

	/// Creates a room and appends, in order: `m.room.create`, the creator's
	/// own `m.room.member: join`, `m.room.power_levels`, the canonical alias
	/// (if one was requested), `m.room.join_rules`, `m.room.history_visibility`,
	/// `m.room.guest_access`, the caller's `initial_state` events, then
	/// optional `m.room.name`/`m.room.topic`, then one `m.room.member: invite`
	/// per invitee — the same ordered sequence a conduit-family homeserver
	/// uses.
	pub fn create_room(&self, req: CreateRoomRequest) -> Result<OwnedRoomId> {
		let room_id = ruma::RoomId::new(&self.store.server_name);
		self.store.create_room(room_id.clone(), req.creator.clone());
		self.store
			.with_room_mut(&room_id, |room| room.published = req.visibility_public)?;

		let append = |event_type: &str, state_key: &str, content: Value| {
			self.store.append_event(
				room_id.clone(),
				req.creator.clone(),
				event_type.to_owned(),
				Some(state_key.to_owned()),
				content,
				None,
			)
		};

		let create_content = merge_override(
			json!({ "creator": req.creator, "room_version": ROOM_VERSION }),
			req.creation_content.as_ref(),
		);
		append("m.room.create", "", create_content)?;

		self.store
			.set_membership(&room_id, req.creator.clone(), Membership::Join)?;
		append(
			"m.room.member",
			req.creator.as_str(),
			json!({ "membership": "join" }),
		)?;

		let mut users = serde_json::Map::new();
		users.insert(req.creator.as_str().to_owned(), json!(CREATOR_POWER_LEVEL));
		if req.preset == Preset::TrustedPrivateChat {
			for invitee in &req.invite {
				users.insert(invitee.as_str().to_owned(), json!(CREATOR_POWER_LEVEL));
			}
		}
		let power_levels_content = merge_override(
			json!({
				"users": Value::Object(users),
				"users_default": DEFAULT_POWER_LEVEL,
				"events_default": DEFAULT_EVENTS_LEVEL,
				"state_default": DEFAULT_STATE_LEVEL,
				"redact": DEFAULT_REDACT_LEVEL,
				"invite": DEFAULT_INVITE_LEVEL,
				"kick": DEFAULT_KICK_LEVEL,
				"ban": DEFAULT_BAN_LEVEL,
			}),
			req.power_level_content_override.as_ref(),
		);
		append("m.room.power_levels", "", power_levels_content)?;

		if let Some(local_alias) = &req.room_alias_name {
			let alias_string = format!("#{}:{}", local_alias, self.store.server_name);
			let alias: OwnedRoomAliasId = RoomAliasId::parse(&alias_string)
				.map(Into::into)
				.map_err(|_| Error::BadJson("invalid room_alias_name".to_owned()))?;
			self.store.set_alias(alias.clone(), room_id.clone())?;
			append(
				"m.room.canonical_alias",
				"",
				json!({ "alias": alias.as_str() }),
			)?;
		}

		let (join_rule, guest_access) = match req.preset {
			| Preset::PublicChat => ("public", "forbidden"),
			| Preset::PrivateChat | Preset::TrustedPrivateChat => ("invite", "can_join"),
		};
		append("m.room.join_rules", "", json!({ "join_rule": join_rule }))?;
		append(
			"m.room.history_visibility",
			"",
			json!({ "history_visibility": "shared" }),
		)?;
		append("m.room.guest_access", "", json!({ "guest_access": guest_access }))?;

		for (event_type, state_key, content) in &req.initial_state {
			append(event_type, state_key, content.clone())?;
		}

		if let Some(name) = &req.name {
			append("m.room.name", "", json!({ "name": name }))?;
		}
		if let Some(topic) = &req.topic {
			append("m.room.topic", "", json!({ "topic": topic }))?;
		}

		for invitee in &req.invite {
			self.invite_inner(&room_id, &req.creator, invitee, req.is_direct)?;
		}

		self.store.notify_user(&req.creator);

		Ok(room_id)
	}

	fn power_level(&self, room_id: &RoomId, user_id: &UserId) -> Result<i64> {
		let pl = self.store.get_state_event(room_id, "m.room.power_levels", "");
		let Some(pl) = pl else { return Ok(DEFAULT_POWER_LEVEL) };

		let users = pl.content.get("users").and_then(Value::as_object);
		if let Some(level) = users.and_then(|u| u.get(user_id.as_str())).and_then(Value::as_i64) {
			return Ok(level);
		}
		Ok(pl
			.content
			.get("users_default")
			.and_then(Value::as_i64)
			.unwrap_or(DEFAULT_POWER_LEVEL))
	}

	fn required_level(&self, room_id: &RoomId, key: &str, default: i64) -> Result<i64> {
		let pl = self.store.get_state_event(room_id, "m.room.power_levels", "");
		Ok(pl
			.and_then(|e| e.content.get(key).and_then(Value::as_i64))
			.unwrap_or(default))
	}

	fn member_event(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &UserId, membership: &'static str) -> Result<()> {
		self.store.append_event(
			room_id.clone(),
			sender.clone(),
			"m.room.member".to_owned(),
			Some(target.as_str().to_owned()),
			json!({ "membership": membership }),
			None,
		)?;
		Ok(())
	}

	fn invite_inner(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &OwnedUserId, is_direct: bool) -> Result<()> {
		self.store
			.set_membership(room_id, target.clone(), Membership::Invite)?;
		self.store.append_event(
			room_id.clone(),
			sender.clone(),
			"m.room.member".to_owned(),
			Some(target.as_str().to_owned()),
			json!({ "membership": "invite", "is_direct": is_direct }),
			None,
		)?;
		self.store.notify_user(target);
		Ok(())
	}

	/// `POST /rooms/{roomId}/invite`: notifies only the invited user, per
	/// "invite user U to room R -> notify U (the target) only".
	pub fn invite(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &OwnedUserId) -> Result<()> {
		self.invite_inner(room_id, sender, target, false)
	}

	/// Idempotent: a user already joined gets success with no new member
	/// event, per the round-trip law that joining twice does not mutate
	/// state.
	pub fn join(&self, room_id: &OwnedRoomId, user_id: &OwnedUserId) -> Result<()> {
		let membership = self
			.store
			.with_room(room_id, |room| room.membership(user_id))?;

		if membership == Some(Membership::Join) {
			return Ok(());
		}
		if membership == Some(Membership::Ban) {
			return Err(Error::Forbidden("banned from this room"));
		}

		if membership != Some(Membership::Invite) {
			let public = self
				.store
				.get_state_event(room_id, "m.room.join_rules", "")
				.and_then(|e| e.content.get("join_rule").and_then(Value::as_str).map(str::to_owned))
				.is_some_and(|rule| rule == "public");
			if !public {
				return Err(Error::Forbidden("room is not public and no invite exists"));
			}
		}

		self.store
			.set_membership(room_id, user_id.clone(), Membership::Join)?;
		self.member_event(room_id, user_id, user_id, "join")?;
		self.store.notify_joined_or_invited(room_id)?;
		Ok(())
	}

	/// For every room where `user_id` is joined, appends a fresh
	/// `m.room.member` state event carrying the updated display name/avatar,
	/// preserving other fields, and notifies every joined member.
	pub fn update_profile(
		&self,
		user_id: &OwnedUserId,
		display_name: Option<String>,
		avatar_url: Option<String>,
	) -> Result<()> {
		for room_id in self.store.joined_rooms(user_id) {
			self.store.append_event(
				room_id.clone(),
				user_id.clone(),
				"m.room.member".to_owned(),
				Some(user_id.as_str().to_owned()),
				json!({
					"membership": "join",
					"displayname": display_name,
					"avatar_url": avatar_url,
				}),
				None,
			)?;
			self.store.notify_joined(&room_id)?;
		}
		Ok(())
	}

	pub fn leave(&self, room_id: &OwnedRoomId, user_id: &OwnedUserId) -> Result<()> {
		let membership = self
			.store
			.with_room(room_id, |room| room.membership(user_id))?;
		if !matches!(membership, Some(Membership::Join) | Some(Membership::Invite)) {
			return Err(Error::Forbidden("not a member of this room"));
		}

		self.store
			.set_membership(room_id, user_id.clone(), Membership::Leave)?;
		self.member_event(room_id, user_id, user_id, "leave")?;
		self.store.notify_joined_or_invited(room_id)?;
		self.store.notify_user(user_id);
		Ok(())
	}

	pub fn kick(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &OwnedUserId) -> Result<()> {
		let required = self.required_level(room_id, "kick", DEFAULT_KICK_LEVEL)?;
		if self.power_level(room_id, sender)? < required {
			return Err(Error::Forbidden("insufficient power level to kick"));
		}

		self.store
			.set_membership(room_id, target.clone(), Membership::Leave)?;
		self.member_event(room_id, sender, target, "leave")?;
		self.store.notify_joined_or_invited(room_id)?;
		self.store.notify_user(target);
		Ok(())
	}

	pub fn ban(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &OwnedUserId) -> Result<()> {
		let required = self.required_level(room_id, "ban", DEFAULT_BAN_LEVEL)?;
		if self.power_level(room_id, sender)? < required {
			return Err(Error::Forbidden("insufficient power level to ban"));
		}

		self.store
			.set_membership(room_id, target.clone(), Membership::Ban)?;
		self.member_event(room_id, sender, target, "ban")?;
		self.store.notify_joined_or_invited(room_id)?;
		self.store.notify_user(target);
		Ok(())
	}

	pub fn unban(&self, room_id: &OwnedRoomId, sender: &OwnedUserId, target: &OwnedUserId) -> Result<()> {
		let membership = self
			.store
			.with_room(room_id, |room| room.membership(target))?;
		if membership != Some(Membership::Ban) {
			return Err(Error::Forbidden("target is not banned"));
		}

		let required = self.required_level(room_id, "ban", DEFAULT_BAN_LEVEL)?;
		if self.power_level(room_id, sender)? < required {
			return Err(Error::Forbidden("insufficient power level to unban"));
		}

		self.store
			.set_membership(room_id, target.clone(), Membership::Leave)?;
		self.member_event(room_id, sender, target, "leave")?;
		self.store.notify_joined_or_invited(room_id)?;
		self.store.notify_user(target);
		Ok(())
	}

	pub fn set_visibility(&self, room_id: &OwnedRoomId, published: bool) -> Result<()> {
		self.store.with_room_mut(room_id, |room| room.published = published)
	}

	pub fn visibility(&self, room_id: &OwnedRoomId) -> Result<bool> {
		self.store.with_room(room_id, |room| room.published)
	}

	pub fn public_rooms(&self) -> Vec<OwnedRoomId> { self.store.public_rooms() }
}

#[cfg(test)]
mod tests {
	use palisade_core::config::UserConfig;

	use super::*;

	fn store() -> Arc<Store> {
		let server_name = ruma::ServerName::parse("example.invalid").unwrap().to_owned();
		let users = vec![
			UserConfig { localpart: "alice".to_owned(), password: "x".to_owned(), display_name: None },
			UserConfig { localpart: "bob".to_owned(), password: "x".to_owned(), display_name: None },
		];
		Store::new(server_name, users).unwrap()
	}

	#[test]
	fn create_room_joins_the_creator_with_full_power() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator: creator.clone(),
				preset: Preset::PrivateChat,
				name: Some("Test Room".to_owned()),
				topic: None,
				visibility_public: false,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		assert_eq!(
			store.with_room(&room_id, |room| room.membership(&creator)).unwrap(),
			Some(Membership::Join)
		);
		assert_eq!(room_ops.power_level(&room_id, &creator).unwrap(), CREATOR_POWER_LEVEL);
	}

	#[test]
	fn public_chat_join_rule_allows_uninvited_join() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();
		let bob = store.user_id("bob").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator,
				preset: Preset::PublicChat,
				name: None,
				topic: None,
				visibility_public: true,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		room_ops.join(&room_id, &bob).unwrap();
		assert_eq!(store.with_room(&room_id, |room| room.membership(&bob)).unwrap(), Some(Membership::Join));
	}

	#[test]
	fn private_chat_join_without_invite_is_forbidden() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();
		let bob = store.user_id("bob").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator,
				preset: Preset::PrivateChat,
				name: None,
				topic: None,
				visibility_public: false,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		assert!(matches!(room_ops.join(&room_id, &bob), Err(Error::Forbidden(_))));
	}

	#[test]
	fn kick_requires_sufficient_power_level() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();
		let bob = store.user_id("bob").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator: creator.clone(),
				preset: Preset::PublicChat,
				name: None,
				topic: None,
				visibility_public: true,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		room_ops.join(&room_id, &bob).unwrap();
		// bob has the default (0) power level and cannot kick the creator.
		assert!(matches!(room_ops.kick(&room_id, &bob, &creator), Err(Error::Forbidden(_))));

		room_ops.kick(&room_id, &creator, &bob).unwrap();
		assert_eq!(store.with_room(&room_id, |room| room.membership(&bob)).unwrap(), Some(Membership::Leave));
	}

	#[test]
	fn ban_then_unban_requires_power_and_prior_ban() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();
		let bob = store.user_id("bob").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator: creator.clone(),
				preset: Preset::PublicChat,
				name: None,
				topic: None,
				visibility_public: true,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		room_ops.join(&room_id, &bob).unwrap();
		room_ops.ban(&room_id, &creator, &bob).unwrap();
		assert_eq!(store.with_room(&room_id, |room| room.membership(&bob)).unwrap(), Some(Membership::Ban));

		assert!(matches!(room_ops.unban(&room_id, &bob, &creator), Err(Error::Forbidden(_))));
		room_ops.unban(&room_id, &creator, &bob).unwrap();
		assert_eq!(store.with_room(&room_id, |room| room.membership(&bob)).unwrap(), Some(Membership::Leave));
	}

	#[test]
	fn trusted_private_chat_grants_every_invitee_full_power() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();
		let bob = store.user_id("bob").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator,
				preset: Preset::TrustedPrivateChat,
				name: None,
				topic: None,
				visibility_public: false,
				invite: vec![bob.clone()],
				is_direct: false,
				room_alias_name: None,
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		assert_eq!(room_ops.power_level(&room_id, &bob).unwrap(), CREATOR_POWER_LEVEL);
	}

	#[test]
	fn room_alias_name_resolves_back_to_the_room() {
		let store = store();
		let room_ops = RoomOps::new(store.clone());
		let creator = store.user_id("alice").unwrap();

		let room_id = room_ops
			.create_room(CreateRoomRequest {
				creator,
				preset: Preset::PublicChat,
				name: None,
				topic: None,
				visibility_public: true,
				invite: Vec::new(),
				is_direct: false,
				room_alias_name: Some("test-room".to_owned()),
				initial_state: Vec::new(),
				creation_content: None,
				power_level_content_override: None,
			})
			.unwrap();

		let alias = ruma::RoomAliasId::parse("#test-room:example.invalid").unwrap();
		assert_eq!(store.resolve_alias(alias), Some(room_id));
	}
}
