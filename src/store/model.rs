use std::collections::HashMap;

use ruma::{OwnedDeviceId, OwnedEventId, OwnedMxcUri, OwnedRoomId, OwnedUserId};
use serde_json::Value;

/// `AccountDataItem` (spec §3): a per-`(user, room?, type)` content value
/// stamped with the global sequence at the time it was last set, so
/// incremental sync can answer "what changed since `since_seq`".
#[derive(Debug, Clone)]
pub struct AccountDataItem {
	pub content: Value,
	pub seq: Seq,
}

/// A monotonically increasing position in the global event order. Rendered
/// on the wire as a sync token of the form `s<decimal>`.
pub type Seq = u64;

#[derive(Debug, Clone)]
pub struct User {
	pub localpart: String,
	pub password: String,
	pub display_name: Option<String>,
	pub avatar_url: Option<String>,
	pub devices: HashMap<OwnedDeviceId, Device>,
}

#[derive(Debug, Clone)]
pub struct Device {
	pub device_id: OwnedDeviceId,
	pub access_token: String,
	pub display_name: Option<String>,
	/// `(txn_id)` -> the event id it produced, so a retried `PUT
	/// /send/{eventType}/{txnId}` replays the original response instead of
	/// creating a duplicate event.
	pub txn_map: HashMap<String, OwnedEventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
	Invite,
	Join,
	Leave,
	Ban,
	Knock,
}

impl Membership {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			| Self::Invite => "invite",
			| Self::Join => "join",
			| Self::Leave => "leave",
			| Self::Ban => "ban",
			| Self::Knock => "knock",
		}
	}
}

/// A single persisted event. Content is carried as untyped JSON rather than
/// a typed ruma event, matching how a conduit-family PDU keeps its content as
/// a raw canonical JSON object rather than validating it against an event
/// schema.
#[derive(Debug, Clone)]
pub struct Event {
	pub event_id: OwnedEventId,
	pub room_id: OwnedRoomId,
	pub sender: OwnedUserId,
	pub event_type: String,
	pub state_key: Option<String>,
	pub content: Value,
	pub origin_server_ts: u64,
	pub seq: Seq,
	pub redacts: Option<OwnedEventId>,
	/// Set once this event has been redacted, carrying the id of the
	/// `m.room.redaction` event responsible (`unsigned.redacted_because`).
	pub redacted_because: Option<OwnedEventId>,
}

#[derive(Debug, Clone)]
pub struct Receipt {
	pub event_id: OwnedEventId,
	pub receipt_type: String,
	pub ts: u64,
}

#[derive(Debug)]
pub struct Room {
	pub room_id: OwnedRoomId,
	pub creator: OwnedUserId,
	/// Full timeline in append order.
	pub timeline: Vec<OwnedEventId>,
	/// Current resolved state, keyed by `(event_type, state_key)`.
	pub state: HashMap<(String, String), OwnedEventId>,
	pub members: HashMap<OwnedUserId, Membership>,
	pub name: Option<String>,
	pub topic: Option<String>,
	pub published: bool,
	/// Keyed by `(user_id, receipt_type)` per spec §3's uniqueness invariant
	/// — at most one receipt per `(room_id, user_id, receipt_type)`.
	pub receipts: HashMap<(OwnedUserId, String), Receipt>,
}

impl Room {
	#[must_use]
	pub fn new(room_id: OwnedRoomId, creator: OwnedUserId) -> Self {
		Self {
			room_id,
			creator,
			timeline: Vec::new(),
			state: HashMap::new(),
			members: HashMap::new(),
			name: None,
			topic: None,
			published: false,
			receipts: HashMap::new(),
		}
	}

	#[must_use]
	pub fn membership(&self, user_id: &ruma::UserId) -> Option<Membership> {
		self.members.get(user_id).copied()
	}
}

#[derive(Debug, Clone)]
pub struct MediaItem {
	pub mxc: OwnedMxcUri,
	pub content_type: Option<String>,
	pub filename: Option<String>,
	pub bytes: Vec<u8>,
}
