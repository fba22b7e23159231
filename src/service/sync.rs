use std::{sync::Arc, time::Duration};

use palisade_core::Result;
use palisade_store::{Event, Receipt, Store};
use ruma::{OwnedRoomId, OwnedUserId};
use serde_json::Value;
use std::collections::HashMap;

/// Default and maximum long-poll durations for `/sync`, matching the
/// `timeout` query parameter's documented meaning.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(0);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncToken {
	Initial,
	Since(u64),
}

impl SyncToken {
	#[must_use]
	pub fn parse(raw: Option<&str>) -> Self {
		match raw.and_then(|s| s.strip_prefix('s')).and_then(|s| s.parse().ok()) {
			| Some(seq) => Self::Since(seq),
			| None => Self::Initial,
		}
	}

	#[must_use]
	fn seq(self) -> u64 {
		match self {
			| Self::Initial => 0,
			| Self::Since(seq) => seq,
		}
	}
}

pub struct RoomSync {
	pub room_id: OwnedRoomId,
	pub timeline: Vec<Event>,
	pub state: Vec<Event>,
	pub account_data: HashMap<String, Value>,
}

pub struct SyncResponse {
	pub next_batch: String,
	pub joined: Vec<RoomSync>,
	pub invited: Vec<OwnedRoomId>,
	pub account_data: HashMap<String, Value>,
	pub receipts: HashMap<OwnedRoomId, HashMap<(OwnedUserId, String), Receipt>>,
}

/// Builds `/sync` responses and long-polls via the store's per-user
/// `Notifier`. Grounded in a conduit-family `sync_helper`'s joined/invited
/// room maps and the `tokio::sync::watch`-backed long-poll wrapper, adapted
/// to this server's simpler per-user (not per-device) wake granularity.
///
/// Two accepted approximations: an incremental response's `state` list is
/// only a subset of state that actually changed (new state the client has
/// not yet seen, not a fully minimized diff), and receipts are shipped in
/// full on every non-empty incremental response rather than being diffed
/// since the last sync.
pub struct SyncEngine {
	store: Arc<Store>,
}

impl SyncEngine {
	#[must_use]
	pub fn new(store: Arc<Store>) -> Self { Self { store } }

	pub async fn sync(
		&self,
		user_id: &OwnedUserId,
		since: Option<&str>,
		timeout: Duration,
	) -> Result<SyncResponse> {
		let token = SyncToken::parse(since);

		let mut response = self.build_response(user_id, token)?;
		let no_changes = response.joined.is_empty()
			&& response.invited.is_empty()
			&& response.account_data.is_empty();

		if token != SyncToken::Initial && no_changes && !timeout.is_zero() {
			let rx = self.store.register_waiter(user_id);
			palisade_store::notifier::wait(rx, timeout).await;
			response = self.build_response(user_id, token)?;
		}

		Ok(response)
	}

	fn build_response(&self, user_id: &OwnedUserId, token: SyncToken) -> Result<SyncResponse> {
		let since = token.seq();
		let initial = token == SyncToken::Initial;

		let mut joined = Vec::new();
		let mut receipts = HashMap::new();
		for room_id in self.store.joined_rooms(user_id) {
			let events = self.store.events_since(&room_id, since);
			let (state, timeline): (Vec<Event>, Vec<Event>) = if initial {
				(events, Vec::new())
			} else {
				let state = events
					.iter()
					.filter(|e| e.state_key.is_some())
					.cloned()
					.collect();
				(state, events)
			};

			let account_data = if initial {
				self.store.room_account_data(user_id, &room_id)
			} else {
				self.store.room_account_data_since(user_id, &room_id, since)
			};

			let room_receipts = self.store.room_receipts(&room_id);
			let has_receipts = !room_receipts.is_empty();

			// Skip rooms with no new events and no receipts: an incremental
			// sync only reports rooms that actually changed.
			if !initial && timeline.is_empty() && state.is_empty() && !has_receipts && account_data.is_empty() {
				continue;
			}

			if has_receipts {
				receipts.insert(room_id.clone(), room_receipts);
			}

			joined.push(RoomSync { room_id, timeline, state, account_data });
		}

		let invited = self
			.store
			.invited_rooms(user_id)
			.into_iter()
			.filter(|room_id| {
				initial
					|| self
						.store
						.get_state_event(room_id, "m.room.member", user_id.as_str())
						.is_some_and(|e| e.seq > since)
			})
			.collect();

		let account_data = if initial {
			self.store.global_account_data(user_id)
		} else {
			self.store.global_account_data_since(user_id, since)
		};
		let next_batch = format!("s{}", self.store.current_seq());

		Ok(SyncResponse { next_batch, joined, invited, account_data, receipts })
	}
}
