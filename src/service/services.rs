use std::sync::Arc;

use palisade_core::{Config, Result};
use palisade_store::Store;

use crate::{auth::Auth, event_ops::EventOps, room_ops::RoomOps, sync::SyncEngine};

/// The bundle of service-layer facades handed to the API layer, mirroring a
/// conduit-family `Services` aggregate — one field per subsystem, each a
/// thin facade over the shared `Store`.
pub struct Services {
	pub store: Arc<Store>,
	pub auth: Auth,
	pub event_ops: EventOps,
	pub room_ops: RoomOps,
	pub sync: SyncEngine,
	pub max_request_size: usize,
}

impl Services {
	pub fn build(config: &Config) -> Result<Arc<Self>> {
		let store = Store::from_config(config)?;

		Ok(Arc::new(Self {
			auth: Auth::new(store.clone()),
			event_ops: EventOps::new(store.clone()),
			room_ops: RoomOps::new(store.clone()),
			sync: SyncEngine::new(store.clone()),
			max_request_size: config.max_request_size,
			store,
		}))
	}
}
