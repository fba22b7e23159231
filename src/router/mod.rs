mod request;

use std::sync::Arc;

use axum::{
	Router,
	routing::{get, post, put},
};
use http::Method;
use palisade_service::Services;
use tower_http::cors::{Any, CorsLayer};

/// Builds the full axum `Router` for the homeserver, wiring every
/// `palisade-api` handler to its documented path. Grounded in a
/// conduit-family router's flat `.route(...)` chain, trimmed to this
/// server's client-API-only surface (no federation, no admin console).
pub fn build(services: Arc<Services>) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
		.allow_headers(Any);

	Router::new()
		.route("/_matrix/client/versions", get(palisade_api::client::versions::get_supported_versions))
		.route(
			"/_matrix/client/v3/login",
			get(palisade_api::client::session::get_login_types).post(palisade_api::client::session::login),
		)
		.route("/_matrix/client/v3/logout", post(palisade_api::client::session::logout))
		.route("/_matrix/client/v3/account/whoami", get(palisade_api::client::session::whoami))
		.route("/_matrix/client/v3/createRoom", post(palisade_api::client::room::create_room))
		.route("/_matrix/client/v3/join/{room_id_or_alias}", post(palisade_api::client::room::join_room))
		.route("/_matrix/client/v3/rooms/{room_id}/join", post(palisade_api::client::room::join_room))
		.route("/_matrix/client/v3/rooms/{room_id}/leave", post(palisade_api::client::room::leave_room))
		.route("/_matrix/client/v3/rooms/{room_id}/invite", post(palisade_api::client::room::invite))
		.route("/_matrix/client/v3/rooms/{room_id}/kick", post(palisade_api::client::room::kick))
		.route("/_matrix/client/v3/rooms/{room_id}/ban", post(palisade_api::client::room::ban))
		.route("/_matrix/client/v3/rooms/{room_id}/unban", post(palisade_api::client::room::unban))
		.route(
			"/_matrix/client/v3/rooms/{room_id}/send/{event_type}/{txn_id}",
			put(palisade_api::client::room::send_message),
		)
		.route(
			"/_matrix/client/v3/rooms/{room_id}/state/{event_type}/{state_key}",
			put(palisade_api::client::room::send_state),
		)
		.route(
			"/_matrix/client/v3/rooms/{room_id}/redact/{event_id}/{txn_id}",
			put(palisade_api::client::room::redact),
		)
		.route("/_matrix/client/v3/rooms/{room_id}/event/{event_id}", get(palisade_api::client::room::get_event))
		.route(
			"/_matrix/client/v3/rooms/{room_id}/receipt/{receipt_type}/{event_id}",
			post(palisade_api::client::room::set_receipt),
		)
		.route("/_matrix/client/v3/directory/room/{room_alias}", get(palisade_api::client::directory::resolve_alias))
		.route("/_matrix/client/v1/directory/room/{room_alias}", get(palisade_api::client::directory::resolve_alias))
		.route(
			"/_matrix/client/v3/directory/list/room/{room_id}",
			get(palisade_api::client::directory::get_visibility).put(palisade_api::client::directory::set_visibility),
		)
		.route("/_matrix/client/v3/publicRooms", get(palisade_api::client::directory::public_rooms))
		.route("/_matrix/client/v3/profile/{user_id}", get(palisade_api::client::profile::get_profile))
		.route(
			"/_matrix/client/v3/profile/{user_id}/displayname",
			get(palisade_api::client::profile::get_display_name).put(palisade_api::client::profile::set_display_name),
		)
		.route(
			"/_matrix/client/v3/profile/{user_id}/avatar_url",
			get(palisade_api::client::profile::get_avatar_url).put(palisade_api::client::profile::set_avatar_url),
		)
		.route(
			"/_matrix/client/v3/user/{user_id}/account_data/{event_type}",
			get(palisade_api::client::account_data::get_global).put(palisade_api::client::account_data::set_global),
		)
		.route(
			"/_matrix/client/v3/user/{user_id}/rooms/{room_id}/account_data/{event_type}",
			get(palisade_api::client::account_data::get_room).put(palisade_api::client::account_data::set_room),
		)
		.route("/_matrix/client/v3/sync", get(palisade_api::client::sync::sync))
		.route("/_matrix/media/v3/upload", post(palisade_api::media::upload))
		.route("/_matrix/media/v3/download/{server_name}/{media_id}", get(palisade_api::media::download))
		.route(
			"/_matrix/media/v3/download/{server_name}/{media_id}/{file_name}",
			get(palisade_api::media::download_named),
		)
		.route("/_matrix/media/v1/download/{server_name}/{media_id}", get(palisade_api::media::download))
		.route(
			"/_matrix/media/v1/download/{server_name}/{media_id}/{file_name}",
			get(palisade_api::media::download_named),
		)
		.fallback(request::not_found)
		.layer(axum::middleware::from_fn(request::handle))
		.layer(cors)
		.with_state(services)
}
