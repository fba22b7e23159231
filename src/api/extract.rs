use std::sync::Arc;

use axum::{
	extract::{FromRequestParts, State},
	http::request::Parts,
};
use palisade_core::Error;
use palisade_service::Services;
use ruma::{OwnedDeviceId, OwnedUserId};

/// Extracts `(user_id, device_id)` from the `Authorization: Bearer <token>`
/// header (or an `access_token` query parameter, which some Matrix clients
/// still use for e.g. media requests), per spec §4.6/§6.
pub struct AuthUser {
	pub user_id: OwnedUserId,
	pub device_id: OwnedDeviceId,
}

impl FromRequestParts<Arc<Services>> for AuthUser {
	type Rejection = Error;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &Arc<Services>,
	) -> Result<Self, Self::Rejection> {
		let header_token = parts
			.headers
			.get(axum::http::header::AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.strip_prefix("Bearer "));

		let query_token = parts
			.uri
			.query()
			.and_then(|q| serde_html_query_token(q));

		let token = header_token.or(query_token.as_deref());

		let (user_id, device_id) = state.auth.authenticate(token)?;
		Ok(Self { user_id, device_id })
	}
}

fn serde_html_query_token(query: &str) -> Option<String> {
	query.split('&').find_map(|pair| {
		let (key, value) = pair.split_once('=')?;
		(key == "access_token").then(|| value.to_owned())
	})
}

pub type Svc = State<Arc<Services>>;
