use std::sync::Arc;

use palisade_core::{Error, Result};
use palisade_store::Store;
use ruma::{OwnedDeviceId, OwnedUserId};

/// Login/logout/whoami, grounded in a conduit-family `login_route`. This
/// server has no registration and no password-hash migration path: accounts
/// and their passwords come straight out of configuration, so login compares
/// the supplied password to the configured value directly rather than
/// against an argon2 hash.
pub struct Auth {
	store: Arc<Store>,
}

pub struct LoginResult {
	pub user_id: OwnedUserId,
	pub device_id: OwnedDeviceId,
	pub access_token: String,
}

impl Auth {
	#[must_use]
	pub fn new(store: Arc<Store>) -> Self { Self { store } }

	pub fn login(
		&self,
		localpart: &str,
		password: &str,
		device_id: Option<OwnedDeviceId>,
		initial_device_display_name: Option<String>,
	) -> Result<LoginResult> {
		let user_id = self
			.store
			.verify_password(localpart, password)
			.ok_or(Error::Forbidden("wrong username or password"))?;

		let (device_id, access_token) =
			self.store
				.create_device(&user_id, device_id, initial_device_display_name)?;

		Ok(LoginResult { user_id, device_id, access_token })
	}

	pub fn logout(&self, user_id: &ruma::UserId, device_id: &OwnedDeviceId) -> Result<()> {
		self.store.remove_device(user_id, device_id)
	}

	/// The shared entry point the router's auth extractor calls on every
	/// authenticated request.
	pub fn authenticate(&self, token: Option<&str>) -> Result<(OwnedUserId, OwnedDeviceId)> {
		let token = token.ok_or(Error::MissingToken)?;
		self.store
			.device_by_token(token)
			.ok_or(Error::UnknownToken)
	}
}

#[cfg(test)]
mod tests {
	use palisade_core::config::UserConfig;

	use super::*;

	fn store() -> Arc<Store> {
		let server_name = ruma::ServerName::parse("example.invalid").unwrap().to_owned();
		let users = vec![UserConfig {
			localpart: "alice".to_owned(),
			password: "secret".to_owned(),
			display_name: None,
		}];
		Store::new(server_name, users).unwrap()
	}

	#[test]
	fn login_with_wrong_password_is_forbidden() {
		let auth = Auth::new(store());
		let result = auth.login("alice", "wrong", None, None);
		assert!(matches!(result, Err(Error::Forbidden(_))));
	}

	#[test]
	fn login_then_authenticate_round_trips() {
		let auth = Auth::new(store());
		let login = auth.login("alice", "secret", None, None).unwrap();
		let (user_id, device_id) = auth.authenticate(Some(&login.access_token)).unwrap();
		assert_eq!(user_id, login.user_id);
		assert_eq!(device_id, login.device_id);
	}

	#[test]
	fn logout_invalidates_the_token() {
		let auth = Auth::new(store());
		let login = auth.login("alice", "secret", None, None).unwrap();
		auth.logout(&login.user_id, &login.device_id).unwrap();
		assert!(matches!(auth.authenticate(Some(&login.access_token)), Err(Error::UnknownToken)));
	}

	#[test]
	fn authenticate_with_no_token_is_missing_token() {
		let auth = Auth::new(store());
		assert!(matches!(auth.authenticate(None), Err(Error::MissingToken)));
	}
}
