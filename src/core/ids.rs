use rand::{Rng, distributions::Alphanumeric, thread_rng};

pub const DEVICE_ID_LENGTH: usize = 10;
pub const TOKEN_LENGTH: usize = 32;
pub const MEDIA_ID_LENGTH: usize = 24;

/// An alphanumeric string of the given length, used for device ids, access
/// tokens, and media ids — anything that needs to be unguessable but isn't
/// itself a Matrix grammar identifier.
#[must_use]
pub fn random_string(length: usize) -> String {
	thread_rng()
		.sample_iter(&Alphanumeric)
		.take(length)
		.map(char::from)
		.collect()
}
