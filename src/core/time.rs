use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for `origin_server_ts` and
/// receipt timestamps.
#[must_use]
pub fn millis_since_unix_epoch() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is after the Unix epoch")
		.as_millis() as u64
}
