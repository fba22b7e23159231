use std::{collections::HashMap, time::Duration};

use ruma::OwnedUserId;
use tokio::sync::oneshot;

/// Wakes long-polling `/sync` requests when a user's event stream has new
/// data to offer. Grounded in conduwuit's `Watchers` type (a map from key to
/// a `watch` channel that is fired and removed exactly once), adapted from a
/// prefix-keyed `watch` channel to a per-user `oneshot` list: this server has
/// only one granularity of waiter (per user, not per key prefix), so a
/// `Vec` of one-shot senders is the simplest correct equivalent.
#[derive(Default)]
pub struct Notifier {
	waiters: HashMap<OwnedUserId, Vec<oneshot::Sender<()>>>,
}

impl Notifier {
	#[must_use]
	pub fn new() -> Self { Self::default() }

	/// Registers a new waiter for `user_id` and returns its receiver. Caller
	/// holds the store lock while calling this so that registration and the
	/// "is there already new data" check happen atomically.
	pub fn register(&mut self, user_id: &OwnedUserId) -> oneshot::Receiver<()> {
		let (tx, rx) = oneshot::channel();
		self.waiters.entry(user_id.clone()).or_default().push(tx);
		rx
	}

	/// Wakes every waiter currently registered for `user_id`. A oneshot can
	/// only be completed once, so double-wakes are harmless; if the waiter
	/// already timed out and dropped its receiver, `send` simply returns an
	/// error we discard.
	pub fn notify(&mut self, user_id: &OwnedUserId) {
		if let Some(waiters) = self.waiters.remove(user_id) {
			for tx in waiters {
				let _ = tx.send(());
			}
		}
	}
}

/// Races a registered waiter against a timeout. Both outcomes are
/// idempotent: on timeout the receiver is simply dropped, and a later
/// `notify` on an already-dropped receiver is a no-op `send` error.
pub async fn wait(rx: oneshot::Receiver<()>, timeout: Duration) -> bool {
	tokio::select! {
		res = rx => res.is_ok(),
		() = tokio::time::sleep(timeout) => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn user() -> OwnedUserId { ruma::UserId::parse("@alice:example.invalid").unwrap() }

	#[tokio::test]
	async fn notify_wakes_a_registered_waiter() {
		let mut notifier = Notifier::new();
		let rx = notifier.register(&user());
		notifier.notify(&user());
		assert!(wait(rx, Duration::from_millis(100)).await);
	}

	#[tokio::test]
	async fn wait_times_out_with_no_notify() {
		let mut notifier = Notifier::new();
		let rx = notifier.register(&user());
		assert!(!wait(rx, Duration::from_millis(10)).await);
	}

	#[test]
	fn notify_with_no_waiters_is_a_no_op() {
		let mut notifier = Notifier::new();
		notifier.notify(&user());
	}
}
