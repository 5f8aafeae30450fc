use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Entries = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Keyed async mutex that serializes work on one conversation.
///
/// Entries exist only while some task holds or waits for the key.
#[derive(Clone, Default)]
pub struct ConversationLocks {
	entries: Entries,
}
impl ConversationLocks {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, key: &str) -> ConversationGuard {
		let mutex = {
			let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

			entries.entry(key.to_string()).or_default().clone()
		};
		let guard = mutex.lock_owned().await;

		ConversationGuard {
			key: key.to_string(),
			entries: self.entries.clone(),
			guard: Some(guard),
		}
	}

	/// Number of keys currently held or awaited.
	pub fn active_keys(&self) -> usize {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}
}

pub struct ConversationGuard {
	key: String,
	entries: Entries,
	guard: Option<OwnedMutexGuard<()>>,
}
impl Drop for ConversationGuard {
	fn drop(&mut self) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		self.guard.take();

		// The map holds one reference. Any other means a task is still waiting on the key.
		if entries.get(&self.key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
			entries.remove(&self.key);
		}
	}
}
