//! Thread-safe in-memory [`CacheStore`] for tests and embedded use.

// self
use crate::{
	_prelude::*,
	store::{CacheStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps blobs in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the blob under `key` without going through the async contract.
	pub fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Seeds a blob under `key`.
	pub fn insert(&self, key: impl Into<String>, blob: impl Into<String>) {
		self.0.write().insert(key.into(), blob.into());
	}

	fn write_now(map: StoreMap, key: String, blob: String) -> Result<(), StoreError> {
		map.write().insert(key, blob);

		Ok(())
	}
}
impl CacheStore for MemoryStore {
	fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let blob = self.get(key);

		Box::pin(async move { Ok(blob) })
	}

	fn write<'a>(&'a self, key: &'a str, blob: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::write_now(map, key, blob) })
	}
}
