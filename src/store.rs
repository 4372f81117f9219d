//! Storage contracts and built-in stores for the persisted cache mirror.
//!
//! The mirror behaves like a browser's local storage: one string blob per string key.
//! Stores never interpret the blob; encoding lives in [`crate::cache::snapshot`].

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// String-keyed blob store backing the cache mirror.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Returns the blob stored under `key`, if any.
	fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Replaces the blob stored under `key`.
	fn write<'a>(&'a self, key: &'a str, blob: String) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`CacheStore`] implementations and mirror encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding the mirror.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
