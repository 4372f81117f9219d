//! Success and negative caches keyed by [`EnrichKey`].

pub mod snapshot;

pub use snapshot::*;

// self
use crate::{_prelude::*, key::EnrichKey, payload::FlightTiming};

/// Result of a successful fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
	/// Key the payload belongs to.
	pub key: EnrichKey,
	/// Decoded payload.
	pub payload: FlightTiming,
	/// Instant the fetch completed.
	pub fetched_at: OffsetDateTime,
}
impl CacheEntry {
	/// Returns `true` if the entry is no older than `ttl` at `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.fetched_at <= ttl
	}
}

/// Marker for a key whose last fetch failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegativeCacheEntry {
	/// Key that failed.
	pub key: EnrichKey,
	/// Instant the failure was recorded.
	pub failed_at: OffsetDateTime,
}
impl NegativeCacheEntry {
	/// Returns `true` if the failure is no older than `ttl` at `instant`.
	pub fn is_recent_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.failed_at <= ttl
	}
}

/// In-memory success cache.
#[derive(Clone, Debug, Default)]
pub struct SuccessCache(HashMap<EnrichKey, CacheEntry>);
impl SuccessCache {
	/// Stores `payload` for `key`, replacing any previous entry.
	pub fn insert(&mut self, key: EnrichKey, payload: FlightTiming, fetched_at: OffsetDateTime) {
		self.0.insert(key.clone(), CacheEntry { key, payload, fetched_at });
	}

	/// Returns the entry for `key` when it is still fresh.
	pub fn fresh(&self, key: &str, instant: OffsetDateTime, ttl: Duration) -> Option<&CacheEntry> {
		self.0.get(key).filter(|entry| entry.is_fresh_at(instant, ttl))
	}

	/// Returns the instant `key` was last fetched, fresh or not.
	pub fn last_fetched(&self, key: &str) -> Option<OffsetDateTime> {
		self.0.get(key).map(|entry| entry.fetched_at)
	}

	/// Iterates entries from the most to the least recently fetched.
	pub fn newest_first(&self) -> impl Iterator<Item = &CacheEntry> {
		let mut entries = self.0.values().collect::<Vec<_>>();

		entries.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then_with(|| a.key.cmp(&b.key)));

		entries.into_iter()
	}

	/// Drops entries older than `ttl`.
	pub fn prune(&mut self, instant: OffsetDateTime, ttl: Duration) {
		self.0.retain(|_, entry| entry.is_fresh_at(instant, ttl));
	}

	/// Number of cached entries.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// In-memory negative cache.
#[derive(Clone, Debug, Default)]
pub struct NegativeCache(HashMap<EnrichKey, NegativeCacheEntry>);
impl NegativeCache {
	/// Marks `key` as failed at `instant`.
	pub fn record(&mut self, key: EnrichKey, failed_at: OffsetDateTime) {
		self.0.insert(key.clone(), NegativeCacheEntry { key, failed_at });
	}

	/// Returns `true` if `key` failed within `ttl` of `instant`.
	pub fn is_recent(&self, key: &str, instant: OffsetDateTime, ttl: Duration) -> bool {
		self.0.get(key).is_some_and(|entry| entry.is_recent_at(instant, ttl))
	}

	/// Drops markers older than `ttl`.
	pub fn prune(&mut self, instant: OffsetDateTime, ttl: Duration) {
		self.0.retain(|_, entry| entry.is_recent_at(instant, ttl));
	}

	/// Number of markers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` if no failures are remembered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn key(raw: &str) -> EnrichKey {
		EnrichKey::new(raw).expect("Fixture key should be valid.")
	}

	#[test]
	fn success_entries_expire_after_ttl() {
		let mut cache = SuccessCache::default();
		let fetched = datetime!(2025-03-14 18:00 UTC);
		let ttl = Duration::minutes(10);

		cache.insert(key("AAL123"), FlightTiming::default(), fetched);

		assert!(cache.fresh("AAL123", fetched + Duration::minutes(10), ttl).is_some());
		assert!(cache.fresh("AAL123", fetched + Duration::minutes(11), ttl).is_none());
		assert_eq!(cache.last_fetched("AAL123"), Some(fetched));

		cache.prune(fetched + Duration::minutes(11), ttl);

		assert!(cache.is_empty());
	}

	#[test]
	fn negative_entries_expire_after_ttl() {
		let mut cache = NegativeCache::default();
		let failed = datetime!(2025-03-14 18:00 UTC);
		let ttl = Duration::minutes(2);

		cache.record(key("DAL456"), failed);

		assert!(cache.is_recent("DAL456", failed + Duration::seconds(119), ttl));
		assert!(!cache.is_recent("DAL456", failed + Duration::seconds(121), ttl));
		assert!(!cache.is_recent("UAL1", failed, ttl));
	}

	#[test]
	fn newest_first_orders_by_fetch_time() {
		let mut cache = SuccessCache::default();
		let base = datetime!(2025-03-14 18:00 UTC);

		cache.insert(key("OLD"), FlightTiming::default(), base);
		cache.insert(key("NEW"), FlightTiming::default(), base + Duration::minutes(2));
		cache.insert(key("MID"), FlightTiming::default(), base + Duration::minutes(1));

		let order = cache.newest_first().map(|entry| entry.key.as_str()).collect::<Vec<_>>();

		assert_eq!(order, ["NEW", "MID", "OLD"]);
	}
}
