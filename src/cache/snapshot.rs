//! JSON mirror of the success cache.
//!
//! The mirror is one object keyed by callsign, each value holding the fetch time in epoch
//! milliseconds (`t`) and the payload (`d`). Only the newest entries are written, and entries
//! older than the success TTL are dropped both when writing and when loading.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, SuccessCache},
	key::EnrichKey,
	payload::FlightTiming,
	store::StoreError,
};

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
	t: i64,
	d: FlightTiming,
}

/// Serializes at most `max_entries` fresh entries, newest first.
pub fn encode_snapshot(
	cache: &SuccessCache,
	instant: OffsetDateTime,
	ttl: Duration,
	max_entries: usize,
) -> Result<String, StoreError> {
	let mut out = BTreeMap::new();

	for entry in cache.newest_first().take(max_entries) {
		if !entry.is_fresh_at(instant, ttl) {
			continue;
		}

		out.insert(
			entry.key.as_str(),
			PersistedEntry { t: epoch_millis(entry.fetched_at), d: entry.payload.clone() },
		);
	}

	serde_json::to_string(&out).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize cache snapshot: {e}"),
	})
}

/// Restores the entries of a mirror blob that are still fresh at `instant`.
///
/// Individual entries with an invalid key, timestamp, or payload are skipped; only a blob
/// that is not a JSON object is an error.
pub fn decode_snapshot(
	blob: &str,
	instant: OffsetDateTime,
	ttl: Duration,
) -> Result<Vec<CacheEntry>, StoreError> {
	let raw: Map<String, Value> =
		serde_json::from_str(blob).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse cache snapshot: {e}"),
		})?;
	let entries = raw
		.into_iter()
		.filter_map(|(key, value)| {
			let key = EnrichKey::new(key).ok()?;
			let persisted = serde_json::from_value::<PersistedEntry>(value).ok()?;
			let fetched_at = from_epoch_millis(persisted.t)?;

			Some(CacheEntry { key, payload: persisted.d, fetched_at })
		})
		.filter(|entry| entry.is_fresh_at(instant, ttl))
		.collect();

	Ok(entries)
}

/// Converts an instant to epoch milliseconds.
pub fn epoch_millis(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Converts epoch milliseconds to an instant; non-positive values are rejected.
pub fn from_epoch_millis(millis: i64) -> Option<OffsetDateTime> {
	if millis <= 0 {
		return None;
	}

	OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000).ok()
}
