//! Tunables for the enrichment client.
//!
//! Every knob has a default matching the production proxy budget (~1.5 requests per second
//! per client, ten minute success cache). Durations serialize as whole milliseconds so the
//! config can live next to other JSON settings.

// self
use crate::{_prelude::*, error::ConfigError};

/// Rate, cache, and circuit-breaker settings for an [`Enricher`](crate::enricher::Enricher).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
	/// Key under which the persisted cache mirror is stored.
	pub storage_key: String,
	/// Minimum spacing between accepted batch enrichment passes.
	#[serde(rename = "min_batch_interval_ms", with = "duration_ms")]
	pub min_batch_interval: Duration,
	/// Minimum spacing between successful fetches of the same key.
	#[serde(rename = "per_key_min_interval_ms", with = "duration_ms")]
	pub per_key_min_interval: Duration,
	/// Lifetime of a success-cache entry.
	#[serde(rename = "success_ttl_ms", with = "duration_ms")]
	pub success_ttl: Duration,
	/// Lifetime of a negative-cache entry.
	#[serde(rename = "negative_ttl_ms", with = "duration_ms")]
	pub negative_ttl: Duration,
	/// Maximum number of keys one batch pass may enqueue.
	pub max_requests_per_batch: usize,
	/// Maximum number of pending keys.
	pub max_queue_size: usize,
	/// Inter-request spacing after a success.
	#[serde(rename = "base_delay_ms", with = "duration_ms")]
	pub base_delay: Duration,
	/// Upper bound for the adaptive inter-request spacing.
	#[serde(rename = "max_delay_ms", with = "duration_ms")]
	pub max_delay: Duration,
	/// Cooldown applied after an ordinary failure.
	#[serde(rename = "error_backoff_ms", with = "duration_ms")]
	pub error_backoff: Duration,
	/// Length of the sliding error window.
	#[serde(rename = "error_window_ms", with = "duration_ms")]
	pub error_window: Duration,
	/// Errors inside the window that open the circuit.
	pub max_errors_per_window: usize,
	/// Consecutive errors that open the circuit.
	pub max_consecutive_errors: u32,
	/// Session-wide errors that open the circuit.
	pub max_total_errors: u32,
	/// Cooldown floor for `429`/`503` responses.
	#[serde(rename = "cooldown_on_429_ms", with = "duration_ms")]
	pub cooldown_on_429: Duration,
	/// Cooldown applied once server errors start bursting.
	#[serde(rename = "cooldown_on_5xx_burst_ms", with = "duration_ms")]
	pub cooldown_on_5xx_burst: Duration,
	/// Quiet period before the cache mirror is written.
	#[serde(rename = "persist_debounce_ms", with = "duration_ms")]
	pub persist_debounce: Duration,
	/// Maximum number of entries kept in the cache mirror.
	pub persist_max_entries: usize,
}
impl EnrichConfig {
	/// Consecutive server errors after which the longer burst cooldown applies.
	pub const SERVER_ERROR_BURST: u32 = 3;
	/// Growth of the inter-request spacing after each failure, in tenths (x1.7).
	pub const DELAY_GROWTH_TENTHS: i128 = 17;
	/// Shortest wait used when rescheduling a drain during a cooldown.
	pub const MIN_COOLDOWN_POLL: Duration = Duration::milliseconds(250);

	/// Overrides the storage key of the cache mirror.
	pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
		self.storage_key = key.into();

		self
	}

	/// Overrides the batch interval gate.
	pub fn with_min_batch_interval(mut self, interval: Duration) -> Self {
		self.min_batch_interval = interval;

		self
	}

	/// Overrides the per-key refetch interval.
	pub fn with_per_key_min_interval(mut self, interval: Duration) -> Self {
		self.per_key_min_interval = interval;

		self
	}

	/// Overrides both cache lifetimes.
	pub fn with_ttls(mut self, success: Duration, negative: Duration) -> Self {
		self.success_ttl = success;
		self.negative_ttl = negative;

		self
	}

	/// Overrides the per-batch and total queue capacities.
	pub fn with_capacity(mut self, per_batch: usize, queue: usize) -> Self {
		self.max_requests_per_batch = per_batch;
		self.max_queue_size = queue;

		self
	}

	/// Overrides the adaptive spacing bounds.
	pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
		self.base_delay = base;
		self.max_delay = max;

		self
	}

	/// Overrides the three cooldown durations.
	pub fn with_cooldowns(
		mut self,
		error_backoff: Duration,
		on_429: Duration,
		on_5xx_burst: Duration,
	) -> Self {
		self.error_backoff = error_backoff;
		self.cooldown_on_429 = on_429;
		self.cooldown_on_5xx_burst = on_5xx_burst;

		self
	}

	/// Overrides the circuit-breaker thresholds.
	pub fn with_error_limits(
		mut self,
		window: Duration,
		per_window: usize,
		consecutive: u32,
		total: u32,
	) -> Self {
		self.error_window = window;
		self.max_errors_per_window = per_window;
		self.max_consecutive_errors = consecutive;
		self.max_total_errors = total;

		self
	}

	/// Overrides the mirror debounce period and capacity.
	pub fn with_persistence(mut self, debounce: Duration, max_entries: usize) -> Self {
		self.persist_debounce = debounce;
		self.persist_max_entries = max_entries;

		self
	}

	/// Checks that every knob describes a usable budget.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.storage_key.trim().is_empty() {
			return Err(ConfigError::EmptyStorageKey);
		}

		for (field, value) in [
			("max_requests_per_batch", self.max_requests_per_batch),
			("max_queue_size", self.max_queue_size),
			("max_errors_per_window", self.max_errors_per_window),
			("max_consecutive_errors", self.max_consecutive_errors as usize),
			("max_total_errors", self.max_total_errors as usize),
			("persist_max_entries", self.persist_max_entries),
		] {
			if value == 0 {
				return Err(ConfigError::ZeroLimit { field });
			}
		}

		for (field, value) in [
			("success_ttl", self.success_ttl),
			("negative_ttl", self.negative_ttl),
			("base_delay", self.base_delay),
			("max_delay", self.max_delay),
			("error_window", self.error_window),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveDuration { field });
			}
		}

		for (field, value) in [
			("min_batch_interval", self.min_batch_interval),
			("per_key_min_interval", self.per_key_min_interval),
			("error_backoff", self.error_backoff),
			("cooldown_on_429", self.cooldown_on_429),
			("cooldown_on_5xx_burst", self.cooldown_on_5xx_burst),
			("persist_debounce", self.persist_debounce),
		] {
			if value.is_negative() {
				return Err(ConfigError::NegativeDuration { field });
			}
		}

		if self.base_delay > self.max_delay {
			return Err(ConfigError::DelayBoundsInverted);
		}

		Ok(())
	}
}
impl Default for EnrichConfig {
	fn default() -> Self {
		Self {
			storage_key: "simtraffic_cache_v1".into(),
			min_batch_interval: Duration::seconds(90),
			per_key_min_interval: Duration::minutes(8),
			success_ttl: Duration::minutes(10),
			negative_ttl: Duration::minutes(2),
			max_requests_per_batch: 60,
			max_queue_size: 250,
			base_delay: Duration::milliseconds(650),
			max_delay: Duration::seconds(10),
			error_backoff: Duration::milliseconds(2_500),
			error_window: Duration::seconds(60),
			max_errors_per_window: 10,
			max_consecutive_errors: 5,
			max_total_errors: 8,
			cooldown_on_429: Duration::seconds(90),
			cooldown_on_5xx_burst: Duration::minutes(3),
			persist_debounce: Duration::milliseconds(1_200),
			persist_max_entries: 500,
		}
	}
}

mod duration_ms {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_milliseconds() as i64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::milliseconds)
	}
}
