//! Synchronous bookkeeping behind the [`Enricher`](crate::enricher::Enricher).
//!
//! Every method takes the current instant explicitly, so admission, batching, drain pacing, and
//! the circuit breaker can be exercised without a runtime or a clock.

// self
use crate::{
	_prelude::*,
	cache::{self, CacheEntry, NegativeCache, SuccessCache},
	config::EnrichConfig,
	enricher::batch::{BatchGate, EnrichTarget},
	key::EnrichKey,
	payload::FlightTiming,
	queue::{PendingQueue, PushOutcome},
	rate::{FailureSignal, FailureVerdict, RateState},
	store::StoreError,
};

/// Why a request did not reach the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
	/// The circuit is open.
	Disabled,
	/// The callsign could not be normalized.
	InvalidKey,
	/// The key failed recently.
	NegativeCached,
	/// The key was fetched successfully too recently.
	RecentlyFetched,
	/// The key is already pending.
	AlreadyQueued,
	/// The queue is at capacity.
	QueueFull,
}
impl SkipReason {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SkipReason::Disabled => "disabled",
			SkipReason::InvalidKey => "invalid_key",
			SkipReason::NegativeCached => "negative_cached",
			SkipReason::RecentlyFetched => "recently_fetched",
			SkipReason::AlreadyQueued => "already_queued",
			SkipReason::QueueFull => "queue_full",
		}
	}
}
impl Display for SkipReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Decision taken for a single key.
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
	/// A fresh entry exists and should be applied.
	Cached(Box<CacheEntry>),
	/// The key was queued.
	Enqueued,
	/// The key was dropped.
	Skipped(SkipReason),
}

/// Work produced by [`EnrichState::plan_batch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchPlan {
	/// Fresh entries to apply.
	pub cached: Vec<CacheEntry>,
	/// Keys queued by this pass.
	pub enqueued: usize,
	/// Set when the pass stopped before enqueueing.
	pub gated: Option<BatchGate>,
}

/// Next action for the drain loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrainStep {
	/// Nothing to do; the loop exits.
	Idle,
	/// Sleep, then ask again.
	Wait(Duration),
	/// Fetch this key, then report the result.
	Fetch(EnrichKey),
}

/// Point-in-time view of the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichStats {
	/// `false` once the circuit opened.
	pub enabled: bool,
	/// A fetch is in flight.
	pub busy: bool,
	/// Pending keys.
	pub queued: usize,
	/// Success-cache entries, fresh or not.
	pub cached: usize,
	/// Negative-cache markers.
	pub negative_cached: usize,
	/// Failures since the last success.
	pub consecutive_errors: u32,
	/// Failures this session.
	pub total_errors: u32,
	/// Failures in the sliding window.
	pub window_errors: usize,
	/// Time left in the active cooldown.
	pub cooldown_remaining: Option<Duration>,
	/// Current spacing between requests.
	pub next_delay: Duration,
}

/// Caches, queue, and rate state of one client.
#[derive(Clone, Debug)]
pub struct EnrichState {
	config: EnrichConfig,
	success: SuccessCache,
	negative: NegativeCache,
	queue: PendingQueue,
	rate: RateState,
	busy: bool,
	draining: bool,
	next_allowed_at: Option<OffsetDateTime>,
	last_batch_at: Option<OffsetDateTime>,
}
impl EnrichState {
	/// Creates an empty state; `config` is assumed to be validated.
	pub fn new(config: EnrichConfig) -> Self {
		Self {
			success: SuccessCache::default(),
			negative: NegativeCache::default(),
			queue: PendingQueue::new(config.max_queue_size),
			rate: RateState::new(&config),
			busy: false,
			draining: false,
			next_allowed_at: None,
			last_batch_at: None,
			config,
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &EnrichConfig {
		&self.config
	}

	/// Returns `false` once the circuit opened.
	pub fn is_enabled(&self) -> bool {
		self.rate.is_enabled()
	}

	/// Pending keys in FIFO order.
	pub fn queue(&self) -> &PendingQueue {
		&self.queue
	}

	/// Process-wide rate state.
	pub fn rate(&self) -> &RateState {
		&self.rate
	}

	/// Fresh success entry for `key`.
	pub fn cached(&self, key: &str, instant: OffsetDateTime) -> Option<&CacheEntry> {
		self.success.fresh(key, instant, self.config.success_ttl)
	}

	/// Normalizes `raw` and runs [`EnrichState::admit`].
	pub fn request(&mut self, raw: &str, instant: OffsetDateTime) -> Admission {
		if !self.is_enabled() {
			return Admission::Skipped(SkipReason::Disabled);
		}

		match EnrichKey::new(raw) {
			Ok(key) => self.admit(key, instant),
			Err(_) => Admission::Skipped(SkipReason::InvalidKey),
		}
	}

	/// Decides whether `key` is served from cache, queued, or dropped.
	pub fn admit(&mut self, key: EnrichKey, instant: OffsetDateTime) -> Admission {
		if !self.is_enabled() {
			return Admission::Skipped(SkipReason::Disabled);
		}
		if let Some(entry) = self.cached(&key, instant) {
			return Admission::Cached(Box::new(entry.clone()));
		}
		if self.negative.is_recent(&key, instant, self.config.negative_ttl) {
			return Admission::Skipped(SkipReason::NegativeCached);
		}
		if self
			.success
			.last_fetched(&key)
			.is_some_and(|at| instant - at < self.config.per_key_min_interval)
		{
			return Admission::Skipped(SkipReason::RecentlyFetched);
		}

		match self.queue.push(key) {
			PushOutcome::Queued => Admission::Enqueued,
			PushOutcome::Duplicate => Admission::Skipped(SkipReason::AlreadyQueued),
			PushOutcome::Full => Admission::Skipped(SkipReason::QueueFull),
		}
	}

	/// Runs one batch pass over `targets`.
	///
	/// Fresh entries are returned for application even when the pass is gated. Accepted passes
	/// order the remaining candidates by `priority` (stable, ascending) and admit at most
	/// `max_requests_per_batch` of them.
	pub fn plan_batch<T, P, F>(
		&mut self,
		targets: &[T],
		mut priority: F,
		force: bool,
		instant: OffsetDateTime,
	) -> BatchPlan
	where
		T: EnrichTarget,
		P: Ord,
		F: FnMut(&T) -> P,
	{
		if !self.is_enabled() {
			return BatchPlan { gated: Some(BatchGate::Disabled), ..Default::default() };
		}

		let mut plan = BatchPlan::default();
		let mut candidates = Vec::new();

		for target in targets {
			let Ok(key) = EnrichKey::new(target.callsign()) else {
				continue;
			};

			if let Some(entry) = self.cached(&key, instant) {
				plan.cached.push(entry.clone());

				continue;
			}

			candidates.push((key, target));
		}

		if !force
			&& self
				.last_batch_at
				.is_some_and(|at| instant - at < self.config.min_batch_interval)
		{
			plan.gated = Some(BatchGate::Interval);

			return plan;
		}
		if self.rate.cooldown_remaining(instant).is_some() {
			plan.gated = Some(BatchGate::Cooldown);

			return plan;
		}

		self.last_batch_at = Some(instant);

		candidates.retain(|(key, target)| {
			target.needs_enrichment()
				&& !self.negative.is_recent(key, instant, self.config.negative_ttl)
		});
		candidates.sort_by_key(|(_, target)| priority(target));

		let cap = self.config.max_requests_per_batch;

		for (key, _) in candidates.into_iter().take(cap) {
			if matches!(self.admit(key, instant), Admission::Enqueued) {
				plan.enqueued += 1;
			}
		}

		plan
	}

	/// Claims the single drain loop; `false` if one is already running.
	pub fn claim_driver(&mut self) -> bool {
		if self.draining || !self.is_enabled() || self.queue.is_empty() {
			return false;
		}

		self.draining = true;

		true
	}

	/// Releases a claimed drain loop that could not be started.
	pub fn release_driver(&mut self) {
		self.draining = false;
	}

	/// Decides the drain loop's next step.
	///
	/// Returning [`DrainStep::Idle`] releases the loop claimed by [`EnrichState::claim_driver`].
	pub fn begin_drain(&mut self, instant: OffsetDateTime) -> DrainStep {
		if !self.is_enabled() || self.busy || self.queue.is_empty() {
			self.draining = false;

			return DrainStep::Idle;
		}
		if let Some(left) = self.rate.cooldown_remaining(instant) {
			return DrainStep::Wait(left.max(EnrichConfig::MIN_COOLDOWN_POLL));
		}
		if let Some(left) =
			self.next_allowed_at.map(|at| at - instant).filter(|left| left.is_positive())
		{
			return DrainStep::Wait(left);
		}

		match self.queue.pop() {
			Some(key) => {
				self.busy = true;

				DrainStep::Fetch(key)
			},
			None => {
				self.draining = false;

				DrainStep::Idle
			},
		}
	}

	/// Records a successful fetch and returns the entry to apply.
	pub fn complete_success(
		&mut self,
		key: EnrichKey,
		payload: FlightTiming,
		instant: OffsetDateTime,
	) -> CacheEntry {
		self.busy = false;
		self.success.insert(key.clone(), payload.clone(), instant);
		self.rate.note_success(&self.config);
		self.next_allowed_at = Some(instant + self.rate.next_delay());
		self.prune(instant);

		CacheEntry { key, payload, fetched_at: instant }
	}

	/// Records a failed fetch; opening the circuit clears the queue.
	pub fn complete_failure(
		&mut self,
		key: EnrichKey,
		signal: FailureSignal,
		instant: OffsetDateTime,
	) -> FailureVerdict {
		self.busy = false;
		self.negative.record(key, instant);

		let verdict = self.rate.note_failure(signal, instant, &self.config);

		if !self.rate.is_enabled() {
			self.queue.clear();
		}

		self.next_allowed_at = Some(instant + self.rate.next_delay());
		self.prune(instant);

		verdict
	}

	/// Encodes the cache mirror.
	pub fn snapshot(&self, instant: OffsetDateTime) -> Result<String, StoreError> {
		cache::encode_snapshot(
			&self.success,
			instant,
			self.config.success_ttl,
			self.config.persist_max_entries,
		)
	}

	/// Restores mirrored entries, keeping in-memory entries that are newer.
	pub fn restore(&mut self, entries: Vec<CacheEntry>) -> usize {
		let mut restored = 0;

		for entry in entries {
			if self.success.last_fetched(&entry.key).is_some_and(|at| at >= entry.fetched_at) {
				continue;
			}

			self.success.insert(entry.key, entry.payload, entry.fetched_at);

			restored += 1;
		}

		restored
	}

	/// Point-in-time counters.
	pub fn stats(&self, instant: OffsetDateTime) -> EnrichStats {
		EnrichStats {
			enabled: self.is_enabled(),
			busy: self.busy,
			queued: self.queue.len(),
			cached: self.success.len(),
			negative_cached: self.negative.len(),
			consecutive_errors: self.rate.consecutive_errors(),
			total_errors: self.rate.total_errors(),
			window_errors: self.rate.window_errors(),
			cooldown_remaining: self.rate.cooldown_remaining(instant),
			next_delay: self.rate.next_delay(),
		}
	}

	fn prune(&mut self, instant: OffsetDateTime) {
		let keep = self.config.success_ttl.max(self.config.per_key_min_interval);

		self.success.prune(instant, keep);
		self.negative.prune(instant, self.config.negative_ttl);
	}
}
