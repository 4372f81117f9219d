//! Throttled enrichment client.
//!
//! [`Enricher`] owns the caches, the pending queue, and the rate state behind one mutex, and
//! drives a single drain loop on the ambient Tokio runtime. Callers never wait on the network:
//! [`Enricher::request_enrichment`] and [`Enricher::request_batch_enrichment`] either apply a
//! cached payload through the apply callback or queue the key and return.

pub mod batch;
pub mod state;

pub use batch::*;
pub use state::*;

// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	cache::{self, CacheEntry},
	config::EnrichConfig,
	error::{ConfigError, TransientError, TransportError},
	http::{self, EnrichHttpClient},
	key::EnrichKey,
	obs::{self, FetchOutcome, FetchSpan},
	payload::FlightTiming,
	rate::FailureSignal,
	store::CacheStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Enricher specialized for the crate's default reqwest transport.
pub type ReqwestEnricher = Enricher<ReqwestHttpClient>;

/// Callback receiving every payload that becomes available, cached or freshly fetched.
pub type ApplyFn = Arc<dyn Fn(&EnrichKey, &FlightTiming) + Send + Sync>;

/// Result of [`Enricher::request_enrichment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
	/// A fresh cached payload was applied synchronously.
	AppliedFromCache,
	/// The key was queued for fetching.
	Enqueued,
	/// The key was dropped.
	Skipped(SkipReason),
}

/// Throttled, cached, circuit-breaking client for the flight timing endpoint.
///
/// Cloning is cheap; clones share caches, queue, and rate state.
pub struct Enricher<C>
where
	C: ?Sized + EnrichHttpClient,
{
	inner: Arc<Inner<C>>,
}
impl<C> Enricher<C>
where
	C: ?Sized + EnrichHttpClient,
{
	/// Creates a client that reuses the caller-provided transport.
	///
	/// Fails when `config` does not validate or `endpoint` cannot carry a query string.
	pub fn with_http_client(
		endpoint: Url,
		config: EnrichConfig,
		store: Arc<dyn CacheStore>,
		http_client: impl Into<Arc<C>>,
		apply: ApplyFn,
	) -> Result<Self> {
		config.validate()?;

		if endpoint.cannot_be_a_base() {
			return Err(ConfigError::InvalidEndpoint { endpoint: endpoint.into() }.into());
		}

		Ok(Self {
			inner: Arc::new(Inner {
				endpoint,
				store,
				apply,
				state: Mutex::new(EnrichState::new(config)),
				persist: Mutex::new(PersistSlot::default()),
				persist_lock: AsyncMutex::new(()),
				http_client: http_client.into(),
			}),
		})
	}

	/// Endpoint queried for every key.
	pub fn endpoint(&self) -> &Url {
		&self.inner.endpoint
	}

	/// Returns `false` once the circuit opened.
	pub fn is_enabled(&self) -> bool {
		self.inner.state.lock().is_enabled()
	}

	/// Fresh cached payload for `key`.
	pub fn cached(&self, key: &str) -> Option<FlightTiming> {
		let key = EnrichKey::new(key).ok()?;

		self.inner.state.lock().cached(&key, OffsetDateTime::now_utc()).map(|e| e.payload.clone())
	}

	/// Point-in-time counters.
	pub fn stats(&self) -> EnrichStats {
		self.inner.state.lock().stats(OffsetDateTime::now_utc())
	}

	/// Applies a fresh cached payload or queues `key` for fetching.
	///
	/// Queued keys are fetched by a background task on the current Tokio runtime.
	pub fn request_enrichment(&self, key: &str) -> RequestOutcome {
		let admission = self.inner.state.lock().request(key, OffsetDateTime::now_utc());

		match admission {
			Admission::Cached(entry) => {
				self.inner.apply_entry(&entry);

				RequestOutcome::AppliedFromCache
			},
			Admission::Enqueued => {
				self.kick();

				RequestOutcome::Enqueued
			},
			Admission::Skipped(reason) => {
				obs::trace_skip(key, &reason);

				RequestOutcome::Skipped(reason)
			},
		}
	}

	/// Runs one batch pass over `targets`.
	///
	/// Fresh cached payloads are applied even when the pass is gated by the batch interval or a
	/// cooldown. `force` bypasses the interval only.
	pub fn request_batch_enrichment<T, P, F>(
		&self,
		targets: &[T],
		priority: F,
		force: bool,
	) -> BatchOutcome
	where
		T: EnrichTarget,
		P: Ord,
		F: FnMut(&T) -> P,
	{
		let plan =
			self.inner.state.lock().plan_batch(targets, priority, force, OffsetDateTime::now_utc());

		for entry in &plan.cached {
			self.inner.apply_entry(entry);
		}

		if plan.enqueued > 0 {
			self.kick();
		}

		BatchOutcome { applied: plan.cached.len(), enqueued: plan.enqueued, gated: plan.gated }
	}

	/// Drains the queue on the current task until it is empty, the circuit opens, or another
	/// drain loop already owns it.
	pub async fn drain_queue(&self) {
		if self.inner.state.lock().claim_driver() {
			Inner::drive(self.inner.clone()).await;
		}
	}

	/// Loads the persisted cache mirror, dropping expired and malformed entries.
	///
	/// Returns the number of entries restored.
	pub async fn load(&self) -> Result<usize> {
		let storage_key = self.inner.state.lock().config().storage_key.clone();
		let Some(blob) = self.inner.store.read(&storage_key).await? else {
			return Ok(0);
		};
		let now = OffsetDateTime::now_utc();
		let ttl = self.inner.state.lock().config().success_ttl;
		let entries = cache::decode_snapshot(&blob, now, ttl)?;

		Ok(self.inner.state.lock().restore(entries))
	}

	/// Cancels any pending debounced write and persists the mirror now.
	pub async fn flush(&self) -> Result<()> {
		if let Some(handle) = self.inner.persist.lock().take() {
			handle.abort();
		}

		self.inner.write_mirror().await
	}

	fn kick(&self) {
		if !self.inner.state.lock().claim_driver() {
			return;
		}

		match Handle::try_current() {
			Ok(handle) => {
				handle.spawn(Inner::drive(self.inner.clone()));
			},
			Err(e) => {
				self.inner.state.lock().release_driver();
				obs::trace_no_runtime(&e);
			},
		}
	}
}
#[cfg(feature = "reqwest")]
impl Enricher<ReqwestHttpClient> {
	/// Creates a client with its own reqwest transport.
	///
	/// Fails with [`ConfigError::HttpClientBuild`] when the transport cannot be constructed.
	pub fn new(
		endpoint: Url,
		config: EnrichConfig,
		store: Arc<dyn CacheStore>,
		apply: ApplyFn,
	) -> Result<Self> {
		Self::with_http_client(endpoint, config, store, ReqwestHttpClient::new()?, apply)
	}
}
impl<C> Clone for Enricher<C>
where
	C: ?Sized + EnrichHttpClient,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C> Debug for Enricher<C>
where
	C: ?Sized + EnrichHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Enricher")
			.field("endpoint", &self.inner.endpoint.as_str())
			.field("stats", &self.stats())
			.finish()
	}
}

#[derive(Default)]
struct PersistSlot {
	handle: Option<JoinHandle<()>>,
	pending_since: Option<OffsetDateTime>,
}
impl PersistSlot {
	const MAX_DEBOUNCE_FACTOR: i32 = 5;

	/// Deadline of the write covering a change at `now`, capped relative to the first
	/// still-pending change.
	fn arm(&mut self, now: OffsetDateTime, debounce: Duration) -> OffsetDateTime {
		let since = *self.pending_since.get_or_insert(now);

		(now + debounce).min(since + debounce * Self::MAX_DEBOUNCE_FACTOR)
	}

	fn take(&mut self) -> Option<JoinHandle<()>> {
		self.pending_since = None;

		self.handle.take()
	}
}

struct Inner<C>
where
	C: ?Sized + EnrichHttpClient,
{
	endpoint: Url,
	store: Arc<dyn CacheStore>,
	apply: ApplyFn,
	state: Mutex<EnrichState>,
	persist: Mutex<PersistSlot>,
	persist_lock: AsyncMutex<()>,
	http_client: Arc<C>,
}
impl<C> Inner<C>
where
	C: ?Sized + EnrichHttpClient,
{
	async fn drive(this: Arc<Self>) {
		loop {
			let step = this.state.lock().begin_drain(OffsetDateTime::now_utc());

			match step {
				DrainStep::Idle => return,
				DrainStep::Wait(wait) => tokio::time::sleep(wait.unsigned_abs()).await,
				DrainStep::Fetch(key) => this.fetch_and_record(key).await,
			}
		}
	}

	async fn fetch_and_record(self: &Arc<Self>, key: EnrichKey) {
		let span = FetchSpan::new(key.as_str());

		obs::record_fetch_outcome(FetchOutcome::Attempt);

		let result = span.instrument(self.fetch(&key)).await;
		let now = OffsetDateTime::now_utc();

		match result {
			Ok(payload) => {
				let entry = self.state.lock().complete_success(key, payload, now);

				obs::record_fetch_outcome(FetchOutcome::Success);
				obs::trace_success(entry.key.as_str());
				self.apply_entry(&entry);
				self.schedule_persist(now);
			},
			Err(e) => {
				let (verdict, rate) = {
					let mut state = self.state.lock();
					let verdict = state.complete_failure(key.clone(), FailureSignal::from(&e), now);

					(verdict, state.rate().clone())
				};

				obs::record_fetch_outcome(FetchOutcome::Failure);
				obs::trace_failure(key.as_str(), &e, verdict.cooldown);

				if verdict.circuit_opened {
					obs::record_fetch_outcome(FetchOutcome::CircuitOpen);
					obs::trace_circuit_open(
						rate.total_errors(),
						rate.consecutive_errors(),
						rate.window_errors(),
					);
				}
			},
		}
	}

	async fn fetch(&self, key: &EnrichKey) -> Result<FlightTiming> {
		let url = http::enrichment_url(&self.endpoint, key);
		let response = self.http_client.get(url).await.map_err(TransportError::network)?;
		let status = response.metadata.status;

		if !response.is_success() {
			return Err(TransientError::Endpoint {
				status,
				retry_after: response.metadata.retry_after,
			}
			.into());
		}

		Ok(FlightTiming::from_body(&response.body, status)?)
	}

	fn apply_entry(&self, entry: &CacheEntry) {
		(self.apply)(&entry.key, &entry.payload);
	}

	fn schedule_persist(self: &Arc<Self>, now: OffsetDateTime) {
		let Ok(runtime) = Handle::try_current() else {
			return;
		};
		let debounce = self.state.lock().config().persist_debounce;
		let mut slot = self.persist.lock();
		let deadline = slot.arm(now, debounce);

		if let Some(previous) = slot.handle.take() {
			previous.abort();
		}

		let this = self.clone();

		slot.handle = Some(runtime.spawn(async move {
			let wait = deadline - OffsetDateTime::now_utc();

			if wait.is_positive() {
				tokio::time::sleep(wait.unsigned_abs()).await;
			}

			this.persist.lock().take();

			if let Err(e) = this.write_mirror().await {
				obs::trace_store_failure("persist", &e);
			}
		}));
	}

	async fn write_mirror(&self) -> Result<()> {
		let _guard = self.persist_lock.lock().await;
		let (storage_key, blob) = {
			let state = self.state.lock();

			(state.config().storage_key.clone(), state.snapshot(OffsetDateTime::now_utc())?)
		};

		self.store.write(&storage_key, blob).await?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		store::{MemoryStore, StoreFuture},
	};

	#[derive(Clone, Default)]
	struct CountingStore {
		backend: MemoryStore,
		writes: Arc<AtomicUsize>,
	}
	impl CountingStore {
		fn writes(&self) -> usize {
			self.writes.load(Ordering::SeqCst)
		}
	}
	impl CacheStore for CountingStore {
		fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
			self.backend.read(key)
		}

		fn write<'a>(&'a self, key: &'a str, blob: String) -> StoreFuture<'a, ()> {
			self.writes.fetch_add(1, Ordering::SeqCst);

			self.backend.write(key, blob)
		}
	}

	fn build_counting_enricher(
		http: ScriptedHttpClient,
		config: EnrichConfig,
	) -> (ScriptedEnricher, CountingStore) {
		let store = CountingStore::default();
		let enricher = Enricher::<ScriptedHttpClient>::with_http_client(
			test_endpoint(),
			config,
			Arc::new(store.clone()),
			http,
			RecordingApply::default().callback(),
		)
		.expect("Counting enricher should build.");

		(enricher, store)
	}

	#[test]
	fn persist_deadline_slides_until_capped() {
		let start = OffsetDateTime::UNIX_EPOCH;
		let debounce = Duration::milliseconds(100);
		let mut slot = PersistSlot::default();

		assert_eq!(slot.arm(start, debounce), start + Duration::milliseconds(100));
		assert_eq!(
			slot.arm(start + Duration::milliseconds(90), debounce),
			start + Duration::milliseconds(190)
		);
		assert_eq!(
			slot.arm(start + Duration::milliseconds(450), debounce),
			start + Duration::milliseconds(500),
			"Capped at five debounce periods after the first pending change."
		);
		assert_eq!(
			slot.arm(start + Duration::milliseconds(700), debounce),
			start + Duration::milliseconds(500)
		);

		slot.take();

		assert_eq!(
			slot.arm(start + Duration::milliseconds(700), debounce),
			start + Duration::milliseconds(800),
			"A completed write starts a new window."
		);
	}

	#[tokio::test]
	async fn burst_of_successes_is_persisted_once_without_flush() {
		let http = ScriptedHttpClient::default();

		for _ in 0..3 {
			http.push(json_response(200, r#"{"arrival":{"eta":"2025-03-14 18:30"}}"#));
		}

		let config = fast_test_config().with_persistence(Duration::milliseconds(400), 500);
		let storage_key = config.storage_key.clone();
		let (enricher, store) = build_counting_enricher(http, config);

		for key in ["A1", "A2", "A3"] {
			assert_eq!(enricher.request_enrichment(key), RequestOutcome::Enqueued);
		}

		wait_until(|| enricher.stats().cached == 3).await;

		assert_eq!(store.writes(), 0, "Write waits for the quiet period.");

		wait_until(|| store.writes() == 1).await;
		tokio::time::sleep(std::time::Duration::from_millis(500)).await;

		assert_eq!(store.writes(), 1);

		let blob = store.backend.get(&storage_key).expect("Mirror should be written.");

		for key in ["A1", "A2", "A3"] {
			assert!(blob.contains(key), "Mirror should contain {key}.");
		}
	}

	#[tokio::test]
	async fn continuous_changes_cannot_postpone_the_write_forever() {
		let config = fast_test_config().with_persistence(Duration::milliseconds(100), 500);
		let (enricher, store) = build_counting_enricher(ScriptedHttpClient::default(), config);

		// Changes every 50 ms for 800 ms; an uncapped debounce would never fire in this span.
		for _ in 0..16 {
			enricher.inner.schedule_persist(OffsetDateTime::now_utc());
			tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		}

		assert!(store.writes() >= 1, "Write should land within five debounce periods.");
	}

	#[test]
	fn construction_rejects_invalid_inputs() {
		let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
		let apply = RecordingApply::default();
		let endpoint = Url::parse("https://example.com/api/tmi/simtraffic_flight.php")
			.expect("Fixture endpoint should parse.");
		let broken = EnrichConfig::default().with_capacity(0, 250);
		let err = Enricher::<ScriptedHttpClient>::with_http_client(
			endpoint,
			broken,
			store.clone(),
			ScriptedHttpClient::default(),
			apply.callback(),
		)
		.expect_err("Zero batch capacity should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::ZeroLimit { .. })));

		let opaque = Url::parse("mailto:ops@example.com").expect("Fixture URL should parse.");
		let err = Enricher::<ScriptedHttpClient>::with_http_client(
			opaque,
			EnrichConfig::default(),
			store,
			ScriptedHttpClient::default(),
			apply.callback(),
		)
		.expect_err("Cannot-be-a-base endpoints should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidEndpoint { .. })));
	}

	#[tokio::test]
	async fn drain_applies_fetched_payload_and_persists_on_flush() {
		let http = ScriptedHttpClient::default();

		http.push(json_response(200, r#"{"arrival":{"eta":"2025-03-14 18:30"}}"#));

		let (enricher, store, apply) = build_test_enricher(http.clone(), fast_test_config());

		assert_eq!(enricher.request_enrichment("aal123"), RequestOutcome::Enqueued);

		enricher.drain_queue().await;
		wait_until(|| apply.count() == 1).await;

		assert_eq!(http.requested(), ["https://example.com/simtraffic?cs=AAL123"]);
		assert_eq!(apply.keys(), ["AAL123"]);
		assert_eq!(enricher.request_enrichment("AAL123"), RequestOutcome::AppliedFromCache);
		assert!(enricher.cached("aal123").is_some());

		enricher.flush().await.expect("Flush should succeed.");

		let blob = store.get(&fast_test_config().storage_key).expect("Mirror should be written.");

		assert!(blob.contains("AAL123"));
	}

	#[tokio::test]
	async fn empty_body_is_negative_cached() {
		let http = ScriptedHttpClient::default();

		http.push(json_response(200, "null"));

		let (enricher, _, apply) = build_test_enricher(http.clone(), fast_test_config());

		enricher.request_enrichment("DAL456");
		wait_until(|| enricher.stats().total_errors == 1).await;

		assert_eq!(apply.count(), 0);
		assert_eq!(
			enricher.request_enrichment("DAL456"),
			RequestOutcome::Skipped(SkipReason::NegativeCached)
		);
	}

	#[tokio::test]
	async fn load_restores_mirror_written_by_another_client() {
		let http = ScriptedHttpClient::default();

		http.push(json_response(200, r#"{"departure":{"edct":"2025-03-14 17:10"}}"#));

		let (first, store, _) = build_test_enricher(http.clone(), fast_test_config());

		first.request_enrichment("UAL789");
		wait_until(|| first.stats().cached == 1).await;
		first.flush().await.expect("Flush should succeed.");

		let second = Enricher::<ScriptedHttpClient>::with_http_client(
			test_endpoint(),
			fast_test_config(),
			Arc::new(store),
			ScriptedHttpClient::default(),
			RecordingApply::default().callback(),
		)
		.expect("Second client should build.");

		assert_eq!(second.load().await.expect("Load should succeed."), 1);
		assert!(second.cached("UAL789").is_some());
	}
}
