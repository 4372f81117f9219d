// std
use std::{env, fs, path::PathBuf, process};
// crates.io
use httpmock::prelude::*;
// self
use simtraffic_enrich::{
	_preludet::*,
	enricher::{BatchGate, FlightRow, ReqwestEnricher, RequestOutcome, SkipReason},
	store::{CacheStore, FileStore, MemoryStore},
};

const ENDPOINT_PATH: &str = "/api/tmi/simtraffic_flight.php";
const TIMING_BODY: &str = r#"{
	"departure": {"edct": "2025-03-14 17:10", "takeoff_time": "2025-03-14 17:20"},
	"arrival": {"eta": "2025-03-14 18:30", "eta_mf": "2025-03-14 18:10", "eta_vt": "2025-03-14 18:20"}
}"#;

fn endpoint(server: &MockServer) -> Url {
	Url::parse(&server.url(ENDPOINT_PATH)).expect("Mock endpoint should parse successfully.")
}

fn build_enricher(
	server: &MockServer,
	store: Arc<dyn CacheStore>,
) -> (ReqwestEnricher, RecordingApply) {
	let applied = RecordingApply::default();
	let enricher =
		ReqwestEnricher::new(endpoint(server), fast_test_config(), store, applied.callback())
			.expect("Enricher should build against the mock endpoint.");

	(enricher, applied)
}

fn temp_dir() -> PathBuf {
	env::temp_dir().join(format!(
		"simtraffic_enrich_it_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

#[tokio::test]
async fn success_is_applied_and_served_from_cache() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(ENDPOINT_PATH).query_param("cs", "AAL123");
			then.status(200).header("content-type", "application/json").body(TIMING_BODY);
		})
		.await;
	let (enricher, applied) = build_enricher(&server, Arc::new(MemoryStore::default()));

	assert_eq!(enricher.request_enrichment(" aal123 "), RequestOutcome::Enqueued);

	wait_until(|| applied.count() == 1).await;

	let (key, payload) = applied.last().expect("Payload should have been applied.");
	let times = payload.times();

	assert_eq!(key.as_str(), "AAL123");
	assert!(times.is_complete());
	assert_eq!(enricher.request_enrichment("AAL123"), RequestOutcome::AppliedFromCache);
	assert_eq!(applied.count(), 2);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn retry_after_blocks_refetch() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(ENDPOINT_PATH);
			then.status(429).header("Retry-After", "30");
		})
		.await;
	let (enricher, applied) = build_enricher(&server, Arc::new(MemoryStore::default()));

	enricher.request_enrichment("AAL123");
	wait_until(|| enricher.stats().total_errors == 1).await;

	let stats = enricher.stats();
	let cooldown = stats.cooldown_remaining.expect("A 429 should start a cooldown.");

	assert!(cooldown > Duration::seconds(25), "Retry-After outranks the shorter 429 floor.");
	assert_eq!(
		enricher.request_enrichment("AAL123"),
		RequestOutcome::Skipped(SkipReason::NegativeCached)
	);
	assert_eq!(enricher.request_enrichment("DAL456"), RequestOutcome::Enqueued);

	tokio::time::sleep(std::time::Duration::from_millis(100)).await;

	assert_eq!(applied.count(), 0);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn consecutive_server_errors_disable_the_session() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(ENDPOINT_PATH);
			then.status(500);
		})
		.await;
	let (enricher, _) = build_enricher(&server, Arc::new(MemoryStore::default()));
	let rows = ["A1", "A2", "A3", "A4", "A5", "A6", "A7"].map(FlightRow::new);
	let first = enricher.request_batch_enrichment(&rows, FlightRow::priority, false);

	assert_eq!(first.enqueued, 7);

	wait_until(|| !enricher.is_enabled()).await;

	let stats = enricher.stats();

	assert_eq!(stats.queued, 0);
	assert_eq!(stats.consecutive_errors, 5);

	let later = enricher.request_batch_enrichment(&rows, FlightRow::priority, true);

	assert_eq!(later.gated, Some(BatchGate::Disabled));
	assert_eq!(later.enqueued, 0);
	assert_eq!(
		enricher.request_enrichment("B1"),
		RequestOutcome::Skipped(SkipReason::Disabled)
	);

	mock.assert_calls_async(5).await;
}

#[tokio::test]
async fn batch_dedupes_and_respects_interval() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(ENDPOINT_PATH);
			then.status(200).header("content-type", "application/json").body(TIMING_BODY);
		})
		.await;
	let (enricher, applied) = build_enricher(&server, Arc::new(MemoryStore::default()));
	let rows = ["AAL123", "AAL123", "DAL456"].map(FlightRow::new);
	let first = enricher.request_batch_enrichment(&rows, FlightRow::priority, false);

	assert_eq!(first.enqueued, 2);

	wait_until(|| applied.count() == 2).await;

	let extra = [FlightRow::new("AAL123"), FlightRow::new("UAL789")];
	let gated = enricher.request_batch_enrichment(&extra, FlightRow::priority, false);

	assert_eq!(gated.gated, Some(BatchGate::Interval));
	assert_eq!(gated.applied, 1, "Cached rows are applied even when gated.");
	assert_eq!(gated.enqueued, 0);

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn file_mirror_survives_a_restart() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(ENDPOINT_PATH).query_param("cs", "SWA9");
			then.status(200).header("content-type", "application/json").body(TIMING_BODY);
		})
		.await;
	let dir = temp_dir();
	let store = FileStore::open(&dir).expect("File store should open.");
	let (first, applied) = build_enricher(&server, Arc::new(store.clone()));

	first.request_enrichment("SWA9");
	wait_until(|| applied.count() == 1).await;
	first.flush().await.expect("Flush should write the mirror.");

	let blob = fs::read_to_string(store.path_for(&fast_test_config().storage_key))
		.expect("Mirror file should exist.");

	assert!(blob.contains("\"SWA9\""));

	let (second, reapplied) = build_enricher(&server, Arc::new(store));

	assert_eq!(second.load().await.expect("Load should read the mirror."), 1);
	assert_eq!(second.request_enrichment("swa9"), RequestOutcome::AppliedFromCache);
	assert_eq!(reapplied.count(), 1);

	mock.assert_calls_async(1).await;

	fs::remove_dir_all(&dir).unwrap_or_else(|e| {
		panic!("Failed to remove temporary mirror directory {}: {e}", dir.display())
	});
}
