//! Throttled, cached, circuit-breaking enrichment client for supplementary flight timing data:
//! one request in flight, adaptive spacing, Retry-After aware cooldowns, and a persisted cache
//! mirror so a restart does not refetch everything.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod enricher;
pub mod error;
pub mod http;
pub mod key;
pub mod obs;
pub mod payload;
pub mod queue;
pub mod rate;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, convert::Infallible};
	// self
	use crate::{
		config::EnrichConfig,
		enricher::{ApplyFn, Enricher},
		http::{EnrichHttpClient, FetchFuture, FetchResponse, ResponseMetadata},
		key::EnrichKey,
		payload::FlightTiming,
		store::{CacheStore, MemoryStore},
	};

	/// Enricher type alias driven by [`ScriptedHttpClient`].
	pub type ScriptedEnricher = Enricher<ScriptedHttpClient>;

	/// Config with millisecond spacing so drain loops finish quickly under test.
	pub fn fast_test_config() -> EnrichConfig {
		EnrichConfig::default()
			.with_delays(Duration::milliseconds(5), Duration::milliseconds(50))
			.with_cooldowns(
				Duration::milliseconds(20),
				Duration::milliseconds(40),
				Duration::milliseconds(60),
			)
			.with_persistence(Duration::milliseconds(10), 500)
	}

	/// Endpoint used by scripted clients.
	pub fn test_endpoint() -> Url {
		Url::parse("https://example.com/simtraffic").expect("Test endpoint should parse.")
	}

	/// Builds a response carrying `body` with `status`.
	pub fn json_response(status: u16, body: &str) -> FetchResponse {
		FetchResponse {
			metadata: ResponseMetadata { status, retry_after: None },
			body: body.as_bytes().to_vec(),
		}
	}

	/// Transport that replays queued responses and records requested URLs.
	///
	/// Once the script runs out every request answers `404`.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedHttpClient {
		responses: Arc<Mutex<VecDeque<FetchResponse>>>,
		requested: Arc<Mutex<Vec<String>>>,
	}
	impl ScriptedHttpClient {
		/// Queues the next response.
		pub fn push(&self, response: FetchResponse) {
			self.responses.lock().push_back(response);
		}

		/// URLs requested so far.
		pub fn requested(&self) -> Vec<String> {
			self.requested.lock().clone()
		}
	}
	impl EnrichHttpClient for ScriptedHttpClient {
		type TransportError = Infallible;

		fn get(&self, url: Url) -> FetchFuture<'_, Self::TransportError> {
			self.requested.lock().push(url.into());

			let response =
				self.responses.lock().pop_front().unwrap_or_else(|| json_response(404, ""));

			Box::pin(async move { Ok(response) })
		}
	}

	/// Apply callback that records every key it receives.
	#[derive(Clone, Debug, Default)]
	pub struct RecordingApply(Arc<Mutex<Vec<(EnrichKey, FlightTiming)>>>);
	impl RecordingApply {
		/// Callback handed to the enricher.
		pub fn callback(&self) -> ApplyFn {
			let seen = self.0.clone();

			Arc::new(move |key: &EnrichKey, payload: &FlightTiming| {
				seen.lock().push((key.clone(), payload.clone()))
			})
		}

		/// Number of applications so far.
		pub fn count(&self) -> usize {
			self.0.lock().len()
		}

		/// Most recent application.
		pub fn last(&self) -> Option<(EnrichKey, FlightTiming)> {
			self.0.lock().last().cloned()
		}

		/// Keys applied so far, in order.
		pub fn keys(&self) -> Vec<String> {
			self.0.lock().iter().map(|(key, _)| key.to_string()).collect()
		}
	}

	/// Constructs an enricher backed by an in-memory store and the scripted transport.
	pub fn build_test_enricher(
		http_client: ScriptedHttpClient,
		config: EnrichConfig,
	) -> (ScriptedEnricher, MemoryStore, RecordingApply) {
		let store_backend = MemoryStore::default();
		let store: Arc<dyn CacheStore> = Arc::new(store_backend.clone());
		let apply = RecordingApply::default();
		let enricher =
			Enricher::with_http_client(test_endpoint(), config, store, http_client, apply.callback())
				.expect("Failed to build test enricher.");

		(enricher, store_backend, apply)
	}

	/// Polls `condition` until it holds, panicking after five seconds.
	pub async fn wait_until(mut condition: impl FnMut() -> bool) {
		let deadline = OffsetDateTime::now_utc() + Duration::seconds(5);

		while !condition() {
			assert!(OffsetDateTime::now_utc() < deadline, "Condition not reached within 5 seconds.");

			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
