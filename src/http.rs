//! Transport primitives for enrichment fetches.
//!
//! [`EnrichHttpClient`] is the client's only dependency on an HTTP stack. Implementations
//! issue a plain `GET` and hand back the status, the Retry-After hint, and the raw body;
//! classifying the response (success, throttled, malformed) stays inside the client so every
//! transport gets the same rate bookkeeping.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{CACHE_CONTROL, HeaderMap, RETRY_AFTER};
use time::{PrimitiveDateTime, format_description::well_known::Rfc2822, macros::format_description};
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{_prelude::*, key::EnrichKey};

/// Boxed future returned by [`EnrichHttpClient::get`].
pub type FetchFuture<'a, E> = Pin<Box<dyn Future<Output = Result<FetchResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP transports able to fetch enrichment documents.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// drain task and the caller, and the futures they return must be `Send` so the client can
/// spawn them on a multi-threaded runtime.
pub trait EnrichHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Issues `GET url` and collects the response.
	///
	/// Non-success statuses are *not* errors at this layer; only failures that prevent a
	/// response from being read (DNS, TCP, TLS, a truncated body) are.
	fn get(&self, url: Url) -> FetchFuture<'_, Self::TransportError>;
}

/// Metadata captured from an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Response collected by an [`EnrichHttpClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
	/// Status and retry hint.
	pub metadata: ResponseMetadata,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl FetchResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.metadata.status)
	}
}

/// Builds the fetch URL for `key` (`<endpoint>?cs=<KEY>`), keeping existing query pairs.
pub fn enrichment_url(endpoint: &Url, key: &EnrichKey) -> Url {
	let mut url = endpoint.clone();

	url.query_pairs_mut().append_pair("cs", key.as_str());

	url
}

/// Parses a Retry-After value observed at `now`.
///
/// Integer values are seconds. HTTP dates (IMF-fixdate plus the obsolete RFC 850 and asctime
/// forms) are converted to whole seconds from `now`, rounded up and floored at zero. Anything
/// else yields `None`.
pub fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}
	if raw.bytes().all(|b| b.is_ascii_digit()) {
		return raw.parse::<i64>().ok().map(Duration::seconds);
	}

	let moment = parse_http_date(raw)?;
	let millis = (moment - now).whole_milliseconds();
	let seconds = if millis <= 0 { 0 } else { (millis + 999) / 1_000 };

	Some(Duration::seconds(seconds as i64))
}

fn parse_http_date(raw: &str) -> Option<OffsetDateTime> {
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		return Some(moment);
	}

	// Both obsolete forms are rewritten to `D Mon YYYY HH:MM:SS` and read as UTC.
	let normalized = match raw.split_once(',') {
		// RFC 850: `Sunday, 06-Nov-94 08:49:37 GMT`.
		Some((_, rest)) => {
			let mut parts = rest.split_whitespace();
			let (date, clock) = (parts.next()?, parts.next()?);
			let mut date = date.splitn(3, '-');
			let (day, month, year) = (date.next()?, date.next()?, date.next()?);
			let year = match year.parse::<u16>().ok()? {
				year @ 0..=69 => 2_000 + year,
				year @ 70..=99 => 1_900 + year,
				year => year,
			};

			format!("{day} {month} {year} {clock}")
		},
		// asctime: `Sun Nov  6 08:49:37 1994`.
		None => {
			let parts = raw.split_whitespace().collect::<Vec<_>>();
			let [_, month, day, clock, year] = parts.as_slice() else {
				return None;
			};

			format!("{day} {month} {year} {clock}")
		},
	};

	PrimitiveDateTime::parse(
		&normalized,
		format_description!(
			"[day padding:none] [month repr:short] [year] [hour]:[minute]:[second]"
		),
	)
	.ok()
	.map(PrimitiveDateTime::assume_utc)
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Every request carries `Cache-Control: no-cache`; freshness is decided by the client's own
/// caches, never by an intermediary.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Per-request deadline of the default transport.
	///
	/// Only one fetch is ever in flight, so a hung request would stall the whole queue.
	pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

	/// Builds the default transport with [`Self::REQUEST_TIMEOUT`].
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(Self::REQUEST_TIMEOUT)
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl EnrichHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn get(&self, url: Url) -> FetchFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client.get(url).header(CACHE_CONTROL, "no-cache").send().await?;
			let status = response.status().as_u16();
			let retry_after = retry_after_header(response.headers());
			let body = response.bytes().await?.to_vec();

			Ok::<_, ReqwestError>(FetchResponse {
				metadata: ResponseMetadata { status, retry_after },
				body,
			})
		})
	}
}

#[cfg(feature = "reqwest")]
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;

	parse_retry_after(raw, OffsetDateTime::now_utc())
}
