//! Error types shared by the enrichment client, its transport, and its stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Status fed into rate bookkeeping for a failed fetch.
	///
	/// Failures without an HTTP status (network errors, malformed or empty bodies) map to `0`.
	pub fn status_hint(&self) -> u16 {
		match self {
			Self::Transient(TransientError::Endpoint { status, .. }) => *status,
			_ => 0,
		}
	}

	/// Retry-After hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::Endpoint { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// The endpoint cannot carry a query string.
	#[error("Enrichment endpoint `{endpoint}` cannot carry query parameters.")]
	InvalidEndpoint {
		/// Offending endpoint.
		endpoint: String,
	},
	/// The cache mirror needs a non-blank storage key.
	#[error("Storage key cannot be empty.")]
	EmptyStorageKey,
	/// A capacity or threshold was zero.
	#[error("The {field} limit must be greater than zero.")]
	ZeroLimit {
		/// Offending config field.
		field: &'static str,
	},
	/// A lifetime or spacing was zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Offending config field.
		field: &'static str,
	},
	/// A cooldown or interval was negative.
	#[error("The {field} duration cannot be negative.")]
	NegativeDuration {
		/// Offending config field.
		field: &'static str,
	},
	/// `base_delay` exceeded `max_delay`.
	#[error("The base delay exceeds the maximum delay.")]
	DelayBoundsInverted,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry once the cooldown elapses).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Endpoint answered with a non-success status.
	#[error("Enrichment endpoint returned HTTP {status}.")]
	Endpoint {
		/// HTTP status code.
		status: u16,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Endpoint responded with JSON that does not describe flight timing.
	#[error("Enrichment endpoint returned malformed JSON.")]
	MalformedPayload {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Endpoint responded successfully without any data.
	#[error("Enrichment endpoint returned an empty payload.")]
	EmptyPayload {
		/// HTTP status code of the response.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the enrichment endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_hint_maps_statusless_failures_to_zero() {
		let throttled: Error =
			TransientError::Endpoint { status: 429, retry_after: Some(Duration::seconds(30)) }
				.into();

		assert_eq!(throttled.status_hint(), 429);
		assert_eq!(throttled.retry_after(), Some(Duration::seconds(30)));

		let empty: Error = TransientError::EmptyPayload { status: 200 }.into();

		assert_eq!(empty.status_hint(), 0);
		assert_eq!(empty.retry_after(), None);

		let network: Error = TransportError::network(std::io::Error::other("reset")).into();

		assert_eq!(network.status_hint(), 0);
	}
}
