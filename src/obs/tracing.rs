// self
use crate::_prelude::*;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFetch<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFetch<F> = F;

/// A span builder wrapped around each enrichment fetch.
#[derive(Clone, Debug)]
pub struct FetchSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FetchSpan {
	/// Creates a new span tagged with the fetched key.
	pub fn new(key: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("simtraffic_enrich.fetch", key);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = key;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFetch<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event for a request that did not reach the queue.
pub fn trace_skip(key: &str, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, %reason, "Enrichment request skipped.");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, reason);
}

/// Emits a debug event for a cached payload.
pub fn trace_success(key: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, "Enrichment payload cached.");
	#[cfg(not(feature = "tracing"))]
	let _ = key;
}

/// Emits a warning for a failed fetch and the cooldown it caused.
pub fn trace_failure(key: &str, error: &Error, cooldown: Duration) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		key,
		status = error.status_hint(),
		cooldown_ms = cooldown.whole_milliseconds() as i64,
		%error,
		"Enrichment fetch failed."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (key, error, cooldown);
}

/// Emits the single warning logged when the circuit opens.
pub fn trace_circuit_open(total_errors: u32, consecutive_errors: u32, window_errors: usize) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		total_errors,
		consecutive_errors,
		window_errors,
		"Enrichment disabled for this session after repeated failures."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (total_errors, consecutive_errors, window_errors);
}

/// Emits a warning when queued keys cannot be drained for lack of a Tokio runtime.
pub fn trace_no_runtime(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%error, "Enrichment queue left pending; no Tokio runtime is running.");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Emits a warning for a swallowed storage failure.
pub fn trace_store_failure(stage: &'static str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(stage, %error, "Enrichment cache mirror unavailable.");
	#[cfg(not(feature = "tracing"))]
	let _ = (stage, error);
}
