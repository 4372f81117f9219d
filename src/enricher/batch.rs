//! Batch inputs and results.

// self
use crate::{
	_prelude::*,
	payload::{FlightTiming, FlightTimes},
};

/// A record that can ask for enrichment in a batch pass.
pub trait EnrichTarget {
	/// Raw callsign; normalized by the client.
	fn callsign(&self) -> &str;

	/// Returns `true` while any timing the UI renders is still unknown.
	fn needs_enrichment(&self) -> bool;
}
impl<T> EnrichTarget for &T
where
	T: ?Sized + EnrichTarget,
{
	fn callsign(&self) -> &str {
		(**self).callsign()
	}

	fn needs_enrichment(&self) -> bool {
		(**self).needs_enrichment()
	}
}

/// Caller-side flight row holding the timings already known from other feeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlightRow {
	/// Callsign as displayed.
	pub callsign: String,
	/// Timings known so far.
	pub times: FlightTimes,
	/// Best-guess arrival used to order batch candidates.
	pub rough_eta: Option<OffsetDateTime>,
}
impl FlightRow {
	/// Creates a row with no known timings.
	pub fn new(callsign: impl Into<String>) -> Self {
		Self { callsign: callsign.into(), ..Default::default() }
	}

	/// Sets the timings already known.
	pub fn with_times(mut self, times: FlightTimes) -> Self {
		self.times = times;

		self
	}

	/// Sets the best-guess arrival.
	pub fn with_rough_eta(mut self, rough_eta: OffsetDateTime) -> Self {
		self.rough_eta = Some(rough_eta);

		self
	}

	/// Batch ordering key: earliest rough ETA first, rows without one last.
	pub fn priority(&self) -> (bool, Option<OffsetDateTime>) {
		(self.rough_eta.is_none(), self.rough_eta)
	}

	/// Overlays the timings carried by an enrichment payload.
	pub fn apply(&mut self, timing: &FlightTiming) {
		self.times.overlay(timing.times());
	}
}
impl EnrichTarget for FlightRow {
	fn callsign(&self) -> &str {
		&self.callsign
	}

	fn needs_enrichment(&self) -> bool {
		!self.times.is_complete()
	}
}

/// Reason a batch pass stopped before enqueueing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchGate {
	/// The circuit is open.
	Disabled,
	/// The previous accepted pass is too recent.
	Interval,
	/// A cooldown is active.
	Cooldown,
}

/// Result of [`Enricher::request_batch_enrichment`](crate::enricher::Enricher::request_batch_enrichment).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
	/// Targets served from the success cache.
	pub applied: usize,
	/// Keys added to the queue.
	pub enqueued: usize,
	/// Set when the pass stopped before enqueueing.
	pub gated: Option<BatchGate>,
}
