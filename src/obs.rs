//! Optional observability helpers for enrichment fetches.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `simtraffic_enrich.fetch` with the `key`
//!   field, plus debug/warn events for skips, successes, failures, and the circuit opening.
//! - Enable `metrics` to increment the `simtraffic_enrich_fetch_total` counter for every
//!   attempt/success/failure/circuit_open, labeled by `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
	/// A queued key was dequeued and sent upstream.
	Attempt,
	/// The payload was cached and applied.
	Success,
	/// The fetch failed and the key was negative-cached.
	Failure,
	/// The failure opened the session circuit.
	CircuitOpen,
}
impl FetchOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FetchOutcome::Attempt => "attempt",
			FetchOutcome::Success => "success",
			FetchOutcome::Failure => "failure",
			FetchOutcome::CircuitOpen => "circuit_open",
		}
	}
}
impl Display for FetchOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
