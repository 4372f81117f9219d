//! Request spacing, cooldowns, and the session circuit breaker.

// std
use std::collections::VecDeque;
// self
use crate::{_prelude::*, config::EnrichConfig};

/// Status and retry hint describing one failed fetch.
///
/// `status` is `0` for failures without an HTTP status (network errors, unusable bodies).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureSignal {
	/// HTTP status, or `0`.
	pub status: u16,
	/// Upstream Retry-After hint.
	pub retry_after: Option<Duration>,
}
impl FailureSignal {
	/// Failure without any HTTP status.
	pub const fn statusless() -> Self {
		Self { status: 0, retry_after: None }
	}

	/// Failure carrying an HTTP status.
	pub const fn http(status: u16, retry_after: Option<Duration>) -> Self {
		Self { status, retry_after }
	}

	fn is_rate_limited(&self) -> bool {
		matches!(self.status, 429 | 503)
	}

	fn is_server_side(&self) -> bool {
		self.status == 0 || self.status >= 500
	}
}
impl From<&Error> for FailureSignal {
	fn from(e: &Error) -> Self {
		Self { status: e.status_hint(), retry_after: e.retry_after() }
	}
}

/// Bookkeeping produced by [`RateState::note_failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureVerdict {
	/// Cooldown this failure asked for.
	pub cooldown: Duration,
	/// `true` only on the failure that opened the circuit.
	pub circuit_opened: bool,
}

/// Process-wide rate state shared by every key.
#[derive(Clone, Debug)]
pub struct RateState {
	cooldown_until: Option<OffsetDateTime>,
	consecutive_errors: u32,
	total_errors: u32,
	error_window: VecDeque<OffsetDateTime>,
	next_delay: Duration,
	enabled: bool,
}
impl RateState {
	/// Creates a closed-circuit state spaced at the configured base delay.
	pub fn new(config: &EnrichConfig) -> Self {
		Self {
			cooldown_until: None,
			consecutive_errors: 0,
			total_errors: 0,
			error_window: VecDeque::new(),
			next_delay: config.base_delay,
			enabled: true,
		}
	}

	/// Returns `false` once the circuit has opened.
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Instant before which no request may start.
	pub fn cooldown_until(&self) -> Option<OffsetDateTime> {
		self.cooldown_until
	}

	/// Time left in the current cooldown, if any.
	pub fn cooldown_remaining(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.cooldown_until.map(|until| until - instant).filter(|left| left.is_positive())
	}

	/// Current spacing between requests.
	pub fn next_delay(&self) -> Duration {
		self.next_delay
	}

	/// Failures since the last success.
	pub fn consecutive_errors(&self) -> u32 {
		self.consecutive_errors
	}

	/// Failures over the lifetime of the state.
	pub fn total_errors(&self) -> u32 {
		self.total_errors
	}

	/// Failures inside the sliding window as of the last failure.
	pub fn window_errors(&self) -> usize {
		self.error_window.len()
	}

	/// Resets the failure streak and the request spacing.
	pub fn note_success(&mut self, config: &EnrichConfig) {
		self.consecutive_errors = 0;
		self.next_delay = config.base_delay;
	}

	/// Records a failure, extends the cooldown, widens the spacing, and opens the circuit once a
	/// threshold is reached.
	pub fn note_failure(
		&mut self,
		signal: FailureSignal,
		instant: OffsetDateTime,
		config: &EnrichConfig,
	) -> FailureVerdict {
		self.total_errors = self.total_errors.saturating_add(1);
		self.consecutive_errors = self.consecutive_errors.saturating_add(1);
		self.error_window.push_back(instant);
		self.prune_window(instant, config.error_window);

		let cooldown = if signal.is_rate_limited() {
			signal
				.retry_after
				.map_or(config.cooldown_on_429, |hint| hint.max(config.cooldown_on_429))
		} else if signal.is_server_side()
			&& self.consecutive_errors >= EnrichConfig::SERVER_ERROR_BURST
		{
			config.cooldown_on_5xx_burst
		} else {
			config.error_backoff
		};
		let until = instant + cooldown;

		self.cooldown_until = Some(self.cooldown_until.map_or(until, |current| current.max(until)));
		self.next_delay = grow_delay(self.next_delay, config);

		let tripped = self.total_errors >= config.max_total_errors
			|| self.consecutive_errors >= config.max_consecutive_errors
			|| self.error_window.len() >= config.max_errors_per_window;
		let circuit_opened = tripped && self.enabled;

		if tripped {
			self.enabled = false;
		}

		FailureVerdict { cooldown, circuit_opened }
	}

	fn prune_window(&mut self, instant: OffsetDateTime, window: Duration) {
		let cutoff = instant - window;

		while self.error_window.front().is_some_and(|at| *at < cutoff) {
			self.error_window.pop_front();
		}
	}
}

fn grow_delay(current: Duration, config: &EnrichConfig) -> Duration {
	let grown_ms = current.whole_milliseconds() * EnrichConfig::DELAY_GROWTH_TENTHS / 10;
	let grown = Duration::milliseconds(grown_ms as i64);

	grown.max(config.error_backoff).min(config.max_delay)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn lenient_config() -> EnrichConfig {
		EnrichConfig::default().with_error_limits(Duration::seconds(60), 100, 100, 100)
	}

	#[test]
	fn rate_limit_honors_longer_retry_after() {
		let config = lenient_config();
		let mut state = RateState::new(&config);
		let now = datetime!(2025-03-14 18:00 UTC);
		let verdict = state.note_failure(
			FailureSignal::http(429, Some(Duration::seconds(120))),
			now,
			&config,
		);

		assert_eq!(verdict.cooldown, Duration::seconds(120));
		assert_eq!(state.cooldown_until(), Some(now + Duration::seconds(120)));

		let verdict =
			state.note_failure(FailureSignal::http(503, Some(Duration::seconds(5))), now, &config);

		assert_eq!(verdict.cooldown, config.cooldown_on_429);
		assert_eq!(state.cooldown_until(), Some(now + Duration::seconds(120)), "Never shortened.");
	}

	#[test]
	fn server_errors_escalate_after_burst() {
		let config = lenient_config();
		let mut state = RateState::new(&config);
		let now = datetime!(2025-03-14 18:00 UTC);
		let first = state.note_failure(FailureSignal::http(500, None), now, &config);
		let second = state.note_failure(FailureSignal::statusless(), now, &config);
		let third = state.note_failure(FailureSignal::http(502, None), now, &config);

		assert_eq!(first.cooldown, config.error_backoff);
		assert_eq!(second.cooldown, config.error_backoff);
		assert_eq!(third.cooldown, config.cooldown_on_5xx_burst);

		let client_error = state.note_failure(FailureSignal::http(404, None), now, &config);

		assert_eq!(client_error.cooldown, config.error_backoff);
	}

	#[test]
	fn delay_grows_until_capped_and_resets_on_success() {
		let config = lenient_config();
		let mut state = RateState::new(&config);
		let now = datetime!(2025-03-14 18:00 UTC);

		assert_eq!(state.next_delay(), Duration::milliseconds(650));

		state.note_failure(FailureSignal::http(404, None), now, &config);

		assert_eq!(state.next_delay(), Duration::milliseconds(2_500));

		state.note_failure(FailureSignal::http(404, None), now, &config);

		assert_eq!(state.next_delay(), Duration::milliseconds(4_250));

		for _ in 0..5 {
			state.note_failure(FailureSignal::http(404, None), now, &config);
		}

		assert_eq!(state.next_delay(), config.max_delay);

		state.note_success(&config);

		assert_eq!(state.next_delay(), config.base_delay);
		assert_eq!(state.consecutive_errors(), 0);
		assert_eq!(state.total_errors(), 7);
	}

	#[test]
	fn consecutive_errors_open_circuit_once() {
		let config = EnrichConfig::default();
		let mut state = RateState::new(&config);
		let now = datetime!(2025-03-14 18:00 UTC);

		for i in 0..4 {
			let verdict =
				state.note_failure(FailureSignal::http(500, None), now + Duration::minutes(i), &config);

			assert!(!verdict.circuit_opened);
		}

		let verdict = state.note_failure(FailureSignal::http(500, None), now, &config);

		assert!(verdict.circuit_opened);
		assert!(!state.is_enabled());

		let again = state.note_failure(FailureSignal::http(500, None), now, &config);

		assert!(!again.circuit_opened, "Only the opening failure reports the transition.");
	}

	#[test]
	fn total_errors_open_circuit_despite_successes() {
		let config = EnrichConfig::default();
		let mut state = RateState::new(&config);
		let start = datetime!(2025-03-14 18:00 UTC);

		for i in 0..7 {
			state.note_failure(FailureSignal::http(404, None), start + Duration::minutes(i * 2), &config);
			state.note_success(&config);
		}

		assert!(state.is_enabled());

		let verdict = state.note_failure(
			FailureSignal::http(404, None),
			start + Duration::minutes(20),
			&config,
		);

		assert!(verdict.circuit_opened);
	}

	#[test]
	fn window_prunes_old_errors() {
		let config = EnrichConfig::default().with_error_limits(Duration::seconds(60), 3, 100, 100);
		let mut state = RateState::new(&config);
		let start = datetime!(2025-03-14 18:00 UTC);

		state.note_failure(FailureSignal::http(404, None), start, &config);
		state.note_failure(FailureSignal::http(404, None), start + Duration::seconds(30), &config);
		state.note_failure(FailureSignal::http(404, None), start + Duration::seconds(90), &config);

		assert_eq!(state.window_errors(), 2);
		assert!(state.is_enabled());

		state.note_failure(FailureSignal::http(404, None), start + Duration::seconds(95), &config);

		assert!(state.is_enabled());

		state.note_failure(FailureSignal::http(404, None), start + Duration::seconds(100), &config);

		assert!(!state.is_enabled());
	}
}
