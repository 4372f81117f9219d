//! Flight timing payloads returned by the enrichment endpoint.
//!
//! The proxy relays the upstream flight document mostly untouched, so only the timing
//! fields the UI consumes are typed. Everything else is kept in `extra` maps so a payload
//! survives the round trip through the persisted cache mirror.

// crates.io
use serde::Deserializer;
use serde_json::{Map, Value};
use time::{PrimitiveDateTime, macros::format_description};
// self
use crate::{_prelude::*, error::TransientError};

/// Supplementary timing document for one flight.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightTiming {
	/// Departure-side times.
	#[serde(default, deserialize_with = "null_as_default")]
	pub departure: DepartureTiming,
	/// Arrival-side times.
	#[serde(default, deserialize_with = "null_as_default")]
	pub arrival: ArrivalTiming,
	/// Untyped top-level fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl FlightTiming {
	/// Decodes a response body.
	///
	/// Blank bodies and a JSON `null` are reported as [`TransientError::EmptyPayload`].
	pub fn from_body(body: &[u8], status: u16) -> Result<Self, TransientError> {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Err(TransientError::EmptyPayload { status });
		}

		let de = &mut serde_json::Deserializer::from_slice(body);
		let parsed: Option<Self> = serde_path_to_error::deserialize(de)
			.map_err(|source| TransientError::MalformedPayload { source, status })?;

		parsed.ok_or(TransientError::EmptyPayload { status })
	}

	/// Parses every timing field the UI renders.
	pub fn times(&self) -> FlightTimes {
		let dep = &self.departure;
		let arr = &self.arrival;

		FlightTimes {
			edct: first_timestamp([&dep.edct]),
			takeoff: first_timestamp([&dep.takeoff_time]),
			eta: first_timestamp([&arr.eta]),
			meter_fix: first_timestamp([&arr.mft, &arr.eta_mf]),
			vertex: first_timestamp([
				&arr.vt,
				&arr.eta_vt,
				&arr.eta_vertex,
				&arr.eta_vertex_time,
				&arr.vertex_time,
			]),
		}
	}
}

/// Departure sub-document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartureTiming {
	/// Expect Departure Clearance Time.
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub edct: Option<String>,
	/// Actual or projected wheels-up time.
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub takeoff_time: Option<String>,
	/// Untyped departure fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Arrival sub-document.
///
/// The upstream feed has used several names for the meter-fix and vertex times; all of them
/// are accepted and the first non-empty one wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrivalTiming {
	/// Estimated time of arrival.
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub eta: Option<String>,
	/// Meter-fix crossing time.
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub mft: Option<String>,
	/// Meter-fix crossing time (legacy name).
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub eta_mf: Option<String>,
	/// Vertex time.
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub vt: Option<String>,
	/// Vertex time (alias `eta_vt`).
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub eta_vt: Option<String>,
	/// Vertex time (alias `eta_vertex`).
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub eta_vertex: Option<String>,
	/// Vertex time (alias `eta_vertex_time`).
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub eta_vertex_time: Option<String>,
	/// Vertex time (alias `vertex_time`).
	#[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
	pub vertex_time: Option<String>,
	/// Untyped arrival fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Parsed UTC instants extracted from a [`FlightTiming`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlightTimes {
	/// Expect Departure Clearance Time.
	pub edct: Option<OffsetDateTime>,
	/// Takeoff time.
	pub takeoff: Option<OffsetDateTime>,
	/// Estimated time of arrival.
	pub eta: Option<OffsetDateTime>,
	/// Meter-fix time.
	pub meter_fix: Option<OffsetDateTime>,
	/// Vertex time.
	pub vertex: Option<OffsetDateTime>,
}
impl FlightTimes {
	/// Returns `true` when every field is populated.
	pub fn is_complete(&self) -> bool {
		self.edct.is_some()
			&& self.takeoff.is_some()
			&& self.eta.is_some()
			&& self.meter_fix.is_some()
			&& self.vertex.is_some()
	}

	/// Replaces fields with the ones populated in `newer`, keeping the rest.
	pub fn overlay(&mut self, newer: FlightTimes) {
		self.edct = newer.edct.or(self.edct);
		self.takeoff = newer.takeoff.or(self.takeoff);
		self.eta = newer.eta.or(self.eta);
		self.meter_fix = newer.meter_fix.or(self.meter_fix);
		self.vertex = newer.vertex.or(self.vertex);
	}
}

/// Parses a feed timestamp as UTC.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS]`, a `T` separator, a trailing `Z`, and fractional seconds
/// (which are discarded).
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return None;
	}

	let mut view = trimmed.replacen('T', " ", 1);

	view.retain(|c| c != 'Z' && c != 'z');

	if let Some(dot) = view.find('.') {
		view.truncate(dot);
	}

	let view = view.trim_end();
	let parsed = PrimitiveDateTime::parse(
		view,
		format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
	)
	.or_else(|_| {
		PrimitiveDateTime::parse(view, format_description!("[year]-[month]-[day] [hour]:[minute]"))
	})
	.ok()?;

	Some(parsed.assume_utc())
}

fn first_timestamp<const N: usize>(candidates: [&Option<String>; N]) -> Option<OffsetDateTime> {
	candidates
		.into_iter()
		.filter_map(|value| value.as_deref())
		.find(|value| !value.trim().is_empty())
		.and_then(parse_timestamp)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::String(value) => Some(value),
		_ => None,
	})
}
