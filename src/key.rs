//! Normalized enrichment keys (flight callsigns).

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const KEY_MAX_LEN: usize = 16;

/// Error returned when a raw callsign cannot be normalized into an [`EnrichKey`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum KeyError {
	/// The key was empty or whitespace.
	#[error("Enrichment key cannot be empty.")]
	Empty,
	/// The key contains whitespace between other characters.
	#[error("Enrichment key contains whitespace.")]
	ContainsWhitespace,
	/// The key exceeded the allowed character count.
	#[error("Enrichment key exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Uppercased flight callsign used as cache, dedupe, and query key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnrichKey(String);
impl EnrichKey {
	/// Trims and uppercases `value`, then validates it.
	pub fn new(value: impl AsRef<str>) -> Result<Self, KeyError> {
		let normalized = value.as_ref().trim().to_uppercase();

		validate_view(&normalized)?;

		Ok(Self(normalized))
	}

	/// Returns the normalized key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for EnrichKey {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for EnrichKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for EnrichKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<EnrichKey> for String {
	fn from(value: EnrichKey) -> Self {
		value.0
	}
}
impl TryFrom<String> for EnrichKey {
	type Error = KeyError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for EnrichKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for EnrichKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "EnrichKey({})", self.0)
	}
}
impl Display for EnrichKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), KeyError> {
	if view.is_empty() {
		return Err(KeyError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(KeyError::ContainsWhitespace);
	}
	if view.chars().count() > KEY_MAX_LEN {
		return Err(KeyError::TooLong { max: KEY_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn keys_are_trimmed_and_uppercased() {
		let key = EnrichKey::new("  aal123 ").expect("Padded callsign should normalize.");

		assert_eq!(key.as_str(), "AAL123");
		assert_eq!(key, EnrichKey::new("AAL123").expect("Uppercase callsign should be valid."));
	}

	#[test]
	fn invalid_keys_are_rejected() {
		assert_eq!(EnrichKey::new(""), Err(KeyError::Empty));
		assert_eq!(EnrichKey::new("   "), Err(KeyError::Empty));
		assert_eq!(EnrichKey::new("AAL 123"), Err(KeyError::ContainsWhitespace));
		assert_eq!(
			EnrichKey::new("A".repeat(KEY_MAX_LEN + 1)),
			Err(KeyError::TooLong { max: KEY_MAX_LEN })
		);

		EnrichKey::new("A".repeat(KEY_MAX_LEN)).expect("Exact length should succeed.");
	}

	#[test]
	fn serde_normalizes_and_validates() {
		let key: EnrichKey =
			serde_json::from_str("\"dal456\"").expect("Key should deserialize successfully.");

		assert_eq!(key.as_str(), "DAL456");
		assert!(serde_json::from_str::<EnrichKey>("\"\"").is_err());
		assert_eq!(
			serde_json::to_string(&key).expect("Key should serialize successfully."),
			"\"DAL456\""
		);
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<EnrichKey, u8> = HashMap::from_iter([(
			EnrichKey::new("ual1").expect("Lookup key should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("UAL1"), Some(&7));
	}
}
