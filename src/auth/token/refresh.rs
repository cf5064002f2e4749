//! Versioned single-use refresh token record and its tolerant decoder.

// self
use crate::{_prelude::*, auth::TokenSecret, store::StoreError};

/// Current single-use refresh token plus rotation bookkeeping.
///
/// Version `0` marks a legacy unversioned record or the bootstrap token; it is never
/// written back. Every successful rotation writes `version + 1`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken {
	/// Refresh secret; callers must avoid logging it.
	pub token: TokenSecret,
	/// Rotation counter.
	pub version: u64,
	/// Instant the record was written.
	#[serde(rename = "updatedAt", with = "time::serde::timestamp")]
	pub updated_at: OffsetDateTime,
}
impl RefreshToken {
	/// Builds a version-0 record from a plain token (bootstrap or legacy storage).
	pub fn legacy(token: impl Into<String>) -> Self {
		Self { token: TokenSecret::new(token), version: 0, updated_at: OffsetDateTime::UNIX_EPOCH }
	}

	/// Builds the successor record for a freshly rotated secret.
	pub fn rotated(
		token: impl Into<TokenSecret>,
		previous_version: u64,
		updated_at: OffsetDateTime,
	) -> Self {
		Self { token: token.into(), version: previous_version.saturating_add(1), updated_at }
	}

	/// Returns `true` for version-0 records that predate versioning.
	pub fn is_legacy(&self) -> bool {
		self.version == 0
	}

	/// Returns the raw refresh value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	/// Encodes the record in the versioned shape written to the shared store.
	pub fn encode(&self) -> Result<String, StoreError> {
		serde_json::to_string(self).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode refresh token record: {e}"),
		})
	}

	/// Decodes a stored value, accepting both the versioned shape and a legacy plain token.
	pub fn decode(raw: &str) -> Result<Self, StoreError> {
		let trimmed = raw.trim();

		if trimmed.is_empty() {
			return Err(StoreError::Serialization {
				message: "Stored refresh token record is empty".into(),
			});
		}

		let stored = if trimmed.starts_with('{') {
			serde_json::from_str::<StoredRefreshToken>(trimmed).map_err(|e| {
				StoreError::Serialization {
					message: format!("Failed to decode refresh token record: {e}"),
				}
			})?
		} else {
			serde_json::from_str::<StoredRefreshToken>(trimmed)
				.unwrap_or_else(|_| StoredRefreshToken::Legacy(trimmed.to_owned()))
		};

		Ok(stored.into())
	}
}
impl Debug for RefreshToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshToken")
			.field("token", &"<redacted>")
			.field("version", &self.version)
			.field("updated_at", &self.updated_at)
			.finish()
	}
}

/// Shapes a refresh token may take in the shared store.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRefreshToken {
	Versioned {
		token: String,
		version: u64,
		#[serde(rename = "updatedAt", with = "time::serde::timestamp")]
		updated_at: OffsetDateTime,
	},
	Legacy(String),
}
impl From<StoredRefreshToken> for RefreshToken {
	fn from(value: StoredRefreshToken) -> Self {
		match value {
			StoredRefreshToken::Versioned { token, version, updated_at } =>
				Self { token: TokenSecret::new(token), version, updated_at },
			StoredRefreshToken::Legacy(token) => Self::legacy(token),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn decodes_versioned_records() {
		let record = RefreshToken::decode(
			"{\"token\":\"refresh-7\",\"version\":7,\"updatedAt\":1735689600}",
		)
		.expect("Versioned record should decode.");

		assert_eq!(record.expose(), "refresh-7");
		assert_eq!(record.version, 7);
		assert_eq!(record.updated_at, macros::datetime!(2025-01-01 00:00 UTC));
	}

	#[test]
	fn plain_values_decode_as_legacy_version_zero() {
		let plain = RefreshToken::decode("legacy-token-value").expect("Plain token should decode.");

		assert_eq!(plain.expose(), "legacy-token-value");
		assert_eq!(plain.version, 0);
		assert!(plain.is_legacy());

		let quoted = RefreshToken::decode("\"quoted-legacy\"").expect("JSON string should decode.");

		assert_eq!(quoted.expose(), "quoted-legacy");
		assert_eq!(quoted.version, 0);
	}

	#[test]
	fn malformed_objects_and_empty_values_are_rejected() {
		assert!(RefreshToken::decode("{\"token\":\"missing-version\"}").is_err());
		assert!(RefreshToken::decode("   ").is_err());
	}

	#[test]
	fn rotation_increments_and_encodes_versioned_shape() {
		let previous = RefreshToken::legacy("bootstrap");
		let next =
			RefreshToken::rotated("rotated", previous.version, macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(next.version, 1);
		assert_eq!(
			next.encode().expect("Rotated record should encode."),
			"{\"token\":\"rotated\",\"version\":1,\"updatedAt\":1735689600}"
		);
		assert!(!format!("{next:?}").contains("rotated"));
	}
}
