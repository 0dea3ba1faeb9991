//! Cookie codec: seals and opens the stamped session cookie payload
//!
//! The codec owns the wire format of the session cookie: an AES-256-GCM
//! encrypted, authenticated record carrying the raw payload string and the
//! issue timestamp ("stamp"). Everything above this module deals in user ids
//! and stamps; everything below it deals in opaque base64url bytes.

use anyhow::anyhow;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::crypto::{
    decrypt_data, derive_encryption_key, encrypt_data, ENCRYPTION_KEY_SIZE,
};

/// Name of the session cookie on the wire
pub const SESSION_COOKIE_NAME: &str = "crumbgate_session";

// chrono durations are bounded by i64::MAX milliseconds
const MAX_DURATION_SECONDS: i64 = i64::MAX / 1000;

/// Convert a configured second count to a `Duration`, saturating at the
/// largest representable value instead of rewriting the configuration
pub(crate) fn saturating_seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_DURATION_SECONDS))
}

/// Wire-level record sealed into the session cookie: the raw payload string
/// and its issue timestamp (UTC, second precision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CookieRecord {
    pub value: String,
    pub stamp: i64,
}

/// Decode failure taxonomy for inbound session cookies
///
/// All variants collapse to the same anonymous-session outcome in the
/// middleware; they are distinguished for logging. `MalformedPayload` is the
/// hard case: the record passed authentication but does not carry a user id.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No session cookie on the request. Normal first-visit state.
    #[error("no session cookie present")]
    Missing,

    /// Undecodable, corrupt, tampered, or sealed under a different key
    #[error("cookie failed authentication: {0}")]
    Invalid(#[source] anyhow::Error),

    /// Authenticated record whose stamp is older than the configured max age
    #[error("cookie expired (issued at {stamp})")]
    Expired { stamp: DateTime<Utc> },

    /// Authenticated record whose payload is not an integer user id
    #[error("cookie payload is not a user id: {0:?}")]
    MalformedPayload(String),
}

/// Seals and opens session cookie values under a fixed key and max age
///
/// The key is derived once at construction and shared read-only across all
/// requests.
#[derive(Clone)]
pub struct CookieCodec {
    encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    max_age: Duration,
}

impl CookieCodec {
    /// Create a codec from raw key material and an absolute cookie lifetime
    #[must_use]
    pub fn new(key: &[u8], max_age_seconds: u64) -> Self {
        Self {
            encryption_key: derive_encryption_key(key),
            max_age: saturating_seconds(max_age_seconds),
        }
    }

    /// Seal a raw payload with the current time as its stamp
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn seal(&self, raw: &str) -> anyhow::Result<String> {
        self.seal_at(raw, Utc::now())
    }

    /// Seal a raw payload with an explicit stamp
    ///
    /// Used by the `testing` feature to mint back-dated cookies for refresh
    /// and expiry tests.
    pub(crate) fn seal_at(&self, raw: &str, stamp: DateTime<Utc>) -> anyhow::Result<String> {
        let record = CookieRecord {
            value: raw.to_owned(),
            stamp: stamp.timestamp(),
        };
        encrypt_data(&record, &self.encryption_key)
    }

    /// Open a sealed cookie value, returning the raw payload and its stamp
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Invalid` when authentication or decoding fails
    /// and `CodecError::Expired` when the stamp is older than the configured
    /// max age.
    pub fn open(&self, value: &str) -> Result<(String, DateTime<Utc>), CodecError> {
        let record: CookieRecord =
            decrypt_data(value, &self.encryption_key).map_err(CodecError::Invalid)?;

        let stamp = Utc
            .timestamp_opt(record.stamp, 0)
            .single()
            .ok_or_else(|| CodecError::Invalid(anyhow!("stamp out of range")))?;

        if Utc::now() - stamp > self.max_age {
            return Err(CodecError::Expired { stamp });
        }

        Ok((record.value, stamp))
    }

    /// Open a sealed cookie value and parse its payload as a user id
    ///
    /// # Errors
    ///
    /// In addition to the `open` failures, returns
    /// `CodecError::MalformedPayload` when the authenticated payload does not
    /// parse as an integer id.
    pub fn open_user_id(&self, value: &str) -> Result<(i64, DateTime<Utc>), CodecError> {
        let (raw, stamp) = self.open(value)?;
        let id = raw
            .parse::<i64>()
            .map_err(|_| CodecError::MalformedPayload(raw))?;
        Ok((id, stamp))
    }
}
