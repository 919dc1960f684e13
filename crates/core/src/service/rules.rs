//! Request normalization and token rules for the snippet lifecycle.

use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};

use crate::Error;

/// Lifetime applied when a request does not name one.
pub const DEFAULT_EXPIRES_IN: std::time::Duration = std::time::Duration::from_secs(365 * 24 * 60 * 60);

const EDIT_TOKEN_BYTES: usize = 32;

/// Absolute expiry for an optional humantime duration (`"2h"`, `"30m"`, `"7days"`).
///
/// # Errors
///
/// Returns `Error::Validation` for unparsable, zero, or overflowing durations.
pub fn parse_expires_in(expires_in: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    let duration = match expires_in {
        None => DEFAULT_EXPIRES_IN,
        Some(text) => humantime::parse_duration(text.trim())
            .map_err(|e| Error::Validation(format!("expires_in must be a duration like \"2h\" or \"15m\": {e}")))?,
    };
    if duration.is_zero() {
        return Err(Error::Validation("expires_in must be greater than zero".into()));
    }

    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| Error::Validation("expires_in is too large".into()))
}

/// 32 bytes from the OS RNG, hex-encoded.
pub fn generate_edit_token() -> String {
    let mut bytes = [0u8; EDIT_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time equality for bearer tokens.
pub fn tokens_match(supplied: &str, stored: &str) -> bool {
    let (a, b) = (supplied.as_bytes(), stored.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Empty strings count as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
