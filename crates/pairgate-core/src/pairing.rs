// ── Pairing records ──
//
// Phone-number normalization and the short-lived code issued by the
// platform. Records are replaced wholesale by the next successful request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::CoreError;

pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 15;

/// Strip everything but ASCII digits and check the length.
pub fn normalize_phone_number(input: &str) -> Result<String, CoreError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(CoreError::InvalidInput {
            reason: format!(
                "expected {MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits, got {}",
                digits.len()
            ),
        })
    }
}

/// A code issued for one connection generation.
#[derive(Debug, Clone)]
pub struct PairingRecord {
    pub code: String,
    pub generation: u64,
    pub issued_at: DateTime<Utc>,
    pub requested_at: Instant,
    pub expires_at: Instant,
}

impl PairingRecord {
    pub fn new(code: String, generation: u64, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            code,
            generation,
            issued_at: Utc::now(),
            requested_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Successful result of a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    /// Upper-cased code as shown to the user.
    pub code: String,
    pub expires_in: Duration,
}
