//! Human-readable record numbers
//!
//! Borrowers, employees, investors and loans all share the same scheme:
//! `{year}/{month}/{random}`, e.g. `2024/3/5577006791947779410`.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::error::{LoanrError, Result};

/// Generate a record number for the given instant
///
/// The random component makes collisions improbable, not impossible.
pub fn generate_number(now: DateTime<Utc>) -> String {
    let random: u64 = rand::rng().random_range(0..=i64::MAX as u64);
    format!("{}/{}/{}", now.year(), now.month(), random)
}

/// Generate a record number that `is_taken` does not reject
///
/// Gives up with `StorageFailure` after `max_attempts` candidates.
pub fn generate_unique<F>(now: DateTime<Utc>, max_attempts: u32, mut is_taken: F) -> Result<String>
where
    F: FnMut(&str) -> Result<bool>,
{
    for _ in 0..max_attempts.max(1) {
        let candidate = generate_number(now);
        if !is_taken(&candidate)? {
            return Ok(candidate);
        }
        log::debug!("Number {} already taken, retrying", candidate);
    }

    Err(LoanrError::StorageFailure(format!(
        "could not generate an unused number after {} attempts",
        max_attempts
    )))
}
