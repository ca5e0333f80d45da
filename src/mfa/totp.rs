//! TOTP primitives: secret generation and time-step validation.
//!
//! Standard parameters: SHA-1, 6 digits, 30-second step. Validation accepts a
//! skew of one step either side of the current one.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Generate a fresh random TOTP seed.
///
/// # Errors
/// Returns an error if the generated secret cannot be decoded (should not
/// happen for a freshly generated one).
pub fn generate_seed() -> Result<Vec<u8>> {
    Secret::generate_secret()
        .to_bytes()
        .map_err(|err| anyhow!("totp secret generation failed: {err:?}"))
}

/// Build the TOTP instance for a stored seed.
///
/// # Errors
/// Returns an error if the seed is too short for the algorithm.
pub fn build(seed: Vec<u8>, issuer: &str, account_name: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECONDS,
        seed,
        Some(issuer.to_string()),
        account_name.to_string(),
    )
    .map_err(|err| anyhow!("totp init failed: {err}"))
}

/// Check a code against the seed at the current time, ±1 step.
///
/// # Errors
/// Returns an error if the seed is invalid or the system clock is unreadable.
pub fn verify(seed: Vec<u8>, code: &str) -> Result<bool> {
    // Account label does not participate in code validation.
    let totp = build(seed, "kawal", "user")?;
    totp.check_current(code)
        .map_err(|err| anyhow!("system time unavailable: {err}"))
}
