//! Recovery code generation and verification.
//!
//! Codes are the fallback when MFA factors are unavailable. Only Argon2id
//! hashes (keyed with a server-side pepper) are ever persisted; the plaintext
//! batch is shown to the user once. Each code is consumable exactly once.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::{RngCore, rngs::OsRng};

pub const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
// No 0/O/1/I to keep transcription unambiguous.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated batch: plaintext codes for the user, hashes for the
/// store.
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a full batch using the provided pepper.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn generate(pepper: &[u8]) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code()?;
            let normalized = normalize_recovery_code(&code)?;
            code_hashes.push(hash_recovery_code(&normalized, pepper)?);
            codes.push(code);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Strip separators and canonicalize case before hashing or lookup.
///
/// # Errors
/// Returns an error for wrong length or characters outside the alphabet.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid recovery code characters"));
    }
    Ok(normalized)
}

/// Check a presented code against one stored hash.
///
/// # Errors
/// Returns an error for a malformed code or an unreadable stored hash.
pub fn verify_recovery_code(code: &str, stored_hash: &str, pepper: &[u8]) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid recovery code hash"))?;
    let argon2 = peppered_argon2(pepper)?;
    Ok(argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn hash_recovery_code(normalized: &str, pepper: &[u8]) -> Result<String> {
    let argon2 = peppered_argon2(pepper)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash recovery code: {err}"))?;
    Ok(hash.to_string())
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow!("failed to initialize Argon2id"))
}

fn generate_code() -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    OsRng
        .try_fill_bytes(&mut raw)
        .context("failed to generate recovery code bytes")?;
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

/// Group a normalized code for display (`ABCD-EFGH-JKLM`).
fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}
