//! Sealing of TOTP seeds at rest.
//!
//! ChaCha20-Poly1305 with the AAD bound to the owning user and credential, so
//! a ciphertext copied onto another row fails to open. Layout is
//! `nonce (12 bytes) || ciphertext`.

use anyhow::{Result, anyhow};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Encrypt a TOTP seed under the given key.
///
/// # Errors
/// Returns an error if encryption fails.
pub fn seal_seed(key: &[u8; 32], seed: &[u8], user_id: Uuid, credential_id: Uuid) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(user_id, credential_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: seed,
                aad: &aad,
            },
        )
        .map_err(|err| anyhow!("seed encryption failure: {err}"))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a sealed TOTP seed.
///
/// # Errors
/// Returns an error if the blob is too short, was sealed for a different
/// user/credential, or fails authentication.
pub fn open_seed(key: &[u8; 32], sealed: &[u8], user_id: Uuid, credential_id: Uuid) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(anyhow!("sealed seed too short"));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let aad = construct_aad(user_id, credential_id);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|err| anyhow!("seed decryption failure: {err}"))
}

fn construct_aad(user_id: Uuid, credential_id: Uuid) -> Vec<u8> {
    format!("totp-seed:v1|{user_id}|{credential_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = [7u8; 32];
        let user_id = Uuid::new_v4();
        let credential_id = Uuid::new_v4();

        let sealed = seal_seed(&key, b"seed-material", user_id, credential_id).unwrap();
        assert_ne!(sealed.as_slice(), b"seed-material");

        let opened = open_seed(&key, &sealed, user_id, credential_id).unwrap();
        assert_eq!(opened, b"seed-material");
    }

    #[test]
    fn open_fails_for_wrong_credential() {
        let key = [7u8; 32];
        let user_id = Uuid::new_v4();
        let sealed = seal_seed(&key, b"seed", user_id, Uuid::new_v4()).unwrap();
        assert!(open_seed(&key, &sealed, user_id, Uuid::new_v4()).is_err());
    }

    #[test]
    fn open_fails_for_tampered_ciphertext() {
        let key = [7u8; 32];
        let user_id = Uuid::new_v4();
        let credential_id = Uuid::new_v4();
        let mut sealed = seal_seed(&key, b"seed", user_id, credential_id).unwrap();
        if let Some(byte) = sealed.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(open_seed(&key, &sealed, user_id, credential_id).is_err());
    }

    #[test]
    fn open_rejects_truncated_blob() {
        let key = [7u8; 32];
        assert!(open_seed(&key, &[0u8; 4], Uuid::new_v4(), Uuid::new_v4()).is_err());
    }
}
