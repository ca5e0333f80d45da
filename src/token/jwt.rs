//! RS256 access tokens.
//!
//! Minimal JWT handling over the `rsa` crate: one signing keypair owned by
//! the issuer, no key-set indirection. Claims carry subject, issuer,
//! issued-at, expiry, and a unique token id (`jti`) that the deny-list keys
//! on.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    alg: String,
    typ: String,
}

impl Header {
    fn rs256() -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_private_key(pem_or_der: &[u8]) -> Result<RsaPrivateKey, Error> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| Error::KeyParse)?;
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(s) {
            return Ok(key);
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(s) {
            return Ok(key);
        }
        return Err(Error::KeyParse);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs8_der(pem_or_der) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_der(pem_or_der) {
        return Ok(key);
    }
    Err(Error::KeyParse)
}

/// Holds the issuing keypair and signs/verifies access tokens.
pub struct TokenSigner {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl TokenSigner {
    /// Load the signing keypair from a PKCS#8 or PKCS#1 private key
    /// (PEM or DER).
    ///
    /// # Errors
    /// Returns [`Error::KeyParse`] if the key cannot be decoded.
    pub fn from_private_key(pem_or_der: &[u8]) -> Result<Self, Error> {
        let private_key = decode_private_key(pem_or_der)?;
        let signing_key = SigningKey::<Sha256>::new(private_key);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Create a signed RS256 token for the given claims.
    ///
    /// # Errors
    /// Returns an error if claims/header JSON cannot be encoded.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, Error> {
        let header_b64 = b64e_json(&Header::rs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, carries an unexpected
    /// algorithm or issuer, fails signature verification, or is expired.
    /// The deny-list is a separate check owned by the lifecycle manager.
    pub fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        now_unix_seconds: i64,
    ) -> Result<AccessClaims, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: Header = b64d_json(header_b64)?;
        if header.alg != "RS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let signature =
            Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: AccessClaims = b64d_json(claims_b64)?;
        if claims.iss != expected_issuer {
            return Err(Error::InvalidIssuer);
        }
        if claims.exp <= now_unix_seconds {
            return Err(Error::Expired);
        }
        Ok(claims)
    }
}
