//! Token issuance and lifecycle: signed access tokens, opaque refresh
//! tokens, rotation with family-wide reuse revocation, and the deny-list
//! check for revoked access tokens.
//!
//! Refresh tokens are grouped into families. A family is created at login and
//! tracks which token is currently valid; every rotation advances that
//! pointer. Presenting a token that belongs to a family but is no longer its
//! current one means the token leaked (or the client replayed it), and the
//! entire family is revoked.

pub mod jwt;

use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::TokenStore;

pub use jwt::{AccessClaims, TokenSigner};

const REFRESH_TOKEN_BYTES: usize = 32;

/// What a successful login or refresh hands back to the client.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Store-side record for one opaque refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub family_id: Uuid,
}

/// One rotation chain of refresh tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenFamily {
    pub family_id: Uuid,
    pub user_id: Uuid,
    /// The only token in this family that may be redeemed next.
    pub current_token: String,
    pub revoked: bool,
}

/// Result of the atomic pointer advance performed by
/// [`TokenStore::rotate_family`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The presented token was current; the pointer now names the new token.
    Rotated,
    /// The presented token belongs to the family but was already rotated out.
    NotCurrent,
    /// The family was revoked earlier.
    Revoked,
    /// No such family.
    Missing,
}

/// Issues, rotates, validates, and revokes tokens.
pub struct TokenLifecycle {
    signer: TokenSigner,
    store: Arc<dyn TokenStore>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenLifecycle {
    pub fn new(
        signer: TokenSigner,
        store: Arc<dyn TokenStore>,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            store,
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Mint an access/refresh pair for a fresh login, opening a new token
    /// family.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if signing or persistence fails.
    pub async fn issue_pair(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<TokenPair> {
        let access_token = self.sign_access(user_id, now)?;
        let refresh_token = generate_refresh_token()?;

        let family_id = Uuid::new_v4();
        self.store
            .put_family(TokenFamily {
                family_id,
                user_id,
                current_token: refresh_token.clone(),
                revoked: false,
            })
            .await?;
        self.store
            .store_refresh_token(
                &refresh_token,
                RefreshTokenRecord { user_id, family_id },
                self.refresh_ttl,
            )
            .await?;

        debug!(user_id = %user_id, family_id = %family_id, "issued token pair");
        Ok(self.pair(access_token, refresh_token))
    }

    /// Redeem a refresh token for a new pair, rotating the family pointer.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] for a token the store has never seen
    /// and [`Error::Unauthorized`] for a revoked family or a detected replay;
    /// a replay also revokes the whole family.
    pub async fn refresh(&self, presented: &str, now: DateTime<Utc>) -> Result<TokenPair> {
        let Some(record) = self.store.get_refresh_token(presented).await? else {
            warn!("refresh token not recognized");
            return Err(Error::InvalidToken);
        };

        let next = generate_refresh_token()?;
        match self
            .store
            .rotate_family(record.family_id, presented, &next)
            .await?
        {
            RotationOutcome::Rotated => {
                self.store
                    .store_refresh_token(
                        &next,
                        RefreshTokenRecord {
                            user_id: record.user_id,
                            family_id: record.family_id,
                        },
                        self.refresh_ttl,
                    )
                    .await?;
                let access_token = self.sign_access(record.user_id, now)?;
                debug!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "rotated refresh token"
                );
                Ok(self.pair(access_token, next))
            }
            RotationOutcome::NotCurrent => {
                warn!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "rotated-out refresh token replayed; revoking token family"
                );
                self.store.revoke_family(record.family_id).await?;
                Err(Error::Unauthorized)
            }
            RotationOutcome::Revoked => Err(Error::Unauthorized),
            RotationOutcome::Missing => {
                // Orphaned record without a family; drop it.
                self.store.delete_refresh_token(presented).await?;
                Err(Error::InvalidToken)
            }
        }
    }

    /// Verify an access token's signature, expiry, and deny-list status.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] for malformed/expired/forged tokens
    /// and [`Error::Unauthorized`] for deny-listed ones.
    pub async fn validate_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims> {
        let claims = self
            .signer
            .verify(token, &self.issuer, now.timestamp())
            .map_err(|err| {
                debug!(error = %err, "access token rejected");
                Error::InvalidToken
            })?;
        if self.store.deny_list_contains(&claims.jti).await? {
            return Err(Error::Unauthorized);
        }
        Ok(claims)
    }

    /// Deny-list an access token for the remainder of its lifetime and hand
    /// back its claims.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] if the token does not verify.
    pub async fn revoke_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims> {
        let claims = self
            .signer
            .verify(token, &self.issuer, now.timestamp())
            .map_err(|_| Error::InvalidToken)?;
        let remaining = claims.exp - now.timestamp();
        if remaining > 0 {
            self.store
                .deny_list_add(&claims.jti, Duration::from_secs(remaining.unsigned_abs()))
                .await?;
        }
        Ok(claims)
    }

    /// Revoke the family a refresh token belongs to.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] for an unknown token.
    pub async fn revoke_refresh(&self, token: &str) -> Result<()> {
        let Some(record) = self.store.get_refresh_token(token).await? else {
            return Err(Error::InvalidToken);
        };
        self.store.revoke_family(record.family_id).await?;
        Ok(())
    }

    /// Best-effort teardown of a just-issued pair when a later step of login
    /// fails. Never surfaces errors; the tokens expire naturally if cleanup
    /// misses.
    pub async fn discard_pair(&self, pair: &TokenPair) {
        match self.store.get_refresh_token(&pair.refresh_token).await {
            Ok(Some(record)) => {
                if let Err(err) = self.store.revoke_family(record.family_id).await {
                    warn!(error = %err, "failed to discard token family");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to look up token pair for discard"),
        }
    }

    fn sign_access(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            iat,
            exp: iat + self.access_ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };
        self.signer
            .sign(&claims)
            .map_err(|err| Error::Internal(anyhow::Error::new(err)))
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.as_secs() as i64,
        }
    }
}

fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::Internal(anyhow::anyhow!("rng failure: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTokenStore;

    const TEST_PRIVATE_KEY_PEM: &str = include_str!("../../tests/data/test_signing_key.pem");
    const ISSUER: &str = "https://idp.example.test";

    fn lifecycle() -> TokenLifecycle {
        let signer = TokenSigner::from_private_key(TEST_PRIVATE_KEY_PEM.as_bytes()).unwrap();
        TokenLifecycle::new(
            signer,
            Arc::new(MemoryTokenStore::new()),
            ISSUER,
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn issued_pair_validates() {
        let lifecycle = lifecycle();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let pair = lifecycle.issue_pair(user_id, now).await.unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);

        let claims = lifecycle
            .validate_access(&pair.access_token, now)
            .await
            .unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_replay_revokes_family() {
        let lifecycle = lifecycle();
        let now = Utc::now();
        let pair = lifecycle.issue_pair(Uuid::new_v4(), now).await.unwrap();

        let rotated = lifecycle.refresh(&pair.refresh_token, now).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // Replaying the rotated-out token burns the whole family.
        let replay = lifecycle.refresh(&pair.refresh_token, now).await;
        assert!(matches!(replay, Err(Error::Unauthorized)));
        // Revocation deleted every outstanding record, including the current
        // token's.
        let current = lifecycle.refresh(&rotated.refresh_token, now).await;
        assert!(matches!(current, Err(Error::InvalidToken)));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_invalid() {
        let lifecycle = lifecycle();
        let result = lifecycle.refresh("no-such-token", Utc::now()).await;
        assert!(matches!(result, Err(Error::InvalidToken)));
    }

    #[tokio::test]
    async fn revoked_access_token_is_rejected_until_expiry() {
        let lifecycle = lifecycle();
        let now = Utc::now();
        let pair = lifecycle.issue_pair(Uuid::new_v4(), now).await.unwrap();

        lifecycle.revoke_access(&pair.access_token, now).await.unwrap();
        let result = lifecycle.validate_access(&pair.access_token, now).await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn revoke_refresh_kills_the_family() {
        let lifecycle = lifecycle();
        let now = Utc::now();
        let pair = lifecycle.issue_pair(Uuid::new_v4(), now).await.unwrap();

        lifecycle.revoke_refresh(&pair.refresh_token).await.unwrap();
        let result = lifecycle.refresh(&pair.refresh_token, now).await;
        assert!(matches!(result, Err(Error::InvalidToken)));
    }

    #[tokio::test]
    async fn discard_pair_is_silent_and_effective() {
        let lifecycle = lifecycle();
        let now = Utc::now();
        let pair = lifecycle.issue_pair(Uuid::new_v4(), now).await.unwrap();

        lifecycle.discard_pair(&pair).await;
        let result = lifecycle.refresh(&pair.refresh_token, now).await;
        assert!(matches!(result, Err(Error::InvalidToken)));
    }
}
