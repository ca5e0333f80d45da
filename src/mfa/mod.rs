//! Multi-factor authentication: enrollment state, challenges, recovery codes.
//!
//! Flow overview:
//! 1) The policy engine asks for MFA; the auth service creates a challenge
//!    here for one of the user's enrolled factors.
//! 2) The challenge is short-lived and single-use: deleted on success or
//!    expiry, retained on mismatch so the user may retry until it expires.
//! 3) TOTP seeds are sealed at rest; the cipher key is handed to the manager
//!    at construction, never read from ambient state.

pub mod crypto;
pub mod recovery;
pub mod totp;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::store::{ChallengeStore, MfaConfigStore};

const SMS_CODE_LEN: u32 = 6;

/// Second-factor kinds a user can enroll.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    Sms,
    Recovery,
}

impl MfaMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::Recovery => "recovery",
        }
    }

    /// Whether this method can answer a login challenge. Recovery codes are
    /// a fallback, not a challenge factor.
    #[must_use]
    pub fn challengeable(self) -> bool {
        matches!(self, Self::Totp | Self::Sms)
    }
}

/// Method-specific stored material. TOTP seeds are sealed; recovery codes are
/// hashes only.
#[derive(Clone, Debug)]
pub enum MfaMaterial {
    SealedTotpSeed {
        credential_id: Uuid,
        ciphertext: Vec<u8>,
    },
    SmsTarget {
        phone: String,
    },
    RecoveryHashes {
        hashes: Vec<String>,
    },
}

/// One user's configuration for one method. Mutated only through explicit
/// enrollment/removal operations.
#[derive(Clone, Debug)]
pub struct UserMfaConfig {
    pub user_id: Uuid,
    pub method: MfaMethod,
    pub material: MfaMaterial,
    pub enabled: bool,
}

/// Server-side record of one pending second-factor verification.
#[derive(Clone, Debug)]
pub struct MfaChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: MfaMethod,
    /// Expected code for SMS challenges; `None` for TOTP.
    pub sms_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MfaChallenge {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a TOTP enrollment, shown to the user once.
#[derive(Debug)]
pub struct TotpEnrollment {
    pub credential_id: Uuid,
    pub secret_base32: String,
    pub otpauth_url: String,
}

pub struct MfaManager {
    configs: Arc<dyn MfaConfigStore>,
    challenges: Arc<dyn ChallengeStore>,
    seal_key: [u8; 32],
    recovery_pepper: Vec<u8>,
    issuer: String,
}

impl MfaManager {
    /// `issuer` is the display name shown in authenticator apps, not the
    /// token issuer URL: the otpauth format forbids colons in it.
    ///
    /// # Errors
    /// Returns an error if the issuer contains a colon.
    pub fn new(
        configs: Arc<dyn MfaConfigStore>,
        challenges: Arc<dyn ChallengeStore>,
        seal_key: [u8; 32],
        recovery_pepper: Vec<u8>,
        issuer: impl Into<String>,
    ) -> Result<Self> {
        let issuer = issuer.into();
        if issuer.contains(':') {
            bail!("otpauth issuer must not contain a colon: {issuer:?}");
        }
        Ok(Self {
            configs,
            challenges,
            seal_key,
            recovery_pepper,
            issuer,
        })
    }

    /// True iff the user has at least one enabled challenge-capable factor.
    ///
    /// # Errors
    /// Returns an error if the config store fails.
    pub async fn should_enforce_mfa(&self, user_id: Uuid) -> Result<bool> {
        let configs = self.configs.list_configs(user_id).await?;
        Ok(configs
            .iter()
            .any(|config| config.enabled && config.method.challengeable()))
    }

    /// Enabled challenge-capable methods for the user, TOTP first.
    ///
    /// # Errors
    /// Returns an error if the config store fails.
    pub async fn available_methods(&self, user_id: Uuid) -> Result<Vec<MfaMethod>> {
        let configs = self.configs.list_configs(user_id).await?;
        let mut methods: Vec<MfaMethod> = configs
            .iter()
            .filter(|config| config.enabled && config.method.challengeable())
            .map(|config| config.method)
            .collect();
        methods.sort_by_key(|method| match method {
            MfaMethod::Totp => 0,
            MfaMethod::Sms => 1,
            MfaMethod::Recovery => 2,
        });
        methods.dedup();
        Ok(methods)
    }

    /// Enroll TOTP: generate a seed, seal it, persist the config, and return
    /// the provisioning material for the user.
    ///
    /// # Errors
    /// Returns an error if seed generation, sealing, or persistence fails.
    pub async fn enroll_totp(&self, user_id: Uuid, account_name: &str) -> Result<TotpEnrollment> {
        let seed = totp::generate_seed()?;
        let credential_id = Uuid::new_v4();
        let ciphertext = crypto::seal_seed(&self.seal_key, &seed, user_id, credential_id)?;

        let instance = totp::build(seed, &self.issuer, account_name)?;
        let enrollment = TotpEnrollment {
            credential_id,
            secret_base32: instance.get_secret_base32(),
            otpauth_url: instance.get_url(),
        };

        self.configs
            .upsert_config(UserMfaConfig {
                user_id,
                method: MfaMethod::Totp,
                material: MfaMaterial::SealedTotpSeed {
                    credential_id,
                    ciphertext,
                },
                enabled: true,
            })
            .await
            .context("failed to persist totp config")?;

        info!(%user_id, "totp factor enrolled");
        Ok(enrollment)
    }

    /// Enroll an SMS target as a second factor.
    ///
    /// # Errors
    /// Returns an error if persistence fails.
    pub async fn enroll_sms(&self, user_id: Uuid, phone: impl Into<String>) -> Result<()> {
        self.configs
            .upsert_config(UserMfaConfig {
                user_id,
                method: MfaMethod::Sms,
                material: MfaMaterial::SmsTarget {
                    phone: phone.into(),
                },
                enabled: true,
            })
            .await
            .context("failed to persist sms config")?;
        info!(%user_id, "sms factor enrolled");
        Ok(())
    }

    /// Validate a TOTP code against the user's enrolled seed (±1 step).
    ///
    /// # Errors
    /// Returns an error if no TOTP factor is enrolled or the seed cannot be
    /// opened.
    pub async fn verify_totp(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let config = self
            .configs
            .get_config(user_id, MfaMethod::Totp)
            .await?
            .filter(|config| config.enabled)
            .ok_or_else(|| anyhow!("no totp factor enrolled"))?;

        let MfaMaterial::SealedTotpSeed {
            credential_id,
            ciphertext,
        } = &config.material
        else {
            return Err(anyhow!("totp config holds unexpected material"));
        };

        let seed = crypto::open_seed(&self.seal_key, ciphertext, user_id, *credential_id)?;
        totp::verify(seed, code)
    }

    /// Create and persist a challenge for the user's preferred enrolled
    /// factor.
    ///
    /// # Errors
    /// Returns [`Error::Unauthorized`] when no challenge-capable factor is
    /// enrolled (fail closed), or an internal error on store failure.
    pub async fn issue_challenge(
        &self,
        user_id: Uuid,
        ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<MfaChallenge, Error> {
        let methods = self
            .available_methods(user_id)
            .await
            .map_err(Error::Internal)?;
        let Some(method) = methods.first().copied() else {
            return Err(Error::Unauthorized);
        };

        let sms_code = match method {
            MfaMethod::Sms => Some(generate_sms_code()),
            _ => None,
        };

        let challenge = MfaChallenge {
            id: Uuid::new_v4(),
            user_id,
            method,
            sms_code,
            created_at: now,
            expires_at: now + Duration::from_std(ttl).unwrap_or(Duration::minutes(5)),
        };
        self.challenges
            .put_challenge(challenge.clone())
            .await
            .map_err(Error::Internal)?;

        info!(%user_id, challenge_id = %challenge.id, method = method.as_str(), "mfa challenge issued");
        Ok(challenge)
    }

    /// Verify a code for a pending challenge and consume the challenge on
    /// success.
    ///
    /// Missing or expired challenges are [`Error::InvalidRequest`] (expired
    /// ones are deleted); a wrong code is [`Error::Unauthorized`] and leaves
    /// the challenge in place for bounded retry until expiry.
    ///
    /// # Errors
    /// See above; store failures surface as [`Error::Internal`].
    pub async fn verify_challenge(
        &self,
        challenge_id: Uuid,
        method: MfaMethod,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<MfaChallenge, Error> {
        let challenge = self
            .challenges
            .get_challenge(challenge_id)
            .await
            .map_err(Error::Internal)?
            .ok_or(Error::InvalidRequest)?;

        if challenge.is_expired(now) {
            self.challenges
                .delete_challenge(challenge_id)
                .await
                .map_err(Error::Internal)?;
            return Err(Error::InvalidRequest);
        }
        if challenge.method != method {
            return Err(Error::InvalidRequest);
        }

        let valid = match challenge.method {
            MfaMethod::Totp => self
                .verify_totp(challenge.user_id, code)
                .await
                .map_err(Error::Internal)?,
            MfaMethod::Sms => challenge
                .sms_code
                .as_deref()
                .is_some_and(|expected| expected.as_bytes().ct_eq(code.as_bytes()).into()),
            MfaMethod::Recovery => false,
        };

        if !valid {
            return Err(Error::Unauthorized);
        }

        self.challenges
            .delete_challenge(challenge_id)
            .await
            .map_err(Error::Internal)?;
        Ok(challenge)
    }

    /// Answer a pending challenge with a recovery code instead of the
    /// challenged factor. The code burns and the challenge is consumed on
    /// success.
    ///
    /// # Errors
    /// Missing or expired challenges are [`Error::InvalidRequest`]; a wrong
    /// or already-used code is [`Error::Unauthorized`].
    pub async fn redeem_recovery(
        &self,
        challenge_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<MfaChallenge, Error> {
        let challenge = self
            .challenges
            .get_challenge(challenge_id)
            .await
            .map_err(Error::Internal)?
            .ok_or(Error::InvalidRequest)?;

        if challenge.is_expired(now) {
            self.challenges
                .delete_challenge(challenge_id)
                .await
                .map_err(Error::Internal)?;
            return Err(Error::InvalidRequest);
        }

        let consumed = self
            .consume_recovery_code(challenge.user_id, code)
            .await
            .map_err(Error::Internal)?;
        if !consumed {
            return Err(Error::Unauthorized);
        }

        self.challenges
            .delete_challenge(challenge_id)
            .await
            .map_err(Error::Internal)?;
        Ok(challenge)
    }

    /// Generate a recovery-code batch, persist the hashes, return the
    /// plaintext codes once.
    ///
    /// # Errors
    /// Returns an error if generation or persistence fails.
    pub async fn generate_recovery_codes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let batch = recovery::RecoveryCodeBatch::generate(&self.recovery_pepper)?;
        self.configs
            .upsert_config(UserMfaConfig {
                user_id,
                method: MfaMethod::Recovery,
                material: MfaMaterial::RecoveryHashes {
                    hashes: batch.code_hashes,
                },
                enabled: true,
            })
            .await
            .context("failed to persist recovery codes")?;
        info!(%user_id, "recovery codes regenerated");
        Ok(batch.codes)
    }

    /// Check a recovery code and burn it on success.
    ///
    /// # Errors
    /// Returns an error if the store fails; an unknown or reused code is
    /// `Ok(false)`.
    pub async fn consume_recovery_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let Some(config) = self.configs.get_config(user_id, MfaMethod::Recovery).await? else {
            return Ok(false);
        };
        let MfaMaterial::RecoveryHashes { hashes } = &config.material else {
            return Ok(false);
        };

        let mut matched = None;
        for (idx, hash) in hashes.iter().enumerate() {
            // Malformed input is a plain mismatch here.
            if recovery::verify_recovery_code(code, hash, &self.recovery_pepper).unwrap_or(false) {
                matched = Some(idx);
                break;
            }
        }
        let Some(idx) = matched else {
            return Ok(false);
        };

        let mut remaining = hashes.clone();
        remaining.remove(idx);
        self.configs
            .upsert_config(UserMfaConfig {
                user_id,
                method: MfaMethod::Recovery,
                material: MfaMaterial::RecoveryHashes { hashes: remaining },
                enabled: config.enabled,
            })
            .await
            .context("failed to burn recovery code")?;
        info!(%user_id, "recovery code consumed");
        Ok(true)
    }

    /// Disable one of the user's factors.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn remove_factor(&self, user_id: Uuid, method: MfaMethod) -> Result<()> {
        self.configs.delete_config(user_id, method).await
    }
}

fn generate_sms_code() -> String {
    let code: u32 = OsRng.gen_range(0..10u32.pow(SMS_CODE_LEN));
    format!("{code:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryChallengeStore, MemoryMfaConfigStore};

    fn manager() -> MfaManager {
        MfaManager::new(
            Arc::new(MemoryMfaConfigStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            [9u8; 32],
            b"pepper".to_vec(),
            "kawal-test",
        )
        .unwrap()
    }

    #[test]
    fn url_shaped_issuer_is_rejected_at_construction() {
        let result = MfaManager::new(
            Arc::new(MemoryMfaConfigStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            [9u8; 32],
            b"pepper".to_vec(),
            "https://idp.example.test",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn enforcement_tracks_enrollment() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        assert!(!manager.should_enforce_mfa(user_id).await.unwrap());

        manager.enroll_totp(user_id, "alice@example.com").await.unwrap();
        assert!(manager.should_enforce_mfa(user_id).await.unwrap());

        manager.remove_factor(user_id, MfaMethod::Totp).await.unwrap();
        assert!(!manager.should_enforce_mfa(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_codes_alone_do_not_enforce_mfa() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.generate_recovery_codes(user_id).await.unwrap();
        assert!(!manager.should_enforce_mfa(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn totp_round_trip_through_sealed_seed() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let enrollment = manager.enroll_totp(user_id, "alice@example.com").await.unwrap();

        let secret = totp_rs::Secret::Encoded(enrollment.secret_base32.clone())
            .to_bytes()
            .unwrap();
        let instance = totp::build(secret, "kawal-test", "alice@example.com").unwrap();
        let code = instance.generate_current().unwrap();

        assert!(manager.verify_totp(user_id, &code).await.unwrap());
        assert!(!manager.verify_totp(user_id, "000000").await.unwrap() || code == "000000");
    }

    #[tokio::test]
    async fn challenge_prefers_totp_over_sms() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.enroll_sms(user_id, "+15550100").await.unwrap();
        manager.enroll_totp(user_id, "alice@example.com").await.unwrap();

        let challenge = manager
            .issue_challenge(user_id, std::time::Duration::from_secs(300), Utc::now())
            .await
            .unwrap();
        assert_eq!(challenge.method, MfaMethod::Totp);
        assert!(challenge.sms_code.is_none());
    }

    #[tokio::test]
    async fn unenrolled_user_cannot_be_challenged() {
        let manager = manager();
        let result = manager
            .issue_challenge(Uuid::new_v4(), std::time::Duration::from_secs(300), Utc::now())
            .await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn sms_challenge_is_exact_match_and_single_use() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.enroll_sms(user_id, "+15550100").await.unwrap();

        let now = Utc::now();
        let challenge = manager
            .issue_challenge(user_id, std::time::Duration::from_secs(300), now)
            .await
            .unwrap();
        let code = challenge.sms_code.clone().unwrap();

        // Wrong code leaves the challenge for retry.
        let wrong = manager
            .verify_challenge(challenge.id, MfaMethod::Sms, "999999", now)
            .await;
        assert!(matches!(wrong, Err(Error::Unauthorized)) || code == "999999");

        // Length mismatches fail the same way.
        let short = manager
            .verify_challenge(challenge.id, MfaMethod::Sms, "12345", now)
            .await;
        assert!(matches!(short, Err(Error::Unauthorized)));

        let verified = manager
            .verify_challenge(challenge.id, MfaMethod::Sms, &code, now)
            .await
            .unwrap();
        assert_eq!(verified.user_id, user_id);

        // Consumed: second use is gone.
        let replay = manager
            .verify_challenge(challenge.id, MfaMethod::Sms, &code, now)
            .await;
        assert!(matches!(replay, Err(Error::InvalidRequest)));
    }

    #[tokio::test]
    async fn expired_challenge_is_invalid_and_deleted() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.enroll_sms(user_id, "+15550100").await.unwrap();

        let now = Utc::now();
        let challenge = manager
            .issue_challenge(user_id, std::time::Duration::from_secs(1), now)
            .await
            .unwrap();
        let later = now + Duration::seconds(5);
        let result = manager
            .verify_challenge(challenge.id, MfaMethod::Sms, "123456", later)
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest)));
    }

    #[tokio::test]
    async fn recovery_codes_burn_on_use() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let codes = manager.generate_recovery_codes(user_id).await.unwrap();
        assert_eq!(codes.len(), recovery::RECOVERY_CODE_COUNT);

        assert!(manager.consume_recovery_code(user_id, &codes[0]).await.unwrap());
        assert!(!manager.consume_recovery_code(user_id, &codes[0]).await.unwrap());
        assert!(manager.consume_recovery_code(user_id, &codes[1]).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_code_answers_a_pending_challenge() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.enroll_sms(user_id, "+15550100").await.unwrap();
        let codes = manager.generate_recovery_codes(user_id).await.unwrap();

        let now = Utc::now();
        let challenge = manager
            .issue_challenge(user_id, std::time::Duration::from_secs(300), now)
            .await
            .unwrap();

        let wrong = manager
            .redeem_recovery(challenge.id, "XXXX-XXXX-XXXX", now)
            .await;
        assert!(matches!(wrong, Err(Error::Unauthorized)));

        let redeemed = manager
            .redeem_recovery(challenge.id, &codes[0], now)
            .await
            .unwrap();
        assert_eq!(redeemed.user_id, user_id);

        // The challenge went with it.
        let replay = manager.redeem_recovery(challenge.id, &codes[1], now).await;
        assert!(matches!(replay, Err(Error::InvalidRequest)));
    }

    #[test]
    fn sms_codes_are_six_digits() {
        for _ in 0..16 {
            let code = generate_sms_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|ch| ch.is_ascii_digit()));
        }
    }
}
