//! Capability traits for every backing store the core depends on.
//!
//! All persistence is reached through these trait objects, injected at
//! construction. The in-memory implementations in [`memory`] are the
//! reference backend and the test fixture; Redis/SQL backends implement the
//! same contracts elsewhere.

pub mod memory;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::mfa::{MfaChallenge, MfaMethod, UserMfaConfig};
use crate::model::{Session, User};
use crate::risk::geo::GeoStamp;
use crate::token::{RefreshTokenRecord, RotationOutcome, TokenFamily};

/// Read-side of the user directory.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

/// Session records with TTL semantics.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session, ttl: Duration) -> Result<()>;
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>>;
    /// Deleting a missing session is a no-op, not an error.
    async fn delete_session(&self, session_id: Uuid) -> Result<()>;
}

/// Refresh tokens, token families, and the access-token deny-list.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn store_refresh_token(
        &self,
        token: &str,
        record: RefreshTokenRecord,
        ttl: Duration,
    ) -> Result<()>;

    /// Look up the record for a presented refresh token. Records stay in the
    /// store after rotation (until natural TTL) so a replayed old token can
    /// still be traced to its family; validity is decided by the family's
    /// current-token pointer, not by record presence.
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    async fn delete_refresh_token(&self, token: &str) -> Result<()>;

    async fn get_family(&self, family_id: Uuid) -> Result<Option<TokenFamily>>;
    async fn put_family(&self, family: TokenFamily) -> Result<()>;

    /// Atomic check-and-advance of the family's current-token pointer. This
    /// is the check-and-invalidate primitive rotation relies on: under
    /// concurrent presentation of the same token exactly one caller observes
    /// `Rotated`; every other caller observes `NotCurrent`.
    async fn rotate_family(
        &self,
        family_id: Uuid,
        presented: &str,
        next: &str,
    ) -> Result<RotationOutcome>;

    /// Mark a family revoked and delete its outstanding refresh tokens.
    async fn revoke_family(&self, family_id: Uuid) -> Result<()>;

    /// Deny-list an access-token id until its natural expiry.
    async fn deny_list_add(&self, jti: &str, ttl: Duration) -> Result<()>;
    async fn deny_list_contains(&self, jti: &str) -> Result<bool>;
}

/// Per-user, per-method MFA configuration.
#[async_trait]
pub trait MfaConfigStore: Send + Sync {
    async fn list_configs(&self, user_id: Uuid) -> Result<Vec<UserMfaConfig>>;
    async fn get_config(&self, user_id: Uuid, method: MfaMethod) -> Result<Option<UserMfaConfig>>;
    async fn upsert_config(&self, config: UserMfaConfig) -> Result<()>;
    async fn delete_config(&self, user_id: Uuid, method: MfaMethod) -> Result<()>;
}

/// Pending MFA challenges (fast ephemeral store with TTL semantics).
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn put_challenge(&self, challenge: MfaChallenge) -> Result<()>;
    async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<MfaChallenge>>;
    async fn delete_challenge(&self, challenge_id: Uuid) -> Result<()>;
}

/// Last known login location per user, feeding the geo-velocity signal.
#[async_trait]
pub trait GeoHistoryStore: Send + Sync {
    async fn last_login_location(&self, user_id: Uuid) -> Result<Option<GeoStamp>>;
    async fn save_login_location(&self, user_id: Uuid, stamp: GeoStamp) -> Result<()>;
}

/// Device fingerprints a user has previously verified from.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn is_known_device(&self, user_id: Uuid, fingerprint: &str) -> Result<bool>;
    async fn remember_device(&self, user_id: Uuid, fingerprint: &str) -> Result<()>;
}

/// Fire-and-forget audit event sink. Appends are best-effort; failures are
/// logged by the recorder, never retried.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<()>;
}
