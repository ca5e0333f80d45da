//! In-memory reference backends for every store trait.
//!
//! These are the test fixture and the single-process default. TTLs are
//! enforced lazily: expiry is stamped at write time and checked on read,
//! nothing sweeps in the background.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::mfa::{MfaChallenge, MfaMethod, UserMfaConfig};
use crate::model::{Session, User};
use crate::risk::geo::GeoStamp;
use crate::token::{RefreshTokenRecord, RotationOutcome, TokenFamily};

use super::{
    AuditSink, ChallengeStore, DeviceStore, GeoHistoryStore, IdentityStore, MfaConfigStore,
    SessionStore, TokenStore,
};

fn expired(deadline: Instant) -> bool {
    Instant::now() >= deadline
}

/// User directory backed by a map, keyed by id with a username scan.
#[derive(Default)]
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, (Session, Instant)>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: Session, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.sessions
            .write()
            .await
            .insert(session.id, (session, deadline));
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&session_id) {
            Some((_, deadline)) if expired(*deadline) => {
                sessions.remove(&session_id);
                Ok(None)
            }
            Some((session, _)) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }
}

#[derive(Default)]
struct TokenState {
    refresh: HashMap<String, (RefreshTokenRecord, Instant)>,
    families: HashMap<Uuid, TokenFamily>,
    deny_list: HashMap<String, Instant>,
}

/// Refresh tokens, families, and the deny-list behind one lock so rotation
/// can check and advance the family pointer atomically.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: RwLock<TokenState>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn store_refresh_token(
        &self,
        token: &str,
        record: RefreshTokenRecord,
        ttl: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.state
            .write()
            .await
            .refresh
            .insert(token.to_string(), (record, deadline));
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let mut state = self.state.write().await;
        match state.refresh.get(token) {
            Some((_, deadline)) if expired(*deadline) => {
                state.refresh.remove(token);
                Ok(None)
            }
            Some((record, _)) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<()> {
        self.state.write().await.refresh.remove(token);
        Ok(())
    }

    async fn get_family(&self, family_id: Uuid) -> Result<Option<TokenFamily>> {
        Ok(self.state.read().await.families.get(&family_id).cloned())
    }

    async fn put_family(&self, family: TokenFamily) -> Result<()> {
        self.state
            .write()
            .await
            .families
            .insert(family.family_id, family);
        Ok(())
    }

    async fn rotate_family(
        &self,
        family_id: Uuid,
        presented: &str,
        next: &str,
    ) -> Result<RotationOutcome> {
        let mut state = self.state.write().await;
        let Some(family) = state.families.get_mut(&family_id) else {
            return Ok(RotationOutcome::Missing);
        };
        if family.revoked {
            return Ok(RotationOutcome::Revoked);
        }
        if family.current_token != presented {
            return Ok(RotationOutcome::NotCurrent);
        }
        family.current_token = next.to_string();
        Ok(RotationOutcome::Rotated)
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(family) = state.families.get_mut(&family_id) {
            family.revoked = true;
        }
        state
            .refresh
            .retain(|_, (record, _)| record.family_id != family_id);
        Ok(())
    }

    async fn deny_list_add(&self, jti: &str, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.state
            .write()
            .await
            .deny_list
            .insert(jti.to_string(), deadline);
        Ok(())
    }

    async fn deny_list_contains(&self, jti: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.deny_list.get(jti) {
            Some(deadline) if expired(*deadline) => {
                state.deny_list.remove(jti);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryMfaConfigStore {
    configs: RwLock<HashMap<(Uuid, MfaMethod), UserMfaConfig>>,
}

impl MemoryMfaConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaConfigStore for MemoryMfaConfigStore {
    async fn list_configs(&self, user_id: Uuid) -> Result<Vec<UserMfaConfig>> {
        let mut configs: Vec<UserMfaConfig> = self
            .configs
            .read()
            .await
            .values()
            .filter(|config| config.user_id == user_id)
            .cloned()
            .collect();
        configs.sort_by_key(|config| config.method.as_str());
        Ok(configs)
    }

    async fn get_config(&self, user_id: Uuid, method: MfaMethod) -> Result<Option<UserMfaConfig>> {
        Ok(self.configs.read().await.get(&(user_id, method)).cloned())
    }

    async fn upsert_config(&self, config: UserMfaConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert((config.user_id, config.method), config);
        Ok(())
    }

    async fn delete_config(&self, user_id: Uuid, method: MfaMethod) -> Result<()> {
        self.configs.write().await.remove(&(user_id, method));
        Ok(())
    }
}

/// Challenges carry their own expiry; the manager checks it, so this store
/// only holds and hands back records.
#[derive(Default)]
pub struct MemoryChallengeStore {
    challenges: RwLock<HashMap<Uuid, MfaChallenge>>,
}

impl MemoryChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn put_challenge(&self, challenge: MfaChallenge) -> Result<()> {
        self.challenges
            .write()
            .await
            .insert(challenge.id, challenge);
        Ok(())
    }

    async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<MfaChallenge>> {
        Ok(self.challenges.read().await.get(&challenge_id).cloned())
    }

    async fn delete_challenge(&self, challenge_id: Uuid) -> Result<()> {
        self.challenges.write().await.remove(&challenge_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGeoHistoryStore {
    locations: RwLock<HashMap<Uuid, GeoStamp>>,
}

impl MemoryGeoHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeoHistoryStore for MemoryGeoHistoryStore {
    async fn last_login_location(&self, user_id: Uuid) -> Result<Option<GeoStamp>> {
        Ok(self.locations.read().await.get(&user_id).copied())
    }

    async fn save_login_location(&self, user_id: Uuid, stamp: GeoStamp) -> Result<()> {
        self.locations.write().await.insert(user_id, stamp);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<Uuid, Vec<String>>>,
}

impl MemoryDeviceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn is_known_device(&self, user_id: Uuid, fingerprint: &str) -> Result<bool> {
        Ok(self
            .devices
            .read()
            .await
            .get(&user_id)
            .is_some_and(|known| known.iter().any(|entry| entry == fingerprint)))
    }

    async fn remember_device(&self, user_id: Uuid, fingerprint: &str) -> Result<()> {
        let mut devices = self.devices.write().await;
        let known = devices.entry(user_id).or_default();
        if !known.iter().any(|entry| entry == fingerprint) {
            known.push(fingerprint.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}
