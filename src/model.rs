//! Core domain records shared across the crate.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account lifecycle state. Only `Active` users may authenticate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Disabled,
}

/// A user record as returned by the identity store. The password hash never
/// leaves this crate.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
}

/// Safe projection of a [`User`] for responses; omits the password hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Everything the risk engine sees about one login attempt. Built per attempt
/// and discarded with it.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub ip: IpAddr,
    pub user_agent: String,
    pub accept_language: String,
    pub timestamp: DateTime<Utc>,
    pub device_fingerprint: String,
    pub is_known_device: bool,
}

/// Server-side session created on successful authentication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
