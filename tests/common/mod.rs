#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use kawal::audit::AuditRecorder;
use kawal::config::{
    AuthConfig, DEFAULT_MAX_TRAVEL_SPEED_KMH, HighRiskAction, RiskThresholds, RiskWeights,
};
use kawal::mfa::MfaManager;
use kawal::model::{User, UserStatus};
use kawal::password;
use kawal::risk::RiskEngine;
use kawal::risk::geo::GeoPoint;
use kawal::risk::signals::{StaticGeoResolver, StaticIpReputation};
use kawal::service::{AuthService, LoginRequest};
use kawal::store::memory::{
    MemoryAuditSink, MemoryChallengeStore, MemoryDeviceStore, MemoryGeoHistoryStore,
    MemoryIdentityStore, MemoryMfaConfigStore, MemorySessionStore, MemoryTokenStore,
};
use kawal::token::TokenSigner;
use uuid::Uuid;

pub const ISSUER: &str = "https://idp.example.test";
const TEST_PRIVATE_KEY_PEM: &str = include_str!("../data/test_signing_key.pem");

/// A fully wired service over in-memory backends, with handles to the pieces
/// tests need to seed or inspect.
pub struct Harness {
    pub service: AuthService,
    pub identities: Arc<MemoryIdentityStore>,
    pub devices: Arc<MemoryDeviceStore>,
    pub geo_history: Arc<MemoryGeoHistoryStore>,
    pub audit_sink: Arc<MemoryAuditSink>,
}

pub struct HarnessBuilder {
    weights: RiskWeights,
    thresholds: RiskThresholds,
    high_risk_action: HighRiskAction,
    reputation: StaticIpReputation,
    resolver: StaticGeoResolver,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            // Time-of-day is excluded so tests do not depend on when they run.
            weights: RiskWeights {
                ip_reputation: 0.5,
                geo_reputation: 0.2,
                device_change: 0.3,
                geo_velocity: 0.0,
                time_anomaly: 0.0,
            },
            thresholds: RiskThresholds::new(0.3, 0.7, 0.9).unwrap(),
            high_risk_action: HighRiskAction::default(),
            reputation: StaticIpReputation::new(),
            resolver: StaticGeoResolver::new(),
        }
    }

    pub fn weights(mut self, weights: RiskWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn high_risk_action(mut self, action: HighRiskAction) -> Self {
        self.high_risk_action = action;
        self
    }

    pub fn ip_reputation(mut self, ip: &str, score: f64) -> Self {
        let ip: IpAddr = ip.parse().unwrap();
        self.reputation = self.reputation.with_entry(ip, score);
        self
    }

    pub fn geo(mut self, ip: &str, lat: f64, lon: f64) -> Self {
        let ip: IpAddr = ip.parse().unwrap();
        self.resolver = self.resolver.with_entry(ip, GeoPoint { lat, lon });
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();
        let identities = Arc::new(MemoryIdentityStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let devices = Arc::new(MemoryDeviceStore::new());
        let geo_history = Arc::new(MemoryGeoHistoryStore::new());
        let audit_sink = Arc::new(MemoryAuditSink::new());

        let risk = RiskEngine::new(
            self.weights,
            self.thresholds,
            DEFAULT_MAX_TRAVEL_SPEED_KMH,
            Arc::new(self.reputation),
            Arc::new(self.resolver),
            geo_history.clone(),
        )
        .unwrap();

        let signer = TokenSigner::from_private_key(TEST_PRIVATE_KEY_PEM.as_bytes()).unwrap();

        let mfa = MfaManager::new(
            Arc::new(MemoryMfaConfigStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            [7u8; 32],
            b"integration-pepper".to_vec(),
            "Kawal",
        )
        .unwrap();

        let service = AuthService::new(
            AuthConfig::new(ISSUER)
                .with_access_token_ttl(Duration::from_secs(900))
                .with_refresh_token_ttl(Duration::from_secs(3600))
                .with_high_risk_action(self.high_risk_action),
            identities.clone(),
            sessions,
            devices.clone(),
            risk,
            mfa,
            signer,
            Arc::new(MemoryTokenStore::new()),
            AuditRecorder::new(audit_sink.clone()),
        );

        Harness {
            service,
            identities,
            devices,
            geo_history,
            audit_sink,
        }
    }
}

impl Harness {
    pub async fn seed_user(&self, username: &str, plaintext: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: password::hash_password(plaintext).unwrap(),
            status: UserStatus::Active,
        };
        self.identities.insert_user(user.clone()).await;
        user
    }

    pub async fn seed_disabled_user(&self, username: &str, plaintext: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: password::hash_password(plaintext).unwrap(),
            status: UserStatus::Disabled,
        };
        self.identities.insert_user(user.clone()).await;
        user
    }
}

pub fn login_request(username: &str, password: &str, ip: &str, fingerprint: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        ip: ip.parse().unwrap(),
        user_agent: "integration-tests".to_string(),
        accept_language: "en".to_string(),
        device_fingerprint: fingerprint.to_string(),
    }
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Let the audit writer task drain its queue.
pub async fn settle_audit() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
