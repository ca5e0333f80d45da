//! The authentication service: wires the risk engine, policy engine, MFA
//! manager, and token lifecycle into the login, refresh, and logout flows.
//!
//! Every login attempt walks the same path: credentials, account status,
//! risk evaluation, policy decision, then either immediate issuance or an
//! MFA challenge. Unknown usernames and wrong passwords are indistinguishable
//! to the caller and to the audit trail.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditRecorder};
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::mfa::{MfaChallenge, MfaManager, MfaMethod};
use crate::model::{AuthContext, Session, User, UserStatus, UserView};
use crate::password;
use crate::policy::{PolicyDecision, PolicyEngine};
use crate::risk::{RiskEngine, model::RiskAssessment};
use crate::store::{DeviceStore, IdentityStore, SessionStore, TokenStore};
use crate::token::{AccessClaims, TokenLifecycle, TokenPair, TokenSigner};

const ACTION_LOGIN: &str = "login";
const ACTION_MFA_CHALLENGE: &str = "mfa_challenge";
const ACTION_MFA_VERIFY: &str = "mfa_verify";
const ACTION_LOGOUT: &str = "logout";
const ACTION_TOKEN_REFRESH: &str = "token_refresh";
const ACTION_TOKEN_REVOKE: &str = "token_revoke";

/// One login attempt as received from the transport layer.
#[derive(Clone, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip: IpAddr,
    pub user_agent: String,
    pub accept_language: String,
    pub device_fingerprint: String,
}

/// A completed authentication: the session and tokens the client keeps.
#[derive(Clone, Debug)]
pub struct AuthSuccess {
    pub user: UserView,
    pub session: Session,
    pub tokens: TokenPair,
}

/// What a password login produced.
#[derive(Debug)]
pub enum LoginOutcome {
    Success {
        auth: AuthSuccess,
        risk: RiskAssessment,
    },
    /// Policy asked for a second factor; the challenge is pending. The
    /// transport delivers the SMS code (when present) out of band and never
    /// echoes it to the client.
    MfaRequired {
        challenge: MfaChallenge,
        methods: Vec<MfaMethod>,
        risk: RiskAssessment,
    },
}

/// Which kind of token a revocation request names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Access,
    Refresh,
}

pub struct AuthService {
    config: AuthConfig,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    devices: Arc<dyn DeviceStore>,
    risk: RiskEngine,
    policy: PolicyEngine,
    mfa: MfaManager,
    tokens: TokenLifecycle,
    audit: AuditRecorder,
}

impl AuthService {
    /// Wire the service. The policy engine and token lifecycle are derived
    /// from `config` here so the configured high-risk action, issuer, and
    /// token lifetimes have exactly one source.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: AuthConfig,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        devices: Arc<dyn DeviceStore>,
        risk: RiskEngine,
        mfa: MfaManager,
        signer: TokenSigner,
        token_store: Arc<dyn TokenStore>,
        audit: AuditRecorder,
    ) -> Self {
        let policy = PolicyEngine::new(config.high_risk_action());
        let tokens = TokenLifecycle::new(
            signer,
            token_store,
            config.issuer(),
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        );
        Self {
            config,
            identities,
            sessions,
            devices,
            risk,
            policy,
            mfa,
            tokens,
            audit,
        }
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaManager {
        &self.mfa
    }

    /// Authenticate with username and password, running the full adaptive
    /// flow.
    ///
    /// # Errors
    /// [`Error::InvalidCredentials`] for an unknown user or wrong password
    /// (indistinguishably), [`Error::UserDisabled`] for an inactive account,
    /// [`Error::Unauthorized`] when policy denies or no MFA factor can answer
    /// a required challenge.
    pub async fn login_with_password(&self, request: LoginRequest) -> Result<LoginOutcome> {
        let now = Utc::now();

        let Some(user) = self.identities.find_by_username(&request.username).await? else {
            // Burn comparable work so a miss is not measurably faster than a
            // wrong password.
            password::verify_password(&request.password, dummy_password_hash());
            self.audit_login_failure(&request, Error::InvalidCredentials.code(), now);
            return Err(Error::InvalidCredentials);
        };

        if user.status != UserStatus::Active {
            self.audit_login_failure(&request, Error::UserDisabled.code(), now);
            return Err(Error::UserDisabled);
        }

        if !password::verify_password(&request.password, &user.password_hash) {
            self.audit_login_failure(&request, Error::InvalidCredentials.code(), now);
            return Err(Error::InvalidCredentials);
        }

        let is_known_device = self
            .devices
            .is_known_device(user.id, &request.device_fingerprint)
            .await?;
        let context = AuthContext {
            user_id: user.id,
            ip: request.ip,
            user_agent: request.user_agent.clone(),
            accept_language: request.accept_language.clone(),
            timestamp: now,
            device_fingerprint: request.device_fingerprint.clone(),
            is_known_device,
        };

        let assessment = self.risk.evaluate(&context).await?;
        let decision = self.policy.decide(assessment.level, &context);
        info!(
            user_id = %user.id,
            risk_score = assessment.score.value(),
            risk_level = assessment.level.as_str(),
            decision = ?decision,
            "login policy decision"
        );

        match decision {
            PolicyDecision::Deny => {
                self.audit.record(
                    AuditEvent::failure(ACTION_LOGIN, "policy_denied", now)
                        .with_actor(user.id)
                        .with_username(&user.username)
                        .with_ip(request.ip),
                );
                Err(Error::Unauthorized)
            }
            PolicyDecision::RequireMfa => {
                let challenge = match self
                    .mfa
                    .issue_challenge(user.id, self.config.challenge_ttl(), now)
                    .await
                {
                    Ok(challenge) => challenge,
                    Err(err) => {
                        // No enrolled factor: fail closed rather than
                        // downgrading to single-factor.
                        self.audit.record(
                            AuditEvent::failure(ACTION_LOGIN, err.code(), now)
                                .with_actor(user.id)
                                .with_username(&user.username)
                                .with_ip(request.ip),
                        );
                        return Err(err);
                    }
                };
                let methods = self.mfa.available_methods(user.id).await?;
                self.audit.record(
                    AuditEvent::success(ACTION_MFA_CHALLENGE, now)
                        .with_actor(user.id)
                        .with_username(&user.username)
                        .with_ip(request.ip),
                );
                Ok(LoginOutcome::MfaRequired {
                    challenge,
                    methods,
                    risk: assessment,
                })
            }
            PolicyDecision::Allow => {
                let auth = self
                    .establish(&user, request.ip, &request.device_fingerprint, now)
                    .await?;
                Ok(LoginOutcome::Success {
                    auth,
                    risk: assessment,
                })
            }
        }
    }

    /// Complete a pending MFA challenge and finish the login.
    ///
    /// Recovery codes answer through their own path; TOTP and SMS verify
    /// against the challenged factor. The verified device is remembered.
    ///
    /// # Errors
    /// [`Error::InvalidRequest`] for a missing/expired/mismatched challenge,
    /// [`Error::Unauthorized`] for a wrong code.
    pub async fn verify_mfa_challenge(
        &self,
        challenge_id: Uuid,
        method: MfaMethod,
        code: &str,
        ip: IpAddr,
        device_fingerprint: &str,
    ) -> Result<AuthSuccess> {
        let now = Utc::now();
        let challenge_result = if method == MfaMethod::Recovery {
            self.mfa.redeem_recovery(challenge_id, code, now).await
        } else {
            self.mfa
                .verify_challenge(challenge_id, method, code, now)
                .await
        };
        let challenge = match challenge_result {
            Ok(challenge) => challenge,
            Err(err) => {
                self.audit
                    .record(AuditEvent::failure(ACTION_MFA_VERIFY, err.code(), now).with_ip(ip));
                return Err(err);
            }
        };

        let user = self
            .identities
            .find_by_id(challenge.user_id)
            .await?
            .ok_or(Error::NotFound)?;
        if user.status != UserStatus::Active {
            return Err(Error::UserDisabled);
        }

        if let Err(err) = self.devices.remember_device(user.id, device_fingerprint).await {
            warn!(user_id = %user.id, "failed to remember device: {err:#}");
        }

        let auth = self.establish(&user, ip, device_fingerprint, now).await?;
        self.audit.record(
            AuditEvent::success(ACTION_MFA_VERIFY, now)
                .with_actor(user.id)
                .with_ip(ip),
        );
        Ok(auth)
    }

    /// End a session and deny-list the presented access token for the rest of
    /// its lifetime.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] when the access token does not parse or
    /// verify; session deletion problems are logged, not surfaced.
    pub async fn logout(&self, access_token: &str, session_id: Option<Uuid>) -> Result<()> {
        let now = Utc::now();

        // The session dies even when the presented token turns out to be
        // garbage.
        if let Some(session_id) = session_id {
            if let Err(err) = self.sessions.delete_session(session_id).await {
                warn!(%session_id, "failed to delete session on logout: {err:#}");
            }
        }

        let claims = self.tokens.revoke_access(access_token, now).await?;

        let mut event = AuditEvent::success(ACTION_LOGOUT, now);
        if let Ok(actor) = claims.sub.parse::<Uuid>() {
            event = event.with_actor(actor);
        }
        self.audit.record(event);
        Ok(())
    }

    /// Exchange a refresh token for a new pair, rotating it.
    ///
    /// # Errors
    /// See [`TokenLifecycle::refresh`]; a detected replay revokes the token
    /// family before the error is returned.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let now = Utc::now();
        match self.tokens.refresh(refresh_token, now).await {
            Ok(pair) => Ok(pair),
            Err(err) => {
                self.audit
                    .record(AuditEvent::failure(ACTION_TOKEN_REFRESH, err.code(), now));
                Err(err)
            }
        }
    }

    /// Explicitly revoke one token.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] when the token is unknown or does not verify.
    pub async fn revoke_token(&self, token: &str, kind: TokenKind) -> Result<()> {
        let now = Utc::now();
        let result = match kind {
            TokenKind::Access => self.tokens.revoke_access(token, now).await.map(|_| ()),
            TokenKind::Refresh => self.tokens.revoke_refresh(token).await,
        };
        match result {
            Ok(()) => {
                self.audit
                    .record(AuditEvent::success(ACTION_TOKEN_REVOKE, now));
                Ok(())
            }
            Err(err) => {
                self.audit
                    .record(AuditEvent::failure(ACTION_TOKEN_REVOKE, err.code(), now));
                Err(err)
            }
        }
    }

    /// Verify an access token's signature, expiry, and deny-list status.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] or [`Error::Unauthorized`] per
    /// [`TokenLifecycle::validate_access`].
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims> {
        self.tokens.validate_access(token, Utc::now()).await
    }

    /// Fetch a live session.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the session is missing or expired.
    pub async fn session(&self, session_id: Uuid) -> Result<Session> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(Error::NotFound)?;
        if session.is_expired(Utc::now()) {
            return Err(Error::NotFound);
        }
        Ok(session)
    }

    /// Issue the token pair and session once every gate has passed. The
    /// session is authoritative: if it cannot be created the just-issued
    /// tokens are discarded and the login fails.
    async fn establish(
        &self,
        user: &User,
        ip: IpAddr,
        device_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthSuccess> {
        let pair = self.tokens.issue_pair(user.id, now).await?;

        let session_ttl = self.config.session_ttl();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            created_at: now,
            expires_at: now
                + ChronoDuration::from_std(session_ttl)
                    .unwrap_or_else(|_| ChronoDuration::hours(12)),
        };
        if let Err(err) = self.sessions.create_session(session.clone(), session_ttl).await {
            self.tokens.discard_pair(&pair).await;
            return Err(Error::Internal(err));
        }

        if let Err(err) = self.devices.remember_device(user.id, device_fingerprint).await {
            warn!(user_id = %user.id, "failed to remember device: {err:#}");
        }

        self.audit.record(
            AuditEvent::success(ACTION_LOGIN, now)
                .with_actor(user.id)
                .with_username(&user.username)
                .with_ip(ip),
        );
        info!(user_id = %user.id, session_id = %session.id, "authentication established");

        Ok(AuthSuccess {
            user: UserView::from(user),
            session,
            tokens: pair,
        })
    }

    fn audit_login_failure(&self, request: &LoginRequest, reason: &str, now: DateTime<Utc>) {
        // Same shape for every failure cause; no actor id even when the
        // account exists.
        self.audit.record(
            AuditEvent::failure(ACTION_LOGIN, reason, now)
                .with_username(&request.username)
                .with_ip(request.ip),
        );
    }
}

/// Fixed Argon2id hash used to equalize work on unknown usernames.
fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        password::hash_password("kawal-dummy-credential").unwrap_or_default()
    })
}
