//! Service configuration: risk thresholds/weights and lifecycle durations.
//!
//! All validation happens at construction so a running service never has to
//! re-check invariants on the login path.

use std::time::Duration;

use anyhow::{Result, bail};

const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Fastest travel speed considered plausible between two logins, in km/h.
/// Roughly commercial-flight cruise speed. The default for
/// [`crate::risk::RiskEngine::new`].
pub const DEFAULT_MAX_TRAVEL_SPEED_KMH: f64 = 900.0;

/// Score boundaries for each risk level. Boundary values belong to the lower
/// level: `score <= low` is Low, `score <= medium` is Medium, anything above
/// is High.
#[derive(Clone, Copy, Debug)]
pub struct RiskThresholds {
    low: f64,
    medium: f64,
    high: f64,
}

impl RiskThresholds {
    /// Build thresholds, rejecting anything not strictly increasing within
    /// [0, 1].
    ///
    /// # Errors
    /// Returns an error unless `0 <= low < medium < high <= 1`.
    pub fn new(low: f64, medium: f64, high: f64) -> Result<Self> {
        for (name, value) in [("low", low), ("medium", medium), ("high", high)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("risk threshold {name} must be within [0, 1], got {value}");
            }
        }
        if low >= medium || medium >= high {
            bail!("risk thresholds must be strictly increasing: {low} / {medium} / {high}");
        }
        Ok(Self { low, medium, high })
    }

    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[must_use]
    pub fn medium(&self) -> f64 {
        self.medium
    }

    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.7,
            high: 0.9,
        }
    }
}

/// Weight of each factor in the overall risk score.
#[derive(Clone, Copy, Debug)]
pub struct RiskWeights {
    pub ip_reputation: f64,
    pub geo_reputation: f64,
    pub device_change: f64,
    pub geo_velocity: f64,
    pub time_anomaly: f64,
}

impl RiskWeights {
    /// Validate that every weight is finite and non-negative.
    ///
    /// # Errors
    /// Returns an error naming the first offending weight.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ip_reputation", self.ip_reputation),
            ("geo_reputation", self.geo_reputation),
            ("device_change", self.device_change),
            ("geo_velocity", self.geo_velocity),
            ("time_anomaly", self.time_anomaly),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("risk weight {name} must be finite and non-negative, got {value}");
            }
        }
        Ok(())
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            ip_reputation: 0.3,
            geo_reputation: 0.1,
            device_change: 0.2,
            geo_velocity: 0.3,
            time_anomaly: 0.1,
        }
    }
}

/// What the policy engine does when risk comes back High.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HighRiskAction {
    #[default]
    RequireMfa,
    Deny,
}

/// Token, session, and challenge lifetimes plus the token issuer name and
/// the high-risk policy outcome. [`crate::AuthService`] derives its policy
/// engine and token lifecycle from this; nothing here is advisory.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    session_ttl: Duration,
    challenge_ttl: Duration,
    high_risk_action: HighRiskAction,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            high_risk_action: HighRiskAction::default(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_high_risk_action(mut self, action: HighRiskAction) -> Self {
        self.high_risk_action = action;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    #[must_use]
    pub fn high_risk_action(&self) -> HighRiskAction {
        self.high_risk_action
    }
}
