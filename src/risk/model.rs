//! Risk factors, score, and level.

use serde::{Deserialize, Serialize};

use crate::config::{RiskThresholds, RiskWeights};

/// Neutral factor value used when a signal source is unknown or unreachable.
/// Mid-range so a missing signal neither vouches for nor condemns the login.
pub const NEUTRAL_FACTOR: f64 = 0.4;

/// Raw signals collected for one authentication attempt. All continuous
/// factors are expected in [0, 1]; out-of-range values are tolerated and
/// clamped during scoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct RiskFactors {
    pub ip_reputation: f64,
    pub geo_reputation: f64,
    pub geo_velocity: f64,
    pub device_changed: bool,
    pub time_anomaly: f64,
}

impl RiskFactors {
    /// Weighted sum of all factors, clamped to [0, 1]. Never errors: raw
    /// inputs of any magnitude are truncated into range.
    #[must_use]
    pub fn to_score(&self, weights: &RiskWeights) -> RiskScore {
        let device = if self.device_changed { 1.0 } else { 0.0 };
        let raw = self.ip_reputation * weights.ip_reputation
            + self.geo_reputation * weights.geo_reputation
            + device * weights.device_change
            + self.geo_velocity * weights.geo_velocity
            + self.time_anomaly * weights.time_anomaly;
        RiskScore::clamped(raw)
    }
}

/// Overall risk of an attempt, always within [0.0, 1.0] inclusive.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(f64);

impl RiskScore {
    /// Truncate an arbitrary raw value into the valid score range. NaN maps
    /// to the neutral mid-range value rather than poisoning comparisons.
    #[must_use]
    pub fn clamped(raw: f64) -> Self {
        if raw.is_nan() {
            return Self(NEUTRAL_FACTOR);
        }
        Self(raw.clamp(0.0, 1.0))
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Map the score to a qualitative level. Boundary values are inclusive to
    /// the lower level: a score exactly at `low` is Low, exactly at `medium`
    /// is Medium.
    #[must_use]
    pub fn level(&self, thresholds: &RiskThresholds) -> RiskLevel {
        if self.0 <= thresholds.low() {
            RiskLevel::Low
        } else if self.0 <= thresholds.medium() {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Qualitative risk level derived from the score.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Result of a full risk evaluation.
#[derive(Clone, Copy, Debug)]
pub struct RiskAssessment {
    pub score: RiskScore,
    pub level: RiskLevel,
    pub factors: RiskFactors,
}
