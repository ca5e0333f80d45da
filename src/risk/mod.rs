//! Adaptive risk evaluation for authentication attempts.
//!
//! The engine folds contextual signals (IP reputation, geo velocity, device
//! novelty, time of day) into one bounded score. Signal lookups that fail
//! degrade to neutral values: a broken GeoIP database must never block a
//! login, only make it less certain.

pub mod geo;
pub mod model;
pub mod signals;

use std::sync::Arc;

use anyhow::bail;
use chrono::Timelike;
use tracing::{debug, warn};

use crate::config::{RiskThresholds, RiskWeights};
use crate::error::Result;
use crate::model::AuthContext;
use crate::store::GeoHistoryStore;

use geo::{GeoStamp, velocity_risk};
use model::{NEUTRAL_FACTOR, RiskAssessment, RiskFactors};
use signals::{GeoResolver, IpReputationProvider};

/// Hours (UTC, inclusive) considered ordinary login time. Logins outside this
/// window contribute the time-anomaly factor.
const USUAL_HOURS: std::ops::RangeInclusive<u32> = 7..=22;

/// Country-level reputation placeholder for resolved locations. A resolved
/// location is mildly reassuring; an unresolved one is neutral.
const RESOLVED_GEO_REPUTATION: f64 = 0.2;

pub struct RiskEngine {
    weights: RiskWeights,
    thresholds: RiskThresholds,
    max_travel_speed_kmh: f64,
    reputation: Arc<dyn IpReputationProvider>,
    resolver: Arc<dyn GeoResolver>,
    geo_history: Arc<dyn GeoHistoryStore>,
}

impl RiskEngine {
    /// Build an engine with validated configuration.
    ///
    /// # Errors
    /// Returns an error if any weight is negative or non-finite.
    pub fn new(
        weights: RiskWeights,
        thresholds: RiskThresholds,
        max_travel_speed_kmh: f64,
        reputation: Arc<dyn IpReputationProvider>,
        resolver: Arc<dyn GeoResolver>,
        geo_history: Arc<dyn GeoHistoryStore>,
    ) -> anyhow::Result<Self> {
        weights.validate()?;
        if !max_travel_speed_kmh.is_finite() || max_travel_speed_kmh <= 0.0 {
            bail!("max travel speed must be positive, got {max_travel_speed_kmh}");
        }
        Ok(Self {
            weights,
            thresholds,
            max_travel_speed_kmh,
            reputation,
            resolver,
            geo_history,
        })
    }

    #[must_use]
    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Evaluate one authentication attempt.
    ///
    /// Signal failures never propagate: each degraded signal falls back to a
    /// neutral contribution. The only error condition is a malformed context.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidRequest`] when the context carries a nil
    /// user id.
    pub async fn evaluate(&self, context: &AuthContext) -> Result<RiskAssessment> {
        if context.user_id.is_nil() {
            return Err(crate::Error::InvalidRequest);
        }

        let ip_reputation = match self.reputation.lookup(context.ip).await {
            Ok(Some(value)) => value,
            Ok(None) => NEUTRAL_FACTOR,
            Err(err) => {
                warn!(ip = %context.ip, "ip reputation lookup failed: {err:#}");
                NEUTRAL_FACTOR
            }
        };

        let location = match self.resolver.resolve(context.ip).await {
            Ok(point) => point,
            Err(err) => {
                warn!(ip = %context.ip, "geo resolution failed: {err:#}");
                None
            }
        };

        let geo_reputation = if location.is_some() {
            RESOLVED_GEO_REPUTATION
        } else {
            NEUTRAL_FACTOR
        };

        let geo_velocity = match location {
            Some(point) => self.travel_risk(context, point).await,
            None => 0.0,
        };

        let hour = context.timestamp.hour();
        let time_anomaly = if USUAL_HOURS.contains(&hour) { 0.0 } else { 1.0 };

        let factors = RiskFactors {
            ip_reputation,
            geo_reputation,
            geo_velocity,
            device_changed: !context.is_known_device,
            time_anomaly,
        };

        let score = factors.to_score(&self.weights);
        let level = score.level(&self.thresholds);

        if let Some(point) = location {
            let stamp = GeoStamp {
                point,
                observed_at: context.timestamp,
            };
            if let Err(err) = self
                .geo_history
                .save_login_location(context.user_id, stamp)
                .await
            {
                warn!(user_id = %context.user_id, "failed to save login location: {err:#}");
            }
        }

        debug!(
            user_id = %context.user_id,
            score = score.value(),
            level = level.as_str(),
            ip_reputation,
            geo_velocity,
            device_changed = factors.device_changed,
            time_anomaly,
            "risk evaluation complete"
        );

        Ok(RiskAssessment {
            score,
            level,
            factors,
        })
    }

    /// Velocity risk against the user's previous login location. History
    /// misses and store failures both score zero: a first login carries no
    /// travel signal.
    async fn travel_risk(&self, context: &AuthContext, current: geo::GeoPoint) -> f64 {
        match self.geo_history.last_login_location(context.user_id).await {
            Ok(Some(previous)) => velocity_risk(
                &previous,
                current,
                context.timestamp,
                self.max_travel_speed_kmh,
            ),
            Ok(None) => 0.0,
            Err(err) => {
                warn!(user_id = %context.user_id, "geo history lookup failed: {err:#}");
                0.0
            }
        }
    }
}
