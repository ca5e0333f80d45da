//! Great-circle geometry and the travel-velocity risk curve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance above which a zero-elapsed-time relocation counts as teleporting
/// rather than GeoIP jitter.
const TELEPORT_DISTANCE_KM: f64 = 10.0;

/// A geographic coordinate resolved from an IP address.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A login location with the time it was observed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GeoStamp {
    pub point: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

/// Great-circle distance between two points in kilometers (haversine).
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat_a.cos() * lat_b.cos();
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Risk contribution of traveling from `previous` to `current`, given the
/// fastest plausible speed in km/h.
///
/// Zero for any speed at or below the maximum; above it the risk grows
/// linearly with the excess and saturates at twice the plausible speed. Two
/// observations in the same instant are only suspicious when they are far
/// apart.
#[must_use]
pub fn velocity_risk(
    previous: &GeoStamp,
    current: GeoPoint,
    now: DateTime<Utc>,
    max_speed_kmh: f64,
) -> f64 {
    let distance_km = haversine_km(previous.point, current);
    let elapsed_hours = (now - previous.observed_at).num_milliseconds() as f64 / 3_600_000.0;

    if elapsed_hours <= 0.0 {
        if distance_km > TELEPORT_DISTANCE_KM {
            return 1.0;
        }
        return 0.0;
    }

    let speed = distance_km / elapsed_hours;
    if speed <= max_speed_kmh || max_speed_kmh <= 0.0 {
        return 0.0;
    }
    ((speed - max_speed_kmh) / max_speed_kmh).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const PARIS: GeoPoint = GeoPoint {
        lat: 48.8566,
        lon: 2.3522,
    };
    const BERLIN: GeoPoint = GeoPoint {
        lat: 52.52,
        lon: 13.405,
    };
    const NEW_YORK: GeoPoint = GeoPoint {
        lat: 40.7128,
        lon: -74.006,
    };

    #[test]
    fn haversine_known_distances() {
        // Paris-Berlin is roughly 878 km, Paris-New York roughly 5837 km.
        let paris_berlin = haversine_km(PARIS, BERLIN);
        assert!((paris_berlin - 878.0).abs() < 15.0, "got {paris_berlin}");
        let paris_ny = haversine_km(PARIS, NEW_YORK);
        assert!((paris_ny - 5837.0).abs() < 60.0, "got {paris_ny}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(PARIS, PARIS) < 1e-6);
    }

    #[test]
    fn plausible_travel_scores_zero() {
        let now = Utc::now();
        let previous = GeoStamp {
            point: PARIS,
            observed_at: now - Duration::hours(2),
        };
        // Paris to Berlin in two hours is ~440 km/h.
        assert_eq!(velocity_risk(&previous, BERLIN, now, 900.0), 0.0);
    }

    #[test]
    fn impossible_travel_saturates() {
        let now = Utc::now();
        let previous = GeoStamp {
            point: PARIS,
            observed_at: now - Duration::minutes(10),
        };
        // ~5800 km in 10 minutes is far beyond twice any plausible speed.
        assert_eq!(velocity_risk(&previous, NEW_YORK, now, 900.0), 1.0);
    }

    #[test]
    fn excess_speed_grows_linearly() {
        let now = Utc::now();
        let previous = GeoStamp {
            point: PARIS,
            observed_at: now - Duration::hours(1),
        };
        // Paris-Berlin in one hour: ~878 km/h vs a 600 km/h ceiling is a
        // ~46% excess.
        let risk = velocity_risk(&previous, BERLIN, now, 600.0);
        assert!(risk > 0.3 && risk < 0.6, "got {risk}");
    }

    #[test]
    fn same_instant_far_apart_is_teleport() {
        let now = Utc::now();
        let previous = GeoStamp {
            point: PARIS,
            observed_at: now,
        };
        assert_eq!(velocity_risk(&previous, NEW_YORK, now, 900.0), 1.0);
        // Small distance in the same instant is GeoIP jitter, not risk.
        let nearby = GeoPoint {
            lat: PARIS.lat + 0.01,
            lon: PARIS.lon,
        };
        assert_eq!(velocity_risk(&previous, nearby, now, 900.0), 0.0);
    }
}
