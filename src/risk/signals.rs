//! Pluggable signal sources consumed by the risk engine.
//!
//! Both traits are injected at construction so backends (threat-intel feeds,
//! MaxMind readers, fixtures) can be swapped without touching the engine.

use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Result;
use async_trait::async_trait;

use super::geo::GeoPoint;
use super::model::NEUTRAL_FACTOR;

/// Looks up the reputation of an IP address as a risk value in [0, 1].
/// `Ok(None)` means the address is unknown; the engine substitutes the
/// neutral value.
#[async_trait]
pub trait IpReputationProvider: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<Option<f64>>;
}

/// Resolves an IP address to coordinates. `Ok(None)` means the address could
/// not be located; the engine then skips the velocity signal.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<Option<GeoPoint>>;
}

/// Fixed-table reputation source. Addresses missing from the table are
/// unknown, which the engine treats as the neutral mid-range value.
#[derive(Debug, Default)]
pub struct StaticIpReputation {
    entries: HashMap<IpAddr, f64>,
}

impl StaticIpReputation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, ip: IpAddr, reputation: f64) -> Self {
        self.entries.insert(ip, reputation.clamp(0.0, 1.0));
        self
    }
}

#[async_trait]
impl IpReputationProvider for StaticIpReputation {
    async fn lookup(&self, ip: IpAddr) -> Result<Option<f64>> {
        Ok(self.entries.get(&ip).copied())
    }
}

/// Fixed-table geo resolver, used in tests and as a stand-in where no GeoIP
/// database is configured.
#[derive(Debug, Default)]
pub struct StaticGeoResolver {
    entries: HashMap<IpAddr, GeoPoint>,
}

impl StaticGeoResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, ip: IpAddr, point: GeoPoint) -> Self {
        self.entries.insert(ip, point);
        self
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<Option<GeoPoint>> {
        Ok(self.entries.get(&ip).copied())
    }
}

/// The neutral reputation substituted for unknown addresses.
#[must_use]
pub fn neutral_reputation() -> f64 {
    NEUTRAL_FACTOR
}
