//! Adaptive authentication core for an identity provider.
//!
//! `kawal` decides what a login attempt needs before it is trusted: the
//! [`risk`] engine scores contextual signals, the [`policy`] engine maps the
//! score to allow/step-up/deny, [`mfa`] runs the second factor when one is
//! required, and [`token`] issues and rotates the resulting credentials.
//! [`service::AuthService`] ties the pieces together; everything it touches
//! is reached through the capability traits in [`store`], so backends are
//! swappable and tests run against the in-memory implementations.

pub mod audit;
pub mod config;
pub mod error;
pub mod mfa;
pub mod model;
pub mod password;
pub mod policy;
pub mod risk;
pub mod service;
pub mod store;
pub mod token;

pub use config::{AuthConfig, HighRiskAction, RiskThresholds, RiskWeights};
pub use error::{Error, Result};
pub use service::{AuthService, AuthSuccess, LoginOutcome, LoginRequest, TokenKind};
