//! Risk-level to decision mapping.
//!
//! Deliberately a pure function of its inputs and configuration: no I/O, no
//! clock, no hidden state. What happens on High risk is configuration, not
//! code.

use serde::{Deserialize, Serialize};

use crate::config::HighRiskAction;
use crate::model::AuthContext;
use crate::risk::model::RiskLevel;

/// Outcome of a policy evaluation for one login attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    RequireMfa,
    Deny,
}

#[derive(Clone, Copy, Debug)]
pub struct PolicyEngine {
    high_risk_action: HighRiskAction,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(high_risk_action: HighRiskAction) -> Self {
        Self { high_risk_action }
    }

    /// Map a risk level to a decision. The context parameter is part of the
    /// contract so condition-based policies (roles, trusted networks) can be
    /// added without changing callers.
    #[must_use]
    pub fn decide(&self, level: RiskLevel, _context: &AuthContext) -> PolicyDecision {
        match level {
            RiskLevel::Low => PolicyDecision::Allow,
            RiskLevel::Medium => PolicyDecision::RequireMfa,
            RiskLevel::High => match self.high_risk_action {
                HighRiskAction::RequireMfa => PolicyDecision::RequireMfa,
                HighRiskAction::Deny => PolicyDecision::Deny,
            },
        }
    }
}
