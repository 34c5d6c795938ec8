//! Licensed feature checks.
//!
//! Feature gating is a single injected check, so tests and deployments can
//! swap the strategy without touching the request path.

use crate::error::EngineError;

/// Features gated behind a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Payload and header filters on subscriptions
    AdvancedSubscriptions,
    /// Transform functions on subscriptions
    Transformations,
}

impl Feature {
    /// Message shown when the feature is requested but not licensed.
    pub fn denied_message(self) -> &'static str {
        match self {
            Feature::AdvancedSubscriptions => {
                "your instance does not have access to subscription filters, upgrade to access this feature"
            }
            Feature::Transformations => {
                "your instance does not have access to transformations, upgrade to access this feature"
            }
        }
    }
}

/// Answers whether a feature is enabled for this instance.
pub trait CapabilityCheck: Send + Sync {
    fn is_enabled(&self, feature: Feature) -> bool;

    /// Reject with the feature's fixed message when it is disabled.
    fn require(&self, feature: Feature) -> Result<(), EngineError> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(EngineError::CapabilityDenied(feature.denied_message()))
        }
    }
}

/// Capability flags loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Licenser {
    pub advanced_subscriptions: bool,
    pub transformations: bool,
}

impl Licenser {
    pub fn new(advanced_subscriptions: bool, transformations: bool) -> Self {
        Self {
            advanced_subscriptions,
            transformations,
        }
    }

    pub fn all() -> Self {
        Self::new(true, true)
    }
}

impl CapabilityCheck for Licenser {
    fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::AdvancedSubscriptions => self.advanced_subscriptions,
            Feature::Transformations => self.transformations,
        }
    }
}
