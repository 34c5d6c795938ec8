//! Error kinds surfaced by the engine.
//!
//! Component errors (`FilterError`, `TransformError`, `StoreError`,
//! `ResolveError`) convert into [`EngineError`] so the service layer can
//! propagate them with `?`. Every variant renders as a single user-facing
//! message.

use thiserror::Error;

use crate::filter::FilterError;
use crate::store::{ResolveError, StoreError};
use crate::transform::TransformError;

/// Top-level error returned by subscription operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input supplied by the caller.
    #[error("{0}")]
    Validation(String),

    /// A referenced subscription or endpoint does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller's scope does not cover the requested endpoint(s).
    #[error("unauthorized")]
    Unauthorized,

    /// A transform function failed, timed out or returned non-JSON data.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The instance is not licensed for the requested feature.
    #[error("{0}")]
    CapabilityDenied(&'static str),

    /// A downstream collaborator failed.
    #[error("{0}")]
    Service(String),
}

impl EngineError {
    /// Console output captured before a transform failure, if any.
    pub fn transform_log(&self) -> Option<&[String]> {
        match self {
            EngineError::Transform(e) => Some(&e.log),
            _ => None,
        }
    }
}

impl From<FilterError> for EngineError {
    fn from(err: FilterError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SubscriptionNotFound => {
                EngineError::NotFound("failed to find subscription".to_string())
            }
            StoreError::EndpointNotFound => {
                EngineError::NotFound("failed to find endpoint".to_string())
            }
            StoreError::Backend(msg) => EngineError::Service(msg),
        }
    }
}

impl From<ResolveError> for EngineError {
    fn from(err: ResolveError) -> Self {
        EngineError::Service(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: EngineError = StoreError::SubscriptionNotFound.into();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "failed to find subscription");
    }

    #[test]
    fn test_resolve_failure_is_service_error() {
        let err: EngineError = ResolveError::PortalLinkNotFound.into();
        assert!(matches!(err, EngineError::Service(_)));
    }

    #[test]
    fn test_transform_log_survives_conversion() {
        let err: EngineError = TransformError {
            message: "boom".to_string(),
            log: vec!["before".to_string()],
        }
        .into();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.transform_log(), Some(&["before".to_string()][..]));
    }
}
