//! Endpoint-scope authorization.
//!
//! The caller's principal is classified once at request entry. Full
//! principals bypass scope resolution entirely; portal-link principals are
//! resolved to the set of endpoints their token grants, and every
//! subscription operation is then checked against that set.

pub mod scope;
pub mod token;

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::EngineError;
use crate::store::PortalLinkResolver;

pub use scope::{AccessScope, EndpointScope, ListScope};
pub use token::TokenDigester;

/// Kind of authenticated caller.
#[derive(Clone, PartialEq, Eq)]
pub enum Principal {
    /// API key or user session with project-wide access
    Full,
    /// Restricted portal-link bearer token
    PortalLink { token: String },
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Full => f.write_str("Full"),
            Principal::PortalLink { .. } => f.write_str("PortalLink"),
        }
    }
}

/// Resolves a principal into the scope it may act on.
#[derive(Clone)]
pub struct EndpointScopeAuthorizer {
    resolver: Arc<dyn PortalLinkResolver>,
}

impl EndpointScopeAuthorizer {
    pub fn new(resolver: Arc<dyn PortalLinkResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve the caller's access scope within `project_id`.
    ///
    /// Failing to resolve a token is a service error, never an empty scope.
    pub async fn resolve(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> Result<AccessScope, EngineError> {
        let token = match principal {
            Principal::Full => return Ok(AccessScope::Full),
            Principal::PortalLink { token } => token,
        };

        let endpoint_ids = self
            .resolver
            .endpoints_for_token(project_id, token)
            .await
            .map_err(|e| {
                warn!(project_id = %project_id, error = %e, "portal_link_resolve_failed");
                EngineError::from(e)
            })?;

        let scope = EndpointScope::new(endpoint_ids);
        info!(project_id = %project_id, endpoints = scope.len(), "portal_link_scope_resolved");

        Ok(AccessScope::Endpoints(scope))
    }
}
