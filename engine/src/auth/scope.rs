//! Endpoint scope checks for restricted principals.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::EngineError;

/// Endpoints a portal-link principal may act on within one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointScope {
    endpoint_ids: BTreeSet<String>,
}

impl EndpointScope {
    pub fn new<I, S>(endpoint_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint_ids: endpoint_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, endpoint_id: &str) -> bool {
        self.endpoint_ids.contains(endpoint_id)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoint_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoint_ids.len()
    }

    /// Endpoint IDs in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.endpoint_ids.iter().cloned().collect()
    }
}

/// What the caller may touch, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Full credential; no endpoint restriction.
    Full,
    /// Portal-link credential restricted to a set of endpoints.
    Endpoints(EndpointScope),
}

/// Effective endpoint filter for a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Query with this endpoint filter (empty means unfiltered).
    Filter(Vec<String>),
    /// The caller has no endpoints; return nothing without querying.
    Nothing,
}

impl AccessScope {
    /// Narrow a listing's endpoint filter to the caller's scope.
    ///
    /// A requested filter must be a subset of the scope or the whole request
    /// is rejected. An absent filter becomes exactly the scope.
    pub fn narrow_list(&self, requested: &[String]) -> Result<ListScope, EngineError> {
        let scope = match self {
            AccessScope::Full => return Ok(ListScope::Filter(requested.to_vec())),
            AccessScope::Endpoints(scope) => scope,
        };

        if scope.is_empty() {
            return Ok(ListScope::Nothing);
        }

        if requested.is_empty() {
            return Ok(ListScope::Filter(scope.ids()));
        }

        if let Some(outside) = requested.iter().find(|id| !scope.contains(id)) {
            warn!(endpoint_id = %outside, "endpoint_outside_scope");
            return Err(EngineError::Unauthorized);
        }

        Ok(ListScope::Filter(requested.to_vec()))
    }

    /// Check a single target endpoint.
    pub fn authorize_endpoint(&self, endpoint_id: &str) -> Result<(), EngineError> {
        match self {
            AccessScope::Full => Ok(()),
            AccessScope::Endpoints(scope) if scope.contains(endpoint_id) => Ok(()),
            AccessScope::Endpoints(_) => {
                warn!(endpoint_id = %endpoint_id, "endpoint_outside_scope");
                Err(EngineError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped(ids: &[&str]) -> AccessScope {
        AccessScope::Endpoints(EndpointScope::new(ids.iter().copied()))
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_requested_outside_scope_is_rejected() {
        let result = scoped(&["ep1", "ep2"]).narrow_list(&strings(&["ep1", "ep3"]));
        assert!(matches!(result, Err(EngineError::Unauthorized)));
    }

    #[test]
    fn test_requested_subset_passes_through() {
        let result = scoped(&["ep1", "ep2"]).narrow_list(&strings(&["ep2"])).unwrap();
        assert_eq!(result, ListScope::Filter(strings(&["ep2"])));
    }

    #[test]
    fn test_no_filter_becomes_scope() {
        let result = scoped(&["ep2", "ep1"]).narrow_list(&[]).unwrap();
        assert_eq!(result, ListScope::Filter(strings(&["ep1", "ep2"])));
    }

    #[test]
    fn test_empty_scope_is_no_access() {
        let empty = scoped(&[]);
        assert_eq!(empty.narrow_list(&[]).unwrap(), ListScope::Nothing);
        assert_eq!(empty.narrow_list(&strings(&["ep1"])).unwrap(), ListScope::Nothing);
        assert!(empty.authorize_endpoint("ep1").is_err());
    }

    #[test]
    fn test_full_scope_bypasses_checks() {
        let full = AccessScope::Full;
        assert_eq!(full.narrow_list(&[]).unwrap(), ListScope::Filter(Vec::new()));
        assert_eq!(
            full.narrow_list(&strings(&["any"])).unwrap(),
            ListScope::Filter(strings(&["any"]))
        );
        assert!(full.authorize_endpoint("any").is_ok());
    }

    #[test]
    fn test_authorize_single_endpoint() {
        let scope = scoped(&["ep1"]);
        assert!(scope.authorize_endpoint("ep1").is_ok());
        assert!(matches!(scope.authorize_endpoint("ep2"), Err(EngineError::Unauthorized)));
    }

    mod properties {
        use std::collections::BTreeSet;

        use proptest::prelude::*;

        use crate::auth::scope::{AccessScope, EndpointScope, ListScope};

        proptest! {
            #[test]
            fn subset_law(
                scope in prop::collection::btree_set("ep[0-9]", 1..6),
                requested in prop::collection::vec("ep[0-9]", 0..6),
            ) {
                let access = AccessScope::Endpoints(EndpointScope::new(scope.clone()));
                let result = access.narrow_list(&requested);
                let all_in_scope = requested.iter().all(|id| scope.contains(id));

                prop_assert_eq!(result.is_ok(), all_in_scope);
                if requested.is_empty() {
                    let expected: Vec<String> = scope.iter().cloned().collect();
                    prop_assert_eq!(result.unwrap(), ListScope::Filter(expected));
                }
            }

            #[test]
            fn single_endpoint_membership(
                scope in prop::collection::btree_set("ep[0-9]", 0..6),
                target in "ep[0-9]",
            ) {
                let access = AccessScope::Endpoints(EndpointScope::new(scope.clone()));
                let allowed: BTreeSet<String> = scope;
                prop_assert_eq!(
                    access.authorize_endpoint(&target).is_ok(),
                    allowed.contains(&target)
                );
            }
        }
    }
}
