//! In-memory implementation of the collaborator ports.
//!
//! The store is cheap to clone and can be shared across tasks; each map is
//! guarded by its own `RwLock`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{Endpoint, PortalLink};
use super::{EndpointDirectory, PortalLinkResolver, ResolveError, StoreError, SubscriptionStore};
use crate::auth::TokenDigester;
use crate::subscription::{paginate, Pageable, PaginationData, Subscription, SubscriptionQuery};

/// Shared in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    digester: TokenDigester,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    endpoints: RwLock<HashMap<String, Endpoint>>,
    portal_links: RwLock<Vec<PortalLink>>,
}

impl MemoryStore {
    pub fn new(digester: TokenDigester) -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                digester,
                subscriptions: RwLock::new(HashMap::new()),
                endpoints: RwLock::new(HashMap::new()),
                portal_links: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register or replace an endpoint.
    pub async fn insert_endpoint(&self, endpoint: Endpoint) {
        info!(
            endpoint_id = %endpoint.uid,
            project_id = %endpoint.project_id,
            "endpoint_registered"
        );
        self.inner
            .endpoints
            .write()
            .await
            .insert(endpoint.uid.clone(), endpoint);
    }

    /// Create a portal link and return it with its bearer token.
    ///
    /// The token is not recoverable afterwards.
    pub async fn create_portal_link(
        &self,
        project_id: &str,
        name: &str,
        endpoints: Vec<String>,
        owner_id: Option<String>,
    ) -> (PortalLink, String) {
        let token = self.inner.digester.generate_token();
        let link = PortalLink {
            uid: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            endpoints,
            owner_id,
            token_digest: self.inner.digester.digest(&token),
            created_at: Utc::now(),
        };

        info!(
            portal_link_id = %link.uid,
            project_id = %project_id,
            endpoints = link.endpoints.len(),
            has_owner = link.owner_id.is_some(),
            "portal_link_created"
        );

        self.inner.portal_links.write().await.push(link.clone());
        (link, token)
    }

    /// Revoke a portal link. Returns whether it existed.
    pub async fn revoke_portal_link(&self, portal_link_id: &str) -> bool {
        let mut links = self.inner.portal_links.write().await;
        let before = links.len();
        links.retain(|l| l.uid != portal_link_id);
        links.len() != before
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn load_subscriptions_paged(
        &self,
        project_id: &str,
        query: &SubscriptionQuery,
        pageable: &Pageable,
    ) -> Result<(Vec<Subscription>, PaginationData), StoreError> {
        let name = query.name.as_ref().map(|n| n.to_lowercase());

        let mut matching: Vec<Subscription> = self
            .inner
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.project_id == project_id)
            .filter(|s| {
                query.endpoint_ids.is_empty() || query.endpoint_ids.contains(&s.endpoint_id)
            })
            .filter(|s| name.as_ref().map_or(true, |n| s.name.to_lowercase().contains(n)))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.uid.cmp(&a.uid));

        Ok(paginate(&matching, pageable, |s| s.uid.as_str()))
    }

    async fn find_subscription_by_id(
        &self,
        project_id: &str,
        id: &str,
    ) -> Result<Subscription, StoreError> {
        self.inner
            .subscriptions
            .read()
            .await
            .get(id)
            .filter(|s| s.project_id == project_id)
            .cloned()
            .ok_or(StoreError::SubscriptionNotFound)
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        if subscriptions.contains_key(&subscription.uid) {
            return Err(StoreError::Backend(format!(
                "subscription {} already exists",
                subscription.uid
            )));
        }
        subscriptions.insert(subscription.uid.clone(), subscription.clone());
        Ok(())
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        match subscriptions.get_mut(&subscription.uid) {
            Some(existing) if existing.project_id == subscription.project_id => {
                *existing = subscription.clone();
                Ok(())
            }
            _ => Err(StoreError::SubscriptionNotFound),
        }
    }

    async fn delete_subscription(
        &self,
        project_id: &str,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        match subscriptions.get(&subscription.uid) {
            Some(existing) if existing.project_id == project_id => {
                subscriptions.remove(&subscription.uid);
                Ok(())
            }
            _ => Err(StoreError::SubscriptionNotFound),
        }
    }
}

#[async_trait]
impl EndpointDirectory for MemoryStore {
    async fn find_endpoint(
        &self,
        project_id: &str,
        endpoint_id: &str,
    ) -> Result<Endpoint, StoreError> {
        self.inner
            .endpoints
            .read()
            .await
            .get(endpoint_id)
            .filter(|e| e.project_id == project_id)
            .cloned()
            .ok_or(StoreError::EndpointNotFound)
    }
}

#[async_trait]
impl PortalLinkResolver for MemoryStore {
    async fn endpoints_for_token(
        &self,
        project_id: &str,
        token: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let link = {
            let links = self.inner.portal_links.read().await;
            links
                .iter()
                .find(|l| self.inner.digester.verify(token, &l.token_digest))
                .cloned()
        };

        let link = match link {
            Some(link) if link.project_id == project_id => link,
            Some(link) => {
                warn!(
                    portal_link_id = %link.uid,
                    project_id = %project_id,
                    "portal_link_project_mismatch"
                );
                return Err(ResolveError::PortalLinkNotFound);
            }
            None => return Err(ResolveError::PortalLinkNotFound),
        };

        let endpoints = self.inner.endpoints.read().await;
        let mut ids: Vec<String> = endpoints
            .values()
            .filter(|e| e.project_id == project_id)
            .filter(|e| {
                link.endpoints.contains(&e.uid)
                    || (link.owner_id.is_some() && e.owner_id == link.owner_id)
            })
            .map(|e| e.uid.clone())
            .collect();
        ids.sort();

        Ok(ids)
    }
}
