//! Collaborator ports for persistence and portal-link resolution.
//!
//! The engine only depends on these traits. `MemoryStore` implements all of
//! them for tests, the dry-run binary and embedded use.

pub mod memory;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::subscription::{Pageable, PaginationData, Subscription, SubscriptionQuery};

pub use memory::MemoryStore;
pub use types::{Endpoint, PortalLink};

/// Errors from the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("endpoint not found")]
    EndpointNotFound,

    #[error("store error: {0}")]
    Backend(String),
}

/// Errors resolving a portal-link token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("portal link not found")]
    PortalLinkNotFound,

    #[error("failed to load portal link endpoints: {0}")]
    Backend(String),
}

/// Subscription persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Page through a project's subscriptions matching `query`.
    async fn load_subscriptions_paged(
        &self,
        project_id: &str,
        query: &SubscriptionQuery,
        pageable: &Pageable,
    ) -> Result<(Vec<Subscription>, PaginationData), StoreError>;

    /// Fails with `SubscriptionNotFound` when absent.
    async fn find_subscription_by_id(
        &self,
        project_id: &str,
        id: &str,
    ) -> Result<Subscription, StoreError>;

    async fn create_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;

    async fn update_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;

    async fn delete_subscription(
        &self,
        project_id: &str,
        subscription: &Subscription,
    ) -> Result<(), StoreError>;
}

/// Endpoint lookup, used to keep subscriptions inside their project.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// Fails with `EndpointNotFound` when the endpoint is absent or belongs
    /// to another project.
    async fn find_endpoint(
        &self,
        project_id: &str,
        endpoint_id: &str,
    ) -> Result<Endpoint, StoreError>;
}

/// Maps portal-link tokens to the endpoints they grant.
#[async_trait]
pub trait PortalLinkResolver: Send + Sync {
    async fn endpoints_for_token(
        &self,
        project_id: &str,
        token: &str,
    ) -> Result<Vec<String>, ResolveError>;
}
