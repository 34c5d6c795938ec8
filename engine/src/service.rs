//! Subscription operations.
//!
//! Each operation takes the caller's `AccessScope`, resolved once at request
//! entry via [`SubscriptionService::resolve_access`], and checks it before
//! touching the store.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::{AccessScope, EndpointScopeAuthorizer, ListScope, Principal};
use crate::capability::{CapabilityCheck, Feature};
use crate::config::Config;
use crate::error::EngineError;
use crate::filter::{FilterConfig, FilterSchema, FilterTestCase};
use crate::store::{EndpointDirectory, MemoryStore, PortalLinkResolver, SubscriptionStore};
use crate::subscription::{
    CreateSubscription, PagedResponse, Pageable, Subscription, SubscriptionQuery,
    SubscriptionResponse, UpdateSubscription,
};
use crate::transform::{FunctionRequest, FunctionResponse, TransformRunner};

/// Orchestrates subscription CRUD and the dry-run evaluators.
#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    endpoints: Arc<dyn EndpointDirectory>,
    authorizer: EndpointScopeAuthorizer,
    capabilities: Arc<dyn CapabilityCheck>,
    runner: TransformRunner,
    default_per_page: usize,
    max_per_page: usize,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        endpoints: Arc<dyn EndpointDirectory>,
        portal_links: Arc<dyn PortalLinkResolver>,
        capabilities: Arc<dyn CapabilityCheck>,
        runner: TransformRunner,
    ) -> Self {
        Self {
            subscriptions,
            endpoints,
            authorizer: EndpointScopeAuthorizer::new(portal_links),
            capabilities,
            runner,
            default_per_page: 20,
            max_per_page: 100,
        }
    }

    /// Build a service backed entirely by one in-memory store.
    pub fn in_memory(config: &Config, store: MemoryStore) -> Self {
        let shared = Arc::new(store);
        Self::new(
            shared.clone(),
            shared.clone(),
            shared,
            Arc::new(config.licenser()),
            TransformRunner::new(config.transform_limits()),
        )
        .with_page_sizes(config.default_per_page, config.max_per_page)
    }

    pub fn with_page_sizes(mut self, default_per_page: usize, max_per_page: usize) -> Self {
        self.default_per_page = default_per_page;
        self.max_per_page = max_per_page;
        self
    }

    /// Classify the caller once; portal-link callers get their endpoint set.
    pub async fn resolve_access(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> Result<AccessScope, EngineError> {
        self.authorizer.resolve(principal, project_id).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list(
        &self,
        project_id: &str,
        access: &AccessScope,
        mut query: SubscriptionQuery,
        pageable: Pageable,
    ) -> Result<PagedResponse<SubscriptionResponse>, EngineError> {
        match access.narrow_list(&query.endpoint_ids)? {
            ListScope::Nothing => {
                info!(project_id = %project_id, "subscription_list_empty_scope");
                return Ok(PagedResponse::empty());
            }
            ListScope::Filter(endpoint_ids) => query.endpoint_ids = endpoint_ids,
        }

        let pageable = pageable.clamped(self.default_per_page, self.max_per_page);
        let (subscriptions, pagination) = self
            .subscriptions
            .load_subscriptions_paged(project_id, &query, &pageable)
            .await
            .map_err(|e| {
                error!(project_id = %project_id, error = %e, "subscription_list_failed");
                EngineError::Service("an error occurred while fetching subscriptions".to_string())
            })?;

        info!(
            project_id = %project_id,
            count = subscriptions.len(),
            endpoint_filter = query.endpoint_ids.len(),
            "subscriptions_fetched"
        );

        Ok(PagedResponse {
            content: subscriptions.iter().map(SubscriptionResponse::from).collect(),
            pagination,
        })
    }

    pub async fn get(
        &self,
        project_id: &str,
        access: &AccessScope,
        id: &str,
    ) -> Result<SubscriptionResponse, EngineError> {
        let subscription = self.find(project_id, id).await?;
        access.authorize_endpoint(&subscription.endpoint_id)?;
        Ok(SubscriptionResponse::from(&subscription))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create(
        &self,
        project_id: &str,
        access: &AccessScope,
        mut request: CreateSubscription,
    ) -> Result<SubscriptionResponse, EngineError> {
        request.validate()?;
        access.authorize_endpoint(&request.endpoint_id)?;
        self.endpoints.find_endpoint(project_id, &request.endpoint_id).await?;

        self.strip_unlicensed(&mut request.filter_config, &mut request.function);
        self.check_function(request.function.as_deref())?;

        let subscription = Subscription::new(project_id, request);
        self.subscriptions
            .create_subscription(&subscription)
            .await
            .map_err(|e| {
                error!(project_id = %project_id, error = %e, "subscription_create_failed");
                EngineError::from(e)
            })?;

        info!(
            project_id = %project_id,
            subscription_id = %subscription.uid,
            endpoint_id = %subscription.endpoint_id,
            has_function = subscription.function.is_some(),
            "subscription_created"
        );

        Ok(SubscriptionResponse::from(&subscription))
    }

    pub async fn update(
        &self,
        project_id: &str,
        access: &AccessScope,
        id: &str,
        mut update: UpdateSubscription,
    ) -> Result<SubscriptionResponse, EngineError> {
        update.validate()?;

        let mut subscription = self.find(project_id, id).await?;
        access.authorize_endpoint(&subscription.endpoint_id)?;

        if let Some(endpoint_id) = &update.endpoint_id {
            access.authorize_endpoint(endpoint_id)?;
            self.endpoints.find_endpoint(project_id, endpoint_id).await?;
        }

        self.strip_unlicensed(&mut update.filter_config, &mut update.function);
        self.check_function(update.function.as_deref())?;

        subscription.apply(update);
        self.subscriptions
            .update_subscription(&subscription)
            .await
            .map_err(|e| {
                error!(
                    project_id = %project_id,
                    subscription_id = %id,
                    error = %e,
                    "subscription_update_failed"
                );
                EngineError::from(e)
            })?;

        info!(project_id = %project_id, subscription_id = %id, "subscription_updated");

        Ok(SubscriptionResponse::from(&subscription))
    }

    pub async fn delete(
        &self,
        project_id: &str,
        access: &AccessScope,
        id: &str,
    ) -> Result<(), EngineError> {
        let subscription = self.find(project_id, id).await?;
        access.authorize_endpoint(&subscription.endpoint_id)?;

        self.subscriptions
            .delete_subscription(project_id, &subscription)
            .await
            .map_err(|e| {
                error!(
                    project_id = %project_id,
                    subscription_id = %id,
                    error = %e,
                    "subscription_delete_failed"
                );
                EngineError::from(e)
            })?;

        info!(project_id = %project_id, subscription_id = %id, "subscription_deleted");
        Ok(())
    }

    // =========================================================================
    // Dry runs
    // =========================================================================

    /// Validate that a filter matches a sample request.
    pub fn test_filter(&self, test: &FilterTestCase) -> Result<bool, EngineError> {
        self.capabilities.require(Feature::AdvancedSubscriptions)?;

        let matched = test.run().map_err(|e| {
            error!(error = %e, "subscription_filter_validation_failed");
            EngineError::Validation(format!("failed to validate subscription filter: {e}"))
        })?;

        info!(matched, "subscription_filter_validated");
        Ok(matched)
    }

    /// Run a transform function against a sample payload.
    pub async fn test_function(
        &self,
        request: FunctionRequest,
    ) -> Result<FunctionResponse, EngineError> {
        self.capabilities.require(Feature::Transformations)?;

        let output = self
            .runner
            .run_detached(request.function, request.payload)
            .await?;

        Ok(FunctionResponse::from(output))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find(&self, project_id: &str, id: &str) -> Result<Subscription, EngineError> {
        self.subscriptions
            .find_subscription_by_id(project_id, id)
            .await
            .map_err(|e| {
                warn!(
                    project_id = %project_id,
                    subscription_id = %id,
                    error = %e,
                    "subscription_lookup_failed"
                );
                EngineError::from(e)
            })
    }

    /// Drop a filter or function the instance is not licensed for.
    fn strip_unlicensed(
        &self,
        filter_config: &mut Option<FilterConfig>,
        function: &mut Option<String>,
    ) {
        if !self.capabilities.is_enabled(Feature::AdvancedSubscriptions) {
            if let Some(config) = filter_config.as_mut() {
                if config.filter != FilterSchema::default() {
                    warn!("subscription_filter_dropped_unlicensed");
                    config.filter = FilterSchema::default();
                }
            }
        }

        if !self.capabilities.is_enabled(Feature::Transformations) && function.take().is_some() {
            warn!("subscription_function_dropped_unlicensed");
        }
    }

    fn check_function(&self, function: Option<&str>) -> Result<(), EngineError> {
        match function {
            Some(source) if !source.trim().is_empty() => self
                .runner
                .check(source)
                .map_err(|e| EngineError::Validation(format!("invalid function: {}", e.message))),
            _ => Ok(()),
        }
    }
}
