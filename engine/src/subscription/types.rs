//! Subscription records, request payloads and the response view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::filter::{FilterConfig, FilterConfigView};

// =============================================================================
// Persisted record
// =============================================================================

/// Binds one event source to one endpoint within a project.
///
/// `uid` and `project_id` never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub uid: String,
    pub project_id: String,
    pub name: String,
    pub endpoint_id: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub filter_config: FilterConfig,
    /// Transform function source
    #[serde(default)]
    pub function: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Build a new subscription from a validated create request.
    pub fn new(project_id: &str, request: CreateSubscription) -> Self {
        let now = Utc::now();
        Self {
            uid: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: request.name.trim().to_string(),
            endpoint_id: request.endpoint_id,
            source_id: request.source_id,
            filter_config: request.filter_config.unwrap_or_default(),
            function: request.function,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the mutable fields of a validated update.
    pub fn apply(&mut self, update: UpdateSubscription) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(endpoint_id) = update.endpoint_id {
            self.endpoint_id = endpoint_id;
        }
        if let Some(source_id) = update.source_id {
            self.source_id = Some(source_id);
        }
        if let Some(filter_config) = update.filter_config {
            self.filter_config = filter_config;
        }
        if let Some(function) = update.function {
            self.function = Some(function).filter(|f| !f.trim().is_empty());
        }
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request to create a subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSubscription {
    pub name: String,
    pub endpoint_id: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub filter_config: Option<FilterConfig>,
    #[serde(default)]
    pub function: Option<String>,
}

impl CreateSubscription {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "please provide a valid subscription name".to_string(),
            ));
        }
        if self.endpoint_id.trim().is_empty() {
            return Err(EngineError::Validation("please provide a valid endpoint id".to_string()));
        }
        if let Some(config) = &self.filter_config {
            validate_filter_config(config)?;
        }
        Ok(())
    }
}

/// Request to update a subscription. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscription {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub filter_config: Option<FilterConfig>,
    /// An empty string removes the function.
    #[serde(default)]
    pub function: Option<String>,
}

impl UpdateSubscription {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(EngineError::Validation(
                "please provide a valid subscription name".to_string(),
            ));
        }
        if self.endpoint_id.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(EngineError::Validation("please provide a valid endpoint id".to_string()));
        }
        if let Some(config) = &self.filter_config {
            validate_filter_config(config)?;
        }
        Ok(())
    }
}

fn validate_filter_config(config: &FilterConfig) -> Result<(), EngineError> {
    if config.event_types.iter().any(|t| t.trim().is_empty()) {
        return Err(EngineError::Validation("event types must not be empty".to_string()));
    }
    config.filter.validate()?;
    Ok(())
}

// =============================================================================
// Response
// =============================================================================

/// Subscription as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionResponse {
    pub uid: String,
    pub project_id: String,
    pub name: String,
    pub endpoint_id: String,
    pub source_id: Option<String>,
    pub filter_config: FilterConfigView,
    pub function: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(sub: &Subscription) -> Self {
        Self {
            uid: sub.uid.clone(),
            project_id: sub.project_id.clone(),
            name: sub.name.clone(),
            endpoint_id: sub.endpoint_id.clone(),
            source_id: sub.source_id.clone(),
            filter_config: FilterConfigView::from(&sub.filter_config),
            function: sub.function.clone(),
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSchema;
    use serde_json::json;

    fn create_request() -> CreateSubscription {
        CreateSubscription {
            name: " orders ".to_string(),
            endpoint_id: "ep1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_subscription_defaults() {
        let sub = Subscription::new("proj1", create_request());
        assert_eq!(sub.name, "orders");
        assert_eq!(sub.project_id, "proj1");
        assert_eq!(sub.filter_config, FilterConfig::default());
        assert!(Uuid::parse_str(&sub.uid).is_ok());
    }

    #[test]
    fn test_create_validation() {
        assert!(create_request().validate().is_ok());

        let mut missing_name = create_request();
        missing_name.name = "  ".to_string();
        assert!(matches!(missing_name.validate(), Err(EngineError::Validation(_))));

        let mut bad_filter = create_request();
        bad_filter.filter_config = Some(FilterConfig {
            event_types: vec!["*".to_string()],
            filter: FilterSchema {
                headers: json!(null),
                body: json!({"amount": {"$bogus": 1}}),
            },
        });
        assert!(matches!(bad_filter.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_apply_keeps_identity() {
        let mut sub = Subscription::new("proj1", create_request());
        let uid = sub.uid.clone();

        sub.apply(UpdateSubscription {
            name: Some("renamed".to_string()),
            endpoint_id: Some("ep2".to_string()),
            function: Some("fn transform(p) { p }".to_string()),
            ..Default::default()
        });

        assert_eq!(sub.uid, uid);
        assert_eq!(sub.project_id, "proj1");
        assert_eq!(sub.name, "renamed");
        assert_eq!(sub.endpoint_id, "ep2");
        assert!(sub.function.is_some());

        sub.apply(UpdateSubscription {
            function: Some(String::new()),
            ..Default::default()
        });
        assert!(sub.function.is_none());
    }

    #[test]
    fn test_response_mirrors_raw_filter() {
        let mut request = create_request();
        request.filter_config = Some(FilterConfig {
            event_types: vec!["user.created".to_string()],
            filter: FilterSchema {
                headers: json!({"x-tenant": "acme"}),
                body: json!({"event": "user.created"}),
            },
        });
        let sub = Subscription::new("proj1", request);
        let resp = SubscriptionResponse::from(&sub);

        let encoded = serde_json::to_value(&resp).unwrap();
        let filter = &encoded["filter_config"]["filter"];
        assert_eq!(filter["body"], filter["raw_body"]);
        assert_eq!(filter["headers"], filter["raw_headers"]);
        assert_eq!(filter["raw_body"], json!({"event": "user.created"}));
    }
}
