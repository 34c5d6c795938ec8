//! Records owned by the collaborators rather than the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A destination endpoint within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub uid: String,
    pub project_id: String,
    pub name: String,
    /// Groups endpoints belonging to one customer
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl Endpoint {
    pub fn new(uid: &str, project_id: &str, name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }
}

/// A restricted access grant handed to a customer.
///
/// Only the token digest is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalLink {
    pub uid: String,
    pub project_id: String,
    pub name: String,
    /// Explicitly granted endpoints
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Grants every endpoint with this owner
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(skip_serializing, default)]
    pub token_digest: String,
    pub created_at: DateTime<Utc>,
}
