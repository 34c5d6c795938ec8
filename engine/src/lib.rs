//! Hookwise - subscription evaluation engine for webhook delivery.
//!
//! This library decides, for each subscription:
//! - whether an incoming event matches its filter (`filter`)
//! - how its payload is reshaped before delivery (`transform`)
//! - which callers may see or change it (`auth`)
//!
//! ## Architecture
//!
//! ```text
//! Principal → EndpointScopeAuthorizer → AccessScope
//!                                          ↓
//!                 SubscriptionService (capability gate, scope checks)
//!                   ↓                 ↓                  ↓
//!            SubscriptionStore   FilterSchema      TransformRunner
//! ```

pub mod auth;
pub mod capability;
pub mod config;
pub mod error;
pub mod filter;
pub mod service;
pub mod store;
pub mod subscription;
pub mod transform;

// Re-export commonly used types
pub use auth::{AccessScope, EndpointScope, EndpointScopeAuthorizer, ListScope, Principal};
pub use capability::{CapabilityCheck, Feature, Licenser};
pub use config::Config;
pub use error::EngineError;
pub use filter::{FilterConfig, FilterSchema, FilterTestCase};
pub use service::SubscriptionService;
pub use store::MemoryStore;
pub use subscription::{CreateSubscription, Subscription, SubscriptionResponse, UpdateSubscription};
pub use transform::{FunctionRequest, FunctionResponse, TransformRunner};
