//! Subscription model.
//!
//! This module provides:
//! - The persisted `Subscription` record and its create/update requests
//! - The response view built once per returned subscription
//! - Cursor pagination types for listings

pub mod pagination;
pub mod types;

pub use pagination::{
    paginate, PageDirection, Pageable, PagedResponse, PaginationData, SubscriptionQuery,
};
pub use types::{CreateSubscription, Subscription, SubscriptionResponse, UpdateSubscription};
