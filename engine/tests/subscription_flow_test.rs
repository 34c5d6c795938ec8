//! End-to-end flows through the public API with an in-memory store.

use serde_json::json;

use hookwise::auth::TokenDigester;
use hookwise::filter::FilterCandidate;
use hookwise::store::Endpoint;
use hookwise::subscription::{Pageable, SubscriptionQuery};
use hookwise::{
    AccessScope, Config, CreateSubscription, EngineError, FilterConfig, FilterSchema,
    FilterTestCase, FunctionRequest, MemoryStore, Principal, SubscriptionService,
};

async fn service_with_endpoints(endpoints: &[&str]) -> (SubscriptionService, MemoryStore) {
    let store = MemoryStore::new(TokenDigester::new(Some("integration-secret")));
    for ep in endpoints {
        store.insert_endpoint(Endpoint::new(ep, "proj", ep)).await;
    }
    let service = SubscriptionService::in_memory(&Config::default(), store.clone());
    (service, store)
}

async fn portal_scope(
    service: &SubscriptionService,
    store: &MemoryStore,
    endpoints: &[&str],
) -> AccessScope {
    let (_, token) = store
        .create_portal_link(
            "proj",
            "customer portal",
            endpoints.iter().map(|e| e.to_string()).collect(),
            None,
        )
        .await;
    service
        .resolve_access(&Principal::PortalLink { token }, "proj")
        .await
        .unwrap()
}

fn event_schema() -> FilterSchema {
    FilterSchema {
        headers: json!(null),
        body: json!({"event": "user.created"}),
    }
}

#[tokio::test]
async fn filter_matching_event_passes() {
    let (service, _) = service_with_endpoints(&[]).await;
    let test = FilterTestCase {
        request: FilterCandidate {
            body: json!({"event": "user.created", "id": 1}),
            headers: json!(null),
        },
        schema: event_schema(),
    };
    assert!(service.test_filter(&test).unwrap());
}

#[tokio::test]
async fn filter_other_event_fails() {
    let (service, _) = service_with_endpoints(&[]).await;
    let test = FilterTestCase {
        request: FilterCandidate {
            body: json!({"event": "user.deleted"}),
            headers: json!(null),
        },
        schema: event_schema(),
    };
    assert!(!service.test_filter(&test).unwrap());
}

#[tokio::test]
async fn filter_checks_headers_and_body_together() {
    let (service, _) = service_with_endpoints(&[]).await;
    let schema = FilterSchema {
        headers: json!({"X-Tenant": "acme"}),
        body: json!({"event": "user.created"}),
    };

    let both = FilterTestCase {
        request: FilterCandidate {
            body: json!({"event": "user.created"}),
            headers: json!({"x-tenant": "acme"}),
        },
        schema: schema.clone(),
    };
    assert!(service.test_filter(&both).unwrap());

    let body_only = FilterTestCase {
        request: FilterCandidate {
            body: json!({"event": "user.created"}),
            headers: json!({"x-tenant": "globex"}),
        },
        schema,
    };
    assert!(!service.test_filter(&body_only).unwrap());
}

#[tokio::test]
async fn function_doubles_amount() {
    let (service, _) = service_with_endpoints(&[]).await;
    let response = service
        .test_function(FunctionRequest {
            function: "fn transform(payload) { payload.amount * 2 }".to_string(),
            payload: json!({"amount": 5}),
        })
        .await
        .unwrap();
    assert_eq!(response.payload, json!(10));
    assert!(response.log.is_empty());
}

#[tokio::test]
async fn function_runaway_loop_is_stopped() {
    let (service, _) = service_with_endpoints(&[]).await;
    let err = service
        .test_function(FunctionRequest {
            function: "fn transform(payload) { print(\"start\"); loop { } }".to_string(),
            payload: json!({}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Transform(_)));
    assert_eq!(err.transform_log(), Some(&["start".to_string()][..]));
}

#[tokio::test]
async fn scoped_listing_rejects_endpoint_outside_scope() {
    let (service, store) = service_with_endpoints(&["ep1", "ep2", "ep3"]).await;
    let access = portal_scope(&service, &store, &["ep1", "ep2"]).await;

    let query = SubscriptionQuery {
        endpoint_ids: vec!["ep1".to_string(), "ep3".to_string()],
        name: None,
    };
    let err = service
        .list("proj", &access, query, Pageable::first(20))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized));
}

#[tokio::test]
async fn scoped_listing_defaults_to_scope() {
    let (service, store) = service_with_endpoints(&["ep1", "ep2", "ep3"]).await;
    let access = portal_scope(&service, &store, &["ep1", "ep2"]).await;

    let page = service
        .list("proj", &access, SubscriptionQuery::default(), Pageable::first(20))
        .await
        .unwrap();
    assert!(page.content.is_empty());

    service
        .create(
            "proj",
            &AccessScope::Full,
            CreateSubscription {
                name: "outside".to_string(),
                endpoint_id: "ep3".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let inside = service
        .create(
            "proj",
            &access,
            CreateSubscription {
                name: "inside".to_string(),
                endpoint_id: "ep2".to_string(),
                filter_config: Some(FilterConfig {
                    event_types: vec!["user.created".to_string()],
                    filter: event_schema(),
                }),
                function: Some("fn transform(payload) { payload }".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let page = service
        .list("proj", &access, SubscriptionQuery::default(), Pageable::first(20))
        .await
        .unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].uid, inside.uid);
    assert_eq!(page.content[0].filter_config.filter.body, json!({"event": "user.created"}));
    assert_eq!(page.content[0].filter_config.filter.raw_body, json!({"event": "user.created"}));
}

#[tokio::test]
async fn revoked_portal_link_cannot_resolve() {
    let (service, store) = service_with_endpoints(&["ep1"]).await;
    let (link, token) = store
        .create_portal_link("proj", "customer", vec!["ep1".to_string()], None)
        .await;
    store.revoke_portal_link(&link.uid).await;

    let err = service
        .resolve_access(&Principal::PortalLink { token }, "proj")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Service(_)));
}
