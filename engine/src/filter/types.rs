//! Filter configuration carried by a subscription, and its response view.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{CompiledFilter, FilterError};

/// Event type wildcard accepted by every event.
pub const ALL_EVENTS: &str = "*";

/// Body and header schemas, stored once in their canonical (raw) form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSchema {
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub body: Value,
}

impl FilterSchema {
    /// Compile both schemas, surfacing the first grammar error.
    pub fn validate(&self) -> Result<(), FilterError> {
        CompiledFilter::compile(&self.headers)?;
        CompiledFilter::compile(&self.body)?;
        Ok(())
    }

    /// Evaluate a candidate event.
    ///
    /// Headers and body are matched independently and both must pass. Both
    /// sides are always evaluated so a malformed header schema is reported
    /// even when the body already failed.
    pub fn evaluate(
        &self,
        body: &Value,
        headers: &Value,
        strict: bool,
    ) -> Result<bool, FilterError> {
        let body_matched = CompiledFilter::compile(&self.body)?.evaluate(body, strict)?;

        let header_schema = normalize_header_schema(&self.headers);
        let header_candidate = normalize_header_names(headers);
        let headers_matched =
            CompiledFilter::compile(&header_schema)?.evaluate(&header_candidate, strict)?;

        debug!(body_matched, headers_matched, "filter_schema_evaluated");
        Ok(body_matched && headers_matched)
    }
}

/// Lowercase the top-level names of a header object.
///
/// Non-object values are returned unchanged.
pub fn normalize_header_names(headers: &Value) -> Value {
    match headers {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Lowercase the header names a header schema refers to.
///
/// Names inside `$and`/`$or` branches are lowercased too. Operator keys and
/// expected values are left alone.
pub fn normalize_header_schema(schema: &Value) -> Value {
    let map = match schema {
        Value::Object(map) => map,
        other => return other.clone(),
    };

    let normalized = map
        .iter()
        .map(|(key, value)| match (key.as_str(), value) {
            ("$and" | "$or", Value::Array(branches)) => (
                key.clone(),
                Value::Array(branches.iter().map(normalize_header_schema).collect()),
            ),
            (k, _) if k.starts_with('$') => (key.clone(), value.clone()),
            _ => (key.to_ascii_lowercase(), value.clone()),
        })
        .collect::<Map<String, Value>>();

    Value::Object(normalized)
}

fn default_event_types() -> Vec<String> {
    vec![ALL_EVENTS.to_string()]
}

/// Filter configuration persisted with a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub filter: FilterSchema,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            event_types: default_event_types(),
            filter: FilterSchema::default(),
        }
    }
}

impl FilterConfig {
    /// Whether a live event should be routed to the subscription.
    pub fn accepts(
        &self,
        event_type: &str,
        body: &Value,
        headers: &Value,
    ) -> Result<bool, FilterError> {
        let type_matched = self.event_types.is_empty()
            || self
                .event_types
                .iter()
                .any(|t| t == ALL_EVENTS || t == event_type);

        if !type_matched {
            return Ok(false);
        }

        self.filter.evaluate(body, headers, false)
    }
}

// =============================================================================
// Response view
// =============================================================================

/// Filter schema as returned to callers.
///
/// `headers` and `body` always mirror the raw persisted values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSchemaView {
    pub headers: Value,
    pub body: Value,
    pub raw_headers: Value,
    pub raw_body: Value,
}

impl From<&FilterSchema> for FilterSchemaView {
    fn from(schema: &FilterSchema) -> Self {
        Self {
            headers: schema.headers.clone(),
            body: schema.body.clone(),
            raw_headers: schema.headers.clone(),
            raw_body: schema.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterConfigView {
    pub event_types: Vec<String>,
    pub filter: FilterSchemaView,
}

impl From<&FilterConfig> for FilterConfigView {
    fn from(config: &FilterConfig) -> Self {
        Self {
            event_types: config.event_types.clone(),
            filter: FilterSchemaView::from(&config.filter),
        }
    }
}

// =============================================================================
// Dry-run input
// =============================================================================

/// A concrete request to test a schema against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCandidate {
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: Value,
}

/// Pairs a candidate request with the schema under test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterTestCase {
    #[serde(default)]
    pub request: FilterCandidate,
    #[serde(default)]
    pub schema: FilterSchema,
}

impl FilterTestCase {
    /// Run the test. Always non-strict.
    pub fn run(&self) -> Result<bool, FilterError> {
        self.schema
            .evaluate(&self.request.body, &self.request.headers, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::matches;
    use serde_json::json;

    fn case(
        body: Value,
        headers: Value,
        schema_body: Value,
        schema_headers: Value,
    ) -> FilterTestCase {
        FilterTestCase {
            request: FilterCandidate { body, headers },
            schema: FilterSchema {
                headers: schema_headers,
                body: schema_body,
            },
        }
    }

    #[test]
    fn test_filter_matches_created_event() {
        let test = case(
            json!({"event": "user.created", "id": 1}),
            json!({}),
            json!({"event": "user.created"}),
            json!(null),
        );
        assert!(test.run().unwrap());
    }

    #[test]
    fn test_filter_rejects_other_event() {
        let test = case(
            json!({"event": "user.deleted"}),
            json!({}),
            json!({"event": "user.created"}),
            json!(null),
        );
        assert!(!test.run().unwrap());
    }

    #[test]
    fn test_both_sides_must_pass() {
        let body = json!({"event": "user.created"});
        let headers = json!({"x-source": ["billing"]});
        let body_schema = json!({"event": "user.created"});

        let billing = json!({"x-source": "billing"});
        let crm = json!({"x-source": "crm"});
        let passing = case(body.clone(), headers.clone(), body_schema.clone(), billing);
        let failing = case(body.clone(), headers.clone(), body_schema.clone(), crm);

        for test in [passing, failing] {
            let expected = matches(&test.request.body, &test.schema.body, false).unwrap()
                && matches(&test.request.headers, &test.schema.headers, false).unwrap();
            assert_eq!(test.run().unwrap(), expected);
        }
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let test = case(
            json!(null),
            json!({"X-Event-Type": "charge.succeeded"}),
            json!(null),
            json!({"x-event-type": "charge.succeeded"}),
        );
        assert!(test.run().unwrap());
    }

    #[test]
    fn test_header_names_inside_combinators_are_case_insensitive() {
        let schema = json!({"$or": [{"X-Source": "billing"}, {"X-Source": "crm"}]});
        let test = case(json!(null), json!({"X-Source": "billing"}), json!(null), schema.clone());
        assert!(test.run().unwrap());

        let nested = json!({
            "$and": [{"$or": [{"X-Tenant": "acme"}]}, {"X-Source": {"$in": ["billing"]}}]
        });
        let headers = json!({"x-tenant": "acme", "X-SOURCE": "billing"});
        assert!(case(json!(null), headers.clone(), json!(null), nested).run().unwrap());

        let other = case(json!(null), json!({"X-Source": "ops"}), json!(null), schema);
        assert!(!other.run().unwrap());
    }

    #[test]
    fn test_header_schema_normalization_keeps_operators() {
        let schema = json!({"X-Id": {"$regex": "^A"}, "$or": [{"X-Kind": "Big"}]});
        assert_eq!(
            normalize_header_schema(&schema),
            json!({"x-id": {"$regex": "^A"}, "$or": [{"x-kind": "Big"}]})
        );
    }

    #[test]
    fn test_malformed_header_schema_reported_when_body_fails() {
        let test = case(
            json!({"a": 1}),
            json!({}),
            json!({"a": 2}),
            json!({"h": {"$nope": 1}}),
        );
        assert!(matches!(test.run(), Err(FilterError::InvalidSchema(_))));
    }

    #[test]
    fn test_test_case_deserializes_with_missing_members() {
        let test: FilterTestCase =
            serde_json::from_value(json!({"request": {"body": {"a": 1}}})).unwrap();
        assert_eq!(test.request.headers, Value::Null);
        assert!(test.run().unwrap());
    }

    #[test]
    fn test_accepts_checks_event_type_first() {
        let config = FilterConfig {
            event_types: vec!["invoice.paid".to_string()],
            filter: FilterSchema {
                headers: json!(null),
                body: json!({"amount": {"$gt": 0}}),
            },
        };
        assert!(config.accepts("invoice.paid", &json!({"amount": 3}), &json!({})).unwrap());
        assert!(!config.accepts("invoice.voided", &json!({"amount": 3}), &json!({})).unwrap());
        assert!(!config.accepts("invoice.paid", &json!({"amount": 0}), &json!({})).unwrap());
    }

    #[test]
    fn test_default_config_accepts_everything() {
        let config = FilterConfig::default();
        assert_eq!(config.event_types, vec!["*".to_string()]);
        assert!(config.accepts("anything", &json!({"x": 1}), &json!(null)).unwrap());
    }

    #[test]
    fn test_view_mirrors_raw_fields() {
        let schema = FilterSchema {
            headers: json!({"x-tenant": "acme"}),
            body: json!({"event": {"$in": ["a", "b"]}}),
        };
        let view = FilterSchemaView::from(&schema);
        assert_eq!(view.headers, view.raw_headers);
        assert_eq!(view.body, view.raw_body);
        assert_eq!(view.raw_body, schema.body);
    }
}
