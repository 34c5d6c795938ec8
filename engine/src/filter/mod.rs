//! Subscription filter evaluation.
//!
//! A filter is a pair of JSON schemas, one for the event body and one for
//! its headers. Both are matched independently and both must pass.
//!
//! ## Grammar
//!
//! ```text
//! {"event": "user.created"}                 equality
//! {"data.user.id": 42}                      dotted path (numeric segments index arrays)
//! {"data": {"user": {"id": 42}}}            nested objects flatten to paths
//! {"amount": {"$gte": 10, "$lt": 100}}      operators: $eq $neq $gt $gte $lt $lte
//!                                                      $in $nin $exist $regex
//! {"$or": [{...}, {...}], "$and": [...]}    combinators, relative to their level
//! ```
//!
//! ## Array candidates
//!
//! When the candidate value is an array and the expectation is not, every
//! operator looks at the elements: `$eq`, `$in`, `$regex` and the ordering
//! operators hold when any element satisfies them, `$neq` and `$nin` hold
//! when none does. Elements of another kind simply do not match, so an
//! array candidate is never a type mismatch.
//!
//! ## Type mismatches
//!
//! A scalar candidate whose kind differs from the expectation is a mismatch:
//! for `$in`/`$nin` when no non-null member of the set shares its kind, and
//! for `$regex` when it is not a string. A mismatch is a non-match, or a
//! [`FilterError::TypeMismatch`] when evaluating strictly. `null` on either
//! side never mismatches.
//!
//! Header names are case-insensitive, including inside `$and`/`$or`.

pub mod matcher;
pub mod types;

use thiserror::Error;

pub use matcher::{matches, matches_str, CompiledFilter};
pub use types::{
    normalize_header_names, normalize_header_schema, FilterCandidate, FilterConfig,
    FilterConfigView, FilterSchema, FilterSchemaView, FilterTestCase,
};

/// Errors raised while compiling or evaluating a filter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("malformed json: {0}")]
    MalformedJson(String),

    #[error("invalid filter schema: {0}")]
    InvalidSchema(String),

    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}
