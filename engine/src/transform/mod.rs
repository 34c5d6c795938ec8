//! Transform functions.
//!
//! A transform function is user-authored Rhai source defining a single
//! entry point:
//!
//! ```text
//! fn transform(payload) {
//!     print(`amount: ${payload.amount}`);
//!     payload.amount * 2
//! }
//! ```
//!
//! Functions run in a fresh, resource-bounded engine per call with no
//! filesystem, network, clock, module or environment access.

pub mod runner;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use runner::{TransformLimits, TransformRunner};

/// Name of the function every transform source must define.
pub const ENTRY_POINT: &str = "transform";

/// A failed transform, with whatever console output was captured first.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    pub log: Vec<String>,
}

/// Result of a successful transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutput {
    pub payload: Value,
    pub log: Vec<String>,
}

/// Dry-run request for a transform function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRequest {
    pub function: String,
    #[serde(default)]
    pub payload: Value,
}

/// Dry-run response for a transform function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub payload: Value,
    pub log: Vec<String>,
}

impl From<TransformOutput> for FunctionResponse {
    fn from(output: TransformOutput) -> Self {
        Self {
            payload: output.payload,
            log: output.log,
        }
    }
}
