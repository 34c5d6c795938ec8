//! Hookwise dry-run CLI.
//!
//! Reads one dry-run request as JSON from stdin, evaluates it and prints the
//! result as JSON to stdout. Logs go to stderr.
//!
//! ```text
//! {"filter": {"request": {"body": {...}, "headers": {...}},
//!             "schema": {"body": {...}, "headers": {...}}}}
//! {"function": {"function": "fn transform(payload) { payload }", "payload": {...}}}
//! ```

use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookwise::auth::TokenDigester;
use hookwise::{
    Config, EngineError, FilterTestCase, FunctionRequest, FunctionResponse, MemoryStore,
    SubscriptionService,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DryRun {
    Filter(FilterTestCase),
    Function(FunctionRequest),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum DryRunOutput {
    Filter {
        is_match: bool,
    },
    Function(FunctionResponse),
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        log: Option<Vec<String>>,
    },
}

impl From<EngineError> for DryRunOutput {
    fn from(err: EngineError) -> Self {
        DryRunOutput::Error {
            error: err.to_string(),
            log: err.transform_log().map(|log| log.to_vec()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize structured JSON logging; stdout is reserved for the result
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(io::stderr))
        .init();

    tracing::info!("dry_run_starting");

    let config = Config::from_env();
    tracing::info!(
        transform_timeout_ms = config.transform_timeout_ms,
        transform_max_operations = config.transform_max_operations,
        advanced_subscriptions = config.feature_advanced_subscriptions,
        transformations = config.feature_transformations,
        "config_loaded"
    );

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read request from stdin")?;

    let request: DryRun =
        serde_json::from_str(&input).context("Failed to parse dry-run request")?;

    let store = MemoryStore::new(TokenDigester::new(config.portal_token_secret.as_deref()));
    let service = SubscriptionService::in_memory(&config, store);

    let (output, code) = match evaluate(&service, request).await {
        Ok(output) => (output, ExitCode::SUCCESS),
        Err(e) => {
            tracing::warn!(error = %e, "dry_run_failed");
            (DryRunOutput::from(e), ExitCode::FAILURE)
        }
    };

    let rendered = serde_json::to_string_pretty(&output).context("Failed to encode result")?;
    println!("{rendered}");

    Ok(code)
}

async fn evaluate(
    service: &SubscriptionService,
    request: DryRun,
) -> Result<DryRunOutput, EngineError> {
    match request {
        DryRun::Filter(test) => {
            let is_match = service.test_filter(&test)?;
            Ok(DryRunOutput::Filter { is_match })
        }
        DryRun::Function(request) => {
            let response = service.test_function(request).await?;
            Ok(DryRunOutput::Function(response))
        }
    }
}
