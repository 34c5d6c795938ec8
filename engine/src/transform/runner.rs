//! Sandboxed execution of transform functions.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use serde_json::Value;
use tracing::{info, warn};

use super::{TransformError, TransformOutput, ENTRY_POINT};

/// How often (in operations) the wall-clock budget is checked.
const CLOCK_CHECK_INTERVAL: u64 = 512;

/// Marker appended once the console log reaches its cap.
const LOG_TRUNCATED: &str = "[log truncated]";

/// Resource budget applied to every transform invocation.
#[derive(Debug, Clone)]
pub struct TransformLimits {
    /// Wall-clock budget for a single run
    pub timeout: Duration,
    /// Maximum script operations (0 = unlimited, timeout still applies)
    pub max_operations: u64,
    /// Maximum function call nesting
    pub max_call_levels: usize,
    /// Maximum expression nesting at global and function level
    pub max_expr_depth: usize,
    /// Maximum string length produced by the script
    pub max_string_size: usize,
    /// Maximum array length produced by the script
    pub max_array_size: usize,
    /// Maximum object map size produced by the script
    pub max_map_size: usize,
    /// Maximum captured console lines
    pub max_log_lines: usize,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_log_lines: 256,
        }
    }
}

/// Runs transform functions against payloads.
///
/// The runner itself only holds limits. Each call builds its own engine,
/// so concurrent and repeated runs never observe each other.
#[derive(Debug, Clone, Default)]
pub struct TransformRunner {
    limits: TransformLimits,
}

impl TransformRunner {
    pub fn new(limits: TransformLimits) -> Self {
        Self { limits }
    }

    /// Compile `source` and confirm it defines the entry point, without running it.
    pub fn check(&self, source: &str) -> Result<(), TransformError> {
        let engine = self.build_engine(Instant::now(), Arc::new(Mutex::new(Vec::new())));
        compile(&engine, source).map(|_| ()).map_err(|message| TransformError {
            message,
            log: Vec::new(),
        })
    }

    /// Execute `source` against `payload`.
    ///
    /// Console output is returned on success and attached to the error on
    /// failure.
    pub fn run(&self, source: &str, payload: &Value) -> Result<TransformOutput, TransformError> {
        let started = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = self.build_engine(started, Arc::clone(&log));

        info!(source_length = source.len(), "transform_run_start");

        let result = execute(&engine, source, payload, &self.limits);
        let lines = take_log(&log);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(payload) => {
                info!(elapsed_ms, log_lines = lines.len(), "transform_run_complete");
                Ok(TransformOutput { payload, log: lines })
            }
            Err(message) => {
                warn!(
                    elapsed_ms,
                    log_lines = lines.len(),
                    error = %message,
                    "transform_run_failed"
                );
                Err(TransformError { message, log: lines })
            }
        }
    }

    /// Execute on the blocking pool.
    ///
    /// Dropping the returned future abandons the result; the engine's own
    /// time budget still stops the evaluation.
    pub async fn run_detached(
        &self,
        source: String,
        payload: Value,
    ) -> Result<TransformOutput, TransformError> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.run(&source, &payload))
            .await
            .map_err(|e| TransformError {
                message: format!("transform task failed: {e}"),
                log: Vec::new(),
            })?
    }

    fn build_engine(&self, started: Instant, log: Arc<Mutex<Vec<String>>>) -> Engine {
        let limits = &self.limits;
        let mut engine = Engine::new();

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        let timeout = limits.timeout;
        engine.on_progress(move |ops| {
            if ops % CLOCK_CHECK_INTERVAL == 0 && started.elapsed() > timeout {
                Some(Dynamic::from("timeout"))
            } else {
                None
            }
        });

        let max_lines = limits.max_log_lines;
        let print_log = Arc::clone(&log);
        engine.on_print(move |text| push_line(&print_log, max_lines, text));
        engine.on_debug(move |text, _source, _pos| push_line(&log, max_lines, text));

        engine
    }
}

fn push_line(log: &Mutex<Vec<String>>, max_lines: usize, text: &str) {
    if let Ok(mut lines) = log.lock() {
        if lines.len() < max_lines {
            lines.push(text.to_string());
        } else if lines.len() == max_lines {
            lines.push(LOG_TRUNCATED.to_string());
        }
    }
}

fn take_log(log: &Mutex<Vec<String>>) -> Vec<String> {
    log.lock().map(|mut lines| std::mem::take(&mut *lines)).unwrap_or_default()
}

fn compile(engine: &Engine, source: &str) -> Result<AST, String> {
    let ast = engine
        .compile(source)
        .map_err(|e| format!("syntax error: {e}"))?;

    let has_entry_point = ast
        .iter_functions()
        .any(|f| f.name == ENTRY_POINT && f.params.len() == 1);

    if !has_entry_point {
        return Err(format!("function must define {ENTRY_POINT}(payload)"));
    }

    Ok(ast)
}

/// Compile, call and convert. Errors are returned as messages; the caller
/// attaches the captured log.
fn execute(
    engine: &Engine,
    source: &str,
    payload: &Value,
    limits: &TransformLimits,
) -> Result<Value, String> {
    let ast = compile(engine, source)?;

    ensure_lossless(payload, &mut Vec::new())?;
    let argument =
        to_dynamic(payload).map_err(|e| format!("payload cannot be passed to function: {e}"))?;

    let mut scope = Scope::new();
    let returned = engine
        .call_fn::<Dynamic>(&mut scope, &ast, ENTRY_POINT, (argument,))
        .map_err(|e| describe_failure(&e, limits))?;

    ensure_representable(&returned)?;
    from_dynamic::<Value>(&returned)
        .map_err(|e| format!("function returned a value that is not JSON representable: {e}"))
}

fn describe_failure(err: &EvalAltResult, limits: &TransformLimits) -> String {
    match root_cause(err) {
        EvalAltResult::ErrorTerminated(..) => format!(
            "function exceeded its time budget of {}ms",
            limits.timeout.as_millis()
        ),
        EvalAltResult::ErrorTooManyOperations(..) => format!(
            "function exceeded its budget of {} operations",
            limits.max_operations
        ),
        EvalAltResult::ErrorStackOverflow(..) => format!(
            "function exceeded its call depth of {}",
            limits.max_call_levels
        ),
        EvalAltResult::ErrorDataTooLarge(what, _) => {
            format!("function exceeded its data budget: {what}")
        }
        cause => cause.to_string(),
    }
}

fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        other => other,
    }
}

/// Reject payload numbers the script could only see as a rounded float.
///
/// Rhai integers are `i64`, so unsigned values above `i64::MAX` are the only
/// JSON numbers without an exact script representation.
fn ensure_lossless(value: &Value, path: &mut Vec<String>) -> Result<(), String> {
    match value {
        Value::Number(n) if n.as_i64().is_none() && n.is_u64() => Err(format!(
            "payload number at {} ({n}) is too large to pass to the function without loss",
            if path.is_empty() { "$".to_string() } else { path.join(".") }
        )),
        Value::Array(items) => items.iter().enumerate().try_for_each(|(i, item)| {
            path.push(i.to_string());
            let checked = ensure_lossless(item, path);
            path.pop();
            checked
        }),
        Value::Object(map) => map.iter().try_for_each(|(key, item)| {
            path.push(key.clone());
            let checked = ensure_lossless(item, path);
            path.pop();
            checked
        }),
        _ => Ok(()),
    }
}

/// Reject values that have no faithful JSON form instead of coercing them.
fn ensure_representable(value: &Dynamic) -> Result<(), String> {
    if value.is::<rhai::FnPtr>() {
        return Err(
            "function returned a function pointer, which is not JSON representable".to_string(),
        );
    }

    if let Ok(number) = value.as_float() {
        if !number.is_finite() {
            return Err(format!("function returned a non-finite number ({number})"));
        }
        return Ok(());
    }

    if value.is::<rhai::Array>() {
        if let Ok(items) = value.clone().into_array() {
            for item in &items {
                ensure_representable(item)?;
            }
        }
        return Ok(());
    }

    if value.is::<rhai::Map>() {
        if let Some(map) = value.clone().try_cast::<rhai::Map>() {
            for item in map.values() {
                ensure_representable(item)?;
            }
        }
    }

    Ok(())
}
