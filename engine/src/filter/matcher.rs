//! Filter schema compilation and evaluation.
//!
//! A schema is compiled once into a tree of conditions and then evaluated
//! against a candidate JSON document. See the module docs in `filter` for
//! the grammar.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::FilterError;

/// Evaluate `candidate` against `schema`.
///
/// A `null` or empty-object schema matches every candidate. With `strict`
/// set, a type mismatch between an expectation and the candidate value is
/// an error instead of a non-match.
pub fn matches(candidate: &Value, schema: &Value, strict: bool) -> Result<bool, FilterError> {
    CompiledFilter::compile(schema)?.evaluate(candidate, strict)
}

/// Same as [`matches`], over raw JSON text.
///
/// Empty or whitespace-only text is treated as `null`.
pub fn matches_str(candidate: &str, schema: &str, strict: bool) -> Result<bool, FilterError> {
    let candidate = parse_json(candidate)?;
    let schema = parse_json(schema)?;
    matches(&candidate, &schema, strict)
}

fn parse_json(raw: &str) -> Result<Value, FilterError> {
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(raw).map_err(|e| FilterError::MalformedJson(e.to_string()))
}

/// A schema compiled into an evaluable condition tree.
#[derive(Debug)]
pub struct CompiledFilter {
    root: Node,
}

#[derive(Debug)]
enum Node {
    All(Vec<Node>),
    Any(Vec<Node>),
    Condition { path: Vec<String>, ops: Vec<Op> },
}

#[derive(Debug)]
enum Op {
    Eq(Value),
    Neq(Value),
    Cmp(CmpOp, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exist(bool),
    Regex(Regex),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Gte => ordering != Ordering::Less,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Lte => ordering != Ordering::Greater,
        }
    }
}

impl CompiledFilter {
    /// Compile a schema, rejecting malformed operator usage.
    pub fn compile(schema: &Value) -> Result<Self, FilterError> {
        let root = match schema {
            Value::Null => Node::All(Vec::new()),
            Value::Object(map) => compile_object(map, &[])?,
            // A bare value constrains the whole candidate.
            other => Node::Condition {
                path: Vec::new(),
                ops: vec![Op::Eq(other.clone())],
            },
        };
        Ok(Self { root })
    }

    /// Evaluate the compiled schema against a candidate document.
    pub fn evaluate(&self, candidate: &Value, strict: bool) -> Result<bool, FilterError> {
        let matched = eval_node(&self.root, candidate, strict)?;
        debug!(matched, strict, "filter_evaluated");
        Ok(matched)
    }
}

// =============================================================================
// Compilation
// =============================================================================

fn compile_object(map: &Map<String, Value>, prefix: &[String]) -> Result<Node, FilterError> {
    let mut nodes = Vec::with_capacity(map.len());

    for (key, value) in map {
        match key.as_str() {
            "$and" => nodes.push(Node::All(compile_branches(key, value, prefix)?)),
            "$or" => {
                let branches = compile_branches(key, value, prefix)?;
                if branches.is_empty() {
                    return Err(FilterError::InvalidSchema(
                        "$or requires at least one branch".into(),
                    ));
                }
                nodes.push(Node::Any(branches));
            }
            k if k.starts_with('$') => {
                return Err(FilterError::InvalidSchema(format!(
                    "operator {k} must be applied to a field"
                )));
            }
            _ => {
                let mut path = prefix.to_vec();
                path.extend(split_path(key)?);
                nodes.push(compile_field(path, value)?);
            }
        }
    }

    Ok(Node::All(nodes))
}

fn compile_branches(key: &str, value: &Value, prefix: &[String]) -> Result<Vec<Node>, FilterError> {
    let branches = value
        .as_array()
        .ok_or_else(|| FilterError::InvalidSchema(format!("{key} expects an array of schemas")))?;

    branches
        .iter()
        .map(|branch| match branch {
            Value::Object(map) => compile_object(map, prefix),
            _ => Err(FilterError::InvalidSchema(format!(
                "{key} branches must be objects"
            ))),
        })
        .collect()
}

fn compile_field(path: Vec<String>, value: &Value) -> Result<Node, FilterError> {
    let map = match value {
        Value::Object(map) if !map.is_empty() => map,
        literal => {
            return Ok(Node::Condition {
                path,
                ops: vec![Op::Eq(literal.clone())],
            })
        }
    };

    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    let logical = map.keys().filter(|k| *k == "$and" || *k == "$or").count();

    if operators == 0 || operators == logical {
        // Plain nested object, possibly with $and/$or scoped to this prefix.
        return compile_object(map, &path);
    }

    if operators != map.len() || logical > 0 {
        return Err(FilterError::InvalidSchema(format!(
            "field {} mixes operators with nested fields",
            path.join(".")
        )));
    }

    let ops = map
        .iter()
        .map(|(op, operand)| compile_op(op, operand))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node::Condition { path, ops })
}

fn compile_op(op: &str, operand: &Value) -> Result<Op, FilterError> {
    let compiled = match op {
        "$eq" => Op::Eq(operand.clone()),
        "$neq" => Op::Neq(operand.clone()),
        "$gt" => Op::Cmp(CmpOp::Gt, ordered_operand(op, operand)?),
        "$gte" => Op::Cmp(CmpOp::Gte, ordered_operand(op, operand)?),
        "$lt" => Op::Cmp(CmpOp::Lt, ordered_operand(op, operand)?),
        "$lte" => Op::Cmp(CmpOp::Lte, ordered_operand(op, operand)?),
        "$in" => Op::In(array_operand(op, operand)?),
        "$nin" => Op::Nin(array_operand(op, operand)?),
        "$exist" => Op::Exist(
            operand
                .as_bool()
                .ok_or_else(|| FilterError::InvalidSchema("$exist expects a boolean".into()))?,
        ),
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| FilterError::InvalidSchema("$regex expects a string".into()))?;
            let re = Regex::new(pattern).map_err(|e| {
                FilterError::InvalidSchema(format!("$regex is not a valid pattern: {e}"))
            })?;
            Op::Regex(re)
        }
        other => {
            return Err(FilterError::InvalidSchema(format!("unknown operator {other}")));
        }
    };
    Ok(compiled)
}

fn ordered_operand(op: &str, operand: &Value) -> Result<Value, FilterError> {
    match operand {
        Value::Number(_) | Value::String(_) => Ok(operand.clone()),
        _ => Err(FilterError::InvalidSchema(format!(
            "{op} expects a number or a string"
        ))),
    }
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>, FilterError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| FilterError::InvalidSchema(format!("{op} expects an array")))
}

fn split_path(key: &str) -> Result<Vec<String>, FilterError> {
    let segments: Vec<String> = key.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(FilterError::InvalidSchema(format!("invalid field path {key:?}")));
    }
    Ok(segments)
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval_node(node: &Node, candidate: &Value, strict: bool) -> Result<bool, FilterError> {
    match node {
        Node::All(nodes) => {
            for node in nodes {
                if !eval_node(node, candidate, strict)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Node::Any(nodes) => {
            for node in nodes {
                if eval_node(node, candidate, strict)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Node::Condition { path, ops } => {
            let actual = lookup(candidate, path);
            for op in ops {
                if !eval_op(op, actual, path, strict)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

fn lookup<'a>(candidate: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(candidate, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn eval_op(
    op: &Op,
    actual: Option<&Value>,
    path: &[String],
    strict: bool,
) -> Result<bool, FilterError> {
    let Some(actual) = actual else {
        return Ok(matches!(op, Op::Neq(_) | Op::Nin(_) | Op::Exist(false)));
    };

    match op {
        Op::Exist(expected) => Ok(*expected),
        Op::Eq(expected) => equals(actual, expected, path, strict),
        Op::Neq(expected) => {
            if !actual.is_array() && is_mismatch(actual, expected) {
                return mismatch(path, expected, actual, strict);
            }
            Ok(!equals(actual, expected, path, strict)?)
        }
        Op::Cmp(cmp, expected) => match actual {
            Value::Null => Ok(false),
            Value::Array(items) => Ok(items
                .iter()
                .any(|item| compare(item, expected).is_some_and(|o| cmp.holds(o)))),
            _ => match compare(actual, expected) {
                Some(ordering) => Ok(cmp.holds(ordering)),
                None => mismatch(path, expected, actual, strict),
            },
        },
        Op::In(set) => {
            if let Some(expected) = set_mismatch(actual, set) {
                return mismatch(path, expected, actual, strict);
            }
            Ok(contained_in(actual, set))
        }
        Op::Nin(set) => {
            if let Some(expected) = set_mismatch(actual, set) {
                return mismatch(path, expected, actual, strict);
            }
            Ok(!contained_in(actual, set))
        }
        Op::Regex(re) => match actual {
            Value::String(s) => Ok(re.is_match(s)),
            Value::Array(items) => Ok(items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| re.is_match(s)))),
            Value::Null => Ok(false),
            _ => mismatch(path, &Value::String(String::new()), actual, strict),
        },
    }
}

fn equals(
    actual: &Value,
    expected: &Value,
    path: &[String],
    strict: bool,
) -> Result<bool, FilterError> {
    if let (Value::Array(items), false) = (actual, expected.is_array()) {
        return Ok(items.iter().any(|item| json_eq(item, expected)));
    }
    if is_mismatch(actual, expected) {
        return mismatch(path, expected, actual, strict);
    }
    Ok(json_eq(actual, expected))
}

fn contained_in(actual: &Value, set: &[Value]) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| set.iter().any(|v| json_eq(item, v))),
        _ => set.iter().any(|v| json_eq(actual, v)),
    }
}

/// First typed member of `set` when a scalar candidate shares no kind with it.
fn set_mismatch<'a>(actual: &Value, set: &'a [Value]) -> Option<&'a Value> {
    if actual.is_null() || actual.is_array() {
        return None;
    }
    let first = set.iter().find(|v| !v.is_null())?;
    let comparable = set.iter().any(|v| kind(v) == kind(actual));
    (!comparable).then_some(first)
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

fn is_mismatch(actual: &Value, expected: &Value) -> bool {
    !actual.is_null() && !expected.is_null() && kind(actual) != kind(expected)
}

fn mismatch(
    path: &[String],
    expected: &Value,
    actual: &Value,
    strict: bool,
) -> Result<bool, FilterError> {
    if strict {
        return Err(FilterError::TypeMismatch {
            path: display_path(path),
            expected: kind(expected),
            found: kind(actual),
        });
    }
    Ok(false)
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.join(".")
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
