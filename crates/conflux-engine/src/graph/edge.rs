use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An edge connecting two nodes in a workflow graph.
///
/// Edges out of the same node are tried in declaration order; the first
/// whose guard evaluates true is taken. Never "most specific", never
/// "all matching".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Guard that must be true to take this edge.
    #[serde(default)]
    pub guard: Guard,
}

/// Boolean predicate over the run context used to select an edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Guard {
    /// Always take this edge.
    #[default]
    Always,
    /// Take this edge if a context expression matches.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`,
    /// `key > number`, `key < number`.
    Expr { expr: String },
}

impl Guard {
    /// The parsed predicate, or None for `Always`. Expressions are checked
    /// at publish time, so parsing here only fails on unvalidated graphs.
    pub fn predicate(&self) -> Option<Predicate> {
        match self {
            Guard::Always => None,
            Guard::Expr { expr } => parse_expr(expr).ok(),
        }
    }
}

impl EdgeSpec {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: Guard::Always,
        }
    }

    /// Create a guarded edge.
    pub fn guarded(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: Guard::Expr { expr: expr.into() },
        }
    }
}

/// A parsed guard expression: `key OP operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub key: String,
    op: Op,
    operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    Ne,
    Contains,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Str(String),
    Num(f64),
    Bool(bool),
}

/// Parse `key OP operand` expressions. Returns a description of the
/// problem on failure, collected into `GraphInvalid` at publish time.
pub fn parse_expr(expr: &str) -> Result<Predicate, String> {
    let expr = expr.trim();
    for (token, op) in [
        ("contains", Op::Contains),
        ("!=", Op::Ne),
        ("==", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some((key, raw)) = split_operator(expr, token) {
            if key.is_empty() {
                return Err(format!("guard '{}' has no key", expr));
            }
            let operand = parse_operand(raw);
            if matches!(op, Op::Gt | Op::Lt) && !matches!(operand, Operand::Num(_)) {
                return Err(format!("guard '{}' compares against a non-number", expr));
            }
            return Ok(Predicate {
                key: key.to_string(),
                op,
                operand,
            });
        }
    }
    Err(format!("unparseable guard expression '{}'", expr))
}

fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let parts: Vec<&str> = expr.splitn(2, op).collect();
    if parts.len() != 2 {
        return None;
    }
    Some((parts[0].trim(), parts[1].trim()))
}

fn parse_operand(raw: &str) -> Operand {
    if let Some(stripped) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Operand::Str(stripped.to_string());
    }
    if raw == "true" {
        return Operand::Bool(true);
    }
    if raw == "false" {
        return Operand::Bool(false);
    }
    match raw.parse::<f64>() {
        Ok(n) => Operand::Num(n),
        Err(_) => Operand::Str(raw.to_string()),
    }
}

impl Predicate {
    /// Evaluate against the value stored under `self.key`.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self.op {
            Op::Eq => self.operand_equals(value),
            Op::Ne => !self.operand_equals(value),
            Op::Contains => match (&self.operand, value) {
                (Operand::Str(s), serde_json::Value::String(text)) => text.contains(s.as_str()),
                (operand, serde_json::Value::Array(items)) => {
                    items.iter().any(|item| operand_matches_value(operand, item))
                }
                _ => false,
            },
            Op::Gt => match (&self.operand, value.as_f64()) {
                (Operand::Num(n), Some(v)) => v > *n,
                _ => false,
            },
            Op::Lt => match (&self.operand, value.as_f64()) {
                (Operand::Num(n), Some(v)) => v < *n,
                _ => false,
            },
        }
    }

    fn operand_equals(&self, value: &serde_json::Value) -> bool {
        operand_matches_value(&self.operand, value)
    }

    /// Evaluate against a full context map, treating a missing key as no
    /// match. The engine separately raises `MappingError` for missing
    /// guard keys before routing, so this path only runs with the key
    /// present.
    pub fn matches_context(&self, context: &HashMap<String, serde_json::Value>) -> bool {
        context.get(&self.key).is_some_and(|v| self.matches(v))
    }
}

fn operand_matches_value(operand: &Operand, value: &serde_json::Value) -> bool {
    match operand {
        Operand::Str(s) => value.as_str() == Some(s.as_str()),
        Operand::Num(n) => value.as_f64() == Some(*n),
        Operand::Bool(b) => value.as_bool() == Some(*b),
    }
}
