//! Per-packet derived-value evaluation.
//!
//! A [`PacketScope`] is built once per packet from the dictionary's
//! `constants` and `functions`. Expressions are parsed into a small typed AST
//! and interpreted; nothing is ever compiled or executed as source text, and
//! a scope cannot see anything outside its own packet.
//!
//! Evaluation never fails loudly: any parse or runtime error makes
//! [`PacketScope::evaluate`] return `None`.
//!
//! ```rust
//! use downlink::scope::PacketScope;
//! use downlink::types::{FieldValues, Value};
//!
//! let scope = PacketScope::default();
//! let raw = FieldValues::from([("x".to_string(), Value::Int(7))]);
//! assert_eq!(scope.evaluate("5 <= x < 10", &raw), Some(Value::Bool(true)));
//! assert_eq!(scope.evaluate("5 <= y < 10", &raw), None);
//! ```

mod ast;
mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::types::{FieldValues, Value};
use crate::{DownlinkError, Result};
pub use ast::{BinaryOp, Expr, Function, FunctionBodyExpr, UnaryOp};
use eval::Evaluator;

/// Internal evaluation failure. Never escapes [`PacketScope`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub(crate) enum EvalError {
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("{0} is not callable")]
    NotCallable(String),
    #[error("unbound identifier '{0}'")]
    Unbound(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("recursion limit exceeded")]
    RecursionLimit,
    #[error("invalid function signature '{0}'")]
    InvalidSignature(String),
}

/// A function body as written in a dictionary: one expression, or a map of
/// guard expression to result expression tried in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionBody {
    Guarded(IndexMap<String, Value>),
    Expression(Value),
}

/// Fenced evaluation context for one packet.
#[derive(Debug, Clone, Default)]
pub struct PacketScope {
    constants: HashMap<String, Value>,
    functions: HashMap<String, Function>,
}

impl PacketScope {
    /// Compile `functions`, then evaluate `constants` in order.
    ///
    /// Functions that fail to parse are dropped. A string constant that does
    /// not evaluate as an expression is kept as a literal string.
    pub fn new(constants: &IndexMap<String, Value>, functions: &IndexMap<String, FunctionBody>) -> Self {
        let mut scope = Self::default();

        for (signature, body) in functions {
            match compile_function(signature, body) {
                Ok(function) => {
                    scope.functions.insert(function.name.clone(), function);
                }
                Err(e) => warn!(signature = %signature, error = %e, "dropping function that does not compile"),
            }
        }

        let empty = FieldValues::new();
        for (name, literal) in constants {
            let value = match literal {
                Value::Str(text) => parser::parse(text)
                    .and_then(|expr| scope.evaluator(&empty).eval(&expr))
                    .unwrap_or_else(|e| {
                        trace!(constant = %name, error = %e, "constant kept as literal string");
                        literal.clone()
                    }),
                other => other.clone(),
            };
            scope.constants.insert(name.clone(), value);
        }

        scope
    }

    /// Parse an expression for repeated evaluation.
    pub fn compile(expression: &str) -> Result<Expr> {
        parser::parse(expression)
            .map_err(|e| DownlinkError::expression_error(expression, e.to_string()))
    }

    /// Parse and evaluate `expression` against `raw`.
    pub fn evaluate(&self, expression: &str, raw: &FieldValues) -> Option<Value> {
        match parser::parse(expression) {
            Ok(expr) => self.evaluate_expr(&expr, raw),
            Err(e) => {
                trace!(expression, error = %e, "expression does not parse");
                None
            }
        }
    }

    pub fn evaluate_expr(&self, expr: &Expr, raw: &FieldValues) -> Option<Value> {
        self.evaluator(raw)
            .eval(expr)
            .inspect_err(|e| trace!(error = %e, "evaluation failed"))
            .ok()
    }

    /// Invoke a declared function (or builtin) by name.
    pub fn call(&self, name: &str, args: Vec<Value>, raw: &FieldValues) -> Option<Value> {
        self.evaluator(raw)
            .call(name, args)
            .inspect_err(|e| trace!(function = name, error = %e, "call failed"))
            .ok()
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    fn evaluator<'a>(&'a self, raw: &'a FieldValues) -> Evaluator<'a> {
        Evaluator { constants: &self.constants, functions: &self.functions, raw }
    }
}

fn literal_or_expression(value: &Value) -> std::result::Result<Expr, EvalError> {
    match value {
        Value::Str(text) => parser::parse(text),
        other => Ok(Expr::Literal(other.clone())),
    }
}

/// `name(a, b)` or a bare `name`.
fn parse_signature(signature: &str) -> std::result::Result<(String, Vec<String>), EvalError> {
    let invalid = || EvalError::InvalidSignature(signature.to_string());
    let is_ident = |s: &str| {
        let mut chars = s.chars();
        chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    };

    let signature = signature.trim();
    let (name, params) = match signature.split_once('(') {
        Some((name, rest)) => {
            let params = rest.trim_end().strip_suffix(')').ok_or_else(invalid)?;
            let params: Vec<String> = params
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            (name.trim(), params)
        }
        None => (signature, Vec::new()),
    };

    if !is_ident(name) || !params.iter().all(|p| is_ident(p)) {
        return Err(invalid());
    }
    Ok((name.to_string(), params))
}

fn compile_function(signature: &str, body: &FunctionBody) -> std::result::Result<Function, EvalError> {
    let (name, params) = parse_signature(signature)?;
    let body = match body {
        FunctionBody::Expression(expr) => FunctionBodyExpr::Expression(literal_or_expression(expr)?),
        FunctionBody::Guarded(guards) => FunctionBodyExpr::Guarded(
            guards
                .iter()
                .map(|(guard, result)| Ok((parser::parse(guard)?, literal_or_expression(result)?)))
                .collect::<std::result::Result<Vec<_>, EvalError>>()?,
        ),
    };
    Ok(Function { name, params, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> PacketScope {
        let constants: IndexMap<String, Value> = serde_json::from_str(
            r#"{"GAIN": 2, "OFFSET": "GAIN * 10", "LABEL": "NOMINAL", "HALF": "scale(GAIN)"}"#,
        )
        .unwrap();
        let functions: IndexMap<String, FunctionBody> = serde_json::from_str(
            r#"{
                "scale(x)": "x * 0.5",
                "state(v)": {"v < 0": "'NEG'", "0 <= v < 10": "'LOW'", "v >= 10": "'HIGH'"},
                "broken(": "1",
                "volts()": "raw.counts * GAIN + OFFSET"
            }"#,
        )
        .unwrap();
        PacketScope::new(&constants, &functions)
    }

    #[test]
    fn constants_evaluate_in_order() {
        let s = scope();
        assert_eq!(s.constant("GAIN"), Some(&Value::Int(2)));
        assert_eq!(s.constant("OFFSET"), Some(&Value::Int(20)));
        assert_eq!(s.constant("LABEL"), Some(&Value::Str("NOMINAL".into())));
        assert_eq!(s.constant("HALF"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn functions_see_constants_and_raw_fields() {
        let s = scope();
        let raw = FieldValues::from([("counts".to_string(), Value::UInt(5))]);
        assert_eq!(s.evaluate("volts()", &raw), Some(Value::Int(30)));
        assert_eq!(s.evaluate("state(counts)", &raw), Some(Value::Str("LOW".into())));
        assert_eq!(s.call("state", vec![Value::Int(12)], &raw), Some(Value::Str("HIGH".into())));
        assert!(s.function("broken").is_none());
    }

    #[test]
    fn interval_guard_does_not_raise() {
        let s = PacketScope::default();
        let at = |x: i64| FieldValues::from([("x".to_string(), Value::Int(x))]);
        assert_eq!(s.evaluate("5 <= x < 10", &at(7)), Some(Value::Bool(true)));
        assert_eq!(s.evaluate("5 <= x < 10", &at(12)), Some(Value::Bool(false)));
        assert_eq!(s.evaluate("0 <= x != 5", &at(5)), Some(Value::Bool(false)));
        assert_eq!(s.evaluate("0 <= x != 5", &at(6)), Some(Value::Bool(true)));
    }

    #[test]
    fn very_long_chains_yield_none() {
        let s = PacketScope::default();
        assert_eq!(s.evaluate(&vec!["1"; 10_000].join(" + "), &FieldValues::new()), None);
        assert_eq!(s.evaluate(&vec!["1"; 50].join(" + "), &FieldValues::new()), Some(Value::Int(50)));
    }

    #[test]
    fn failures_yield_none() {
        let s = scope();
        let raw = FieldValues::new();
        assert_eq!(s.evaluate("volts()", &raw), None);
        assert_eq!(s.evaluate("1 +", &raw), None);
        assert_eq!(s.evaluate("undefined_fn(2)", &raw), None);
        assert!(PacketScope::compile("1 +").is_err());
    }

    #[test]
    fn signatures_parse() {
        assert_eq!(parse_signature("f(a, b)").unwrap(), ("f".into(), vec!["a".into(), "b".into()]));
        assert_eq!(parse_signature("g()").unwrap(), ("g".into(), vec![]));
        assert_eq!(parse_signature("h").unwrap(), ("h".into(), vec![]));
        assert!(parse_signature("1f(x)").is_err());
        assert!(parse_signature("f(x").is_err());
    }
}
