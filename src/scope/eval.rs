//! Tree-walking interpreter
//!
//! Identifiers resolve through function parameters, then packet constants,
//! then the raw field values of the packet being evaluated. Arithmetic stays
//! in `i64` while both operands are integers and falls back to `f64`
//! otherwise; bitwise operators truncate to `i64`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter;

use super::EvalError;
use super::ast::{BinaryOp, Expr, Function, FunctionBodyExpr, UnaryOp};
use crate::types::{FieldValues, Value};

/// Call depth limit for dictionary-declared functions.
pub(crate) const MAX_CALL_DEPTH: usize = 64;

type Locals = HashMap<String, Value>;

pub(crate) struct Evaluator<'a> {
    pub(crate) constants: &'a HashMap<String, Value>,
    pub(crate) functions: &'a HashMap<String, Function>,
    pub(crate) raw: &'a FieldValues,
}

impl Evaluator<'_> {
    pub(crate) fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_in(expr, None, 0)
    }

    pub(crate) fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        match self.functions.get(name) {
            Some(function) => self.invoke(function, args, 1),
            None => builtin(name, &args),
        }
    }

    fn eval_in(&self, expr: &Expr, locals: Option<&Locals>, depth: usize) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval_in(item, locals, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Ident(name) => self.lookup(name, locals),
            Expr::Raw(field) => {
                self.raw.get(field).cloned().ok_or_else(|| EvalError::Unbound(format!("raw.{field}")))
            }
            Expr::Member(base, property) => {
                if **base == Expr::Ident("Math".into()) {
                    return math_constant(property)
                        .map(Value::Float)
                        .ok_or_else(|| EvalError::Unbound(format!("Math.{property}")));
                }
                match (self.eval_in(base, locals, depth)?, property.as_str()) {
                    (Value::Array(items), "length") => Ok(Value::Int(items.len() as i64)),
                    (Value::Str(s), "length") => Ok(Value::Int(s.chars().count() as i64)),
                    (_, property) => Err(EvalError::Unbound(property.to_string())),
                }
            }
            Expr::Index(base, index) => {
                let base = self.eval_in(base, locals, depth)?;
                let index = self.eval_in(index, locals, depth)?;
                let i = index
                    .as_i64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| EvalError::TypeMismatch(format!("index {index}")))?;
                match base {
                    Value::Array(items) => Ok(items.get(i).cloned().unwrap_or(Value::Null)),
                    Value::Str(s) => {
                        Ok(s.chars().nth(i).map_or(Value::Null, |c| Value::Str(c.to_string())))
                    }
                    other => Err(EvalError::TypeMismatch(format!("cannot index {other}"))),
                }
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_in(arg, locals, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                match self.functions.get(name) {
                    Some(function) => self.invoke(function, args, depth + 1),
                    None => builtin(name, &args),
                }
            }
            Expr::Unary(op, operand) => unary(*op, self.eval_in(operand, locals, depth)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_in(lhs, locals, depth)?;
                let rhs = self.eval_in(rhs, locals, depth)?;
                binary(*op, lhs, rhs)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval_in(lhs, locals, depth)?;
                if lhs.is_truthy() { self.eval_in(rhs, locals, depth) } else { Ok(lhs) }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval_in(lhs, locals, depth)?;
                if lhs.is_truthy() { Ok(lhs) } else { self.eval_in(rhs, locals, depth) }
            }
            Expr::Conditional(condition, then, otherwise) => {
                if self.eval_in(condition, locals, depth)?.is_truthy() {
                    self.eval_in(then, locals, depth)
                } else {
                    self.eval_in(otherwise, locals, depth)
                }
            }
        }
    }

    fn lookup(&self, name: &str, locals: Option<&Locals>) -> Result<Value, EvalError> {
        locals
            .and_then(|l| l.get(name))
            .or_else(|| self.constants.get(name))
            .or_else(|| self.raw.get(name))
            .cloned()
            .ok_or_else(|| EvalError::Unbound(name.to_string()))
    }

    fn invoke(&self, function: &Function, args: Vec<Value>, depth: usize) -> Result<Value, EvalError> {
        if depth > MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit);
        }

        // Missing arguments bind to null, extra ones are ignored
        let locals: Locals = function
            .params
            .iter()
            .cloned()
            .zip(args.into_iter().chain(iter::repeat(Value::Null)))
            .collect();

        match &function.body {
            FunctionBodyExpr::Expression(expr) => self.eval_in(expr, Some(&locals), depth),
            FunctionBodyExpr::Guarded(guards) => {
                for (guard, result) in guards {
                    if self.eval_in(guard, Some(&locals), depth)?.is_truthy() {
                        return self.eval_in(result, Some(&locals), depth);
                    }
                }
                Ok(Value::Null)
            }
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::BitNot => Ok(Value::Int(!to_int(&value)?)),
        UnaryOp::Plus => match value {
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => Ok(value),
            other => number(&other).map(Value::Float),
        },
        UnaryOp::Neg => match value {
            Value::Int(v) => Ok(v.checked_neg().map_or(Value::Float(-(v as f64)), Value::Int)),
            Value::UInt(v) => {
                Ok(i64::try_from(v).ok().map_or(Value::Float(-(v as f64)), |v| Value::Int(-v)))
            }
            other => number(&other).map(|v| Value::Float(-v)),
        },
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            let (a, b) = (to_int(&lhs)?, to_int(&rhs)?);
            Ok(Value::Int(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a.wrapping_shl((b & 63) as u32),
                _ => a.wrapping_shr((b & 63) as u32),
            }))
        }
        BinaryOp::Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => {
            Ok(Value::Str(format!("{lhs}{rhs}")))
        }
        _ => arithmetic(op, &lhs, &rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (integer(lhs), integer(rhs)) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Rem if b != 0 => a.checked_rem(b),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }

    let (a, b) = (number(lhs)?, number(rhs)?);
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Pow => a.powf(b),
        other => return Err(EvalError::TypeMismatch(format!("{other:?} is not arithmetic"))),
    }))
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => number(lhs)?.partial_cmp(&number(rhs)?),
    };
    // NaN compares false in every direction
    Ok(Value::Bool(ordering.is_some_and(|o| match op {
        BinaryOp::Lt => o == Ordering::Less,
        BinaryOp::Le => o != Ordering::Greater,
        BinaryOp::Gt => o == Ordering::Greater,
        _ => o != Ordering::Less,
    })))
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::UInt(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn number(value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| EvalError::TypeMismatch(format!("{value} is not a number")))
}

fn to_int(value: &Value) -> Result<i64, EvalError> {
    if let Some(v) = integer(value) {
        return Ok(v);
    }
    let v = number(value)?;
    if v.is_finite() {
        Ok(v.trunc() as i64)
    } else {
        Err(EvalError::TypeMismatch(format!("{v} is not an integer")))
    }
}

fn math_constant(name: &str) -> Option<f64> {
    use std::f64::consts;
    Some(match name {
        "PI" => consts::PI,
        "E" => consts::E,
        "LN2" => consts::LN_2,
        "LN10" => consts::LN_10,
        "LOG2E" => consts::LOG2_E,
        "LOG10E" => consts::LOG10_E,
        "SQRT2" => consts::SQRT_2,
        "SQRT1_2" => consts::FRAC_1_SQRT_2,
        _ => return None,
    })
}

fn builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arg = |i: usize| {
        args.get(i)
            .ok_or_else(|| EvalError::TypeMismatch(format!("{name} expects {} argument(s)", i + 1)))
            .and_then(number)
    };
    let float = |f: fn(f64) -> f64| arg(0).map(|x| Value::Float(f(x)));

    match name {
        "abs" => match args.first() {
            Some(Value::Int(v)) => Ok(v.checked_abs().map_or(Value::Float((*v as f64).abs()), Value::Int)),
            Some(Value::UInt(v)) => Ok(Value::UInt(*v)),
            _ => float(f64::abs),
        },
        "sqrt" => float(f64::sqrt),
        "cbrt" => float(f64::cbrt),
        "floor" => float(f64::floor),
        "ceil" => float(f64::ceil),
        "round" => float(f64::round),
        "trunc" => float(f64::trunc),
        "sign" => float(|x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        "exp" => float(f64::exp),
        "log" => float(f64::ln),
        "log2" => float(f64::log2),
        "log10" => float(f64::log10),
        "sin" => float(f64::sin),
        "cos" => float(f64::cos),
        "tan" => float(f64::tan),
        "asin" => float(f64::asin),
        "acos" => float(f64::acos),
        "atan" => float(f64::atan),
        "pow" => Ok(Value::Float(arg(0)?.powf(arg(1)?))),
        "atan2" => Ok(Value::Float(arg(0)?.atan2(arg(1)?))),
        "hypot" => Ok(Value::Float(arg(0)?.hypot(arg(1)?))),
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::TypeMismatch(format!("{name} expects arguments")));
            }
            let pick_min = name == "min";
            if let Some(ints) = args.iter().map(integer).collect::<Option<Vec<_>>>() {
                let best = if pick_min { ints.iter().min() } else { ints.iter().max() };
                return Ok(best.map_or(Value::Null, |v| Value::Int(*v)));
            }
            let values = args.iter().map(number).collect::<Result<Vec<_>, _>>()?;
            let init = if pick_min { f64::INFINITY } else { f64::NEG_INFINITY };
            Ok(Value::Float(values.into_iter().fold(init, |acc, v| {
                if pick_min { acc.min(v) } else { acc.max(v) }
            })))
        }
        "int" => args
            .first()
            .ok_or_else(|| EvalError::TypeMismatch("int expects 1 argument".into()))
            .and_then(to_int)
            .map(Value::Int),
        "float" => arg(0).map(Value::Float),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
