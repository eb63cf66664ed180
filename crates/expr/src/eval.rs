//! Tree-walking evaluator over `serde_json::Value`.
//!
//! Semantics are deliberately lenient where rule authors expect it:
//! missing fields evaluate to null, and ordering comparisons against
//! null are false instead of errors. Genuine type mismatches (adding a
//! bool, dividing strings) are errors.

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;
use crate::program::{Env, Helpers};

pub(crate) fn eval(expr: &Expr, env: &Env, helpers: &Helpers) -> Result<Value, ExprError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Float(f) => Ok(Value::from(*f)),
        Expr::Str(s) => Ok(Value::String(s.clone())),

        Expr::Ident { name, .. } => Ok(env.get(name).cloned().unwrap_or(Value::Null)),

        Expr::Field { base, field, .. } => {
            let base = eval(base, env, helpers)?;
            Ok(match base {
                Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
                // Field access on anything else yields null, not an error:
                // rules probe payload shapes they don't control.
                _ => Value::Null,
            })
        }

        Expr::Index { base, index, pos } => {
            let base = eval(base, env, helpers)?;
            let index = eval(index, env, helpers)?;
            match (&base, &index) {
                (Value::Object(map), Value::String(key)) => {
                    Ok(map.get(key).cloned().unwrap_or(Value::Null))
                }
                (Value::Array(items), idx) => {
                    let i = idx.as_i64().ok_or_else(|| {
                        ExprError::Type(format!("array index must be an integer (byte {pos})"))
                    })?;
                    let i = if i < 0 { items.len() as i64 + i } else { i };
                    Ok(items.get(i.max(0) as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Null, _) => Ok(Value::Null),
                _ => Err(ExprError::Type(format!(
                    "cannot index {} with {} (byte {pos})",
                    type_name(&base),
                    type_name(&index)
                ))),
            }
        }

        Expr::Call { name, args, .. } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, env, helpers)?);
            }
            helpers.call(name, &values)
        }

        Expr::Unary { op, operand, pos } => {
            let value = eval(operand, env, helpers)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match value {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Ok(Value::from(-i))
                        } else if let Some(f) = n.as_f64() {
                            Ok(Value::from(-f))
                        } else {
                            Err(ExprError::Type(format!("cannot negate {n} (byte {pos})")))
                        }
                    }
                    other => Err(ExprError::Type(format!(
                        "cannot negate {} (byte {pos})",
                        type_name(&other)
                    ))),
                },
            }
        }

        Expr::Binary { op, lhs, rhs, pos } => match op {
            // Short-circuiting boolean logic on truthiness.
            BinaryOp::And => {
                let l = eval(lhs, env, helpers)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = eval(rhs, env, helpers)?;
                Ok(Value::Bool(truthy(&r)))
            }
            BinaryOp::Or => {
                let l = eval(lhs, env, helpers)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = eval(rhs, env, helpers)?;
                Ok(Value::Bool(truthy(&r)))
            }

            BinaryOp::Eq => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                Ok(Value::Bool(loose_eq(&l, &r)))
            }
            BinaryOp::Ne => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                Ok(Value::Bool(!loose_eq(&l, &r)))
            }

            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                Ok(Value::Bool(compare(op, &l, &r)))
            }

            BinaryOp::In => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                contains_value(&r, &l).map(Value::Bool)
            }

            BinaryOp::Add => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                match (&l, &r) {
                    (Value::String(a), Value::String(b)) => {
                        Ok(Value::String(format!("{a}{b}")))
                    }
                    _ => arith(*op, &l, &r, *pos),
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let (l, r) = (eval(lhs, env, helpers)?, eval(rhs, env, helpers)?);
                arith(*op, &l, &r, *pos)
            }
        },
    }
}

// ── Value semantics ─────────────────────────────────────────────────

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truthiness: null/false/0/""/[]/{} are false, everything else true.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Equality with int/float coercion; otherwise deep JSON equality.
pub(crate) fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => l == r,
    }
}

/// Ordering comparison. Numbers and strings are ordered; comparisons
/// involving null (or mixed types) are false.
fn compare(op: &BinaryOp, l: &Value, r: &Value) -> bool {
    let ord = match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match ord {
        None => false,
        Some(ord) => match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::Le => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::Ge => ord.is_ge(),
            _ => unreachable!("compare called with non-ordering op"),
        },
    }
}

/// Membership for `in` and the `contains` helper.
///
/// - array: element equality
/// - string: substring
/// - object: key presence
pub(crate) fn contains_value(haystack: &Value, needle: &Value) -> Result<bool, ExprError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(ExprError::Type(format!(
                "cannot search a string for {}",
                type_name(other)
            ))),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(ExprError::Type(format!(
                "object membership needs a string key, got {}",
                type_name(other)
            ))),
        },
        Value::Null => Ok(false),
        other => Err(ExprError::Type(format!(
            "'in' expects array, string, or object, got {}",
            type_name(other)
        ))),
    }
}

/// Numeric arithmetic. Integers stay integral except for `/`, which
/// promotes to float unless it divides evenly.
fn arith(op: BinaryOp, l: &Value, r: &Value, pos: usize) -> Result<Value, ExprError> {
    let (a, b) = match (l, r) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        _ => {
            return Err(ExprError::Type(format!(
                "arithmetic needs numbers, got {} and {} (byte {pos})",
                type_name(l),
                type_name(r)
            )))
        }
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return match op {
            BinaryOp::Add => Ok(Value::from(x.wrapping_add(y))),
            BinaryOp::Sub => Ok(Value::from(x.wrapping_sub(y))),
            BinaryOp::Mul => Ok(Value::from(x.wrapping_mul(y))),
            BinaryOp::Div => {
                if y == 0 {
                    Err(ExprError::Type(format!("division by zero (byte {pos})")))
                } else if x % y == 0 {
                    Ok(Value::from(x / y))
                } else {
                    Ok(Value::from(x as f64 / y as f64))
                }
            }
            BinaryOp::Rem => {
                if y == 0 {
                    Err(ExprError::Type(format!("modulo by zero (byte {pos})")))
                } else {
                    Ok(Value::from(x % y))
                }
            }
            _ => unreachable!(),
        };
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ExprError::Type(format!(
                "non-finite numeric operands (byte {pos})"
            )))
        }
    };
    let out = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(ExprError::Type(format!("division by zero (byte {pos})")));
            }
            x / y
        }
        BinaryOp::Rem => {
            if y == 0.0 {
                return Err(ExprError::Type(format!("modulo by zero (byte {pos})")));
            }
            x % y
        }
        _ => unreachable!(),
    };
    Ok(Value::from(out))
}
