//! Binary and unary operator semantics shared by both execution engines.

use crate::ast::{BinaryOp, UnaryOp};
use crate::interpreter::builtins::OpError;
use crate::interpreter::value::Value;

/// Apply a binary operator to two already-evaluated operands.
///
/// Integer arithmetic stays integral with one deliberate exception:
/// division of two integers always yields a decimal (10 / 4 is 2.5).
/// `and`/`or` here combine the truthiness of two evaluated operands; the
/// tree-walk interpreter short-circuits before reaching this function,
/// the VM never does.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, OpError> {
    match op {
        BinaryOp::Add => add(a, b),
        BinaryOp::Subtract => numeric(op, a, b, |x, y| x - y, |x, y| x - y),
        BinaryOp::Multiply => numeric(op, a, b, |x, y| x * y, |x, y| x * y),
        BinaryOp::Divide => divide(a, b),
        BinaryOp::Modulo => modulo(a, b),
        BinaryOp::Power => power(a, b),
        BinaryOp::Equal => Ok(Value::Bool(a.equals(b))),
        BinaryOp::NotEqual => Ok(Value::Bool(!a.equals(b))),
        BinaryOp::Less => ordering(op, a, b),
        BinaryOp::LessEqual => ordering(op, a, b),
        BinaryOp::Greater => ordering(op, a, b),
        BinaryOp::GreaterEqual => ordering(op, a, b),
        BinaryOp::And => Ok(Value::Bool(a.is_truthy() && b.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(a.is_truthy() || b.is_truthy())),
        BinaryOp::BitAnd => bitwise(op, a, b, |x, y| Ok(x & y)),
        BinaryOp::BitOr => bitwise(op, a, b, |x, y| Ok(x | y)),
        BinaryOp::BitXor => bitwise(op, a, b, |x, y| Ok(x ^ y)),
        BinaryOp::ShiftLeft => bitwise(op, a, b, shift_left),
        BinaryOp::ShiftRight => bitwise(op, a, b, shift_right),
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOp, v: &Value) -> Result<Value, OpError> {
    match (op, v) {
        (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnaryOp::Negate, Value::Decimal(n)) => Ok(Value::Decimal(-n)),
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (op, v) => Err(OpError::Type(format!(
            "cannot apply '{}' to {}",
            op,
            v.type_name()
        ))),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, OpError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
        (Value::Text(x), Value::Text(y)) => Ok(Value::Text(format!("{}{}", x, y))),
        _ => numeric(BinaryOp::Add, a, b, |x, y| x + y, |x, y| x + y),
    }
}

/// Int op Int stays Int, any decimal operand promotes to Decimal.
fn numeric(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> i64,
    dec_op: fn(f64, f64) -> f64,
) -> Result<Value, OpError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(*x, *y))),
        (Value::Int(x), Value::Decimal(y)) => Ok(Value::Decimal(dec_op(*x as f64, *y))),
        (Value::Decimal(x), Value::Int(y)) => Ok(Value::Decimal(dec_op(*x, *y as f64))),
        (Value::Decimal(x), Value::Decimal(y)) => Ok(Value::Decimal(dec_op(*x, *y))),
        _ => Err(type_mismatch(op, a, b)),
    }
}

/// Division always yields a decimal, even for two integer operands.
fn divide(a: &Value, b: &Value) -> Result<Value, OpError> {
    let (x, y) = both_numbers(BinaryOp::Divide, a, b)?;
    if y == 0.0 {
        return Err(OpError::DivisionByZero);
    }
    Ok(Value::Decimal(x / y))
}

fn modulo(a: &Value, b: &Value) -> Result<Value, OpError> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(OpError::DivisionByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x % y)),
        _ => {
            let (x, y) = both_numbers(BinaryOp::Modulo, a, b)?;
            if y == 0.0 {
                return Err(OpError::DivisionByZero);
            }
            Ok(Value::Decimal(x % y))
        }
    }
}

fn power(a: &Value, b: &Value) -> Result<Value, OpError> {
    match (a, b) {
        (Value::Int(base), Value::Int(exp)) if *exp >= 0 => {
            Ok(Value::Int(base.pow(*exp as u32)))
        }
        _ => {
            let (x, y) = both_numbers(BinaryOp::Power, a, b)?;
            Ok(Value::Decimal(x.powf(y)))
        }
    }
}

fn ordering(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, OpError> {
    let cmp = match (a, b) {
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => {
            let (x, y) = both_numbers(op, a, b)?;
            x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
        }
    };
    let result = match op {
        BinaryOp::Less => cmp == std::cmp::Ordering::Less,
        BinaryOp::LessEqual => cmp != std::cmp::Ordering::Greater,
        BinaryOp::Greater => cmp == std::cmp::Ordering::Greater,
        BinaryOp::GreaterEqual => cmp != std::cmp::Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn bitwise(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    f: fn(i64, i64) -> Result<i64, OpError>,
) -> Result<Value, OpError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => f(*x, *y).map(Value::Int),
        _ => Err(type_mismatch(op, a, b)),
    }
}

fn shift_left(x: i64, y: i64) -> Result<i64, OpError> {
    if !(0..64).contains(&y) {
        return Err(OpError::Type(format!("shift amount {} out of range", y)));
    }
    Ok(x << y)
}

fn shift_right(x: i64, y: i64) -> Result<i64, OpError> {
    if !(0..64).contains(&y) {
        return Err(OpError::Type(format!("shift amount {} out of range", y)));
    }
    Ok(x >> y)
}

fn both_numbers(op: BinaryOp, a: &Value, b: &Value) -> Result<(f64, f64), OpError> {
    let x = match a {
        Value::Int(n) => *n as f64,
        Value::Decimal(n) => *n,
        _ => return Err(type_mismatch(op, a, b)),
    };
    let y = match b {
        Value::Int(n) => *n as f64,
        Value::Decimal(n) => *n,
        _ => return Err(type_mismatch(op, a, b)),
    };
    Ok((x, y))
}

fn type_mismatch(op: BinaryOp, a: &Value, b: &Value) -> OpError {
    OpError::Type(format!(
        "cannot apply '{}' to {} and {}",
        op,
        a.type_name(),
        b.type_name()
    ))
}
