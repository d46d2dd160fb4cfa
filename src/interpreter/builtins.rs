//! Built-in function table and polymorphic property operations.
//!
//! Both execution engines dispatch into this module: the tree-walking
//! interpreter calls these directly, and the bytecode VM wraps them behind
//! its CALL and property-access instructions. Built-in names are reserved —
//! a user function sharing a built-in's name is unreachable.
//!
//! Pair results exist for the string pop combinators, which must hand back
//! both the rebound remainder and the popped character. The VM pushes both
//! values; the interpreter's calls produce one value, so it keeps the
//! popped element there.

use crate::interpreter::value::{HashKey, Value};

/// Failures raised by built-in operations, mapped by each engine onto its
/// own error type.
#[derive(Debug)]
pub enum OpError {
    Type(String),
    Index { index: i64, length: usize },
    KeyNotFound(String),
    DivisionByZero,
    UnknownCast(String),
}

impl OpError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }
}

/// Result of a built-in call: most push one value, string pops push two.
pub enum BuiltinResult {
    One(Value),
    Pair(Value, Value),
}

type BuiltinFn = fn(Vec<Value>) -> Result<BuiltinResult, OpError>;

/// A fixed-arity native operation reachable by name from CALL.
pub struct BuiltinDef {
    pub name: &'static str,
    pub arity: usize,
    pub func: BuiltinFn,
}

/// The comparator-driven sort is resolved by name but re-enters the engine
/// to call the user comparator, so each engine special-cases it before
/// consulting the table.
pub const SORT_BY: &str = "SortBy";

/// Look up a built-in by name. Returns None for unknown names (which then
/// resolve as user functions).
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|b| b.name == name)
}

static BUILTINS: &[BuiltinDef] = &[
    // Conversion
    BuiltinDef { name: "Char", arity: 1, func: builtin_char },
    BuiltinDef { name: "Ascii", arity: 1, func: builtin_ascii },
    BuiltinDef { name: "Integer", arity: 1, func: builtin_integer },
    BuiltinDef { name: "Decimal", arity: 1, func: builtin_decimal },
    BuiltinDef { name: "UInteger", arity: 1, func: builtin_uinteger },
    BuiltinDef { name: "String", arity: 1, func: builtin_string },
    BuiltinDef { name: "Boolean", arity: 1, func: builtin_boolean },
    // Inspection
    BuiltinDef { name: "Length", arity: 1, func: builtin_length },
    BuiltinDef { name: "TypeOf", arity: 1, func: builtin_typeof },
    // Array/string editing
    BuiltinDef { name: "Insert", arity: 3, func: builtin_insert },
    BuiltinDef { name: "Append", arity: 2, func: builtin_append },
    BuiltinDef { name: "PushFront", arity: 2, func: builtin_push_front },
    BuiltinDef { name: "PushBack", arity: 2, func: builtin_push_back },
    BuiltinDef { name: "PopFront", arity: 1, func: builtin_pop_front },
    BuiltinDef { name: "PopBack", arity: 1, func: builtin_pop_back },
    BuiltinDef { name: "RemoveAt", arity: 2, func: builtin_remove_at },
    BuiltinDef { name: "CharAt", arity: 2, func: builtin_char_at },
    BuiltinDef { name: "SetAt", arity: 3, func: builtin_set_at },
    BuiltinDef { name: "Clear", arity: 1, func: builtin_clear },
    BuiltinDef { name: "Sort", arity: 1, func: builtin_sort },
    BuiltinDef { name: SORT_BY, arity: 2, func: builtin_sort_by_stub },
    BuiltinDef { name: "HashRemove", arity: 2, func: builtin_hash_remove },
    BuiltinDef { name: "Slice", arity: 4, func: builtin_slice },
    // Formatting
    BuiltinDef { name: "Format", arity: 2, func: builtin_format },
    BuiltinDef { name: "Format2", arity: 3, func: builtin_format2 },
    // Math
    BuiltinDef { name: "Sin", arity: 1, func: builtin_sin },
    BuiltinDef { name: "Cos", arity: 1, func: builtin_cos },
    BuiltinDef { name: "Tan", arity: 1, func: builtin_tan },
    BuiltinDef { name: "Asin", arity: 1, func: builtin_asin },
    BuiltinDef { name: "Acos", arity: 1, func: builtin_acos },
    BuiltinDef { name: "Atan", arity: 1, func: builtin_atan },
    BuiltinDef { name: "Exp", arity: 1, func: builtin_exp },
    BuiltinDef { name: "Log", arity: 1, func: builtin_log },
    BuiltinDef { name: "Log2", arity: 1, func: builtin_log2 },
    BuiltinDef { name: "Log10", arity: 1, func: builtin_log10 },
    BuiltinDef { name: "Sqrt", arity: 1, func: builtin_sqrt },
    BuiltinDef { name: "Pow", arity: 2, func: builtin_pow },
    BuiltinDef { name: "Floor", arity: 1, func: builtin_floor },
    BuiltinDef { name: "Ceil", arity: 1, func: builtin_ceil },
    BuiltinDef { name: "Round", arity: 1, func: builtin_round },
    BuiltinDef { name: "Trunc", arity: 1, func: builtin_trunc },
    BuiltinDef { name: "Abs", arity: 1, func: builtin_abs },
    BuiltinDef { name: "Pi", arity: 0, func: builtin_pi },
    BuiltinDef { name: "Euler", arity: 0, func: builtin_euler },
];

// ===== Property access =====

/// The property operations that mutate their receiver in place and whose
/// compiled form stores the result back into the receiver's binding.
pub fn is_mutating_property(op: &str) -> bool {
    matches!(
        op,
        "PushBack" | "PushFront" | "PopBack" | "PopFront" | "Insert" | "Remove" | "Clear" | "Add"
    )
}

/// Receiver-polymorphic property access: dispatches on the runtime type of
/// the receiver. Array and Hash mutate the shared value in place and return
/// the receiver; Text never mutates — its operations return a new string
/// for the caller to rebind.
pub fn property_access(receiver: &Value, op: &str, args: &[Value]) -> Result<Value, OpError> {
    match receiver {
        Value::Array(_) => array_property(receiver, op, args),
        Value::Text(s) => text_property(s, op, args),
        Value::Hash(_) => hash_property(receiver, op, args),
        other => Err(OpError::Type(format!(
            "'{}' is not supported on {}",
            op,
            other.type_name()
        ))),
    }
}

fn expect_args(op: &str, args: &[Value], expected: usize) -> Result<(), OpError> {
    if args.len() != expected {
        Err(OpError::Type(format!(
            "'{}' expects {} argument(s), got {}",
            op,
            expected,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn array_property(receiver: &Value, op: &str, args: &[Value]) -> Result<Value, OpError> {
    let Value::Array(cell) = receiver else {
        unreachable!()
    };
    match op {
        "PushBack" => {
            expect_args(op, args, 1)?;
            cell.borrow_mut().push(args[0].clone());
            Ok(receiver.clone())
        }
        "PushFront" => {
            expect_args(op, args, 1)?;
            cell.borrow_mut().insert(0, args[0].clone());
            Ok(receiver.clone())
        }
        "PopBack" => {
            expect_args(op, args, 0)?;
            let mut values = cell.borrow_mut();
            if values.pop().is_none() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            drop(values);
            Ok(receiver.clone())
        }
        "PopFront" => {
            expect_args(op, args, 0)?;
            let mut values = cell.borrow_mut();
            if values.is_empty() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            values.remove(0);
            drop(values);
            Ok(receiver.clone())
        }
        "Insert" => {
            expect_args(op, args, 2)?;
            let index = expect_index(&args[0])?;
            let mut values = cell.borrow_mut();
            if index < 0 || index as usize > values.len() {
                return Err(OpError::Index {
                    index,
                    length: values.len(),
                });
            }
            values.insert(index as usize, args[1].clone());
            drop(values);
            Ok(receiver.clone())
        }
        "Remove" => {
            expect_args(op, args, 1)?;
            let index = expect_index(&args[0])?;
            let mut values = cell.borrow_mut();
            if index < 0 || index as usize >= values.len() {
                return Err(OpError::Index {
                    index,
                    length: values.len(),
                });
            }
            values.remove(index as usize);
            drop(values);
            Ok(receiver.clone())
        }
        "Clear" => {
            expect_args(op, args, 0)?;
            cell.borrow_mut().clear();
            Ok(receiver.clone())
        }
        "Length" => {
            expect_args(op, args, 0)?;
            Ok(Value::Int(cell.borrow().len() as i64))
        }
        "Contains" => {
            expect_args(op, args, 1)?;
            let found = cell.borrow().iter().any(|v| v.equals(&args[0]));
            Ok(Value::Bool(found))
        }
        "Slice" => {
            expect_args(op, args, 3)?;
            slice_value(receiver, &args[0], &args[1], &args[2])
        }
        _ => Err(OpError::Type(format!(
            "'{}' is not supported on array",
            op
        ))),
    }
}

fn text_property(s: &str, op: &str, args: &[Value]) -> Result<Value, OpError> {
    let chars: Vec<char> = s.chars().collect();
    match op {
        "PushBack" => {
            expect_args(op, args, 1)?;
            let suffix = expect_text(&args[0])?;
            Ok(Value::Text(format!("{}{}", s, suffix)))
        }
        "PushFront" => {
            expect_args(op, args, 1)?;
            let prefix = expect_text(&args[0])?;
            Ok(Value::Text(format!("{}{}", prefix, s)))
        }
        "PopBack" => {
            expect_args(op, args, 0)?;
            if chars.is_empty() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            Ok(Value::Text(chars[..chars.len() - 1].iter().collect()))
        }
        "PopFront" => {
            expect_args(op, args, 0)?;
            if chars.is_empty() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            Ok(Value::Text(chars[1..].iter().collect()))
        }
        "Insert" => {
            expect_args(op, args, 2)?;
            let index = expect_index(&args[0])?;
            let insert = expect_text(&args[1])?;
            if index < 0 || index as usize > chars.len() {
                return Err(OpError::Index {
                    index,
                    length: chars.len(),
                });
            }
            let mut out: String = chars[..index as usize].iter().collect();
            out.push_str(insert);
            out.extend(&chars[index as usize..]);
            Ok(Value::Text(out))
        }
        "Remove" => {
            expect_args(op, args, 1)?;
            let index = expect_index(&args[0])?;
            if index < 0 || index as usize >= chars.len() {
                return Err(OpError::Index {
                    index,
                    length: chars.len(),
                });
            }
            let mut out = String::with_capacity(s.len());
            for (i, c) in chars.iter().enumerate() {
                if i != index as usize {
                    out.push(*c);
                }
            }
            Ok(Value::Text(out))
        }
        "Clear" => {
            expect_args(op, args, 0)?;
            Ok(Value::Text(String::new()))
        }
        "Length" => {
            expect_args(op, args, 0)?;
            Ok(Value::Int(chars.len() as i64))
        }
        "Contains" => {
            expect_args(op, args, 1)?;
            let needle = expect_text(&args[0])?;
            Ok(Value::Bool(s.contains(needle)))
        }
        "Slice" => {
            expect_args(op, args, 3)?;
            slice_value(&Value::Text(s.to_string()), &args[0], &args[1], &args[2])
        }
        _ => Err(OpError::Type(format!(
            "'{}' is not supported on string",
            op
        ))),
    }
}

fn hash_property(receiver: &Value, op: &str, args: &[Value]) -> Result<Value, OpError> {
    let Value::Hash(cell) = receiver else {
        unreachable!()
    };
    match op {
        "Add" => {
            expect_args(op, args, 2)?;
            let key = expect_key(&args[0])?;
            cell.borrow_mut().insert(key, args[1].clone());
            Ok(receiver.clone())
        }
        "Remove" => {
            expect_args(op, args, 1)?;
            let key = expect_key(&args[0])?;
            if cell.borrow_mut().shift_remove(&key).is_none() {
                return Err(OpError::KeyNotFound(key.to_string()));
            }
            Ok(receiver.clone())
        }
        "Clear" => {
            expect_args(op, args, 0)?;
            cell.borrow_mut().clear();
            Ok(receiver.clone())
        }
        "Keys" => {
            expect_args(op, args, 0)?;
            let keys = cell.borrow().keys().map(|k| k.to_value()).collect();
            Ok(Value::array(keys))
        }
        "Values" => {
            expect_args(op, args, 0)?;
            let values = cell.borrow().values().cloned().collect();
            Ok(Value::array(values))
        }
        "Contains" => {
            expect_args(op, args, 1)?;
            let key = expect_key(&args[0])?;
            Ok(Value::Bool(cell.borrow().contains_key(&key)))
        }
        "Length" => {
            expect_args(op, args, 0)?;
            Ok(Value::Int(cell.borrow().len() as i64))
        }
        _ => Err(OpError::Type(format!("'{}' is not supported on hash", op))),
    }
}

/// Operand count for each property operation; the compiled form needs this
/// to know how many stack slots an access consumes.
pub fn property_arity(op: &str) -> Option<usize> {
    match op {
        "PopBack" | "PopFront" | "Clear" | "Length" | "Keys" | "Values" => Some(0),
        "PushBack" | "PushFront" | "Remove" | "Contains" => Some(1),
        "Insert" | "Add" => Some(2),
        "Slice" => Some(3),
        _ => None,
    }
}

// ===== Indexing =====

/// Read `object[index]` for arrays, strings and hashes.
pub fn index_get(object: &Value, index: &Value) -> Result<Value, OpError> {
    match object {
        Value::Array(cell) => {
            let values = cell.borrow();
            let i = expect_index(index)?;
            if i < 0 || i as usize >= values.len() {
                return Err(OpError::Index {
                    index: i,
                    length: values.len(),
                });
            }
            Ok(values[i as usize].clone())
        }
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = expect_index(index)?;
            if i < 0 || i as usize >= chars.len() {
                return Err(OpError::Index {
                    index: i,
                    length: chars.len(),
                });
            }
            Ok(Value::Text(chars[i as usize].to_string()))
        }
        Value::Hash(cell) => {
            let key = expect_key(index)?;
            cell.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| OpError::KeyNotFound(key.to_string()))
        }
        other => Err(OpError::Type(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}

/// Write `object[index] = value` for arrays and hashes. Strings are
/// immutable under indexing; SetAt returns a new string instead.
pub fn index_set(object: &Value, index: &Value, value: Value) -> Result<(), OpError> {
    match object {
        Value::Array(cell) => {
            let mut values = cell.borrow_mut();
            let i = expect_index(index)?;
            if i < 0 || i as usize >= values.len() {
                return Err(OpError::Index {
                    index: i,
                    length: values.len(),
                });
            }
            values[i as usize] = value;
            Ok(())
        }
        Value::Hash(cell) => {
            let key = expect_key(index)?;
            cell.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(OpError::Type(format!(
            "cannot index-assign {}",
            other.type_name()
        ))),
    }
}

// ===== Typecasts =====

/// Convert a value to the named target type. Array and hash targets only
/// accept values already of that container type.
pub fn cast_value(value: Value, target: &str) -> Result<Value, OpError> {
    match target {
        "integer" => cast_integer(&value).map(Value::Int),
        "uinteger" => cast_integer(&value).map(|n| Value::Int(n.abs())),
        "decimal" => match &value {
            Value::Int(n) => Ok(Value::Decimal(*n as f64)),
            Value::Decimal(n) => Ok(Value::Decimal(*n)),
            Value::Bool(b) => Ok(Value::Decimal(if *b { 1.0 } else { 0.0 })),
            Value::Text(s) => s.trim().parse::<f64>().map(Value::Decimal).map_err(|_| {
                OpError::Type(format!("cannot convert \"{}\" to decimal", s))
            }),
            other => Err(OpError::Type(format!(
                "cannot convert {} to decimal",
                other.type_name()
            ))),
        },
        "string" => Ok(Value::Text(format!("{}", value))),
        "boolean" => Ok(Value::Bool(value.is_truthy())),
        "array" => match value {
            Value::Array(_) => Ok(value),
            other => Err(OpError::Type(format!(
                "cannot convert {} to array",
                other.type_name()
            ))),
        },
        "hash" => match value {
            Value::Hash(_) => Ok(value),
            other => Err(OpError::Type(format!(
                "cannot convert {} to hash",
                other.type_name()
            ))),
        },
        other => Err(OpError::UnknownCast(other.to_string())),
    }
}

fn cast_integer(value: &Value) -> Result<i64, OpError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Decimal(n) => Ok(*n as i64),
        Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| OpError::Type(format!("cannot convert \"{}\" to integer", s))),
        other => Err(OpError::Type(format!(
            "cannot convert {} to integer",
            other.type_name()
        ))),
    }
}

// ===== Slicing =====

/// Generic slice over arrays and strings, parametrized by start/end/step.
pub fn slice_value(
    value: &Value,
    start: &Value,
    end: &Value,
    step: &Value,
) -> Result<Value, OpError> {
    let start = expect_index(start)?;
    let end = expect_index(end)?;
    let step = expect_index(step)?;
    if step == 0 {
        return Err(OpError::type_error("slice step must not be zero"));
    }

    match value {
        Value::Array(cell) => {
            let values = cell.borrow();
            let indices = slice_indices(values.len(), start, end, step);
            Ok(Value::array(
                indices.into_iter().map(|i| values[i].clone()).collect(),
            ))
        }
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let indices = slice_indices(chars.len(), start, end, step);
            Ok(Value::Text(indices.into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(OpError::Type(format!(
            "cannot slice {}",
            other.type_name()
        ))),
    }
}

fn slice_indices(len: usize, start: i64, end: i64, step: i64) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < end && i >= 0 && (i as usize) < len {
            out.push(i as usize);
            i += step;
        }
    } else {
        while i > end && i >= 0 && (i as usize) < len {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

// ===== Argument coercion helpers =====

fn expect_index(value: &Value) -> Result<i64, OpError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(OpError::Type(format!(
            "expected integer index, got {}",
            other.type_name()
        ))),
    }
}

fn expect_text<'a>(value: &'a Value) -> Result<&'a str, OpError> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(OpError::Type(format!(
            "expected string, got {}",
            other.type_name()
        ))),
    }
}

fn expect_key(value: &Value) -> Result<HashKey, OpError> {
    HashKey::from_value(value).ok_or_else(|| {
        OpError::Type(format!("{} cannot be used as a hash key", value.type_name()))
    })
}

fn expect_number(name: &str, value: &Value) -> Result<f64, OpError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Decimal(n) => Ok(*n),
        other => Err(OpError::Type(format!(
            "{} expects a number, got {}",
            name,
            other.type_name()
        ))),
    }
}

// ===== Conversion builtins =====

fn builtin_char(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    match &args[0] {
        Value::Int(n) => {
            let c = u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| OpError::Type(format!("{} is not a valid character code", n)))?;
            Ok(BuiltinResult::One(Value::Text(c.to_string())))
        }
        other => Err(OpError::Type(format!(
            "Char expects an integer, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_ascii(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let s = expect_text(&args[0])?;
    match s.chars().next() {
        Some(c) => Ok(BuiltinResult::One(Value::Int(c as i64))),
        None => Err(OpError::type_error("Ascii expects a non-empty string")),
    }
}

fn builtin_integer(mut args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    cast_value(args.remove(0), "integer").map(BuiltinResult::One)
}

fn builtin_decimal(mut args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    cast_value(args.remove(0), "decimal").map(BuiltinResult::One)
}

fn builtin_uinteger(mut args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    cast_value(args.remove(0), "uinteger").map(BuiltinResult::One)
}

fn builtin_string(mut args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    cast_value(args.remove(0), "string").map(BuiltinResult::One)
}

fn builtin_boolean(mut args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    cast_value(args.remove(0), "boolean").map(BuiltinResult::One)
}

// ===== Inspection builtins =====

fn builtin_length(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let len = match &args[0] {
        Value::Array(a) => a.borrow().len(),
        Value::Text(s) => s.chars().count(),
        Value::Hash(h) => h.borrow().len(),
        other => {
            return Err(OpError::Type(format!(
                "Length expects array, string or hash, got {}",
                other.type_name()
            )))
        }
    };
    Ok(BuiltinResult::One(Value::Int(len as i64)))
}

fn builtin_typeof(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    Ok(BuiltinResult::One(Value::Text(
        args[0].type_name().to_string(),
    )))
}

// ===== Array/string editing builtins =====

fn builtin_insert(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "Insert", &args[1..]).map(BuiltinResult::One)
}

fn builtin_append(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "PushBack", &args[1..]).map(BuiltinResult::One)
}

fn builtin_push_front(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "PushFront", &args[1..]).map(BuiltinResult::One)
}

fn builtin_push_back(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "PushBack", &args[1..]).map(BuiltinResult::One)
}

fn builtin_pop_front(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    pop_builtin(&args[0], true)
}

fn builtin_pop_back(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    pop_builtin(&args[0], false)
}

/// Pop combinator: returns the remainder and the removed element as a pair.
fn pop_builtin(receiver: &Value, front: bool) -> Result<BuiltinResult, OpError> {
    match receiver {
        Value::Array(cell) => {
            let mut values = cell.borrow_mut();
            if values.is_empty() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            let popped = if front {
                values.remove(0)
            } else {
                let last = values.len() - 1;
                values.remove(last)
            };
            drop(values);
            Ok(BuiltinResult::Pair(receiver.clone(), popped))
        }
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.is_empty() {
                return Err(OpError::Index {
                    index: 0,
                    length: 0,
                });
            }
            let (rest, popped) = if front {
                (chars[1..].iter().collect::<String>(), chars[0])
            } else {
                (
                    chars[..chars.len() - 1].iter().collect::<String>(),
                    chars[chars.len() - 1],
                )
            };
            Ok(BuiltinResult::Pair(
                Value::Text(rest),
                Value::Text(popped.to_string()),
            ))
        }
        other => Err(OpError::Type(format!(
            "cannot pop from {}",
            other.type_name()
        ))),
    }
}

fn builtin_remove_at(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "Remove", &args[1..]).map(BuiltinResult::One)
}

fn builtin_char_at(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let s = expect_text(&args[0])?;
    let index = expect_index(&args[1])?;
    let chars: Vec<char> = s.chars().collect();
    if index < 0 || index as usize >= chars.len() {
        return Err(OpError::Index {
            index,
            length: chars.len(),
        });
    }
    Ok(BuiltinResult::One(Value::Text(
        chars[index as usize].to_string(),
    )))
}

fn builtin_set_at(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let s = expect_text(&args[0])?;
    let index = expect_index(&args[1])?;
    let replacement = expect_text(&args[2])?;
    let chars: Vec<char> = s.chars().collect();
    if index < 0 || index as usize >= chars.len() {
        return Err(OpError::Index {
            index,
            length: chars.len(),
        });
    }
    let mut out: String = chars[..index as usize].iter().collect();
    out.push_str(replacement);
    out.extend(&chars[index as usize + 1..]);
    Ok(BuiltinResult::One(Value::Text(out)))
}

fn builtin_clear(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    property_access(&args[0], "Clear", &[]).map(BuiltinResult::One)
}

fn builtin_sort(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let Value::Array(cell) = &args[0] else {
        return Err(OpError::Type(format!(
            "Sort expects an array, got {}",
            args[0].type_name()
        )));
    };
    {
        let mut values = cell.borrow_mut();
        let all_numeric = values
            .iter()
            .all(|v| matches!(v, Value::Int(_) | Value::Decimal(_)));
        let all_text = values.iter().all(|v| matches!(v, Value::Text(_)));
        if all_numeric {
            values.sort_by(|a, b| {
                let a = match a {
                    Value::Int(n) => *n as f64,
                    Value::Decimal(n) => *n,
                    _ => unreachable!(),
                };
                let b = match b {
                    Value::Int(n) => *n as f64,
                    Value::Decimal(n) => *n,
                    _ => unreachable!(),
                };
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            });
        } else if all_text {
            values.sort_by(|a, b| {
                let (Value::Text(a), Value::Text(b)) = (a, b) else {
                    unreachable!()
                };
                a.cmp(b)
            });
        } else {
            return Err(OpError::type_error(
                "Sort expects an array of numbers or an array of strings",
            ));
        }
    }
    Ok(BuiltinResult::One(args[0].clone()))
}

fn builtin_sort_by_stub(_args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    // Dispatched before table lookup by both engines; reaching this means
    // an engine forgot to special-case it.
    Err(OpError::type_error("SortBy requires a function comparator"))
}

fn builtin_hash_remove(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    match &args[0] {
        Value::Hash(_) => property_access(&args[0], "Remove", &args[1..]).map(BuiltinResult::One),
        other => Err(OpError::Type(format!(
            "HashRemove expects a hash, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_slice(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    slice_value(&args[0], &args[1], &args[2], &args[3]).map(BuiltinResult::One)
}

// ===== Formatting builtins =====

/// Replace each `{}` in the format string with the next argument.
pub fn format_interp(fmt: &str, args: &[Value]) -> Value {
    let mut out = fmt.to_string();
    for arg in args {
        if let Some(pos) = out.find("{}") {
            out.replace_range(pos..pos + 2, &format!("{}", arg));
        }
    }
    Value::Text(out)
}

fn builtin_format(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let fmt = expect_text(&args[0])?;
    Ok(BuiltinResult::One(format_interp(fmt, &args[1..])))
}

fn builtin_format2(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let fmt = expect_text(&args[0])?;
    Ok(BuiltinResult::One(format_interp(fmt, &args[1..])))
}

// ===== Math builtins =====

macro_rules! unary_math {
    ($fn_name:ident, $name:literal, $method:ident) => {
        fn $fn_name(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
            let n = expect_number($name, &args[0])?;
            Ok(BuiltinResult::One(Value::Decimal(n.$method())))
        }
    };
}

unary_math!(builtin_sin, "Sin", sin);
unary_math!(builtin_cos, "Cos", cos);
unary_math!(builtin_tan, "Tan", tan);
unary_math!(builtin_asin, "Asin", asin);
unary_math!(builtin_acos, "Acos", acos);
unary_math!(builtin_atan, "Atan", atan);
unary_math!(builtin_exp, "Exp", exp);
unary_math!(builtin_log, "Log", ln);
unary_math!(builtin_log2, "Log2", log2);
unary_math!(builtin_log10, "Log10", log10);
unary_math!(builtin_sqrt, "Sqrt", sqrt);

fn builtin_pow(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let result = match (&args[0], &args[1]) {
        (Value::Int(base), Value::Int(exp)) if *exp >= 0 => {
            Value::Int(base.pow(*exp as u32))
        }
        (a, b) => {
            let base = expect_number("Pow", a)?;
            let exp = expect_number("Pow", b)?;
            Value::Decimal(base.powf(exp))
        }
    };
    Ok(BuiltinResult::One(result))
}

fn builtin_floor(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    rounding("Floor", &args[0], f64::floor)
}

fn builtin_ceil(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    rounding("Ceil", &args[0], f64::ceil)
}

fn builtin_round(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    rounding("Round", &args[0], f64::round)
}

fn builtin_trunc(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    rounding("Trunc", &args[0], f64::trunc)
}

fn rounding(name: &str, value: &Value, f: fn(f64) -> f64) -> Result<BuiltinResult, OpError> {
    let result = match value {
        Value::Int(n) => Value::Int(*n),
        Value::Decimal(n) => Value::Int(f(*n) as i64),
        other => {
            return Err(OpError::Type(format!(
                "{} expects a number, got {}",
                name,
                other.type_name()
            )))
        }
    };
    Ok(BuiltinResult::One(result))
}

fn builtin_abs(args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    let result = match &args[0] {
        Value::Int(n) => Value::Int(n.abs()),
        Value::Decimal(n) => Value::Decimal(n.abs()),
        other => {
            return Err(OpError::Type(format!(
                "Abs expects a number, got {}",
                other.type_name()
            )))
        }
    };
    Ok(BuiltinResult::One(result))
}

fn builtin_pi(_args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    Ok(BuiltinResult::One(Value::Decimal(std::f64::consts::PI)))
}

fn builtin_euler(_args: Vec<Value>) -> Result<BuiltinResult, OpError> {
    Ok(BuiltinResult::One(Value::Decimal(std::f64::consts::E)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(result: Result<BuiltinResult, OpError>) -> Value {
        match result.unwrap() {
            BuiltinResult::One(v) => v,
            BuiltinResult::Pair(..) => panic!("expected single result"),
        }
    }

    #[test]
    fn test_lookup_reserved_names() {
        assert!(lookup("Length").is_some());
        assert_eq!(lookup("Slice").unwrap().arity, 4);
        assert!(lookup("nosuch").is_none());
    }

    #[test]
    fn test_char_ascii_roundtrip() {
        let c = one(builtin_char(vec![Value::Int(65)]));
        assert!(c.equals(&Value::Text("A".to_string())));
        let n = one(builtin_ascii(vec![Value::Text("A".to_string())]));
        assert!(n.equals(&Value::Int(65)));
    }

    #[test]
    fn test_array_push_back_mutates_in_place() {
        let arr = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let alias = arr.clone();
        property_access(&arr, "PushBack", &[Value::Int(3)]).unwrap();
        assert!(alias.equals(&Value::array(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3)
        ])));
    }

    #[test]
    fn test_text_push_back_returns_new_string() {
        let s = Value::Text("ab".to_string());
        let result = property_access(&s, "PushBack", &[Value::Text("x".to_string())]).unwrap();
        assert!(result.equals(&Value::Text("abx".to_string())));
        // receiver untouched
        assert!(s.equals(&Value::Text("ab".to_string())));
    }

    #[test]
    fn test_keys_on_array_is_type_error() {
        let arr = Value::array(vec![Value::Int(1)]);
        assert!(matches!(
            property_access(&arr, "Keys", &[]),
            Err(OpError::Type(_))
        ));
    }

    #[test]
    fn test_hash_add_and_keys_preserve_order() {
        let hash = Value::empty_hash();
        property_access(&hash, "Add", &[Value::Text("b".to_string()), Value::Int(1)]).unwrap();
        property_access(&hash, "Add", &[Value::Text("a".to_string()), Value::Int(2)]).unwrap();
        let keys = property_access(&hash, "Keys", &[]).unwrap();
        assert!(keys.equals(&Value::array(vec![
            Value::Text("b".to_string()),
            Value::Text("a".to_string())
        ])));
    }

    #[test]
    fn test_hash_remove_missing_key() {
        let hash = Value::empty_hash();
        assert!(matches!(
            property_access(&hash, "Remove", &[Value::Text("k".to_string())]),
            Err(OpError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_slice_with_step() {
        let arr = Value::array((0..6).map(Value::Int).collect());
        let sliced = slice_value(&arr, &Value::Int(1), &Value::Int(6), &Value::Int(2)).unwrap();
        assert!(sliced.equals(&Value::array(vec![
            Value::Int(1),
            Value::Int(3),
            Value::Int(5)
        ])));
    }

    #[test]
    fn test_slice_over_string() {
        let sliced = slice_value(
            &Value::Text("abcdef".to_string()),
            &Value::Int(0),
            &Value::Int(6),
            &Value::Int(3),
        )
        .unwrap();
        assert!(sliced.equals(&Value::Text("ad".to_string())));
    }

    #[test]
    fn test_cast_uinteger_is_absolute() {
        let v = cast_value(Value::Decimal(-3.9), "uinteger").unwrap();
        assert!(v.equals(&Value::Int(3)));
    }

    #[test]
    fn test_cast_array_rejects_non_array() {
        assert!(matches!(
            cast_value(Value::Int(1), "array"),
            Err(OpError::Type(_))
        ));
    }

    #[test]
    fn test_cast_unknown_target() {
        assert!(matches!(
            cast_value(Value::Int(1), "quaternion"),
            Err(OpError::UnknownCast(_))
        ));
    }

    #[test]
    fn test_format_interp() {
        let v = format_interp("{} + {}", &[Value::Int(1), Value::Int(2)]);
        assert!(v.equals(&Value::Text("1 + 2".to_string())));
    }

    #[test]
    fn test_pop_back_pair() {
        let result = builtin_pop_back(vec![Value::Text("hi".to_string())]).unwrap();
        match result {
            BuiltinResult::Pair(rest, popped) => {
                assert!(rest.equals(&Value::Text("h".to_string())));
                assert!(popped.equals(&Value::Text("i".to_string())));
            }
            _ => panic!("expected pair"),
        }
    }

    #[test]
    fn test_sort_numeric() {
        let arr = Value::array(vec![Value::Int(3), Value::Decimal(1.5), Value::Int(2)]);
        let sorted = one(builtin_sort(vec![arr]));
        assert!(sorted.equals(&Value::array(vec![
            Value::Decimal(1.5),
            Value::Int(2),
            Value::Int(3)
        ])));
    }
}
