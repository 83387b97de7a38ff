//! Evaluation of postfix arithmetic over the value stack.
//!
//! Numeric coercion: two integers stay integral except for division,
//! which always produces a float; any float operand forces a float
//! result. Equality and ordering apply to compatible kinds only. On
//! failure the operands are consumed, `None` takes the result slot so
//! the stack keeps its shape, and the error is reported to the caller
//! for logging.

use thiserror::Error;

use crate::instruction::Operator;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    #[error("value stack underflow")]
    StackUnderflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("cannot apply \"{op}\" to {a} and {b}")]
    TypeMismatch { op: Operator, a: Value, b: Value },
    #[error("cannot apply \"{op}\" to {value}")]
    UnaryMismatch { op: Operator, value: Value },
}

/// Apply `op` to the top of the stack. The net effect is always one
/// result slot, holding `None` when the operation failed.
pub fn apply(op: Operator, stack: &mut Vec<Value>) -> Result<(), MathError> {
    let result = match op {
        Operator::UnaryMinus | Operator::Not => {
            let value = match stack.pop() {
                Some(value) => value,
                None => {
                    stack.push(Value::None);
                    return Err(MathError::StackUnderflow);
                }
            };
            unary(op, value)
        }
        _ => {
            let b = stack.pop();
            let a = stack.pop();
            match (a, b) {
                (Some(a), Some(b)) => binary(op, a, b),
                _ => {
                    stack.push(Value::None);
                    return Err(MathError::StackUnderflow);
                }
            }
        }
    };
    match result {
        Ok(value) => {
            stack.push(value);
            Ok(())
        }
        Err(e) => {
            stack.push(Value::None);
            Err(e)
        }
    }
}

fn unary(op: Operator, value: Value) -> Result<Value, MathError> {
    match op {
        Operator::UnaryMinus => match value {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            value => Err(MathError::UnaryMismatch { op, value }),
        },
        Operator::Not => Ok(Value::Bool(!value.is_truthy())),
        _ => Err(MathError::UnaryMismatch { op, value }),
    }
}

fn binary(op: Operator, a: Value, b: Value) -> Result<Value, MathError> {
    match op {
        Operator::And => Ok(Value::Bool(a.is_truthy() && b.is_truthy())),
        Operator::Or => Ok(Value::Bool(a.is_truthy() || b.is_truthy())),
        Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod => {
            arithmetic(op, a, b)
        }
        Operator::Eq => equality(a, b).map(Value::Bool),
        Operator::NotEq => equality(a, b).map(|eq| Value::Bool(!eq)),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => comparison(op, a, b),
        Operator::UnaryMinus | Operator::Not => {
            Err(MathError::TypeMismatch { op, a, b })
        }
    }
}

fn arithmetic(op: Operator, a: Value, b: Value) -> Result<Value, MathError> {
    match (&a, &b) {
        (Value::Integer(x), Value::Integer(y)) => {
            let (x, y) = (*x, *y);
            match op {
                Operator::Add => Ok(Value::Integer(x.wrapping_add(y))),
                Operator::Sub => Ok(Value::Integer(x.wrapping_sub(y))),
                Operator::Mul => Ok(Value::Integer(x.wrapping_mul(y))),
                Operator::Div => {
                    if y == 0 {
                        Err(MathError::DivideByZero)
                    } else {
                        Ok(Value::Float(x as f64 / y as f64))
                    }
                }
                Operator::Mod => {
                    if y == 0 {
                        Err(MathError::DivideByZero)
                    } else {
                        Ok(Value::Integer(x.rem_euclid(y)))
                    }
                }
                _ => Err(MathError::TypeMismatch { op, a, b }),
            }
        }
        _ => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(MathError::TypeMismatch { op, a, b }),
            };
            match op {
                Operator::Add => Ok(Value::Float(x + y)),
                Operator::Sub => Ok(Value::Float(x - y)),
                Operator::Mul => Ok(Value::Float(x * y)),
                Operator::Div => {
                    if y == 0.0 {
                        Err(MathError::DivideByZero)
                    } else {
                        Ok(Value::Float(x / y))
                    }
                }
                Operator::Mod => {
                    if y == 0.0 {
                        Err(MathError::DivideByZero)
                    } else {
                        Ok(Value::Float(x.rem_euclid(y)))
                    }
                }
                _ => Err(MathError::TypeMismatch { op, a, b }),
            }
        }
    }
}

fn equality(a: Value, b: Value) -> Result<bool, MathError> {
    match (&a, &b) {
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::None, Value::None) => Ok(true),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x == y),
            _ => Err(MathError::TypeMismatch {
                op: Operator::Eq,
                a,
                b,
            }),
        },
    }
}

fn comparison(op: Operator, a: Value, b: Value) -> Result<Value, MathError> {
    let ordering = match (&a, &b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => match x.partial_cmp(&y) {
                Some(ordering) => ordering,
                None => return Err(MathError::TypeMismatch { op, a, b }),
            },
            _ => return Err(MathError::TypeMismatch { op, a, b }),
        },
    };
    let result = match op {
        Operator::Lt => ordering.is_lt(),
        Operator::Lte => ordering.is_le(),
        Operator::Gt => ordering.is_gt(),
        Operator::Gte => ordering.is_ge(),
        _ => return Err(MathError::TypeMismatch { op, a, b }),
    };
    Ok(Value::Bool(result))
}
