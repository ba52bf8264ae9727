use std::fmt;

use crate::ast::format_float;
use crate::types::{Scalar, Type};

use super::EvalError;

/// Runtime value of the reference interpreter. Vectors hold floats only;
/// integer and boolean vectors are outside what derivative code produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Vector(Vec<f64>),
}

impl Value {
    pub fn vec(components: impl Into<Vec<f64>>) -> Self {
        Value::Vector(components.into())
    }

    /// Zero of a scalar or float vector type.
    pub fn zero(ty: &Type) -> Result<Value, EvalError> {
        match ty {
            Type::Scalar(Scalar::Int | Scalar::Uint) => Ok(Value::Int(0)),
            Type::Scalar(Scalar::Bool) => Ok(Value::Bool(false)),
            Type::Scalar(_) => Ok(Value::Float(0.0)),
            Type::Vector(s, n) if s.is_floating() => Ok(Value::Vector(vec![0.0; usize::from(*n)])),
            other => Err(EvalError::Unsupported(format!("values of type {other}"))),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::TypeError(format!("expected a bool, got {other}"))),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Components of a number or vector, as floats.
    pub fn components(&self) -> Result<Vec<f64>, EvalError> {
        match self {
            Value::Vector(c) => Ok(c.clone()),
            other => other
                .as_f64()
                .map(|v| vec![v])
                .ok_or_else(|| EvalError::TypeError(format!("expected a number, got {other}"))),
        }
    }

    /// Convert to `ty` the way GLSL's implicit conversions allow.
    pub fn coerce(self, ty: &Type) -> Result<Value, EvalError> {
        match (ty, self) {
            (Type::Scalar(s), Value::Int(v)) if s.is_floating() => Ok(Value::Float(v as f64)),
            (Type::Scalar(s), v @ Value::Float(_)) if s.is_floating() => Ok(v),
            (Type::Scalar(Scalar::Int | Scalar::Uint), v @ Value::Int(_)) => Ok(v),
            (Type::Scalar(Scalar::Bool), v @ Value::Bool(_)) => Ok(v),
            (Type::Vector(s, n), Value::Vector(c)) if s.is_floating() && c.len() == usize::from(*n) => {
                Ok(Value::Vector(c))
            }
            (ty, v) => Err(EvalError::TypeError(format!("cannot use {v} as {ty}"))),
        }
    }

    /// Absolute-or-relative closeness, component by component.
    pub fn approx_eq(&self, other: &Value, tolerance: f64) -> bool {
        match (self.components(), other.components()) {
            (Ok(a), Ok(b)) => {
                a.len() == b.len()
                    && a.iter().zip(&b).all(|(x, y)| {
                        (x - y).abs() <= tolerance * (1.0f64).max(x.abs()).max(y.abs())
                    })
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Vector(c) => {
                let parts: Vec<String> = c.iter().map(|v| format_float(*v)).collect();
                write!(f, "vec{}({})", c.len(), parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_ints_to_floats_only() {
        assert_eq!(Value::Int(2).coerce(&Type::FLOAT).unwrap(), Value::Float(2.0));
        assert!(Value::Float(2.0).coerce(&Type::INT).is_err());
        assert!(Value::vec([1.0, 2.0]).coerce(&Type::vec(3)).is_err());
    }

    #[test]
    fn display_matches_glsl_spelling() {
        assert_eq!(Value::vec([1.0, 0.5]).to_string(), "vec2(1.0, 0.5)");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
    }

    #[test]
    fn approx_eq_is_relative_for_large_values() {
        assert!(Value::Float(1000.0).approx_eq(&Value::Float(1000.5), 1e-3));
        assert!(!Value::Float(1.0).approx_eq(&Value::Float(1.01), 1e-3));
    }
}
