//! GLSL type names used by the scope and derivative rules.
//!
//! # Example
//! ```
//! use ddx::types::{Scalar, Type};
//! let ty = Type::parse("vec3");
//! assert_eq!(ty, Type::Vector(Scalar::Float, 3));
//! assert_eq!(ty.to_string(), "vec3");
//! ```

use std::fmt;

use crate::ast::{Expr, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Float,
    Double,
    Int,
    Uint,
    Bool,
}

impl Scalar {
    pub fn is_floating(self) -> bool {
        matches!(self, Scalar::Float | Scalar::Double)
    }

    fn vector_prefix(self) -> &'static str {
        match self {
            Scalar::Float => "",
            Scalar::Double => "d",
            Scalar::Int => "i",
            Scalar::Uint => "u",
            Scalar::Bool => "b",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Scalar::Float => "float",
            Scalar::Double => "double",
            Scalar::Int => "int",
            Scalar::Uint => "uint",
            Scalar::Bool => "bool",
        }
    }

    pub fn zero(self) -> Literal {
        match self {
            Scalar::Float | Scalar::Double => Literal::Float("0.0".into()),
            Scalar::Int => Literal::Int("0".into()),
            Scalar::Uint => Literal::Int("0u".into()),
            Scalar::Bool => Literal::Bool(false),
        }
    }

    pub fn one(self) -> Literal {
        match self {
            Scalar::Float | Scalar::Double => Literal::Float("1.0".into()),
            Scalar::Int => Literal::Int("1".into()),
            Scalar::Uint => Literal::Int("1u".into()),
            Scalar::Bool => Literal::Bool(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(Scalar),
    /// `vecN` family; the size is 2, 3 or 4.
    Vector(Scalar, u8),
    /// `matCxR`; only float and double matrices exist.
    Matrix { scalar: Scalar, cols: u8, rows: u8 },
    /// Sampler, struct or any other name the table does not know.
    Named(String),
    Array(Box<Type>, Option<usize>),
}

impl Type {
    pub const FLOAT: Type = Type::Scalar(Scalar::Float);
    pub const INT: Type = Type::Scalar(Scalar::Int);
    pub const BOOL: Type = Type::Scalar(Scalar::Bool);

    pub fn parse(name: &str) -> Type {
        match name {
            "void" => return Type::Void,
            "float" => return Type::FLOAT,
            "double" => return Type::Scalar(Scalar::Double),
            "int" => return Type::INT,
            "uint" => return Type::Scalar(Scalar::Uint),
            "bool" => return Type::BOOL,
            _ => {}
        }
        if let Some(ty) = parse_vector(name).or_else(|| parse_matrix(name)) {
            return ty;
        }
        Type::Named(name.to_string())
    }

    pub fn vec(size: u8) -> Type {
        Type::Vector(Scalar::Float, size)
    }

    /// Element scalar of a scalar, vector or matrix type.
    pub fn scalar(&self) -> Option<Scalar> {
        match self {
            Type::Scalar(s) | Type::Vector(s, _) | Type::Matrix { scalar: s, .. } => Some(*s),
            _ => None,
        }
    }

    pub fn is_floating(&self) -> bool {
        self.scalar().is_some_and(Scalar::is_floating)
    }

    /// Float or double scalar or vector.
    pub fn is_float_like(&self) -> bool {
        matches!(self, Type::Scalar(s) | Type::Vector(s, _) if s.is_floating())
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Type::Named(_))
    }

    /// Number of scalar components in a scalar or vector.
    pub fn components(&self) -> Option<u8> {
        match self {
            Type::Scalar(_) => Some(1),
            Type::Vector(_, n) => Some(*n),
            _ => None,
        }
    }

    /// `self` accepts a value of `other` directly or through int-to-float
    /// promotion.
    pub fn accepts(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Scalar(to), Type::Scalar(from)) => promotes(*from, *to),
            (Type::Vector(to, n), Type::Vector(from, m)) => n == m && promotes(*from, *to),
            _ => false,
        }
    }

    /// The additive identity of this type, as an expression.
    pub fn zero_value(&self) -> Option<Expr> {
        self.filled(Scalar::zero)
    }

    /// The multiplicative identity: `1.0`, `vec3(1.0)` or the identity matrix.
    pub fn one_value(&self) -> Option<Expr> {
        self.filled(Scalar::one)
    }

    fn filled(&self, fill: fn(Scalar) -> Literal) -> Option<Expr> {
        match self {
            Type::Scalar(s) => Some(Expr::Literal(fill(*s))),
            Type::Vector(s, _) | Type::Matrix { scalar: s, .. } => Some(Expr::call(
                self.to_string(),
                vec![Expr::Literal(fill(*s))],
            )),
            Type::Void | Type::Named(_) | Type::Array(..) => None,
        }
    }
}

fn promotes(from: Scalar, to: Scalar) -> bool {
    from == to
        || matches!(
            (from, to),
            (Scalar::Int | Scalar::Uint, Scalar::Float | Scalar::Double)
                | (Scalar::Float, Scalar::Double)
                | (Scalar::Int, Scalar::Uint)
        )
}

fn parse_vector(name: &str) -> Option<Type> {
    let (scalar, rest) = match name.as_bytes().first()? {
        b'v' => (Scalar::Float, name),
        b'd' => (Scalar::Double, &name[1..]),
        b'i' => (Scalar::Int, &name[1..]),
        b'u' => (Scalar::Uint, &name[1..]),
        b'b' => (Scalar::Bool, &name[1..]),
        _ => return None,
    };
    let size = rest.strip_prefix("vec")?;
    match size {
        "2" | "3" | "4" => size.parse().ok().map(|n| Type::Vector(scalar, n)),
        _ => None,
    }
}

fn parse_matrix(name: &str) -> Option<Type> {
    let (scalar, rest) = match name.strip_prefix('d') {
        Some(rest) => (Scalar::Double, rest),
        None => (Scalar::Float, name),
    };
    let dims = rest.strip_prefix("mat")?;
    let dim = |s: &str| match s {
        "2" | "3" | "4" => s.parse::<u8>().ok(),
        _ => None,
    };
    let (cols, rows) = match dims.split_once('x') {
        Some((c, r)) => (dim(c)?, dim(r)?),
        None => {
            let n = dim(dims)?;
            (n, n)
        }
    };
    Some(Type::Matrix { scalar, cols, rows })
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Scalar(s) => f.write_str(s.name()),
            Type::Vector(s, n) => write!(f, "{}vec{n}", s.vector_prefix()),
            Type::Matrix { scalar, cols, rows } => {
                let prefix = if *scalar == Scalar::Double { "d" } else { "" };
                if cols == rows {
                    write!(f, "{prefix}mat{cols}")
                } else {
                    write!(f, "{prefix}mat{cols}x{rows}")
                }
            }
            Type::Named(name) => f.write_str(name),
            Type::Array(elem, Some(n)) => write!(f, "{elem}[{n}]"),
            Type::Array(elem, None) => write!(f, "{elem}[]"),
        }
    }
}
