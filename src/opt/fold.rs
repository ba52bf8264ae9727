use crate::ast::{BinOp, Expr, Literal, UnaryOp};
use crate::scope::literal_type;
use crate::types::{Scalar, Type};

/// A foldable numeric constant: a float or int literal, possibly negated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Float(f64),
    Int(i64),
}

impl Constant {
    pub fn of(expr: &Expr) -> Option<Constant> {
        match expr {
            Expr::Literal(lit) => match literal_type(lit) {
                Type::Scalar(Scalar::Float) => lit.as_f64().map(Constant::Float),
                Type::Scalar(Scalar::Int) => lit.as_f64().map(|v| Constant::Int(v as i64)),
                _ => None,
            },
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => Constant::of(operand).map(Constant::negate),
            Expr::Paren(inner) => Constant::of(inner),
            _ => None,
        }
    }

    fn negate(self) -> Constant {
        match self {
            Constant::Float(v) => Constant::Float(-v),
            Constant::Int(v) => Constant::Int(v.wrapping_neg()),
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Constant::Float(v) => v,
            Constant::Int(v) => v as f64,
        }
    }

    /// Negative values come back as `-literal` so the tree matches what the
    /// parser produces for the same text.
    pub fn into_expr(self) -> Expr {
        let (negative, lit) = match self {
            Constant::Float(v) => (v.is_sign_negative() && v != 0.0, Literal::float(v.abs())),
            Constant::Int(v) => (v < 0, Literal::int(v.saturating_abs())),
        };
        let lit = Expr::Literal(lit);
        if negative {
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(lit),
            }
        } else {
            lit
        }
    }
}

/// Fold `lhs op rhs` when both sides are constants. Int pairs stay int;
/// anything involving a float folds in `f64`. Division by zero and
/// non-finite results are left alone.
pub fn fold_binary(op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let (l, r) = (Constant::of(lhs)?, Constant::of(rhs)?);
    let folded = match (l, r) {
        (Constant::Int(a), Constant::Int(b)) => Constant::Int(match op {
            BinOp::Add => a.checked_add(b)?,
            BinOp::Sub => a.checked_sub(b)?,
            BinOp::Mul => a.checked_mul(b)?,
            BinOp::Div if b != 0 => a.checked_div(b)?,
            _ => return None,
        }),
        _ => {
            let (a, b) = (l.value(), r.value());
            let v = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div if b != 0.0 => a / b,
                _ => return None,
            };
            if !v.is_finite() {
                return None;
            }
            Constant::Float(v)
        }
    };
    Some(folded.into_expr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_expr;

    fn lit(text: &str) -> Expr {
        crate::parser::parse_expr(text).unwrap()
    }

    #[test]
    fn folds_floats_and_ints() {
        let e = fold_binary(BinOp::Mul, &lit("2.0"), &lit("3.0")).unwrap();
        assert_eq!(compose_expr(&e), "6.0");
        let e = fold_binary(BinOp::Div, &lit("7"), &lit("2")).unwrap();
        assert_eq!(compose_expr(&e), "3");
        let e = fold_binary(BinOp::Sub, &lit("1.0"), &lit("2.5")).unwrap();
        assert_eq!(compose_expr(&e), "-1.5");
    }

    #[test]
    fn leaves_division_by_zero() {
        assert!(fold_binary(BinOp::Div, &lit("1.0"), &lit("0.0")).is_none());
        assert!(fold_binary(BinOp::Div, &lit("1"), &lit("0")).is_none());
    }

    #[test]
    fn skips_unsigned_and_double() {
        assert!(fold_binary(BinOp::Add, &lit("1u"), &lit("2u")).is_none());
        assert!(fold_binary(BinOp::Add, &lit("1.0lf"), &lit("2.0")).is_none());
    }
}
