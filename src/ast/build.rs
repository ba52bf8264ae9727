//! Precedence-aware constructors.
//!
//! Every builder wraps an operand in `Paren` only when composing it bare would
//! regroup the expression, so a built tree composes to text that parses back
//! to the same tree.

use super::{
    Accessor, AssignOp, BinOp, Expr, UnaryOp, PREC_ASSIGN, PREC_POSTFIX, PREC_TERNARY,
    PREC_UNARY,
};

/// Parenthesize `expr` if it binds looser than `min_prec`.
pub fn wrap(expr: Expr, min_prec: u8) -> Expr {
    if expr.precedence() < min_prec {
        Expr::Paren(Box::new(expr))
    } else {
        expr
    }
}

/// Left-associative binary node.
pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let prec = op.precedence();
    Expr::Binary {
        op,
        lhs: Box::new(wrap(lhs, prec)),
        rhs: Box::new(wrap(rhs, prec + 1)),
    }
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinOp::Div, lhs, rhs)
}

pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinOp::Gt, lhs, rhs)
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    let min = if op.is_postfix() { PREC_POSTFIX } else { PREC_UNARY };
    Expr::Unary {
        op,
        operand: Box::new(wrap(operand, min)),
    }
}

pub fn neg(operand: Expr) -> Expr {
    unary(UnaryOp::Neg, operand)
}

pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    Expr::Ternary {
        cond: Box::new(wrap(cond, PREC_TERNARY + 1)),
        then_expr: Box::new(wrap(then_expr, PREC_TERNARY)),
        else_expr: Box::new(wrap(else_expr, PREC_TERNARY)),
    }
}

pub fn assign(target: Expr, op: AssignOp, value: Expr) -> Expr {
    Expr::Assign {
        target: Box::new(wrap(target, PREC_UNARY)),
        op,
        value: Box::new(wrap(value, PREC_ASSIGN)),
    }
}

pub fn attribute(base: Expr, accessors: Vec<Accessor>) -> Expr {
    match base {
        Expr::Attribute {
            base,
            accessors: mut head,
        } => {
            head.extend(accessors);
            Expr::Attribute {
                base,
                accessors: head,
            }
        }
        base => Expr::Attribute {
            base: Box::new(wrap(base, PREC_POSTFIX)),
            accessors,
        },
    }
}

pub fn field(base: Expr, name: impl Into<String>) -> Expr {
    attribute(base, vec![Accessor::Field(name.into())])
}

/// Remove every `Paren` node in the tree.
pub fn strip_parens(expr: &Expr) -> Expr {
    match expr {
        Expr::Paren(inner) => strip_parens(inner),
        Expr::Literal(_) | Expr::Var(_) => expr.clone(),
        Expr::Call { callee, args } => Expr::Call {
            callee: callee.clone(),
            args: args.iter().map(strip_parens).collect(),
        },
        Expr::Attribute { base, accessors } => Expr::Attribute {
            base: Box::new(strip_parens(base)),
            accessors: accessors.iter().map(strip_accessor).collect(),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(strip_parens(operand)),
        },
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: Box::new(strip_parens(lhs)),
            rhs: Box::new(strip_parens(rhs)),
        },
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => Expr::Ternary {
            cond: Box::new(strip_parens(cond)),
            then_expr: Box::new(strip_parens(then_expr)),
            else_expr: Box::new(strip_parens(else_expr)),
        },
        Expr::Assign { target, op, value } => Expr::Assign {
            target: Box::new(strip_parens(target)),
            op: *op,
            value: Box::new(strip_parens(value)),
        },
    }
}

fn strip_accessor(accessor: &Accessor) -> Accessor {
    match accessor {
        Accessor::Field(name) => Accessor::Field(name.clone()),
        Accessor::Index(index) => Accessor::Index(strip_parens(index)),
    }
}

/// Rebuild a paren-free tree through the builders, restoring the minimal
/// set of parentheses.
pub fn reparenthesize(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => expr,
        Expr::Paren(inner) => reparenthesize(*inner),
        Expr::Call { callee, args } => Expr::Call {
            callee,
            args: args.into_iter().map(reparenthesize).collect(),
        },
        Expr::Attribute { base, accessors } => attribute(
            reparenthesize(*base),
            accessors
                .into_iter()
                .map(|a| match a {
                    Accessor::Index(index) => Accessor::Index(reparenthesize(index)),
                    field => field,
                })
                .collect(),
        ),
        Expr::Unary { op, operand } => unary(op, reparenthesize(*operand)),
        Expr::Binary { op, lhs, rhs } => binary(op, reparenthesize(*lhs), reparenthesize(*rhs)),
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => ternary(
            reparenthesize(*cond),
            reparenthesize(*then_expr),
            reparenthesize(*else_expr),
        ),
        Expr::Assign { target, op, value } => {
            assign(reparenthesize(*target), op, reparenthesize(*value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_inside_product_gets_parens() {
        let e = mul(add(Expr::var("a"), Expr::var("b")), Expr::var("c"));
        let Expr::Binary { lhs, .. } = &e else {
            panic!("expected binary");
        };
        assert!(matches!(**lhs, Expr::Paren(_)));
    }

    #[test]
    fn right_operand_of_subtraction_keeps_grouping() {
        let e = sub(Expr::var("a"), sub(Expr::var("b"), Expr::var("c")));
        let Expr::Binary { rhs, .. } = &e else {
            panic!("expected binary");
        };
        assert!(matches!(**rhs, Expr::Paren(_)));
    }

    #[test]
    fn reparenthesize_drops_redundant_parens() {
        let e = Expr::Paren(Box::new(mul(
            Expr::Paren(Box::new(Expr::var("a"))),
            Expr::var("b"),
        )));
        let rebuilt = reparenthesize(strip_parens(&e));
        assert_eq!(rebuilt, mul(Expr::var("a"), Expr::var("b")));
    }
}
