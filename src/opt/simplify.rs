// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the DDX project (analytic derivatives for shading code).

use crate::ast::{build, Accessor, BinOp, Binding, Declaration, Expr, FunctionDecl, Stmt, UnaryOp};
use crate::autodiff::component_index;
use crate::scope::LexicalScope;
use crate::types::{Scalar, Type};

use super::fold::{fold_binary, Constant};

/// Upper bound on rewrite passes per expression.
pub const MAX_PASSES: usize = 16;

/// Algebraic cleanup of one function.
///
/// Every rewrite preserves the deduced type of the node it replaces, so the
/// output type-checks whenever the input did. Rewrites that would need a type
/// the scope cannot deduce are skipped. Running the pass twice gives the same
/// result as running it once.
pub fn simplify_function(func: &FunctionDecl, scope: &LexicalScope) -> FunctionDecl {
    let local = scope.subscope(func);
    FunctionDecl {
        return_type: func.return_type.clone(),
        name: func.name.clone(),
        params: func.params.clone(),
        body: func.body.iter().map(|s| simplify_stmt(s, &local)).collect(),
    }
}

pub fn simplify_stmt(stmt: &Stmt, scope: &LexicalScope) -> Stmt {
    let expr = |e: &Expr| simplify_expr(e, scope);
    let boxed = |s: &Stmt| Box::new(simplify_stmt(s, scope));
    match stmt {
        Stmt::Comment(_) | Stmt::Discard | Stmt::Break | Stmt::Continue => stmt.clone(),
        Stmt::Declaration(decl) => Stmt::Declaration(Declaration {
            qualifiers: decl.qualifiers.clone(),
            ty: decl.ty.clone(),
            bindings: decl
                .bindings
                .iter()
                .map(|b| Binding {
                    name: b.name.clone(),
                    array: b.array.clone(),
                    init: b.init.as_ref().map(expr),
                })
                .collect(),
        }),
        Stmt::Expr(e) => Stmt::Expr(expr(e)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond: expr(cond),
            then_branch: boxed(then_branch),
            else_branch: else_branch.as_deref().map(boxed),
        },
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => Stmt::For {
            init: init.as_deref().map(boxed),
            cond: cond.as_ref().map(expr),
            step: step.as_ref().map(expr),
            body: boxed(body),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond: expr(cond),
            body: boxed(body),
        },
        Stmt::Return(value) => Stmt::Return(value.as_ref().map(expr)),
        Stmt::Block(stmts) => Stmt::Block(stmts.iter().map(|s| simplify_stmt(s, scope)).collect()),
    }
}

/// Strip parentheses, rewrite to a fixed point, then put back only the
/// parentheses precedence needs.
pub fn simplify_expr(expr: &Expr, scope: &LexicalScope) -> Expr {
    let mut current = build::strip_parens(expr);
    for _ in 0..MAX_PASSES {
        let next = rewrite(&current, scope);
        if next == current {
            break;
        }
        current = next;
    }
    build::reparenthesize(current)
}

fn rewrite(expr: &Expr, scope: &LexicalScope) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => expr.clone(),
        Expr::Paren(inner) => rewrite(inner, scope),
        Expr::Call { callee, args } => {
            let args: Vec<Expr> = args.iter().map(|a| rewrite(a, scope)).collect();
            rewrite_call(callee, args)
        }
        Expr::Attribute { base, accessors } => {
            let base = rewrite(base, scope);
            let accessors: Vec<Accessor> = accessors
                .iter()
                .map(|a| match a {
                    Accessor::Index(i) => Accessor::Index(rewrite(i, scope)),
                    field => field.clone(),
                })
                .collect();
            rewrite_access(base, accessors)
        }
        Expr::Unary { op, operand } => {
            let operand = rewrite(operand, scope);
            match (op, &operand) {
                (UnaryOp::Plus, _) => operand,
                (
                    UnaryOp::Neg,
                    Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: inner,
                    },
                ) => (**inner).clone(),
                (UnaryOp::Neg, _) if is_zero_any(&operand) => operand,
                _ => Expr::Unary {
                    op: *op,
                    operand: Box::new(operand),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = rewrite(lhs, scope);
            let rhs = rewrite(rhs, scope);
            rewrite_binary(*op, lhs, rhs, scope)
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            let then_expr = rewrite(then_expr, scope);
            let else_expr = rewrite(else_expr, scope);
            if then_expr == else_expr && is_pure(cond) {
                return then_expr;
            }
            Expr::Ternary {
                cond: Box::new(rewrite(cond, scope)),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            }
        }
        Expr::Assign { target, op, value } => Expr::Assign {
            target: target.clone(),
            op: *op,
            value: Box::new(rewrite(value, scope)),
        },
    }
}

fn rewrite_binary(op: BinOp, lhs: Expr, rhs: Expr, scope: &LexicalScope) -> Expr {
    if let Some(folded) = fold_binary(op, &lhs, &rhs) {
        return folded;
    }
    let lhs_ty = scope.deduce_type(&lhs);
    let rhs_ty = scope.deduce_type(&rhs);
    let rebuilt = |lhs: Expr, rhs: Expr| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    };
    match op {
        BinOp::Mul => {
            if is_one_for(&rhs, lhs_ty.as_ref()) {
                return lhs;
            }
            if is_one_for(&lhs, rhs_ty.as_ref()) {
                return rhs;
            }
            if (is_zero_any(&lhs) || is_zero_any(&rhs)) && is_pure(&lhs) && is_pure(&rhs) {
                if let Some(zero) = zero_of(&rebuilt(lhs.clone(), rhs.clone()), scope) {
                    return zero;
                }
            }
        }
        BinOp::Div => {
            if is_one_for(&rhs, lhs_ty.as_ref()) {
                return lhs;
            }
            if is_zero_any(&lhs) && !is_zero_any(&rhs) && is_pure(&rhs) {
                if let Some(zero) = zero_of(&rebuilt(lhs.clone(), rhs.clone()), scope) {
                    return zero;
                }
            }
        }
        BinOp::Add => {
            if is_zero_for(&rhs, lhs_ty.as_ref()) {
                return lhs;
            }
            if is_zero_for(&lhs, rhs_ty.as_ref()) {
                return rhs;
            }
        }
        BinOp::Sub => {
            if is_zero_for(&rhs, lhs_ty.as_ref()) {
                return lhs;
            }
            if is_zero_for(&lhs, rhs_ty.as_ref()) {
                return Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(rhs),
                };
            }
        }
        _ => {}
    }
    rebuilt(lhs, rhs)
}

fn rewrite_call(callee: &str, args: Vec<Expr>) -> Expr {
    if callee == "dot" && args.len() == 2 && args.iter().any(is_zero_any) && args.iter().all(is_pure)
    {
        return Expr::float(0.0);
    }
    // vec3(0.0, 0.0, 0.0) -> vec3(0.0)
    if let Type::Vector(_, n) = Type::parse(callee) {
        if args.len() == usize::from(n) && args.len() > 1 {
            let first = Constant::of(&args[0]);
            if first.is_some() && args.iter().all(|a| Constant::of(a) == first) {
                return Expr::call(callee, vec![args[0].clone()]);
            }
        }
    }
    Expr::Call {
        callee: callee.to_string(),
        args,
    }
}

/// `vecN(c).x` and `vecN(a, b, c).y` read the constructor argument directly.
fn rewrite_access(base: Expr, accessors: Vec<Accessor>) -> Expr {
    if let ([Accessor::Field(name)], Expr::Call { callee, args }) = (accessors.as_slice(), &base) {
        let mut chars = name.chars();
        if let (Some(c), None, Type::Vector(Scalar::Float, n)) =
            (chars.next(), chars.next(), Type::parse(callee))
        {
            let index = component_index(c).filter(|i| *i < usize::from(n));
            let picked = match (index, args.as_slice()) {
                (Some(_), [only]) => Some(only),
                (Some(i), _) if args.len() == usize::from(n) && args.iter().all(is_pure) => {
                    args.get(i)
                }
                _ => None,
            };
            match picked.map(|arg| (arg, Constant::of(arg))) {
                // int arguments are converted by the constructor
                Some((_, Some(constant))) => return Constant::Float(constant.value()).into_expr(),
                Some((arg, None)) if args.len() > 1 => return arg.clone(),
                _ => {}
            }
        }
    }
    Expr::Attribute {
        base: Box::new(base),
        accessors,
    }
}

fn zero_of(expr: &Expr, scope: &LexicalScope) -> Option<Expr> {
    scope.deduce_type(expr)?.zero_value()
}

/// A scalar constant equal to `value`, or a splat `vecN(value)`. With
/// `other` given, a splat only counts when `other` is that same `vecN`.
fn is_constant(expr: &Expr, value: f64, other: Option<Option<&Type>>) -> bool {
    if let Some(c) = Constant::of(expr) {
        return c.value() == value;
    }
    let Expr::Call { callee, args } = expr else {
        return false;
    };
    let ty = Type::parse(callee);
    let (Type::Vector(..), [arg]) = (&ty, args.as_slice()) else {
        return false;
    };
    let splat = Constant::of(arg).is_some_and(|c| c.value() == value);
    match other {
        None => splat,
        Some(other) => splat && other == Some(&ty),
    }
}

/// Zero in any shape.
fn is_zero_any(expr: &Expr) -> bool {
    is_constant(expr, 0.0, None)
}

/// Zero that can be dropped next to an operand of type `other`.
fn is_zero_for(expr: &Expr, other: Option<&Type>) -> bool {
    is_constant(expr, 0.0, Some(other))
}

fn is_one_for(expr: &Expr, other: Option<&Type>) -> bool {
    is_constant(expr, 1.0, Some(other))
}

/// No assignments or increments anywhere inside.
fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => true,
        Expr::Assign { .. } => false,
        Expr::Unary { op, operand } => {
            !matches!(
                op,
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
            ) && is_pure(operand)
        }
        Expr::Paren(inner) => is_pure(inner),
        Expr::Call { args, .. } => args.iter().all(is_pure),
        Expr::Attribute { base, accessors } => {
            is_pure(base)
                && accessors.iter().all(|a| match a {
                    Accessor::Index(i) => is_pure(i),
                    Accessor::Field(_) => true,
                })
        }
        Expr::Binary { lhs, rhs, .. } => is_pure(lhs) && is_pure(rhs),
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => is_pure(cond) && is_pure(then_expr) && is_pure(else_expr),
    }
}
