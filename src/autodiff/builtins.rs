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

//! Derivative table for GLSL built-in functions.
//!
//! Each rule receives the call arguments and the call node itself and builds
//! the derivative by substituting into a fixed formula. Calls that are not in
//! [`RULES`] fall back to the chain rule through [`CHAIN_ALIASES`] or a
//! synthetic `dd{x}_{f}` name.

use crate::ast::{build, Expr, UnaryOp};
use crate::types::{Scalar, Type};

use super::engine::{derivative_fn_name, DeriveError};
use super::rules::Differentiator;
use super::shape::lift;

type Rule = fn(&mut Differentiator<'_>, &[Expr], &Expr) -> Result<Expr, DeriveError>;

pub struct BuiltinRule {
    pub name: &'static str,
    /// Accepted argument counts; empty means the rule checks for itself.
    pub arities: &'static [usize],
    pub derive: Rule,
}

pub static RULES: &[BuiltinRule] = &[
    BuiltinRule { name: "sqrt", arities: &[1], derive: derive_sqrt },
    BuiltinRule { name: "log", arities: &[1], derive: derive_log },
    BuiltinRule { name: "pow", arities: &[2], derive: derive_pow },
    BuiltinRule { name: "cos", arities: &[1], derive: derive_cos },
    BuiltinRule { name: "tan", arities: &[1], derive: derive_tan },
    BuiltinRule { name: "asin", arities: &[1], derive: derive_asin },
    BuiltinRule { name: "acos", arities: &[1], derive: derive_acos },
    BuiltinRule { name: "atan", arities: &[1, 2], derive: derive_atan },
    BuiltinRule { name: "abs", arities: &[1], derive: derive_abs },
    BuiltinRule { name: "min", arities: &[2], derive: derive_min },
    BuiltinRule { name: "max", arities: &[2], derive: derive_max },
    BuiltinRule { name: "dot", arities: &[], derive: derive_dot },
    BuiltinRule { name: "normalize", arities: &[1], derive: not_component_wise },
    BuiltinRule { name: "cross", arities: &[2], derive: not_component_wise },
];

/// One-argument functions whose derivative is another known function.
pub static CHAIN_ALIASES: &[(&str, &str)] = &[("length", "normalize"), ("sin", "cos"), ("exp", "exp")];

pub fn lookup(name: &str) -> Option<&'static BuiltinRule> {
    RULES.iter().find(|rule| rule.name == name)
}

fn chain_alias(name: &str) -> Option<&'static str> {
    CHAIN_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
}

fn is_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(lit) => lit.is_numeric(),
        Expr::Paren(inner) => is_constant(inner),
        Expr::Unary {
            op: UnaryOp::Neg | UnaryOp::Plus,
            operand,
        } => is_constant(operand),
        _ => false,
    }
}

/// `d(callee(args))`.
pub fn derive_call(
    rules: &mut Differentiator<'_>,
    callee: &str,
    args: &[Expr],
    node: &Expr,
) -> Result<Expr, DeriveError> {
    match Type::parse(callee) {
        Type::Vector(Scalar::Float, _) if args.iter().all(is_constant) => {
            return Ok(Expr::call(callee, vec![Expr::float(0.0); args.len()]));
        }
        Type::Scalar(_) | Type::Vector(..) | Type::Matrix { .. } => {
            return Err(DeriveError::unsupported("constructors", node));
        }
        _ => {}
    }
    if rules.scope().attributes.contains_key(callee) {
        return Err(DeriveError::unsupported("user-defined data structures", node));
    }

    if let Some(rule) = lookup(callee) {
        if !rule.arities.is_empty() && !rule.arities.contains(&args.len()) {
            return Err(DeriveError::invalid(
                format!("\"{callee}\" cannot take {} arguments", args.len()),
                node,
            ));
        }
        return (rule.derive)(rules, args, node);
    }

    match args {
        [] => {
            let ty = rules.scope().deduce_type(node).ok_or_else(|| {
                DeriveError::invalid(format!("the result type of \"{callee}\" is unknown"), node)
            })?;
            let ty = super::shape::resolve(&ty, rules.target_type()).unwrap_or(ty);
            ty.zero_value().ok_or_else(|| {
                DeriveError::unsupported(format!("functions returning \"{ty}\""), node)
            })
        }
        [u] => {
            let du = rules.derive_expr(u)?;
            let outer = match chain_alias(callee) {
                Some(alias) => alias.to_string(),
                None => derivative_fn_name(rules.target(), callee),
            };
            let vector_arg = matches!(rules.scope().deduce_type(u), Some(Type::Vector(..)));
            if callee == "length" && vector_arg && matches!(rules.target_type(), Type::Scalar(_)) {
                // the gradient of length is a vector, contract it with du
                return Ok(Expr::call(
                    "dot",
                    vec![Expr::call(outer, vec![u.clone()]), du],
                ));
            }
            Ok(build::mul(Expr::call(outer, vec![u.clone()]), du))
        }
        _ => Err(DeriveError::unsupported(
            "user-defined multi-parameter functions",
            node,
        )),
    }
}

fn float(value: f64) -> Expr {
    Expr::float(value)
}

fn call1(name: &str, arg: Expr) -> Expr {
    Expr::call(name, vec![arg])
}

fn derive_sqrt(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::div(du, build::mul(float(2.0), call1("sqrt", u.clone()))))
}

fn derive_log(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::div(du, u.clone()))
}

fn derive_pow(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let (u, v) = (&args[0], &args[1]);
    let du = rules.derive_expr(u)?;
    let dv = rules.derive_expr(v)?;
    let base = build::mul(
        build::mul(
            v.clone(),
            Expr::call("pow", vec![u.clone(), build::sub(v.clone(), float(1.0))]),
        ),
        du,
    );
    let exponent = build::mul(
        build::mul(
            call1("log", u.clone()),
            Expr::call("pow", vec![u.clone(), v.clone()]),
        ),
        dv,
    );
    Ok(build::add(base, exponent))
}

fn derive_cos(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::mul(build::neg(call1("sin", u.clone())), du))
}

fn derive_tan(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::div(
        du,
        Expr::call("pow", vec![call1("cos", u.clone()), float(2.0)]),
    ))
}

/// `sqrt(1.0 - u * u)`
fn unit_root(u: &Expr) -> Expr {
    call1("sqrt", build::sub(float(1.0), build::mul(u.clone(), u.clone())))
}

fn derive_asin(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::div(du, unit_root(u)))
}

fn derive_acos(rules: &mut Differentiator<'_>, args: &[Expr], _: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    let du = rules.derive_expr(u)?;
    Ok(build::div(build::neg(du), unit_root(u)))
}

fn derive_atan(
    rules: &mut Differentiator<'_>,
    args: &[Expr],
    node: &Expr,
) -> Result<Expr, DeriveError> {
    let [u] = args else {
        return Err(DeriveError::unsupported("two-argument atan", node));
    };
    let du = rules.derive_expr(u)?;
    Ok(build::div(
        du,
        build::add(float(1.0), build::mul(u.clone(), u.clone())),
    ))
}

fn is_scalar_float(rules: &Differentiator<'_>, expr: &Expr) -> bool {
    matches!(rules.scope().deduce_type(expr), Some(Type::Scalar(s)) if s.is_floating())
}

fn derive_abs(rules: &mut Differentiator<'_>, args: &[Expr], node: &Expr) -> Result<Expr, DeriveError> {
    let u = &args[0];
    if !is_scalar_float(rules, u) {
        return Err(DeriveError::unsupported("calls to component-wise abs()", node));
    }
    let ty = rules.scalar_derivative_type();
    let du = lift(rules.derive_expr(u)?, ty.as_ref());
    Ok(build::ternary(
        build::gt(u.clone(), float(0.0)),
        du.clone(),
        build::neg(du),
    ))
}

/// `u > v ? pick(du, dv)`; ties take the `else` branch.
fn derive_extremum(
    rules: &mut Differentiator<'_>,
    args: &[Expr],
    node: &Expr,
    larger_first: bool,
) -> Result<Expr, DeriveError> {
    let (u, v) = (&args[0], &args[1]);
    if !is_scalar_float(rules, u) || !is_scalar_float(rules, v) {
        let name = if larger_first { "max" } else { "min" };
        return Err(DeriveError::unsupported(
            format!("calls to component-wise {name}()"),
            node,
        ));
    }
    let ty = rules.scalar_derivative_type();
    let du = lift(rules.derive_expr(u)?, ty.as_ref());
    let dv = lift(rules.derive_expr(v)?, ty.as_ref());
    let cond = build::gt(u.clone(), v.clone());
    Ok(if larger_first {
        build::ternary(cond, du, dv)
    } else {
        build::ternary(cond, dv, du)
    })
}

fn derive_min(rules: &mut Differentiator<'_>, args: &[Expr], node: &Expr) -> Result<Expr, DeriveError> {
    derive_extremum(rules, args, node, false)
}

fn derive_max(rules: &mut Differentiator<'_>, args: &[Expr], node: &Expr) -> Result<Expr, DeriveError> {
    derive_extremum(rules, args, node, true)
}

fn derive_dot(rules: &mut Differentiator<'_>, args: &[Expr], node: &Expr) -> Result<Expr, DeriveError> {
    let [u, v] = args else {
        return Err(DeriveError::invalid("dot product must have two parameters", node));
    };
    let (u_ty, v_ty) = (rules.scope().deduce_type(u), rules.scope().deduce_type(v));
    let (u_ty, v_ty) = match (u_ty, v_ty) {
        (Some(a @ Type::Vector(..)), Some(b @ Type::Vector(..))) => (a, b),
        (Some(a), Some(b)) => {
            if a.is_builtin() && b.is_builtin() {
                return Err(DeriveError::invalid(
                    "dot product must only accept vectors as parameters",
                    node,
                ));
            }
            return Err(DeriveError::unsupported("user-defined data structures", node));
        }
        _ => {
            return Err(DeriveError::invalid(
                "dot product must only accept vectors as parameters",
                node,
            ))
        }
    };
    if !u_ty.is_floating() || !v_ty.is_floating() {
        return Err(DeriveError::unsupported("non-floating point dot products", node));
    }
    if u_ty.components() != v_ty.components() {
        return Err(DeriveError::invalid(
            format!("tried to take the dot product of a {u_ty} and a {v_ty}"),
            node,
        ));
    }
    let du = rules.derive_expr(u)?;
    let dv = rules.derive_expr(v)?;
    match rules.target_type().clone() {
        Type::Vector(..) => {
            rules.derivative_type(&u_ty, node)?;
            Ok(build::add(
                build::mul(u.clone(), dv),
                build::mul(du, v.clone()),
            ))
        }
        _ => Ok(build::add(
            Expr::call("dot", vec![u.clone(), dv]),
            Expr::call("dot", vec![du, v.clone()]),
        )),
    }
}

fn not_component_wise(
    _: &mut Differentiator<'_>,
    _: &[Expr],
    node: &Expr,
) -> Result<Expr, DeriveError> {
    Err(DeriveError::unsupported("non-component-wise functions", node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::derive;
    use crate::compose::compose_expr;
    use crate::parser;
    use crate::scope::LexicalScope;

    fn d(src: &str, target: &str) -> Result<String, DeriveError> {
        let unit = parser::parse(
            "float f(float x, float y, vec3 u, vec3 v, ivec3 n) { return x; }",
        )
        .unwrap();
        let scope = LexicalScope::new(&unit).subscope(unit.function("f").unwrap());
        let expr = parser::parse_expr(src).unwrap();
        derive(&expr, target, &scope).map(|e| compose_expr(&e))
    }

    #[test]
    fn table_is_unique() {
        for (i, rule) in RULES.iter().enumerate() {
            assert!(RULES[i + 1..].iter().all(|other| other.name != rule.name));
            assert!(lookup(rule.name).is_some());
        }
    }

    #[test]
    fn elementary_formulas() {
        assert_eq!(d("sqrt(x)", "x").unwrap(), "1.0 / (2.0 * sqrt(x))");
        assert_eq!(d("log(x)", "x").unwrap(), "1.0 / x");
        assert_eq!(d("cos(x)", "x").unwrap(), "-sin(x) * 1.0");
        assert_eq!(d("tan(x)", "x").unwrap(), "1.0 / pow(cos(x), 2.0)");
        assert_eq!(d("asin(x)", "x").unwrap(), "1.0 / sqrt(1.0 - x * x)");
        assert_eq!(d("acos(x)", "x").unwrap(), "-1.0 / sqrt(1.0 - x * x)");
        assert_eq!(d("atan(x)", "x").unwrap(), "1.0 / (1.0 + x * x)");
    }

    #[test]
    fn pow_has_both_terms() {
        assert_eq!(
            d("pow(x, y)", "x").unwrap(),
            "y * pow(x, y - 1.0) * 1.0 + log(x) * pow(x, y) * ddx_y"
        );
    }

    #[test]
    fn chain_rule_through_aliases_and_synthetic_names() {
        assert_eq!(d("sin(x * y)", "x").unwrap(), "cos(x * y) * (y * 1.0 + x * ddx_y)");
        assert_eq!(d("exp(x)", "x").unwrap(), "exp(x) * 1.0");
        assert_eq!(d("noise(x)", "x").unwrap(), "ddx_noise(x) * 1.0");
        assert_eq!(d("length(u)", "u").unwrap(), "normalize(u) * vec3(1.0)");
        assert_eq!(d("length(u)", "x").unwrap(), "dot(normalize(u), ddx_u)");
    }

    #[test]
    fn piecewise_rules() {
        assert_eq!(d("abs(x)", "x").unwrap(), "x > 0.0 ? 1.0 : -1.0");
        assert_eq!(d("min(x, y)", "x").unwrap(), "x > y ? ddx_y : 1.0");
        assert_eq!(d("max(x, y)", "x").unwrap(), "x > y ? 1.0 : ddx_y");
        let err = d("abs(u)", "x").unwrap_err();
        assert!(err.to_string().contains("component-wise abs()"));
        let err = d("min(u, v)", "x").unwrap_err();
        assert!(err.to_string().contains("component-wise min()"));
        let err = d("max(x, u)", "x").unwrap_err();
        assert!(err.to_string().contains("component-wise max()"));
    }

    #[test]
    fn dot_product_shapes() {
        assert_eq!(d("dot(u, v)", "x").unwrap(), "dot(u, ddx_v) + dot(ddx_u, v)");
        assert_eq!(d("dot(u, v)", "u").unwrap(), "u * ddu_v + vec3(1.0) * v");
        assert!(!d("dot(x, u)", "x").unwrap_err().is_unsupported());
        assert!(d("dot(n, n)", "x").unwrap_err().is_unsupported());
    }

    #[test]
    fn constructors() {
        assert_eq!(d("vec3(1.0, -2.0, 3)", "x").unwrap(), "vec3(0.0, 0.0, 0.0)");
        let err = d("vec3(x, 0.0, 0.0)", "x").unwrap_err();
        assert!(err.to_string().contains("constructors"));
    }

    #[test]
    fn rejected_calls() {
        assert!(d("cross(u, v)", "x").unwrap_err().to_string().contains("non-component-wise"));
        assert!(d("normalize(u)", "x").unwrap_err().is_unsupported());
        assert!(d("smoothstep(0.0, 1.0, x)", "x")
            .unwrap_err()
            .to_string()
            .contains("multi-parameter"));
        assert!(d("atan(x, y)", "x").unwrap_err().is_unsupported());
        assert!(!d("sqrt(x, y)", "x").unwrap_err().is_unsupported());
    }
}
