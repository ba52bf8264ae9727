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

//! Derivative shapes.
//!
//! | expression | variable | derivative |
//! |---|---|---|
//! | float | float | float |
//! | float | vecN | vecN (gradient) |
//! | vecN | float | vecN (component-wise) |
//! | vecN | vecN | vecN (diagonal only) |
//!
//! Every other pairing has no derivative the engine can express.

use crate::ast::{Expr, Literal};
use crate::types::Type;

/// Type of `d(expr)/d(var)`, or `None` when the pairing is unsupported.
pub fn resolve(expr_type: &Type, var_type: &Type) -> Option<Type> {
    match (expr_type, var_type) {
        (Type::Scalar(e), Type::Scalar(v)) if e.is_floating() && v.is_floating() => {
            Some(expr_type.clone())
        }
        (Type::Scalar(e), Type::Vector(v, _)) if e.is_floating() && v.is_floating() => {
            Some(var_type.clone())
        }
        (Type::Vector(e, _), Type::Scalar(v)) if e.is_floating() && v.is_floating() => {
            Some(expr_type.clone())
        }
        (Type::Vector(e, n), Type::Vector(v, m)) if e.is_floating() && e == v && n == m => {
            Some(expr_type.clone())
        }
        _ => None,
    }
}

/// Slot addressed by a single swizzle letter (`xyzw`, `rgba` or `stpq`).
pub fn component_index(c: char) -> Option<usize> {
    match c {
        'x' | 'r' | 's' => Some(0),
        'y' | 'g' | 't' => Some(1),
        'z' | 'b' | 'p' => Some(2),
        'w' | 'a' | 'q' => Some(3),
        _ => None,
    }
}

/// `vecN(0.0, .., value, .., 0.0)` with `value` in slot `index`.
pub fn embed_component(vector: &Type, index: usize, value: Expr) -> Option<Expr> {
    let size = usize::from(vector.components()?);
    if index >= size {
        return None;
    }
    let mut args = vec![Expr::float(0.0); size];
    args[index] = value;
    Some(Expr::call(vector.to_string(), args))
}

pub fn is_zero(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(lit @ (Literal::Float(_) | Literal::Int(_))) => lit.as_f64() == Some(0.0),
        Expr::Paren(inner) => is_zero(inner),
        _ => false,
    }
}

/// Widen a scalar zero to the zero of `ty` when `ty` is a vector, so both
/// sides of a declaration, assignment, ternary or return agree in shape.
pub fn lift(expr: Expr, ty: Option<&Type>) -> Expr {
    match ty {
        Some(ty @ Type::Vector(..)) if is_zero(&expr) => ty.zero_value().unwrap_or(expr),
        _ => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_expr;
    use crate::types::Scalar;

    #[test]
    fn resolve_table() {
        let f = Type::FLOAT;
        let v3 = Type::vec(3);
        assert_eq!(resolve(&f, &f), Some(f.clone()));
        assert_eq!(resolve(&f, &v3), Some(v3.clone()));
        assert_eq!(resolve(&v3, &f), Some(v3.clone()));
        assert_eq!(resolve(&v3, &v3), Some(v3.clone()));
    }

    #[test]
    fn resolve_rejects_everything_else() {
        let v3 = Type::vec(3);
        let mat = Type::parse("mat3");
        assert_eq!(resolve(&v3, &Type::vec(2)), None);
        assert_eq!(resolve(&mat, &Type::FLOAT), None);
        assert_eq!(resolve(&Type::FLOAT, &mat), None);
        assert_eq!(resolve(&Type::Vector(Scalar::Int, 3), &Type::FLOAT), None);
        assert_eq!(resolve(&Type::INT, &Type::FLOAT), None);
        assert_eq!(resolve(&Type::Void, &Type::FLOAT), None);
    }

    #[test]
    fn embeds_into_requested_slot() {
        let e = embed_component(&Type::vec(3), 1, Expr::var("d")).unwrap();
        assert_eq!(compose_expr(&e), "vec3(0.0, d, 0.0)");
        assert!(embed_component(&Type::vec(2), 2, Expr::var("d")).is_none());
    }

    #[test]
    fn lifts_scalar_zero_only() {
        let v3 = Type::vec(3);
        assert_eq!(compose_expr(&lift(Expr::float(0.0), Some(&v3))), "vec3(0.0)");
        assert_eq!(compose_expr(&lift(Expr::var("d"), Some(&v3))), "d");
        assert_eq!(compose_expr(&lift(Expr::float(0.0), Some(&Type::FLOAT))), "0.0");
    }
}
