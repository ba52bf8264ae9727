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

//! Name and type resolution for one translation unit.
//!
//! A [`LexicalScope`] built from a unit knows its globals, struct layouts and
//! user function return types. [`LexicalScope::subscope`] narrows it to one
//! function: parameters and every local declaration (flattened across nested
//! blocks) become visible and the return type is fixed. The scope is a
//! read-only snapshot; the derivative engine never mutates it.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Accessor, BinOp, Binding, Expr, FunctionDecl, Item, Literal, Stmt, UnaryOp};
use crate::types::{Scalar, Type};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalScope {
    /// Every visible variable and its declared type.
    pub variables: BTreeMap<String, Type>,
    /// Unit-level variables (`uniform`, `const`, plain globals).
    pub globals: BTreeMap<String, Type>,
    /// Struct name to field name to field type.
    pub attributes: BTreeMap<String, BTreeMap<String, Type>>,
    /// User function name to return type.
    pub functions: BTreeMap<String, Type>,
    /// Parameters and locals of the function this scope was narrowed to.
    pub locals: BTreeSet<String>,
    pub return_type: Option<Type>,
}

/// Built-ins whose result has the type of their widest argument.
const GEN_TYPE_BUILTINS: &[&str] = &[
    "radians", "degrees", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh",
    "asinh", "acosh", "atanh", "pow", "exp", "log", "exp2", "log2", "sqrt", "inversesqrt", "abs",
    "sign", "floor", "ceil", "fract", "round", "roundEven", "trunc", "mod", "min", "max", "clamp",
    "mix", "step", "smoothstep", "normalize", "faceforward", "reflect", "refract", "dFdx", "dFdy",
    "fwidth", "transpose", "inverse", "matrixCompMult",
];

const FLOAT_BUILTINS: &[&str] = &["dot", "length", "distance", "determinant", "noise1"];

const COMPARE_BUILTINS: &[&str] = &[
    "lessThan",
    "lessThanEqual",
    "greaterThan",
    "greaterThanEqual",
    "equal",
    "notEqual",
];

fn binding_type(ty: &Type, binding: &Binding) -> Type {
    match &binding.array {
        Some(Expr::Literal(lit)) => Type::Array(
            Box::new(ty.clone()),
            lit.as_f64().map(|n| n as usize),
        ),
        Some(_) => Type::Array(Box::new(ty.clone()), None),
        None => ty.clone(),
    }
}

impl LexicalScope {
    pub fn new(unit: &crate::ast::TranslationUnit) -> Self {
        let mut scope = LexicalScope::default();
        for item in &unit.items {
            match item {
                Item::Declaration(decl) => {
                    for binding in &decl.bindings {
                        let ty = binding_type(&decl.ty, binding);
                        scope.globals.insert(binding.name.clone(), ty.clone());
                        scope.variables.insert(binding.name.clone(), ty);
                    }
                }
                Item::Struct(decl) => {
                    let fields = decl
                        .fields
                        .iter()
                        .flat_map(|f| f.names.iter().map(move |n| (n.clone(), f.ty.clone())))
                        .collect();
                    scope.attributes.insert(decl.name.clone(), fields);
                }
                Item::Function(func) => {
                    scope
                        .functions
                        .insert(func.name.clone(), func.return_type.clone());
                }
                Item::Directive(_) | Item::Comment(_) => {}
            }
        }
        scope
    }

    /// Narrow to `func`: its parameters and locals shadow globals.
    pub fn subscope(&self, func: &FunctionDecl) -> Self {
        let mut scope = self.clone();
        scope.locals.clear();
        scope.return_type = Some(func.return_type.clone());
        for param in &func.params {
            let ty = match &param.array {
                Some(_) => Type::Array(Box::new(param.ty.clone()), None),
                None => param.ty.clone(),
            };
            scope.declare(&param.name, ty);
        }
        for stmt in &func.body {
            stmt.walk(&mut |s| {
                if let Stmt::Declaration(decl) = s {
                    for binding in &decl.bindings {
                        scope.declare(&binding.name, binding_type(&decl.ty, binding));
                    }
                }
            });
        }
        scope
    }

    fn declare(&mut self, name: &str, ty: Type) {
        self.variables.insert(name.to_string(), ty);
        self.locals.insert(name.to_string());
    }

    /// Add one variable to this scope.
    pub fn with_variable(mut self, name: &str, ty: Type) -> Self {
        self.declare(name, ty);
        self
    }

    /// A global that no parameter or local shadows.
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains_key(name) && !self.locals.contains(name)
    }

    pub fn deduce_type(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Literal(lit) => Some(literal_type(lit)),
            Expr::Var(name) => self.variables.get(name).cloned(),
            Expr::Paren(inner) => self.deduce_type(inner),
            Expr::Call { callee, args } => self.deduce_call(callee, args),
            Expr::Attribute { base, accessors } => {
                let mut ty = self.deduce_type(base)?;
                for accessor in accessors {
                    ty = self.access_type(&ty, accessor)?;
                }
                Some(ty)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => Some(Type::BOOL),
                _ => self.deduce_type(operand),
            },
            Expr::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    return Some(Type::BOOL);
                }
                let l = self.deduce_type(lhs)?;
                let r = self.deduce_type(rhs)?;
                match op {
                    BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                        Some(l)
                    }
                    BinOp::Mul => multiply_types(&l, &r),
                    _ => arithmetic_type(&l, &r),
                }
            }
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => self
                .deduce_type(then_expr)
                .or_else(|| self.deduce_type(else_expr)),
            Expr::Assign { target, .. } => self.deduce_type(target),
        }
    }

    fn deduce_call(&self, callee: &str, args: &[Expr]) -> Option<Type> {
        if let Some(ty) = self.functions.get(callee) {
            return Some(ty.clone());
        }
        if self.attributes.contains_key(callee) {
            return Some(Type::Named(callee.to_string()));
        }
        let ty = Type::parse(callee);
        if matches!(
            ty,
            Type::Scalar(_) | Type::Vector(..) | Type::Matrix { .. }
        ) {
            return Some(ty);
        }
        if GEN_TYPE_BUILTINS.contains(&callee) {
            let types: Vec<Type> = args.iter().filter_map(|a| self.deduce_type(a)).collect();
            return types
                .iter()
                .find(|t| !matches!(t, Type::Scalar(_)))
                .or_else(|| types.first())
                .cloned();
        }
        if FLOAT_BUILTINS.contains(&callee) {
            return Some(Type::FLOAT);
        }
        if COMPARE_BUILTINS.contains(&callee) {
            let n = args.first().and_then(|a| self.deduce_type(a))?.components()?;
            return Some(Type::Vector(Scalar::Bool, n));
        }
        match callee {
            "cross" => Some(Type::vec(3)),
            "any" | "all" => Some(Type::BOOL),
            "not" => args.first().and_then(|a| self.deduce_type(a)),
            "texture" | "texture2D" | "textureLod" | "texelFetch" => Some(Type::vec(4)),
            _ => None,
        }
    }

    fn access_type(&self, ty: &Type, accessor: &Accessor) -> Option<Type> {
        match (ty, accessor) {
            (Type::Vector(s, n), Accessor::Field(name)) => {
                let valid = name.len() <= 4
                    && name.chars().all(|c| {
                        crate::autodiff::component_index(c).is_some_and(|i| i < usize::from(*n))
                    });
                if !valid {
                    return None;
                }
                match name.len() {
                    1 => Some(Type::Scalar(*s)),
                    len => u8::try_from(len).ok().map(|len| Type::Vector(*s, len)),
                }
            }
            (Type::Named(name), Accessor::Field(field)) => {
                self.attributes.get(name)?.get(field).cloned()
            }
            (Type::Vector(s, _), Accessor::Index(_)) => Some(Type::Scalar(*s)),
            (Type::Matrix { scalar, rows, .. }, Accessor::Index(_)) => {
                Some(Type::Vector(*scalar, *rows))
            }
            (Type::Array(elem, _), Accessor::Index(_)) => Some((**elem).clone()),
            _ => None,
        }
    }
}

pub fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Float(text) if text.ends_with("lf") || text.ends_with("LF") => {
            Type::Scalar(Scalar::Double)
        }
        Literal::Float(_) => Type::FLOAT,
        Literal::Int(text) if text.ends_with(['u', 'U']) => Type::Scalar(Scalar::Uint),
        Literal::Int(_) => Type::INT,
        Literal::Bool(_) => Type::BOOL,
    }
}

fn promote(a: Scalar, b: Scalar) -> Scalar {
    if a == b {
        a
    } else if a == Scalar::Double || b == Scalar::Double {
        Scalar::Double
    } else if a.is_floating() || b.is_floating() {
        Scalar::Float
    } else {
        a
    }
}

fn with_scalar(ty: &Type, s: Scalar) -> Type {
    match ty {
        Type::Scalar(_) => Type::Scalar(s),
        Type::Vector(_, n) => Type::Vector(s, *n),
        Type::Matrix { cols, rows, .. } => Type::Matrix {
            scalar: s,
            cols: *cols,
            rows: *rows,
        },
        other => other.clone(),
    }
}

/// Component-wise arithmetic with scalar broadcasting.
fn arithmetic_type(l: &Type, r: &Type) -> Option<Type> {
    let s = promote(l.scalar()?, r.scalar()?);
    match (l, r) {
        (Type::Scalar(_), other) | (other, Type::Scalar(_)) => Some(with_scalar(other, s)),
        (Type::Vector(_, n), Type::Vector(_, m)) if n == m => Some(Type::Vector(s, *n)),
        (Type::Matrix { .. }, Type::Matrix { .. }) if l == r => Some(l.clone()),
        _ => None,
    }
}

/// `*` is component-wise except for the linear-algebra products.
fn multiply_types(l: &Type, r: &Type) -> Option<Type> {
    match (l, r) {
        (Type::Matrix { scalar, cols, rows }, Type::Vector(_, n)) if cols == n => {
            Some(Type::Vector(*scalar, *rows))
        }
        (Type::Vector(_, n), Type::Matrix { scalar, rows, cols }) if rows == n => {
            Some(Type::Vector(*scalar, *cols))
        }
        (
            Type::Matrix {
                scalar,
                cols: inner,
                rows,
            },
            Type::Matrix {
                cols, rows: r_rows, ..
            },
        ) if inner == r_rows => Some(Type::Matrix {
            scalar: *scalar,
            cols: *cols,
            rows: *rows,
        }),
        _ => arithmetic_type(l, r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn scope_for(src: &str, func: &str) -> LexicalScope {
        let unit = parser::parse(src).expect("parse");
        let scope = LexicalScope::new(&unit);
        scope.subscope(unit.function(func).expect("function"))
    }

    fn deduce(scope: &LexicalScope, src: &str) -> Option<Type> {
        scope.deduce_type(&parser::parse_expr(src).expect("expr"))
    }

    #[test]
    fn locals_in_nested_blocks_are_visible() {
        let scope = scope_for(
            "float f(float x) { if (x > 0.0) { vec2 p = vec2(x); } return x; }",
            "f",
        );
        assert_eq!(scope.variables.get("p"), Some(&Type::vec(2)));
        assert_eq!(scope.return_type, Some(Type::FLOAT));
    }

    #[test]
    fn parameters_shadow_globals() {
        let scope = scope_for("uniform float t; uniform float k; float f(float t) { return t * k; }", "f");
        assert!(!scope.is_global("t"));
        assert!(scope.is_global("k"));
    }

    #[test]
    fn broadcasting_and_promotion() {
        let scope = scope_for("float f(vec3 v, float s, int n) { return s; }", "f");
        assert_eq!(deduce(&scope, "v * s"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "s * n"), Some(Type::FLOAT));
        assert_eq!(deduce(&scope, "2 * 3"), Some(Type::INT));
        assert_eq!(deduce(&scope, "v.xy"), Some(Type::vec(2)));
        assert_eq!(deduce(&scope, "v.x"), Some(Type::FLOAT));
        assert_eq!(deduce(&scope, "v.q"), None);
        assert_eq!(deduce(&scope, "s > 1.0"), Some(Type::BOOL));
    }

    #[test]
    fn builtin_return_types() {
        let scope = scope_for("float f(vec3 v, float s) { return s; }", "f");
        assert_eq!(deduce(&scope, "sin(v)"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "mix(v, v, s)"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "dot(v, v)"), Some(Type::FLOAT));
        assert_eq!(deduce(&scope, "cross(v, v)"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "mystery(s)"), None);
    }

    #[test]
    fn struct_fields_and_matrix_columns() {
        let scope = scope_for(
            "struct Light { vec3 pos; float power; }; float f(Light l, mat3 m) { return l.power; }",
            "f",
        );
        assert_eq!(deduce(&scope, "l.pos"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "m[0]"), Some(Type::vec(3)));
        assert_eq!(deduce(&scope, "m * l.pos"), Some(Type::vec(3)));
        assert_eq!(
            deduce(&scope, "Light(l.pos, 1.0)"),
            Some(Type::Named("Light".into()))
        );
    }
}
