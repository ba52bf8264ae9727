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

use std::slice;

use crate::ast::{build, Accessor, AssignOp, BinOp, Binding, Declaration, Expr, Literal, Stmt, UnaryOp};
use crate::scope::{literal_type, LexicalScope};
use crate::types::Type;

use super::builtins;
use super::engine::{derivative_var_name, DeriveConfig, DeriveError};
use super::shape::{self, component_index, embed_component, lift};

/// Derivative rules for one target variable within one function scope.
///
/// Input trees are only ever read; every result is freshly built.
pub struct Differentiator<'a> {
    target: &'a str,
    target_type: Type,
    scope: &'a LexicalScope,
    return_type: Option<Type>,
    max_depth: usize,
    depth: usize,
}

/// `d(expr)/d(target)` with the default depth guard.
pub fn derive(expr: &Expr, target: &str, scope: &LexicalScope) -> Result<Expr, DeriveError> {
    let target_type = scope.variables.get(target).cloned().ok_or_else(|| {
        DeriveError::invalid(format!("\"{target}\" is used but never declared"), expr)
    })?;
    Differentiator::new(target, target_type, scope, &DeriveConfig::default()).derive_expr(expr)
}

impl<'a> Differentiator<'a> {
    pub fn new(
        target: &'a str,
        target_type: Type,
        scope: &'a LexicalScope,
        config: &DeriveConfig,
    ) -> Self {
        let return_type = scope
            .return_type
            .as_ref()
            .and_then(|ty| shape::resolve(ty, &target_type));
        Self {
            target,
            target_type,
            scope,
            return_type,
            max_depth: config.max_depth,
            depth: 0,
        }
    }

    pub fn target(&self) -> &str {
        self.target
    }

    pub fn target_type(&self) -> &Type {
        &self.target_type
    }

    pub fn scope(&self) -> &LexicalScope {
        self.scope
    }

    /// Derivative type for an expression of type `ty`.
    pub(crate) fn derivative_type(
        &self,
        ty: &Type,
        node: &dyn std::fmt::Display,
    ) -> Result<Type, DeriveError> {
        shape::resolve(ty, &self.target_type).ok_or_else(|| {
            DeriveError::unsupported(
                format!("variables of type \"{ty}\" and \"{}\"", self.target_type),
                node,
            )
        })
    }

    /// Derivative type of a scalar float, the result shape of the scalar
    /// built-ins.
    pub(crate) fn scalar_derivative_type(&self) -> Option<Type> {
        shape::resolve(&Type::FLOAT, &self.target_type)
    }

    fn enter(&mut self, node: &dyn std::fmt::Display) -> Result<(), DeriveError> {
        if self.depth >= self.max_depth {
            return Err(DeriveError::unsupported(
                format!("expressions nested deeper than {} levels", self.max_depth),
                node,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn derive_expr(&mut self, expr: &Expr) -> Result<Expr, DeriveError> {
        self.enter(expr)?;
        let result = self.derive_expr_inner(expr);
        self.depth -= 1;
        result
    }

    fn derive_expr_inner(&mut self, expr: &Expr) -> Result<Expr, DeriveError> {
        match expr {
            Expr::Literal(lit) => Ok(literal_zero(lit)),
            Expr::Var(name) => self.derive_var(name, expr),
            Expr::Paren(inner) => Ok(Expr::Paren(Box::new(self.derive_expr(inner)?))),
            Expr::Call { callee, args } => builtins::derive_call(self, callee, args, expr),
            Expr::Attribute { base, accessors } => self.derive_attribute(base, accessors, expr),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => Ok(build::neg(self.derive_expr(operand)?)),
                UnaryOp::Plus => Ok(build::unary(UnaryOp::Plus, self.derive_expr(operand)?)),
                _ => Err(DeriveError::unsupported(
                    format!("unary \"{}\" expressions", op.symbol()),
                    expr,
                )),
            },
            Expr::Binary { op, lhs, rhs } => self.derive_binary(*op, lhs, rhs, expr),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let ty = self
                    .scope
                    .deduce_type(expr)
                    .and_then(|ty| shape::resolve(&ty, &self.target_type));
                let then_d = lift(self.derive_expr(then_expr)?, ty.as_ref());
                let else_d = lift(self.derive_expr(else_expr)?, ty.as_ref());
                Ok(build::ternary((**cond).clone(), then_d, else_d))
            }
            Expr::Assign { target, op, value } => {
                let (name, dvalue) = self.derive_assignment(target, *op, value, expr)?;
                Ok(build::assign(Expr::Var(name), *op, dvalue))
            }
        }
    }

    fn derive_var(&mut self, name: &str, node: &Expr) -> Result<Expr, DeriveError> {
        if name == self.target {
            return self.target_type.one_value().ok_or_else(|| {
                DeriveError::unsupported(
                    format!("variables of type \"{}\"", self.target_type),
                    node,
                )
            });
        }
        match self.scope.variables.get(name) {
            Some(Type::Named(ty)) if self.scope.attributes.contains_key(ty) => Err(
                DeriveError::unsupported("user-defined data structures", node),
            ),
            Some(Type::Named(ty)) => Err(DeriveError::unsupported(
                format!("variables of type \"{ty}\""),
                node,
            )),
            Some(Type::Array(..)) => Err(DeriveError::unsupported("array index access", node)),
            Some(ty @ Type::Matrix { .. }) => Err(DeriveError::unsupported(
                format!("matrix operands of type \"{ty}\""),
                node,
            )),
            Some(ty) => {
                self.derivative_type(ty, node)?;
                Ok(Expr::Var(derivative_var_name(self.target, name)))
            }
            None => Ok(Expr::Var(derivative_var_name(self.target, name))),
        }
    }

    fn derive_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        node: &Expr,
    ) -> Result<Expr, DeriveError> {
        if matches!(op, BinOp::Mul | BinOp::Div) {
            self.reject_matrix(lhs, node)?;
            self.reject_matrix(rhs, node)?;
        }
        match op {
            BinOp::Mul => {
                let du = self.derive_expr(lhs)?;
                let dv = self.derive_expr(rhs)?;
                Ok(build::add(
                    build::mul(rhs.clone(), du),
                    build::mul(lhs.clone(), dv),
                ))
            }
            BinOp::Div => {
                let du = self.derive_expr(lhs)?;
                let dv = self.derive_expr(rhs)?;
                Ok(build::div(
                    build::sub(build::mul(rhs.clone(), du), build::mul(lhs.clone(), dv)),
                    build::mul(rhs.clone(), rhs.clone()),
                ))
            }
            BinOp::Mod => Err(DeriveError::invalid(
                format!(
                    "multiplicative expressions cannot have an operator of \"{}\"",
                    op.symbol()
                ),
                node,
            )),
            BinOp::Add | BinOp::Sub => {
                let du = self.derive_expr(lhs)?;
                let dv = self.derive_expr(rhs)?;
                Ok(build::binary(op, du, dv))
            }
            _ => {
                let kind = if op.is_comparison() {
                    "relational"
                } else if op.is_logical() {
                    "logical"
                } else if matches!(op, BinOp::Shl | BinOp::Shr) {
                    "shift"
                } else {
                    "bitwise"
                };
                Err(DeriveError::unsupported(format!("{kind} expressions"), node))
            }
        }
    }

    /// Matrix products mix components, so no diagonal derivative exists.
    fn reject_matrix(&self, operand: &Expr, node: &Expr) -> Result<(), DeriveError> {
        match self.scope.deduce_type(operand) {
            Some(ty @ Type::Matrix { .. }) => Err(DeriveError::unsupported(
                format!("matrix operands of type \"{ty}\""),
                node,
            )),
            _ => Ok(()),
        }
    }

    /// Single-component reads are the only accepted accessors. Reading slot
    /// `i` of `V` gives `dV.i` for a scalar target and re-embeds it into slot
    /// `i` of a zero vector for a vector target.
    fn derive_attribute(
        &mut self,
        base: &Expr,
        accessors: &[Accessor],
        node: &Expr,
    ) -> Result<Expr, DeriveError> {
        let mut ty = self.scope.deduce_type(base);
        if let (Some(current @ Type::Matrix { .. }), Some(first)) = (&ty, accessors.first()) {
            self.component_read(current, first, node)?;
        }
        let mut derived = self.derive_expr(base)?;
        for accessor in accessors {
            let current = ty
                .take()
                .ok_or_else(|| DeriveError::unsupported("attribute expressions", node))?;
            let index = self.component_read(&current, accessor, node)?;
            let Type::Vector(scalar, _) = current else {
                return Err(DeriveError::unsupported("attribute expressions", node));
            };
            if !scalar.is_floating() {
                return Err(DeriveError::unsupported(
                    "component access for non-float derivatives",
                    node,
                ));
            }
            let read = build::attribute(derived, vec![accessor.clone()]);
            derived = match &self.target_type {
                Type::Scalar(s) if s.is_floating() => read,
                Type::Vector(s, _) if s.is_floating() => {
                    self.derivative_type(&current, node)?;
                    embed_component(&current, index, read).ok_or_else(|| {
                        DeriveError::invalid("component index out of range", node)
                    })?
                }
                _ => {
                    return Err(DeriveError::unsupported(
                        "component access for non-float derivatives",
                        node,
                    ))
                }
            };
            ty = Some(Type::Scalar(scalar));
        }
        Ok(derived)
    }

    /// Slot read by `accessor` on a value of type `ty`.
    fn component_read(
        &self,
        ty: &Type,
        accessor: &Accessor,
        node: &Expr,
    ) -> Result<usize, DeriveError> {
        let unsupported = |feature: &str| Err(DeriveError::unsupported(feature, node));
        let index = match (ty, accessor) {
            (Type::Matrix { .. }, Accessor::Index(_)) => return unsupported("matrix column access"),
            (Type::Array(..), Accessor::Index(_)) => return unsupported("array index access"),
            (Type::Vector(..), Accessor::Index(Expr::Literal(lit @ Literal::Int(_)))) => {
                lit.as_f64().map(|i| i as usize)
            }
            (Type::Vector(..), Accessor::Index(_)) => {
                return unsupported("variable vector component access")
            }
            (Type::Vector(..), Accessor::Field(name)) => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => component_index(c),
                    _ => return unsupported("swizzling"),
                }
            }
            (Type::Named(_), Accessor::Field(_)) => return unsupported("attribute access"),
            _ => return unsupported("attribute expressions"),
        };
        let size = ty.components().map_or(0, usize::from);
        match index {
            Some(i) if i < size => Ok(i),
            _ => Err(DeriveError::invalid(
                format!("\"{ty}\" has no such component"),
                node,
            )),
        }
    }

    /// Shared by assignments and declaration bindings. Returns the derivative
    /// variable and the derived value.
    fn derive_assignment(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        node: &Expr,
    ) -> Result<(String, Expr), DeriveError> {
        if !matches!(
            op,
            AssignOp::Assign | AssignOp::AddAssign | AssignOp::SubAssign
        ) {
            return Err(DeriveError::unsupported(
                format!("assignments using \"{}\"", op.symbol()),
                node,
            ));
        }
        let Expr::Var(name) = build::strip_parens(target) else {
            return Err(DeriveError::unsupported(
                "assignments to attributes or indices",
                node,
            ));
        };
        if name == self.target {
            return Err(DeriveError::unsupported(
                "assignments to the differentiation variable",
                node,
            ));
        }
        let lhs = self.scope.variables.get(&name).cloned();
        let rhs = self.scope.deduce_type(value);
        if let (Some(lhs), Some(rhs)) = (&lhs, &rhs) {
            let broadcast = op != AssignOp::Assign && matches!(rhs, Type::Scalar(_));
            if !lhs.accepts(rhs) && !broadcast {
                return Err(DeriveError::invalid(
                    format!("tried to set value to a {rhs} but needed a {lhs}"),
                    node,
                ));
            }
        }
        let dtype = match &lhs {
            Some(ty) => Some(self.derivative_type(ty, node)?),
            None => None,
        };
        let dvalue = lift(self.derive_expr(value)?, dtype.as_ref());
        Ok((derivative_var_name(self.target, &name), dvalue))
    }

    fn derive_declaration(
        &mut self,
        decl: &Declaration,
        stmt: &Stmt,
    ) -> Result<Declaration, DeriveError> {
        let dtype = self.derivative_type(&decl.ty, stmt)?;
        let mut bindings = Vec::with_capacity(decl.bindings.len());
        for binding in &decl.bindings {
            if binding.array.is_some() {
                return Err(DeriveError::unsupported("array index access", stmt));
            }
            // a bare binding starts out as zero
            let init = match &binding.init {
                Some(init) => init.clone(),
                None => decl.ty.zero_value().ok_or_else(|| {
                    DeriveError::unsupported(format!("variables of type \"{}\"", decl.ty), stmt)
                })?,
            };
            let assignment = build::assign(Expr::var(&binding.name), AssignOp::Assign, init);
            let Expr::Assign { target, value, .. } = &assignment else {
                return Err(DeriveError::invalid("malformed declaration", stmt));
            };
            let (name, dvalue) =
                self.derive_assignment(target, AssignOp::Assign, value, &assignment)?;
            bindings.push(Binding::new(name, Some(lift(dvalue, Some(&dtype)))));
        }
        Ok(Declaration {
            qualifiers: decl.qualifiers.clone(),
            ty: dtype,
            bindings,
        })
    }

    /// Derivative of one statement; comments derive to nothing.
    pub fn derive_stmt(&mut self, stmt: &Stmt) -> Result<Option<Stmt>, DeriveError> {
        self.enter(stmt)?;
        let result = self.derive_stmt_inner(stmt);
        self.depth -= 1;
        result
    }

    fn derive_stmt_inner(&mut self, stmt: &Stmt) -> Result<Option<Stmt>, DeriveError> {
        let derived = match stmt {
            Stmt::Comment(_) => return Ok(None),
            Stmt::Declaration(decl) => Stmt::Declaration(self.derive_declaration(decl, stmt)?),
            Stmt::Expr(expr @ Expr::Assign { .. }) => Stmt::Expr(self.derive_expr(expr)?),
            Stmt::Expr(_) => {
                return Err(DeriveError::unsupported(
                    "expression statements without assignment",
                    stmt,
                ))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => Stmt::If {
                cond: cond.clone(),
                then_branch: Box::new(self.derive_branch(then_branch)?),
                else_branch: match else_branch {
                    Some(branch) => Some(Box::new(self.derive_branch(branch)?)),
                    None => None,
                },
            },
            Stmt::Return(Some(value)) => {
                if let (Some(found), Some(expected)) =
                    (self.scope.deduce_type(value), self.scope.return_type.as_ref())
                {
                    if !expected.accepts(&found) {
                        return Err(DeriveError::invalid(
                            format!("tried to return a {found} but needed a {expected}"),
                            stmt,
                        ));
                    }
                }
                let derived = self.derive_expr(value)?;
                Stmt::Return(Some(lift(derived, self.return_type.as_ref())))
            }
            Stmt::Return(None) => {
                return Err(DeriveError::invalid(
                    "tried to return nothing from a function with a result",
                    stmt,
                ))
            }
            Stmt::Block(stmts) => Stmt::Block(self.derive_block(stmts)?),
            Stmt::For { .. }
            | Stmt::While { .. }
            | Stmt::Discard
            | Stmt::Break
            | Stmt::Continue => {
                return Err(DeriveError::unsupported(
                    format!("{}s", stmt.kind_name()),
                    stmt,
                ))
            }
        };
        Ok(Some(derived))
    }

    /// Branch bodies always come back as blocks so a lone assignment keeps its
    /// original next to its derivative.
    fn derive_branch(&mut self, stmt: &Stmt) -> Result<Stmt, DeriveError> {
        let stmts = match stmt {
            Stmt::Block(stmts) => stmts.as_slice(),
            other => slice::from_ref(other),
        };
        Ok(Stmt::Block(self.derive_block(stmts)?))
    }

    /// Declarations and assignments keep the original statement next to its
    /// derivative; everything else is replaced by its derivative.
    pub fn derive_block(&mut self, stmts: &[Stmt]) -> Result<Vec<Stmt>, DeriveError> {
        let mut out = Vec::with_capacity(stmts.len() * 2);
        for stmt in stmts {
            let derived = self.derive_stmt(stmt)?;
            match stmt {
                Stmt::Declaration(_) => {
                    out.push(stmt.clone());
                    out.extend(derived);
                }
                Stmt::Expr(Expr::Assign { target, value, .. }) => {
                    if reads_own_target(target, value) {
                        out.extend(derived);
                        out.push(stmt.clone());
                    } else {
                        out.push(stmt.clone());
                        out.extend(derived);
                    }
                }
                _ => out.extend(derived),
            }
        }
        Ok(out)
    }
}

fn literal_zero(lit: &Literal) -> Expr {
    match literal_type(lit) {
        Type::Scalar(s) => Expr::Literal(s.zero()),
        _ => Expr::float(0.0),
    }
}

/// `y = y * x` must see the old `y`, so its derivative goes first.
fn reads_own_target(target: &Expr, value: &Expr) -> bool {
    match build::strip_parens(target) {
        Expr::Var(name) => value.free_vars().contains(name.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_expr;
    use crate::parser;

    fn scope() -> LexicalScope {
        let unit = parser::parse(
            "float f(float x, float y, vec3 u, vec3 v, vec2 p, mat3 m, int n) { return x; }",
        )
        .unwrap();
        LexicalScope::new(&unit).subscope(unit.function("f").unwrap())
    }

    fn d(src: &str, target: &str) -> Result<String, DeriveError> {
        let expr = parser::parse_expr(src).unwrap();
        derive(&expr, target, &scope()).map(|e| compose_expr(&e))
    }

    #[test]
    fn identity_and_other_variables() {
        assert_eq!(d("x", "x").unwrap(), "1.0");
        assert_eq!(d("u", "u").unwrap(), "vec3(1.0)");
        assert_eq!(d("y", "x").unwrap(), "ddx_y");
        assert_eq!(d("2.0", "x").unwrap(), "0.0");
    }

    #[test]
    fn product_and_quotient() {
        assert_eq!(d("x * y", "x").unwrap(), "y * 1.0 + x * ddx_y");
        assert_eq!(
            d("x / y", "x").unwrap(),
            "(y * 1.0 - x * ddx_y) / (y * y)"
        );
    }

    #[test]
    fn linearity_keeps_grouping() {
        assert_eq!(d("x - (y + x)", "x").unwrap(), "1.0 - (ddx_y + 1.0)");
        assert_eq!(d("-x", "x").unwrap(), "-1.0");
    }

    #[test]
    fn ternary_keeps_condition() {
        assert_eq!(d("x > y ? x : y", "x").unwrap(), "x > y ? 1.0 : ddx_y");
    }

    #[test]
    fn component_reads() {
        assert_eq!(d("u.y", "x").unwrap(), "ddx_u.y");
        assert_eq!(d("u.y", "u").unwrap(), "vec3(0.0, vec3(1.0).y, 0.0)");
        assert_eq!(d("u[2]", "x").unwrap(), "ddx_u[2]");
    }

    #[test]
    fn rejected_accessors() {
        let err = d("u.xy", "x").unwrap_err();
        assert!(err.to_string().contains("swizzling"));
        let err = d("m[0]", "x").unwrap_err();
        assert!(err.to_string().contains("matrix column access"));
        let err = d("u[n]", "x").unwrap_err();
        assert!(err.to_string().contains("variable vector component access"));
        let err = d("p.x", "u").unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn matrix_operands_are_unsupported() {
        let err = d("m * u", "u").unwrap_err();
        assert!(err.to_string().contains("matrix operands"), "{err}");
        let err = d("u / m", "x").unwrap_err();
        assert!(err.to_string().contains("matrix operands"), "{err}");
        assert!(d("m", "x").unwrap_err().is_unsupported());
        assert!(d("n", "x").unwrap_err().is_unsupported());
    }

    #[test]
    fn assigning_the_target_is_unsupported() {
        let err = d("x = x * x", "x").unwrap_err();
        assert!(err.to_string().contains("assignments to the differentiation variable"));
        assert!(d("x += y", "x").unwrap_err().is_unsupported());
        assert_eq!(d("y = x * y", "x").unwrap(), "ddx_y = y * 1.0 + x * ddx_y");
    }

    #[test]
    fn modulo_is_invalid() {
        let err = d("x % y", "x").unwrap_err();
        assert!(!err.is_unsupported());
    }

    #[test]
    fn comparison_is_unsupported() {
        let err = d("x < y", "x").unwrap_err();
        assert!(err.to_string().contains("relational expressions"));
    }

    #[test]
    fn depth_guard() {
        let mut src = String::from("x");
        for _ in 0..40 {
            src = format!("({src})");
        }
        let expr = parser::parse_expr(&src).unwrap();
        let scope = scope();
        let mut rules = Differentiator::new(
            "x",
            Type::FLOAT,
            &scope,
            &DeriveConfig { max_depth: 16 },
        );
        let err = rules.derive_expr(&expr).unwrap_err();
        assert!(err.to_string().contains("nested deeper than 16 levels"));
    }

    #[test]
    fn input_is_not_mutated() {
        let expr = parser::parse_expr("x * sin(x) + y / x").unwrap();
        let before = compose_expr(&expr);
        let first = derive(&expr, "x", &scope()).unwrap();
        let second = derive(&expr, "x", &scope()).unwrap();
        assert_eq!(compose_expr(&expr), before);
        assert_eq!(first, second);
    }
}
