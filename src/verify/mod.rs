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

use std::collections::BTreeSet;

use crate::ast::{Accessor, Expr, FunctionDecl, Stmt};
use crate::autodiff::component_index;
use crate::scope::LexicalScope;

/// Structured errors returned by the derivative verifier.
///
/// Any of these means a construct slipped past the per-function isolation
/// boundary, so the whole run is aborted.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    /// A statement kind derivatives never contain.
    #[error("derivative `{function}` contains a {kind}")]
    ForbiddenStatement {
        function: String,
        kind: &'static str,
    },
    /// A read of more than one vector component.
    #[error("derivative `{function}` contains the swizzle `{fragment}`")]
    Swizzle { function: String, fragment: String },
    /// A variable read before any declaration of it is visible.
    #[error("derivative `{function}` uses `{name}` before declaring it")]
    UseBeforeDeclaration { function: String, name: String },
}

/// Check one generated derivative function.
///
/// Conditions of `if` statements and ternaries are copied verbatim from the
/// input and are not inspected for swizzles.
pub fn verify_function(func: &FunctionDecl, scope: &LexicalScope) -> Result<(), VerifyError> {
    let mut visible: BTreeSet<String> = scope.globals.keys().cloned().collect();
    visible.extend(func.params.iter().map(|p| p.name.clone()));
    let checker = Checker { function: &func.name };
    checker.block(&func.body, &mut visible)
}

/// Check every function in `funcs`, stopping at the first violation.
pub fn verify_functions<'a>(
    funcs: impl IntoIterator<Item = &'a FunctionDecl>,
    scope: &LexicalScope,
) -> Result<(), VerifyError> {
    funcs
        .into_iter()
        .try_for_each(|func| verify_function(func, scope))
}

struct Checker<'a> {
    function: &'a str,
}

impl Checker<'_> {
    fn block(&self, stmts: &[Stmt], visible: &mut BTreeSet<String>) -> Result<(), VerifyError> {
        for stmt in stmts {
            self.stmt(stmt, visible)?;
        }
        Ok(())
    }

    /// Nested statements get their own copy of `visible`, so declarations
    /// inside a branch do not leak out of it.
    fn nested(&self, stmt: &Stmt, visible: &BTreeSet<String>) -> Result<(), VerifyError> {
        let mut inner = visible.clone();
        self.stmt(stmt, &mut inner)
    }

    fn stmt(&self, stmt: &Stmt, visible: &mut BTreeSet<String>) -> Result<(), VerifyError> {
        match stmt {
            Stmt::Declaration(decl) => {
                for binding in &decl.bindings {
                    if let Some(init) = &binding.init {
                        self.expr(init, visible, true)?;
                    }
                    visible.insert(binding.name.clone());
                }
                Ok(())
            }
            Stmt::Expr(expr) => self.expr(expr, visible, true),
            Stmt::Return(value) => match value {
                Some(value) => self.expr(value, visible, true),
                None => Ok(()),
            },
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond, visible, false)?;
                self.nested(then_branch, visible)?;
                match else_branch {
                    Some(branch) => self.nested(branch, visible),
                    None => Ok(()),
                }
            }
            Stmt::Block(stmts) => {
                let mut inner = visible.clone();
                self.block(stmts, &mut inner)
            }
            Stmt::Comment(_)
            | Stmt::For { .. }
            | Stmt::While { .. }
            | Stmt::Discard
            | Stmt::Break
            | Stmt::Continue => Err(VerifyError::ForbiddenStatement {
                function: self.function.to_string(),
                kind: stmt.kind_name(),
            }),
        }
    }

    fn expr(
        &self,
        expr: &Expr,
        visible: &BTreeSet<String>,
        check_swizzles: bool,
    ) -> Result<(), VerifyError> {
        for name in expr.free_vars() {
            if !visible.contains(name) {
                return Err(VerifyError::UseBeforeDeclaration {
                    function: self.function.to_string(),
                    name: name.to_string(),
                });
            }
        }
        if check_swizzles {
            if let Some(fragment) = find_swizzle(expr) {
                return Err(VerifyError::Swizzle {
                    function: self.function.to_string(),
                    fragment,
                });
            }
        }
        Ok(())
    }
}

fn is_swizzle(name: &str) -> bool {
    name.len() > 1 && name.len() <= 4 && name.chars().all(|c| component_index(c).is_some())
}

fn find_swizzle(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => None,
        Expr::Attribute { base, accessors } => {
            let here = accessors
                .iter()
                .any(|a| matches!(a, Accessor::Field(name) if is_swizzle(name)));
            if here {
                return Some(expr.to_string());
            }
            find_swizzle(base).or_else(|| {
                accessors.iter().find_map(|a| match a {
                    Accessor::Index(index) => find_swizzle(index),
                    Accessor::Field(_) => None,
                })
            })
        }
        Expr::Call { args, .. } => args.iter().find_map(find_swizzle),
        Expr::Paren(inner) | Expr::Unary { operand: inner, .. } => find_swizzle(inner),
        Expr::Binary { lhs, rhs, .. } => find_swizzle(lhs).or_else(|| find_swizzle(rhs)),
        Expr::Ternary {
            then_expr,
            else_expr,
            ..
        } => find_swizzle(then_expr).or_else(|| find_swizzle(else_expr)),
        Expr::Assign { target, value, .. } => {
            find_swizzle(target).or_else(|| find_swizzle(value))
        }
    }
}
