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
use std::fmt;

use tracing::{debug, warn};

use crate::ast::{Binding, Declaration, FunctionDecl, Item, Stmt};
use crate::scope::LexicalScope;
use crate::types::Type;

use super::rules::Differentiator;
use super::shape;

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Errors raised while building one derivative.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeriveError {
    /// A construct the engine does not model. `fragment` is the composed
    /// text of the offending node.
    #[error("support for derivatives involving {feature} such as for \"{fragment}\" is not implemented")]
    Unsupported { feature: String, fragment: String },
    /// The input could not have type-checked.
    #[error("{description}, code cannot compile, cannot continue safely: \n\t{fragment}")]
    Invalid {
        description: String,
        fragment: String,
    },
}

impl DeriveError {
    pub fn unsupported(feature: impl Into<String>, node: &dyn fmt::Display) -> Self {
        DeriveError::Unsupported {
            feature: feature.into(),
            fragment: node.to_string(),
        }
    }

    pub fn invalid(description: impl Into<String>, node: &dyn fmt::Display) -> Self {
        DeriveError::Invalid {
            description: description.into(),
            fragment: node.to_string(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, DeriveError::Unsupported { .. })
    }
}

/// Limits applied while differentiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveConfig {
    /// Deepest expression or statement nesting the rules will recurse into.
    pub max_depth: usize,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Name of the variable holding `d(var)/d(target)`.
pub fn derivative_var_name(target: &str, var: &str) -> String {
    format!("dd{target}_{var}")
}

/// Name of the function computing `d(func)/d(target)`.
pub fn derivative_fn_name(target: &str, func: &str) -> String {
    format!("dd{target}_{func}")
}

/// Outcome of differentiating one function with respect to one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivative {
    Function(FunctionDecl),
    /// The derivative could not be built; rendered as an inert comment.
    Unavailable { name: String, error: DeriveError },
}

impl Derivative {
    pub fn name(&self) -> &str {
        match self {
            Derivative::Function(func) => &func.name,
            Derivative::Unavailable { name, .. } => name,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Derivative::Function(_))
    }

    pub fn into_item(self) -> Item {
        match self {
            Derivative::Function(func) => Item::Function(func),
            Derivative::Unavailable { name, error } => placeholder(&name, &error),
        }
    }
}

/// Comment standing in for a derivative that could not be built.
pub fn placeholder(name: &str, error: &DeriveError) -> Item {
    let message = error.to_string().replace("*/", "* /");
    Item::Comment(format!(
        "/*\n Derivative \"{name}\" not available:\n {message}\n*/"
    ))
}

pub fn derive_function(func: &FunctionDecl, target: &str, scope: &LexicalScope) -> Derivative {
    derive_function_with(func, target, scope, &DeriveConfig::default())
}

/// Differentiate `func` with respect to `target`. Failures never escape: they
/// come back as [`Derivative::Unavailable`].
#[tracing::instrument(
    level = "debug",
    skip(func, scope, config),
    fields(function = %func.name, parameter = %target)
)]
pub fn derive_function_with(
    func: &FunctionDecl,
    target: &str,
    scope: &LexicalScope,
    config: &DeriveConfig,
) -> Derivative {
    let name = derivative_fn_name(target, &func.name);
    match try_derive_function(func, target, scope, config) {
        Ok(derived) => {
            debug!(derivative = %name, statements = derived.body.len(), "derivative built");
            Derivative::Function(derived)
        }
        Err(error) => {
            warn!(
                function = %func.name,
                parameter = %target,
                error = %error,
                "derivative replaced by placeholder"
            );
            Derivative::Unavailable { name, error }
        }
    }
}

struct Signature<'a>(&'a FunctionDecl);

impl fmt::Display for Signature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.0.params.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} {}({})",
            self.0.return_type,
            self.0.name,
            params.join(", ")
        )
    }
}

/// The fallible part of [`derive_function_with`].
pub fn try_derive_function(
    func: &FunctionDecl,
    target: &str,
    scope: &LexicalScope,
    config: &DeriveConfig,
) -> Result<FunctionDecl, DeriveError> {
    let signature = Signature(func);
    let local = scope.subscope(func);
    let target_type = local.variables.get(target).cloned().ok_or_else(|| {
        DeriveError::invalid(
            format!("no variable named \"{target}\" is visible in \"{}\"", func.name),
            &signature,
        )
    })?;
    let return_type = shape::resolve(&func.return_type, &target_type).ok_or_else(|| {
        DeriveError::unsupported(
            format!(
                "variables of type \"{}\" and \"{target_type}\"",
                func.return_type
            ),
            &signature,
        )
    })?;
    let name = derivative_fn_name(target, &func.name);

    if func.param(target).is_none() {
        let zero = return_type.zero_value().ok_or_else(|| {
            DeriveError::unsupported(format!("return type \"{return_type}\""), &signature)
        })?;
        return Ok(FunctionDecl {
            return_type,
            name,
            params: func.params.clone(),
            body: vec![Stmt::Return(Some(zero))],
        });
    }

    let mut body = Vec::new();
    for param in &func.params {
        if param.is_output() {
            return Err(DeriveError::unsupported(
                "output reference parameters",
                param,
            ));
        }
        if param.name != target {
            body.extend(seed(target, &param.name, &param.ty, &target_type));
        }
    }

    for global in referenced_names(&func.body) {
        if local.locals.contains(global) {
            continue;
        }
        match local.globals.get(global) {
            Some(ty) => body.extend(seed(target, global, ty, &target_type)),
            None => {
                return Err(DeriveError::invalid(
                    format!("\"{global}\" is used but never declared"),
                    &signature,
                ))
            }
        }
    }

    let mut rules = Differentiator::new(target, target_type, &local, config);
    body.extend(rules.derive_block(&func.body)?);

    Ok(FunctionDecl {
        return_type,
        name,
        params: func.params.clone(),
        body,
    })
}

/// `T ddx_name = 0;` holding a variable constant while differentiating.
/// Variables without a derivative type get no seed; reading them is rejected
/// by the expression rules.
fn seed(target: &str, name: &str, ty: &Type, target_type: &Type) -> Option<Stmt> {
    let seed_type = shape::resolve(ty, target_type)?;
    let zero = seed_type.zero_value()?;
    Some(Stmt::Declaration(Declaration {
        qualifiers: Vec::new(),
        ty: seed_type,
        bindings: vec![Binding::new(
            derivative_var_name(target, name),
            Some(zero),
        )],
    }))
}

fn referenced_names(body: &[Stmt]) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();
    for stmt in body {
        stmt.walk(&mut |s| {
            for expr in s.exprs() {
                expr.collect_vars(&mut names);
            }
        });
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_function;
    use crate::parser;

    fn derive_src(src: &str, func: &str, target: &str) -> Derivative {
        let unit = parser::parse(src).expect("parse");
        let scope = LexicalScope::new(&unit);
        derive_function(unit.function(func).expect("function"), target, &scope)
    }

    #[test]
    fn seeds_other_parameters() {
        let Derivative::Function(d) = derive_src("float f(float x, float y) { return x * y; }", "f", "x") else {
            panic!("expected a derivative");
        };
        assert_eq!(d.name, "ddx_f");
        let text = compose_function(&d);
        assert!(text.contains("float ddx_y = 0.0;"), "{text}");
        assert!(!text.contains("float ddx_x"), "{text}");
    }

    #[test]
    fn non_parameter_target_returns_zero() {
        let unit = parser::parse("uniform vec3 t; float f(float x) { return x; }").unwrap();
        let scope = LexicalScope::new(&unit);
        let func = unit.function("f").unwrap();
        let Derivative::Function(d) = derive_function(func, "t", &scope) else {
            panic!("expected a derivative");
        };
        assert_eq!(d.return_type, Type::vec(3));
        assert_eq!(d.body, vec![Stmt::Return(Some(Type::vec(3).zero_value().unwrap()))]);
    }

    #[test]
    fn output_parameter_is_unsupported() {
        let d = derive_src("float f(float x, out float y) { y = x; return x; }", "f", "x");
        let Derivative::Unavailable { error, .. } = d else {
            panic!("expected a placeholder");
        };
        assert!(error.to_string().contains("output reference parameters"));
    }

    #[test]
    fn undeclared_name_is_invalid() {
        let d = derive_src("float f(float x) { return x * k; }", "f", "x");
        let Derivative::Unavailable { error, .. } = d else {
            panic!("expected a placeholder");
        };
        assert!(!error.is_unsupported());
    }

    #[test]
    fn placeholder_defuses_comment_terminator() {
        let error = DeriveError::unsupported("swizzling", &"v.xy */ x");
        let Item::Comment(text) = placeholder("ddx_f", &error) else {
            panic!("expected a comment");
        };
        assert!(text.starts_with("/*\n Derivative \"ddx_f\" not available:\n"));
        assert_eq!(text.matches("*/").count(), 1);
        assert!(text.ends_with("\n*/"));
    }
}
