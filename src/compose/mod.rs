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

//! Source rendering for the GLSL tree.
//!
//! Output is K&R style with four-space indentation. Parentheses come only
//! from `Paren` nodes, so composing a parsed tree and parsing the result
//! yields the same tree.

use std::fmt;

use crate::ast::{
    Accessor, Binding, Declaration, Expr, FunctionDecl, Item, Literal, Param, Stmt, StructDecl,
    TranslationUnit,
};

const INDENT: &str = "    ";

/// Render a whole unit. Functions and structs are separated from their
/// neighbours by a blank line.
pub fn compose(unit: &TranslationUnit) -> String {
    let mut out = String::new();
    let mut prev: Option<&Item> = None;
    for item in &unit.items {
        if let Some(prev) = prev {
            out.push('\n');
            if is_block_item(prev) || is_block_item(item) {
                out.push('\n');
            }
        }
        out.push_str(&compose_item(item));
        prev = Some(item);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn is_block_item(item: &Item) -> bool {
    matches!(item, Item::Function(_) | Item::Struct(_))
}

pub fn compose_item(item: &Item) -> String {
    match item {
        Item::Directive(text) | Item::Comment(text) => text.clone(),
        Item::Struct(decl) => compose_struct(decl),
        Item::Declaration(decl) => format!("{};", compose_declaration(decl)),
        Item::Function(func) => compose_function(func),
    }
}

fn compose_struct(decl: &StructDecl) -> String {
    let mut out = format!("struct {} {{\n", decl.name);
    for field in &decl.fields {
        out.push_str(INDENT);
        out.push_str(&format!("{} {};\n", field.ty, field.names.join(", ")));
    }
    out.push_str("};");
    out
}

pub fn compose_function(func: &FunctionDecl) -> String {
    let params: Vec<String> = func.params.iter().map(compose_param).collect();
    let mut out = format!(
        "{} {}({}) {{\n",
        func.return_type,
        func.name,
        params.join(", ")
    );
    for stmt in &func.body {
        write_stmt(&mut out, stmt, 1);
    }
    out.push('}');
    out
}

fn compose_param(param: &Param) -> String {
    let mut out = String::new();
    for q in &param.qualifiers {
        out.push_str(q);
        out.push(' ');
    }
    out.push_str(&format!("{} {}", param.ty, param.name));
    if let Some(size) = &param.array {
        out.push_str(&format!("[{}]", compose_expr(size)));
    }
    out
}

pub fn compose_declaration(decl: &Declaration) -> String {
    let mut parts: Vec<String> = decl.qualifiers.clone();
    parts.push(decl.ty.to_string());
    let head = parts.join(" ");
    if decl.bindings.is_empty() {
        return head;
    }
    let bindings: Vec<String> = decl.bindings.iter().map(compose_binding).collect();
    format!("{head} {}", bindings.join(", "))
}

fn compose_binding(binding: &Binding) -> String {
    let mut out = binding.name.clone();
    if let Some(size) = &binding.array {
        out.push_str(&format!("[{}]", compose_expr(size)));
    }
    if let Some(init) = &binding.init {
        out.push_str(" = ");
        out.push_str(&compose_expr(init));
    }
    out
}

/// Render one statement at indent level zero, without a trailing newline.
pub fn compose_stmt(stmt: &Stmt) -> String {
    let mut out = String::new();
    write_stmt_inline(&mut out, stmt, 0);
    out
}

fn pad(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    pad(out, level);
    write_stmt_inline(out, stmt, level);
    out.push('\n');
}

/// Write `stmt` starting at the current cursor; nested lines use `level`.
fn write_stmt_inline(out: &mut String, stmt: &Stmt, level: usize) {
    match stmt {
        Stmt::Comment(text) => out.push_str(text),
        Stmt::Declaration(decl) => {
            out.push_str(&compose_declaration(decl));
            out.push(';');
        }
        Stmt::Expr(expr) => {
            out.push_str(&compose_expr(expr));
            out.push(';');
        }
        Stmt::Return(None) => out.push_str("return;"),
        Stmt::Return(Some(value)) => {
            out.push_str("return ");
            out.push_str(&compose_expr(value));
            out.push(';');
        }
        Stmt::Discard => out.push_str("discard;"),
        Stmt::Break => out.push_str("break;"),
        Stmt::Continue => out.push_str("continue;"),
        Stmt::Block(stmts) => write_block(out, stmts, level),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str(&format!("if ({})", compose_expr(cond)));
            write_body(out, then_branch, level);
            if let Some(else_branch) = else_branch {
                if matches!(**then_branch, Stmt::Block(_)) {
                    out.push(' ');
                } else {
                    out.push('\n');
                    pad(out, level);
                }
                out.push_str("else");
                if matches!(**else_branch, Stmt::If { .. }) {
                    out.push(' ');
                    write_stmt_inline(out, else_branch, level);
                } else {
                    write_body(out, else_branch, level);
                }
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            out.push_str("for (");
            match init {
                Some(init) => write_stmt_inline(out, init, level),
                None => out.push(';'),
            }
            if let Some(cond) = cond {
                out.push(' ');
                out.push_str(&compose_expr(cond));
            }
            out.push(';');
            if let Some(step) = step {
                out.push(' ');
                out.push_str(&compose_expr(step));
            }
            out.push(')');
            write_body(out, body, level);
        }
        Stmt::While { cond, body } => {
            out.push_str(&format!("while ({})", compose_expr(cond)));
            write_body(out, body, level);
        }
    }
}

/// Body of a compound statement: blocks open on the same line, anything
/// else goes on its own indented line.
fn write_body(out: &mut String, body: &Stmt, level: usize) {
    match body {
        Stmt::Block(stmts) => {
            out.push(' ');
            write_block(out, stmts, level);
        }
        other => {
            out.push('\n');
            pad(out, level + 1);
            write_stmt_inline(out, other, level + 1);
        }
    }
}

fn write_block(out: &mut String, stmts: &[Stmt], level: usize) {
    out.push_str("{\n");
    for stmt in stmts {
        write_stmt(out, stmt, level + 1);
    }
    pad(out, level);
    out.push('}');
}

pub fn compose_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(Literal::Float(text)) | Expr::Literal(Literal::Int(text)) => {
            out.push_str(text)
        }
        Expr::Literal(Literal::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Var(name) => out.push_str(name),
        Expr::Call { callee, args } => {
            out.push_str(callee);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
        Expr::Attribute { base, accessors } => {
            write_expr(out, base);
            for accessor in accessors {
                match accessor {
                    Accessor::Field(name) => {
                        out.push('.');
                        out.push_str(name);
                    }
                    Accessor::Index(index) => {
                        out.push('[');
                        write_expr(out, index);
                        out.push(']');
                    }
                }
            }
        }
        Expr::Paren(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push(')');
        }
        Expr::Unary { op, operand } if op.is_postfix() => {
            write_expr(out, operand);
            out.push_str(op.symbol());
        }
        Expr::Unary { op, operand } => {
            let inner = compose_expr(operand);
            out.push_str(op.symbol());
            // `- -x` must not collapse into `--x`
            if let (Some(last), Some(first)) = (op.symbol().chars().last(), inner.chars().next()) {
                if last == first && matches!(first, '-' | '+') {
                    out.push(' ');
                }
            }
            out.push_str(&inner);
        }
        Expr::Binary { op, lhs, rhs } => {
            write_expr(out, lhs);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, rhs);
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            write_expr(out, cond);
            out.push_str(" ? ");
            write_expr(out, then_expr);
            out.push_str(" : ");
            write_expr(out, else_expr);
        }
        Expr::Assign { target, op, value } => {
            write_expr(out, target);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, value);
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_expr(self))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_stmt(self))
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_declaration(self))
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_param(self))
    }
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_function(self))
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_item(self))
    }
}

impl fmt::Display for TranslationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;
    use crate::parser;

    #[test]
    fn k_and_r_layout() {
        let unit = parser::parse(
            "float f(float x){float y=x*x;if(y>1.0){return y;}else{return -x;}}",
        )
        .unwrap();
        let expected = "float f(float x) {\n    float y = x * x;\n    if (y > 1.0) {\n        return y;\n    } else {\n        return -x;\n    }\n}\n";
        assert_eq!(compose(&unit), expected);
    }

    #[test]
    fn nested_negation_keeps_a_space() {
        let e = build::neg(build::neg(Expr::var("x")));
        assert_eq!(compose_expr(&e), "- -x");
    }

    #[test]
    fn builders_insert_needed_parens_only() {
        let e = build::mul(
            build::add(Expr::var("a"), Expr::var("b")),
            build::div(Expr::var("c"), Expr::var("d")),
        );
        assert_eq!(compose_expr(&e), "(a + b) * (c / d)");
        let e = build::div(
            build::mul(Expr::var("a"), Expr::var("b")),
            Expr::var("c"),
        );
        assert_eq!(compose_expr(&e), "a * b / c");
    }

    #[test]
    fn for_loop_header() {
        let unit = parser::parse("void f() { for (int i = 0; i < 4; i++) x += 1.0; }").unwrap();
        let text = compose(&unit);
        assert!(text.contains("    for (int i = 0; i < 4; i++)\n        x += 1.0;\n"));
    }
}
