//! Tree for the procedural GLSL subset.
//!
//! The variant set is closed: every consumer (composer, scope, derivative
//! rules, simplifier, interpreter) matches exhaustively. Nodes carry only the
//! fields they need; no spans are kept because every tree handed to the
//! derivative engine is either parsed or freshly built.

use std::collections::BTreeSet;

use crate::types::Type;

pub mod build;

pub(crate) const PREC_ASSIGN: u8 = 1;
pub(crate) const PREC_TERNARY: u8 = 2;
pub(crate) const PREC_UNARY: u8 = 14;
pub(crate) const PREC_POSTFIX: u8 = 15;
pub(crate) const PREC_PRIMARY: u8 = 16;

/// Literal text is kept verbatim so composing a parsed tree is lossless.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Float(String),
    Int(String),
    Bool(bool),
}

impl Literal {
    pub fn float(value: f64) -> Self {
        Literal::Float(format_float(value))
    }

    pub fn int(value: i64) -> Self {
        Literal::Int(value.to_string())
    }

    /// Numeric value of a float or int literal (suffixes stripped).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Float(text) => text
                .trim_end_matches(|c| matches!(c, 'f' | 'F' | 'l' | 'L'))
                .parse()
                .ok(),
            Literal::Int(text) => {
                let digits = text.trim_end_matches(['u', 'U']);
                if let Some(hex) = digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                {
                    i64::from_str_radix(hex, 16).ok().map(|v| v as f64)
                } else {
                    digits.parse::<i64>().ok().map(|v| v as f64)
                }
            }
            Literal::Bool(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Literal::Bool(_))
    }
}

/// Render a float so that it always reads back as a float literal.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Xor,
    Or,
}

impl BinOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 3,
            BinOp::Xor => 4,
            BinOp::And => 5,
            BinOp::BitOr => 6,
            BinOp::BitXor => 7,
            BinOp::BitAnd => 8,
            BinOp::Eq | BinOp::Ne => 9,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 10,
            BinOp::Shl | BinOp::Shr => 11,
            BinOp::Add | BinOp::Sub => 12,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 13,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::And => "&&",
            BinOp::Xor => "^^",
            BinOp::Or => "||",
        }
    }

    pub fn is_multiplicative(self) -> bool {
        matches!(self, BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_additive(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Xor | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::ModAssign => "%=",
        }
    }
}

/// One step of an attribute chain: `.name` or `[index]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    /// Function call or constructor: `callee(args...)`.
    Call { callee: String, args: Vec<Expr> },
    /// `base.field[index]...`; consecutive accessors share one node.
    Attribute {
        base: Box<Expr>,
        accessors: Vec<Accessor>,
    },
    Paren(Box<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::float(value))
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Literal(_) | Expr::Var(_) | Expr::Call { .. } | Expr::Paren(_) => PREC_PRIMARY,
            Expr::Attribute { .. } => PREC_POSTFIX,
            Expr::Unary { op, .. } if op.is_postfix() => PREC_POSTFIX,
            Expr::Unary { .. } => PREC_UNARY,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Ternary { .. } => PREC_TERNARY,
            Expr::Assign { .. } => PREC_ASSIGN,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::Var(_) => "variable reference",
            Expr::Call { .. } => "invocation",
            Expr::Attribute { .. } => "attribute",
            Expr::Paren(_) => "parenthesized",
            Expr::Unary { .. } => "unary",
            Expr::Binary { .. } => "binary",
            Expr::Ternary { .. } => "ternary",
            Expr::Assign { .. } => "assignment",
        }
    }

    /// Names of every variable this expression reads or writes.
    pub fn free_vars(&self) -> BTreeSet<&str> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    pub(crate) fn collect_vars<'a>(&'a self, vars: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                vars.insert(name.as_str());
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_vars(vars);
                }
            }
            Expr::Attribute { base, accessors } => {
                base.collect_vars(vars);
                for accessor in accessors {
                    if let Accessor::Index(index) = accessor {
                        index.collect_vars(vars);
                    }
                }
            }
            Expr::Paren(inner) | Expr::Unary { operand: inner, .. } => inner.collect_vars(vars),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.collect_vars(vars);
                then_expr.collect_vars(vars);
                else_expr.collect_vars(vars);
            }
            Expr::Assign { target, value, .. } => {
                target.collect_vars(vars);
                value.collect_vars(vars);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub array: Option<Expr>,
    pub init: Option<Expr>,
}

impl Binding {
    pub fn new(name: impl Into<String>, init: Option<Expr>) -> Self {
        Self {
            name: name.into(),
            array: None,
            init,
        }
    }
}

/// `qualifiers type a = 1.0, b;`. A declaration without bindings covers
/// statements such as `precision highp float;`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub qualifiers: Vec<String>,
    pub ty: Type,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Raw comment text including its delimiters.
    Comment(String),
    Declaration(Declaration),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Block(Vec<Stmt>),
    Discard,
    Break,
    Continue,
}

impl Stmt {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Comment(_) => "comment",
            Stmt::Declaration(_) => "declaration",
            Stmt::Expr(_) => "expression statement",
            Stmt::If { .. } => "if statement",
            Stmt::For { .. } => "for loop",
            Stmt::While { .. } => "while loop",
            Stmt::Return(_) => "return statement",
            Stmt::Block(_) => "block",
            Stmt::Discard => "discard statement",
            Stmt::Break => "break statement",
            Stmt::Continue => "continue statement",
        }
    }

    /// Visit this statement and every nested statement, outermost first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Stmt)) {
        visit(self);
        match self {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.walk(visit);
                if let Some(else_branch) = else_branch {
                    else_branch.walk(visit);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    init.walk(visit);
                }
                body.walk(visit);
            }
            Stmt::While { body, .. } => body.walk(visit),
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    stmt.walk(visit);
                }
            }
            Stmt::Comment(_)
            | Stmt::Declaration(_)
            | Stmt::Expr(_)
            | Stmt::Return(_)
            | Stmt::Discard
            | Stmt::Break
            | Stmt::Continue => {}
        }
    }

    /// Expressions held directly by this statement (not by nested statements).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Declaration(decl) => decl
                .bindings
                .iter()
                .flat_map(|b| b.array.iter().chain(b.init.iter()))
                .collect(),
            Stmt::Expr(expr) => vec![expr],
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => vec![cond],
            Stmt::For { cond, step, .. } => cond.iter().chain(step.iter()).collect(),
            Stmt::Return(value) => value.iter().collect(),
            Stmt::Comment(_)
            | Stmt::Block(_)
            | Stmt::Discard
            | Stmt::Break
            | Stmt::Continue => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub qualifiers: Vec<String>,
    pub ty: Type,
    pub name: String,
    pub array: Option<Expr>,
}

impl Param {
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self {
            qualifiers: Vec::new(),
            ty,
            name: name.into(),
            array: None,
        }
    }

    /// `out` and `inout` parameters write back to the caller.
    pub fn is_output(&self) -> bool {
        self.qualifiers.iter().any(|q| q == "out" || q == "inout")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub return_type: Type,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl FunctionDecl {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub ty: Type,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Preprocessor line such as `#version 330`, kept verbatim.
    Directive(String),
    Comment(String),
    Struct(StructDecl),
    Declaration(Declaration),
    Function(FunctionDecl),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
}

impl TranslationUnit {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions().find(|f| f.name == name)
    }
}
