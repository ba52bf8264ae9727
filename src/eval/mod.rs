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

//! Reference interpreter for the GLSL subset.
//!
//! Evaluates functions of a parsed [`TranslationUnit`] on plain `f64`
//! values so generated derivatives can be checked numerically against
//! finite differences. It is deliberately small: no matrices, structs,
//! arrays or textures.

use std::collections::BTreeMap;

use crate::ast::{Accessor, AssignOp, BinOp, Expr, FunctionDecl, Item, Literal, Stmt, TranslationUnit, UnaryOp};
use crate::autodiff::component_index;
use crate::types::{Scalar, Type};

pub mod builtins;
pub mod value;

pub use value::Value;

pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
const MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown variable: {0}")]
    UnknownVar(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("`{name}` takes {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivZero,
    #[error("component {index} out of bounds for {len} components")]
    OutOfBounds { index: i64, len: usize },
    #[error("loop exceeded {0} iterations")]
    IterationLimit(usize),
    #[error("call depth exceeded {0}")]
    RecursionLimit(usize),
    #[error("function `{0}` finished without returning a value")]
    MissingReturn(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

enum Flow {
    Normal,
    Return(Option<Value>),
    Break,
    Continue,
}

/// Lexical frames of one call.
struct Frame {
    scopes: Vec<BTreeMap<String, Value>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            scopes: vec![BTreeMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

pub struct Interpreter<'a> {
    functions: BTreeMap<&'a str, &'a FunctionDecl>,
    globals: BTreeMap<String, Value>,
    max_iterations: usize,
}

impl<'a> Interpreter<'a> {
    /// Interpreter over `unit`. Global declarations with constant
    /// initializers are evaluated up front; the rest start at zero.
    pub fn new(unit: &'a TranslationUnit) -> Self {
        let mut interp = Self {
            functions: unit.functions().map(|f| (f.name.as_str(), f)).collect(),
            globals: BTreeMap::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        };
        for item in &unit.items {
            let Item::Declaration(decl) = item else {
                continue;
            };
            for binding in &decl.bindings {
                let value = binding
                    .init
                    .as_ref()
                    .and_then(|init| interp.eval(init, &mut Frame::new(), 0).ok())
                    .and_then(|v| v.coerce(&decl.ty).ok())
                    .or_else(|| Value::zero(&decl.ty).ok());
                if let Some(value) = value {
                    interp.globals.insert(binding.name.clone(), value);
                }
            }
        }
        interp
    }

    /// Set or override a global such as a uniform.
    pub fn with_global(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_string(), value);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Call function `name` with `args`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.call_at(name, args.to_vec(), 0)
    }

    /// Evaluate a free-standing expression with `vars` in scope.
    pub fn eval_expr(&self, expr: &Expr, vars: &[(&str, Value)]) -> Result<Value, EvalError> {
        let mut frame = Frame::new();
        for (name, value) in vars {
            frame.declare(name, value.clone());
        }
        self.eval(expr, &mut frame, 0)
    }

    fn call_at(&self, name: &str, args: Vec<Value>, depth: usize) -> Result<Value, EvalError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit(MAX_CALL_DEPTH));
        }
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        if func.params.len() != args.len() {
            return Err(EvalError::Arity {
                name: name.to_string(),
                expected: func.params.len(),
                found: args.len(),
            });
        }
        let mut frame = Frame::new();
        for (param, arg) in func.params.iter().zip(args) {
            frame.declare(&param.name, arg.coerce(&param.ty)?);
        }
        match self.exec_block(&func.body, &mut frame, depth)? {
            Flow::Return(Some(value)) => value.coerce(&func.return_type),
            Flow::Return(None) | Flow::Normal if func.return_type == Type::Void => {
                Ok(Value::Int(0))
            }
            _ => Err(EvalError::MissingReturn(name.to_string())),
        }
    }

    fn exec_block(&self, stmts: &[Stmt], frame: &mut Frame, depth: usize) -> Result<Flow, EvalError> {
        frame.push();
        let mut flow = Flow::Normal;
        for stmt in stmts {
            flow = self.exec(stmt, frame, depth)?;
            if !matches!(flow, Flow::Normal) {
                break;
            }
        }
        frame.pop();
        Ok(flow)
    }

    /// Run a branch or loop body in its own scope.
    fn exec_nested(&self, stmt: &Stmt, frame: &mut Frame, depth: usize) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Block(stmts) => self.exec_block(stmts, frame, depth),
            other => self.exec_block(std::slice::from_ref(other), frame, depth),
        }
    }

    fn exec(&self, stmt: &Stmt, frame: &mut Frame, depth: usize) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Comment(_) => Ok(Flow::Normal),
            Stmt::Declaration(decl) => {
                for binding in &decl.bindings {
                    if binding.array.is_some() {
                        return Err(EvalError::Unsupported("arrays".into()));
                    }
                    let value = match &binding.init {
                        Some(init) => self.eval(init, frame, depth)?.coerce(&decl.ty)?,
                        None => Value::zero(&decl.ty)?,
                    };
                    frame.declare(&binding.name, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, frame, depth)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, frame, depth)?.as_bool()? {
                    self.exec_nested(then_branch, frame, depth)
                } else if let Some(branch) = else_branch {
                    self.exec_nested(branch, frame, depth)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                frame.push();
                let result = self.run_loop(init.as_deref(), cond.as_ref(), step.as_ref(), body, frame, depth);
                frame.pop();
                result
            }
            Stmt::While { cond, body } => self.run_loop(None, Some(cond), None, body, frame, depth),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.eval(expr, frame, depth)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Block(stmts) => self.exec_block(stmts, frame, depth),
            Stmt::Discard => Err(EvalError::Unsupported("discard".into())),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn run_loop(
        &self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<Flow, EvalError> {
        if let Some(init) = init {
            self.exec(init, frame, depth)?;
        }
        for _ in 0..self.max_iterations {
            if let Some(cond) = cond {
                if !self.eval(cond, frame, depth)?.as_bool()? {
                    return Ok(Flow::Normal);
                }
            }
            match self.exec_nested(body, frame, depth)? {
                Flow::Break => return Ok(Flow::Normal),
                ret @ Flow::Return(_) => return Ok(ret),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(step) = step {
                self.eval(step, frame, depth)?;
            }
        }
        Err(EvalError::IterationLimit(self.max_iterations))
    }

    fn lookup(&self, name: &str, frame: &Frame) -> Result<Value, EvalError> {
        frame
            .lookup(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| EvalError::UnknownVar(name.to_string()))
    }

    fn eval(&self, expr: &Expr, frame: &mut Frame, depth: usize) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(lit) => literal(lit),
            Expr::Var(name) => self.lookup(name, frame),
            Expr::Paren(inner) => self.eval(inner, frame, depth),
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, frame, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                self.eval_call(callee, args, depth)
            }
            Expr::Attribute { base, accessors } => {
                let mut value = self.eval(base, frame, depth)?;
                for accessor in accessors {
                    let index = match accessor {
                        Accessor::Index(index) => Some(self.eval(index, frame, depth)?),
                        Accessor::Field(_) => None,
                    };
                    value = access(&value, accessor, index)?;
                }
                Ok(value)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => negate(self.eval(operand, frame, depth)?),
                UnaryOp::Plus => self.eval(operand, frame, depth),
                UnaryOp::Not => Ok(Value::Bool(!self.eval(operand, frame, depth)?.as_bool()?)),
                UnaryOp::BitNot => match self.eval(operand, frame, depth)? {
                    Value::Int(v) => Ok(Value::Int(!v)),
                    other => Err(EvalError::TypeError(format!("cannot apply ~ to {other}"))),
                },
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                    let old = self.eval(operand, frame, depth)?;
                    let delta = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
                        BinOp::Add
                    } else {
                        BinOp::Sub
                    };
                    let new = arithmetic(delta, &old, &Value::Int(1))?;
                    self.store(operand, new.clone(), frame)?;
                    Ok(if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) {
                        new
                    } else {
                        old
                    })
                }
            },
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And | BinOp::Or => {
                    let l = self.eval(lhs, frame, depth)?.as_bool()?;
                    if (*op == BinOp::And) != l {
                        return Ok(Value::Bool(l));
                    }
                    Ok(Value::Bool(self.eval(rhs, frame, depth)?.as_bool()?))
                }
                _ => {
                    let l = self.eval(lhs, frame, depth)?;
                    let r = self.eval(rhs, frame, depth)?;
                    binary(*op, &l, &r)
                }
            },
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval(cond, frame, depth)?.as_bool()? {
                    self.eval(then_expr, frame, depth)
                } else {
                    self.eval(else_expr, frame, depth)
                }
            }
            Expr::Assign { target, op, value } => {
                let rhs = self.eval(value, frame, depth)?;
                let new = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign => arithmetic(BinOp::Add, &self.eval(target, frame, depth)?, &rhs)?,
                    AssignOp::SubAssign => arithmetic(BinOp::Sub, &self.eval(target, frame, depth)?, &rhs)?,
                    AssignOp::MulAssign => arithmetic(BinOp::Mul, &self.eval(target, frame, depth)?, &rhs)?,
                    AssignOp::DivAssign => arithmetic(BinOp::Div, &self.eval(target, frame, depth)?, &rhs)?,
                    AssignOp::ModAssign => arithmetic(BinOp::Mod, &self.eval(target, frame, depth)?, &rhs)?,
                };
                self.store(target, new.clone(), frame)?;
                Ok(new)
            }
        }
    }

    fn eval_call(&self, callee: &str, args: Vec<Value>, depth: usize) -> Result<Value, EvalError> {
        match Type::parse(callee) {
            ty @ (Type::Scalar(_) | Type::Vector(..)) => return construct(&ty, &args),
            Type::Matrix { .. } => return Err(EvalError::Unsupported("matrices".into())),
            _ => {}
        }
        if self.functions.contains_key(callee) {
            return self.call_at(callee, args, depth + 1);
        }
        builtins::call(callee, &args)?.ok_or_else(|| EvalError::UnknownFunction(callee.to_string()))
    }

    /// Write `value` through a variable or a single-component access.
    fn store(&self, target: &Expr, value: Value, frame: &mut Frame) -> Result<(), EvalError> {
        match target {
            Expr::Paren(inner) => self.store(inner, value, frame),
            Expr::Var(name) => {
                let slot = frame
                    .lookup_mut(name)
                    .ok_or_else(|| EvalError::UnknownVar(name.to_string()))?;
                let widen = matches!(slot, Value::Float(_));
                *slot = match value {
                    Value::Int(v) if widen => Value::Float(v as f64),
                    v => v,
                };
                Ok(())
            }
            Expr::Attribute { base, accessors } => {
                let (Expr::Var(name), [Accessor::Field(field)]) = (&**base, accessors.as_slice())
                else {
                    return Err(EvalError::Unsupported(format!("assignment to {target}")));
                };
                let index = single_component(field)?;
                let slot = frame
                    .lookup_mut(name)
                    .ok_or_else(|| EvalError::UnknownVar(name.to_string()))?;
                let Value::Vector(c) = slot else {
                    return Err(EvalError::TypeError(format!("{name} is not a vector")));
                };
                let len = c.len();
                let v = value
                    .as_f64()
                    .ok_or_else(|| EvalError::TypeError(format!("cannot store {value} in a component")))?;
                *c.get_mut(index).ok_or(EvalError::OutOfBounds { index: index as i64, len })? = v;
                Ok(())
            }
            other => Err(EvalError::Unsupported(format!("assignment to {other}"))),
        }
    }
}

fn literal(lit: &Literal) -> Result<Value, EvalError> {
    match lit {
        Literal::Bool(b) => Ok(Value::Bool(*b)),
        Literal::Int(_) => lit
            .as_f64()
            .map(|v| Value::Int(v as i64))
            .ok_or_else(|| EvalError::TypeError(format!("bad literal {lit:?}"))),
        Literal::Float(_) => lit
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| EvalError::TypeError(format!("bad literal {lit:?}"))),
    }
}

fn single_component(field: &str) -> Result<usize, EvalError> {
    let mut chars = field.chars();
    match (chars.next().and_then(component_index), chars.next()) {
        (Some(i), None) => Ok(i),
        _ => Err(EvalError::Unsupported(format!("writes through .{field}"))),
    }
}

fn access(value: &Value, accessor: &Accessor, index: Option<Value>) -> Result<Value, EvalError> {
    let Value::Vector(c) = value else {
        return Err(EvalError::TypeError(format!("cannot access components of {value}")));
    };
    let pick = |i: i64| {
        usize::try_from(i)
            .ok()
            .and_then(|i| c.get(i).copied())
            .ok_or(EvalError::OutOfBounds { index: i, len: c.len() })
    };
    match (accessor, index) {
        (Accessor::Index(_), Some(Value::Int(i))) => pick(i).map(Value::Float),
        (Accessor::Index(_), _) => Err(EvalError::TypeError("vector index must be an int".into())),
        (Accessor::Field(name), _) => {
            let picked = name
                .chars()
                .map(|ch| {
                    component_index(ch)
                        .ok_or_else(|| EvalError::TypeError(format!("no component .{name}")))
                        .and_then(|i| pick(i as i64))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match picked.as_slice() {
                [single] => Value::Float(*single),
                _ => Value::Vector(picked),
            })
        }
    }
}

/// Scalar conversion or vector constructor.
fn construct(ty: &Type, args: &[Value]) -> Result<Value, EvalError> {
    match ty {
        Type::Scalar(s) => {
            let [arg] = args else {
                return Err(EvalError::Arity {
                    name: ty.to_string(),
                    expected: 1,
                    found: args.len(),
                });
            };
            let v = match arg {
                Value::Bool(b) => f64::from(u8::from(*b)),
                Value::Vector(c) => c.first().copied().unwrap_or_default(),
                other => other.as_f64().unwrap_or_default(),
            };
            Ok(match s {
                Scalar::Float | Scalar::Double => Value::Float(v),
                Scalar::Int | Scalar::Uint => Value::Int(v as i64),
                Scalar::Bool => Value::Bool(v != 0.0),
            })
        }
        Type::Vector(s, n) if s.is_floating() => {
            let n = usize::from(*n);
            let mut out = Vec::with_capacity(n);
            for arg in args {
                out.extend(arg.components()?);
            }
            match out.as_slice() {
                [single] => Ok(Value::Vector(vec![*single; n])),
                _ if out.len() >= n && !args.is_empty() => {
                    out.truncate(n);
                    Ok(Value::Vector(out))
                }
                _ => Err(EvalError::TypeError(format!(
                    "{ty} needs {n} components, got {}",
                    out.len()
                ))),
            }
        }
        other => Err(EvalError::Unsupported(format!("{other} values"))),
    }
}

fn negate(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Float(v) => Ok(Value::Float(-v)),
        Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
        Value::Vector(c) => Ok(Value::Vector(c.into_iter().map(|v| -v).collect())),
        Value::Bool(_) => Err(EvalError::TypeError("cannot negate a bool".into())),
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if op.is_comparison() {
        return compare(op, l, r);
    }
    match op {
        BinOp::Xor => Ok(Value::Bool(l.as_bool()? != r.as_bool()?)),
        BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Add | BinOp::Sub => arithmetic(op, l, r),
        _ => match (l, r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
                BinOp::Shl => a.wrapping_shl(*b as u32),
                BinOp::Shr => a.wrapping_shr(*b as u32),
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                _ => a ^ b,
            })),
            _ => Err(EvalError::TypeError(format!(
                "operator {} needs ints",
                op.symbol()
            ))),
        },
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if let (BinOp::Eq | BinOp::Ne, Value::Bool(a), Value::Bool(b)) = (op, l, r) {
        return Ok(Value::Bool((a == b) == (op == BinOp::Eq)));
    }
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let equal = l.components()? == r.components()?;
        return Ok(Value::Bool(equal == (op == BinOp::Eq)));
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(EvalError::TypeError(format!(
            "operator {} needs scalars",
            op.symbol()
        )));
    };
    Ok(Value::Bool(match op {
        BinOp::Lt => a < b,
        BinOp::Gt => a > b,
        BinOp::Le => a <= b,
        _ => a >= b,
    }))
}

/// `+ - * / %` with int arithmetic for int pairs and scalar/vector
/// broadcasting otherwise.
fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let v = match op {
            BinOp::Add => a.wrapping_add(*b),
            BinOp::Sub => a.wrapping_sub(*b),
            BinOp::Mul => a.wrapping_mul(*b),
            BinOp::Div => a.checked_div(*b).ok_or(EvalError::DivZero)?,
            BinOp::Mod => a.checked_rem(*b).ok_or(EvalError::DivZero)?,
            _ => return Err(EvalError::Unsupported(format!("operator {}", op.symbol()))),
        };
        return Ok(Value::Int(v));
    }
    let f = |a: f64, b: f64| match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => a - b * (a / b).floor(),
    };
    match (l, r) {
        (Value::Vector(a), Value::Vector(b)) if a.len() == b.len() => Ok(Value::Vector(
            a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect(),
        )),
        (Value::Vector(a), s) => {
            let s = scalar(s)?;
            Ok(Value::Vector(a.iter().map(|x| f(*x, s)).collect()))
        }
        (s, Value::Vector(b)) => {
            let s = scalar(s)?;
            Ok(Value::Vector(b.iter().map(|y| f(s, *y)).collect()))
        }
        (a, b) => Ok(Value::Float(f(scalar(a)?, scalar(b)?))),
    }
}

fn scalar(value: &Value) -> Result<f64, EvalError> {
    value
        .as_f64()
        .ok_or_else(|| EvalError::TypeError(format!("expected a number, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn run(src: &str, func: &str, args: &[Value]) -> Result<Value, EvalError> {
        let unit = parser::parse(src).expect("parse");
        Interpreter::new(&unit).call(func, args)
    }

    #[test]
    fn arithmetic_and_locals() {
        let v = run(
            "float f(float x) { float y = x * x; y += 1.0; return y / 2.0; }",
            "f",
            &[Value::Float(3.0)],
        )
        .unwrap();
        assert_eq!(v, Value::Float(5.0));
    }

    #[test]
    fn vectors_swizzles_and_broadcast() {
        let v = run(
            "vec3 f(vec3 u) { vec3 w = u * 2.0; w.y = 0.5; return w + vec3(u.z, u.yx); }",
            "f",
            &[Value::vec([1.0, 2.0, 3.0])],
        )
        .unwrap();
        assert_eq!(v, Value::vec([5.0, 2.5, 7.0]));
    }

    #[test]
    fn control_flow_and_user_calls() {
        let src = "float sq(float a) { return a * a; }\n\
                   float f(float x) { float s = 0.0; for (int i = 0; i < 4; i++) { if (i == 2) continue; s += sq(x); } return x > 0.0 ? s : -s; }";
        assert_eq!(run(src, "f", &[Value::Float(2.0)]).unwrap(), Value::Float(12.0));
    }

    #[test]
    fn globals_and_overrides() {
        let unit = parser::parse("uniform float t; const float k = 2.0; float f(float x) { return x * k + t; }").unwrap();
        let interp = Interpreter::new(&unit).with_global("t", Value::Float(0.5));
        assert_eq!(interp.call("f", &[Value::Int(1)]).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn runaway_loops_are_capped() {
        let unit = parser::parse("float f(float x) { while (true) { x += 1.0; } return x; }").unwrap();
        let err = Interpreter::new(&unit)
            .with_max_iterations(50)
            .call("f", &[Value::Float(0.0)])
            .unwrap_err();
        assert_eq!(err, EvalError::IterationLimit(50));
    }

    #[test]
    fn errors_are_structured() {
        assert_eq!(
            run("float f(float x) { return y; }", "f", &[Value::Float(1.0)]).unwrap_err(),
            EvalError::UnknownVar("y".into())
        );
        assert_eq!(
            run("int f(int a) { return a / 0; }", "f", &[Value::Int(1)]).unwrap_err(),
            EvalError::DivZero
        );
        assert!(matches!(
            run("float f(float x) { return x; }", "f", &[]).unwrap_err(),
            EvalError::Arity { expected: 1, found: 0, .. }
        ));
    }
}
