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

//! # Example
//! ```
//! use ddx::parser;
//! let unit = parser::parse("float f(float x) { return x * x; }").unwrap();
//! assert_eq!(unit.functions().count(), 1);
//! ```

use chumsky::prelude::*;

use crate::ast::{
    Accessor, AssignOp, BinOp, Binding, Declaration, Expr, FunctionDecl, Item, Param, Stmt,
    StructDecl, StructField, TranslationUnit, UnaryOp,
};
use crate::diagnostics::Diagnostic;
use crate::lexer;
use crate::types::Type;

const RESERVED: &[&str] = &[
    "if", "else", "for", "while", "do", "return", "discard", "break", "continue", "struct",
    "true", "false", "switch", "case", "default",
];

const QUALIFIERS: &[&str] = &[
    "const",
    "in",
    "out",
    "inout",
    "uniform",
    "varying",
    "attribute",
    "buffer",
    "shared",
    "highp",
    "mediump",
    "lowp",
    "precision",
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "invariant",
    "precise",
];

type Err = Simple<char>;

fn kw(s: &'static str) -> impl Parser<char, &'static str, Error = Err> + Clone {
    text::keyword(s).to(s)
}

/// Identifier that is neither a keyword nor a qualifier.
fn name() -> impl Parser<char, String, Error = Err> + Clone {
    text::ident().try_map(|name: String, span| {
        if RESERVED.contains(&name.as_str()) || QUALIFIERS.contains(&name.as_str()) {
            Err(Simple::custom(span, format!("unexpected keyword `{name}`")))
        } else {
            Ok(name)
        }
    })
}

fn qualifier() -> impl Parser<char, String, Error = Err> + Clone {
    text::ident().try_map(|name: String, span| {
        if QUALIFIERS.contains(&name.as_str()) {
            Ok(name)
        } else {
            Err(Simple::custom(span, format!("`{name}` is not a qualifier")))
        }
    })
}

fn comment() -> impl Parser<char, String, Error = Err> + Clone {
    let line = just("//")
        .ignore_then(none_of("\n").repeated().collect::<String>())
        .map(|body| format!("//{}", body.trim_end()));
    let block = just("/*")
        .ignore_then(take_until(just("*/")))
        .map(|(body, _)| format!("/*{}*/", body.into_iter().collect::<String>()));
    line.or(block)
}

fn number() -> impl Parser<char, Expr, Error = Err> + Clone {
    let digit = filter(|c: &char| c.is_ascii_digit());
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(digit.repeated().at_least(1).collect::<String>())
        .map(|((e, sign), digits)| {
            let mut text = String::from(e);
            text.extend(sign);
            text.push_str(&digits);
            text
        });
    let suffix = filter(|c: &char| c.is_ascii_alphanumeric())
        .repeated()
        .collect::<String>();
    filter(|c: &char| c.is_ascii_digit() || *c == '.')
        .repeated()
        .at_least(1)
        .collect::<String>()
        .then(exponent.or_not())
        .then(suffix)
        .try_map(|((mantissa, exponent), suffix), span| {
            let text = format!("{mantissa}{}{suffix}", exponent.unwrap_or_default());
            match lexer::classify_literal(&text) {
                Some(lit) if lit.is_numeric() => Ok(Expr::Literal(lit)),
                _ => Err(Simple::custom(
                    span,
                    format!("invalid numeric literal `{text}`"),
                )),
            }
        })
}

fn binary_level(
    operand: BoxedParser<'static, char, Expr, Err>,
    ops: impl Parser<char, BinOp, Error = Err> + Clone + 'static,
) -> BoxedParser<'static, char, Expr, Err> {
    operand
        .clone()
        .then(ops.padded().then(operand).repeated())
        .foldl(|lhs, (op, rhs)| Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
        .boxed()
}

pub fn expr_parser() -> impl Parser<char, Expr, Error = Err> + Clone {
    recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(',').padded())
            .delimited_by(just('(').padded(), just(')'));

        let call = text::ident()
            .then_ignore(text::whitespace())
            .then(args)
            .try_map(|(callee, args): (String, Vec<Expr>), span| {
                if RESERVED.contains(&callee.as_str()) {
                    Err(Simple::custom(span, format!("unexpected keyword `{callee}`")))
                } else {
                    Ok(Expr::Call { callee, args })
                }
            });

        let boolean = choice((kw("true").to(true), kw("false").to(false)))
            .map(|b| Expr::Literal(crate::ast::Literal::Bool(b)));

        let paren = expr
            .clone()
            .delimited_by(just('(').padded(), just(')'))
            .map(|inner| Expr::Paren(Box::new(inner)));

        let primary = choice((number(), boolean, call, name().map(Expr::Var), paren))
            .padded()
            .boxed();

        #[derive(Clone)]
        enum Postfix {
            Access(Accessor),
            Op(UnaryOp),
        }
        let postfix_op = choice((
            just('.')
                .padded()
                .ignore_then(text::ident())
                .map(|f| Postfix::Access(Accessor::Field(f))),
            expr.clone()
                .delimited_by(just('[').padded(), just(']'))
                .map(|i| Postfix::Access(Accessor::Index(i))),
            just("++").to(Postfix::Op(UnaryOp::PostInc)),
            just("--").to(Postfix::Op(UnaryOp::PostDec)),
        ))
        .padded();
        let postfix = primary
            .then(postfix_op.repeated())
            .foldl(|base, op| match op {
                Postfix::Access(accessor) => match base {
                    Expr::Attribute {
                        base,
                        mut accessors,
                    } => {
                        accessors.push(accessor);
                        Expr::Attribute { base, accessors }
                    }
                    base => Expr::Attribute {
                        base: Box::new(base),
                        accessors: vec![accessor],
                    },
                },
                Postfix::Op(op) => Expr::Unary {
                    op,
                    operand: Box::new(base),
                },
            })
            .boxed();

        let prefix_op = choice((
            just("++").to(UnaryOp::PreInc),
            just("--").to(UnaryOp::PreDec),
            just('-').to(UnaryOp::Neg),
            just('+').to(UnaryOp::Plus),
            just('!').to(UnaryOp::Not),
            just('~').to(UnaryOp::BitNot),
        ))
        .padded();
        let unary = prefix_op
            .repeated()
            .then(postfix)
            .foldr(|op, operand| Expr::Unary {
                op,
                operand: Box::new(operand),
            })
            .boxed();

        let product = binary_level(
            unary,
            choice((
                just('*').to(BinOp::Mul),
                just('/').to(BinOp::Div),
                just('%').to(BinOp::Mod),
            )),
        );
        let sum = binary_level(
            product,
            choice((just('+').to(BinOp::Add), just('-').to(BinOp::Sub))),
        );
        let shift = binary_level(
            sum,
            choice((just("<<").to(BinOp::Shl), just(">>").to(BinOp::Shr))),
        );
        let relational = binary_level(
            shift,
            choice((
                just("<=").to(BinOp::Le),
                just(">=").to(BinOp::Ge),
                just('<').to(BinOp::Lt),
                just('>').to(BinOp::Gt),
            )),
        );
        let equality = binary_level(
            relational,
            choice((just("==").to(BinOp::Eq), just("!=").to(BinOp::Ne))),
        );
        let bit_and = binary_level(equality, just('&').to(BinOp::BitAnd));
        let bit_xor = binary_level(bit_and, just('^').to(BinOp::BitXor));
        let bit_or = binary_level(bit_xor, just('|').to(BinOp::BitOr));
        let and = binary_level(bit_or, just("&&").to(BinOp::And));
        let xor = binary_level(and, just("^^").to(BinOp::Xor));
        let or = binary_level(xor, just("||").to(BinOp::Or));

        let ternary = or
            .then(
                just('?')
                    .padded()
                    .ignore_then(expr.clone())
                    .then_ignore(just(':').padded())
                    .then(expr.clone())
                    .or_not(),
            )
            .map(|(cond, branches)| match branches {
                Some((then_expr, else_expr)) => Expr::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                None => cond,
            })
            .boxed();

        let assign_op = choice((
            just("+=").to(AssignOp::AddAssign),
            just("-=").to(AssignOp::SubAssign),
            just("*=").to(AssignOp::MulAssign),
            just("/=").to(AssignOp::DivAssign),
            just("%=").to(AssignOp::ModAssign),
            just('=').to(AssignOp::Assign),
        ))
        .padded();

        ternary
            .then(assign_op.then(expr).or_not())
            .map(|(target, rhs)| match rhs {
                Some((op, value)) => Expr::Assign {
                    target: Box::new(target),
                    op,
                    value: Box::new(value),
                },
                None => target,
            })
    })
}

fn array_suffix(
    expr: BoxedParser<'static, char, Expr, Err>,
) -> impl Parser<char, Option<Expr>, Error = Err> + Clone {
    expr.or_not().delimited_by(just('[').padded(), just(']').padded())
}

fn declaration(
    expr: BoxedParser<'static, char, Expr, Err>,
) -> impl Parser<char, Declaration, Error = Err> + Clone {
    let binding = name()
        .padded()
        .then(array_suffix(expr.clone()).or_not())
        .then(just('=').padded().ignore_then(expr).or_not())
        .map(|((name, array), init)| Binding {
            name,
            array: array.flatten(),
            init,
        });

    qualifier()
        .padded()
        .repeated()
        .then(name().padded())
        .then(binding.separated_by(just(',').padded()))
        .try_map(|((qualifiers, ty), bindings), span| {
            if bindings.is_empty() && !qualifiers.iter().any(|q| q == "precision") {
                return Err(Simple::custom(span, "declaration without a name"));
            }
            Ok(Declaration {
                qualifiers,
                ty: Type::parse(&ty),
                bindings,
            })
        })
}

fn statement(
    expr: BoxedParser<'static, char, Expr, Err>,
) -> impl Parser<char, Stmt, Error = Err> + Clone {
    recursive(|stmt| {
        let semi = || just(';').padded();
        let cond = expr
            .clone()
            .delimited_by(just('(').padded(), just(')').padded());

        let block = stmt
            .clone()
            .repeated()
            .delimited_by(just('{').padded(), just('}').padded())
            .map(Stmt::Block);

        let if_stmt = kw("if")
            .padded()
            .ignore_then(cond.clone())
            .then(stmt.clone())
            .then(kw("else").padded().ignore_then(stmt.clone()).or_not())
            .map(|((cond, then_branch), else_branch)| Stmt::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            });

        let for_init = choice((
            declaration(expr.clone())
                .then_ignore(semi())
                .map(|d| Some(Box::new(Stmt::Declaration(d)))),
            expr.clone()
                .then_ignore(semi())
                .map(|e| Some(Box::new(Stmt::Expr(e)))),
            semi().to(None),
        ));
        let for_stmt = kw("for")
            .padded()
            .ignore_then(
                for_init
                    .then(expr.clone().or_not())
                    .then_ignore(semi())
                    .then(expr.clone().or_not())
                    .delimited_by(just('(').padded(), just(')').padded()),
            )
            .then(stmt.clone())
            .map(|(((init, cond), step), body)| Stmt::For {
                init,
                cond,
                step,
                body: Box::new(body),
            });

        let while_stmt = kw("while")
            .padded()
            .ignore_then(cond)
            .then(stmt)
            .map(|(cond, body)| Stmt::While {
                cond,
                body: Box::new(body),
            });

        let return_stmt = kw("return")
            .padded()
            .ignore_then(expr.clone().or_not())
            .then_ignore(semi())
            .map(Stmt::Return);

        let jump = choice((
            kw("discard").to(Stmt::Discard),
            kw("break").to(Stmt::Break),
            kw("continue").to(Stmt::Continue),
        ))
        .padded()
        .then_ignore(semi());

        choice((
            comment().map(Stmt::Comment),
            block,
            if_stmt,
            for_stmt,
            while_stmt,
            return_stmt,
            jump,
            declaration(expr.clone())
                .then_ignore(semi())
                .map(Stmt::Declaration),
            expr.then_ignore(semi()).map(Stmt::Expr),
        ))
        .padded()
        .boxed()
    })
}

pub fn parser() -> impl Parser<char, TranslationUnit, Error = Err> {
    let expr = expr_parser().boxed();
    let stmt = statement(expr.clone());

    let directive = just('#')
        .ignore_then(none_of("\n").repeated().collect::<String>())
        .map(|body| Item::Directive(format!("#{}", body.trim_end())));

    let field = name()
        .padded()
        .then(name().padded().separated_by(just(',').padded()).at_least(1))
        .then_ignore(just(';').padded())
        .map(|(ty, names)| StructField {
            ty: Type::parse(&ty),
            names,
        });
    let struct_decl = kw("struct")
        .padded()
        .ignore_then(name().padded())
        .then(
            field
                .repeated()
                .delimited_by(just('{').padded(), just('}').padded()),
        )
        .then_ignore(just(';').padded())
        .map(|(name, fields)| Item::Struct(StructDecl { name, fields }));

    let param = qualifier()
        .padded()
        .repeated()
        .then(name().padded())
        .then(name().padded())
        .then(array_suffix(expr.clone()).or_not())
        .map(|(((qualifiers, ty), name), array)| Param {
            qualifiers,
            ty: Type::parse(&ty),
            name,
            array: array.flatten(),
        });
    let params = choice((
        kw("void").padded().to(Vec::new()),
        param.separated_by(just(',').padded()),
    ))
    .delimited_by(just('(').padded(), just(')').padded());

    let function = name()
        .padded()
        .then(name().padded())
        .then(params)
        .then(
            stmt.repeated()
                .delimited_by(just('{').padded(), just('}').padded()),
        )
        .map(|(((return_type, name), params), body)| {
            Item::Function(FunctionDecl {
                return_type: Type::parse(&return_type),
                name,
                params,
                body,
            })
        });

    let global = declaration(expr)
        .then_ignore(just(';').padded())
        .map(Item::Declaration);

    choice((
        directive,
        comment().map(Item::Comment),
        struct_decl,
        function,
        global,
    ))
    .padded()
    .repeated()
    .then_ignore(end())
    .map(TranslationUnit::new)
}

pub fn parse(input: &str) -> Result<TranslationUnit, Vec<Simple<char>>> {
    parser().parse(input)
}

/// Parse a single expression; surrounding whitespace is allowed.
pub fn parse_expr(input: &str) -> Result<Expr, Vec<Simple<char>>> {
    expr_parser().padded().then_ignore(end()).parse(input)
}

/// Parse with pretty diagnostics instead of raw chumsky errors.
pub fn parse_with_diagnostics(input: &str) -> Result<TranslationUnit, Vec<Diagnostic>> {
    let (unit, errs) = parser().parse_recovery(input);
    match unit {
        Some(unit) if errs.is_empty() => Ok(unit),
        _ if errs.is_empty() => Err(vec![Diagnostic::new(
            input,
            0..input.len(),
            "input could not be parsed",
        )]),
        _ => Err(errs
            .into_iter()
            .map(|e| Diagnostic::from_chumsky(input, e))
            .collect()),
    }
}
