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

use logos::Logos;

use crate::ast::Literal;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[regex(r"//[^\n]*", |lex| lex.slice().to_string())]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| lex.slice().to_string())]
    Comment(String),

    #[regex(r"#[^\n]*", |lex| lex.slice().to_string())]
    Directive(String),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?([fF]|lf|LF)?", |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?([fF]|lf|LF)?", |lex| lex.slice().to_string())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+([fF]|lf|LF)?", |lex| lex.slice().to_string())]
    Float(String),

    #[regex(r"[0-9]+[uU]?", |lex| lex.slice().to_string())]
    #[regex(r"0[xX][0-9a-fA-F]+[uU]?", |lex| lex.slice().to_string())]
    Int(String),

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[-+*/%<>=!&|^~?:;,.(){}\[\]]+", |lex| lex.slice().to_string())]
    Punct(String),
}

pub fn lex(input: &str) -> Vec<Token> {
    Token::lexer(input).filter_map(Result::ok).collect()
}

/// Classify a complete numeric or boolean literal. Returns `None` when the
/// text is not exactly one literal token.
pub fn classify_literal(text: &str) -> Option<Literal> {
    let mut lexer = Token::lexer(text);
    let literal = match lexer.next()? {
        Ok(Token::Float(s)) => Literal::Float(s),
        Ok(Token::Int(s)) => Literal::Int(s),
        Ok(Token::Bool(b)) => Literal::Bool(b),
        _ => return None,
    };
    match lexer.next() {
        None => Some(literal),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_comments_and_numbers() {
        let tokens = lex("/* a */ float x = 1.5e3; // tail");
        assert_eq!(tokens[0], Token::Comment("/* a */".into()));
        assert_eq!(tokens[1], Token::Ident("float".into()));
        assert!(tokens.contains(&Token::Float("1.5e3".into())));
        assert_eq!(tokens.last(), Some(&Token::Comment("// tail".into())));
    }

    #[test]
    fn classifies_literals() {
        assert_eq!(classify_literal("2."), Some(Literal::Float("2.".into())));
        assert_eq!(classify_literal(".5f"), Some(Literal::Float(".5f".into())));
        assert_eq!(classify_literal("0x1Fu"), Some(Literal::Int("0x1Fu".into())));
        assert_eq!(classify_literal("true"), Some(Literal::Bool(true)));
        assert_eq!(classify_literal("1.0 2"), None);
        assert_eq!(classify_literal("x"), None);
    }
}
