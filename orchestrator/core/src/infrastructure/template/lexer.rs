// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tokenizer for `{{ ... }}` expressions.

use logos::{Logos, Span};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    // === Keywords ===
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    #[token("null")]
    Nil,

    // === Logical operators ===
    #[token("and")]
    #[token("&&")]
    And,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("not")]
    #[token("!")]
    Not,

    // === Literals ===
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    /// Quoted string, quotes stripped, escapes still raw.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    #[regex(r"`[^`]*`", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    String(&'src str),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),

    // === Comparison ===
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,

    // === Arithmetic ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // === Punctuation ===
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    /// End of the enclosing `{{ ... }}` placeholder.
    #[token("}}")]
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Spanned<Token<'_>>>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                span: lexer.span(),
            }),
            Err(()) => {
                return Err(LexError {
                    span: lexer.span(),
                    slice: lexer.slice().to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

/// Byte offset of the first `}}` in `source` that is not inside a string
/// literal. Characters the lexer rejects are stepped over.
pub fn find_close(source: &str) -> Option<usize> {
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        if let Ok(Token::Close) = result {
            return Some(lexer.span().start);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unexpected character(s) '{slice}' at {span:?}")]
pub struct LexError {
    pub span: Span,
    pub slice: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token<'_>> {
        lex(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("true and nil or android"),
            vec![Token::True, Token::And, Token::Nil, Token::Or, Token::Ident("android")]
        );
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            tokens("a != b ! c >= 1"),
            vec![
                Token::Ident("a"),
                Token::NotEq,
                Token::Ident("b"),
                Token::Not,
                Token::Ident("c"),
                Token::GreaterEq,
                Token::Number("1"),
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#""a b" 'c' `d`"#),
            vec![Token::String("a b"), Token::String("c"), Token::String("d")]
        );
        assert_eq!(tokens(r#""say \"hi\"""#), vec![Token::String(r#"say \"hi\""#)]);
    }

    #[test]
    fn test_member_call() {
        assert_eq!(
            tokens("util.Atoi(x)[0]"),
            vec![
                Token::Ident("util"),
                Token::Dot,
                Token::Ident("Atoi"),
                Token::ParenOpen,
                Token::Ident("x"),
                Token::ParenClose,
                Token::BracketOpen,
                Token::Number("0"),
                Token::BracketClose,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("a # b").unwrap_err();
        assert_eq!(err.slice, "#");
    }

    #[test]
    fn test_find_close_skips_string_literals() {
        assert_eq!(find_close(" a }} b }}"), Some(3));
        assert_eq!(find_close(r#" "a}}b" }}"#), Some(8));
        assert_eq!(find_close(" 'x}}' + `y}}` }} tail"), Some(15));
        assert_eq!(find_close(" a # b }}"), Some(7));
        assert_eq!(find_close(" \"a}}b\" "), None);
    }
}
