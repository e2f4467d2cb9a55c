// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Expression Engine
//!
//! Parses and evaluates the expressions found between `{{` and `}}` in
//! workflow templates.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn templated strings into final configuration values
//!
//! # Grammar
//!
//! ```text
//! ternary    := or ( "?" ternary ":" ternary )?
//! or         := and ( ("||" | "or") and )*
//! and        := equality ( ("&&" | "and") equality )*
//! equality   := comparison ( ("==" | "!=") comparison )*
//! comparison := additive ( ("<" | "<=" | ">" | ">=") additive )*
//! additive   := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/" | "%") unary )*
//! unary      := ("!" | "not" | "-") unary | postfix
//! postfix    := primary ( "." IDENT | "[" ternary "]" | "(" args ")" )*
//! primary    := NUMBER | STRING | true | false | nil | IDENT
//!             | "(" ternary ")" | "[" args "]"
//! ```
//!
//! Values are JSON values. Variables are always strings; `FromJson` turns
//! them into structured values. `+` concatenates as soon as either operand
//! is a string (nil counting as the empty string) and adds numbers
//! otherwise.

use super::lexer::{find_close, lex, Spanned, Token};
use crate::domain::configuration::{ConfigSource, ConfigSourceError};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Namespaces under which every built-in function is also reachable,
/// e.g. `strings.ToUpper(x)`.
const FUNCTION_NAMESPACES: &[&str] = &["util", "strings", "json", "config", "inventory", "runtime"];

const MAX_CONFIG_NESTING: usize = 8;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    List(Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("FromJson: {0}")]
    FromJson(String),

    #[error("ToJson: {0}")]
    ToJson(String),

    #[error("unterminated '{{{{' in '{0}'")]
    Unterminated(String),
}

impl ExpressionError {
    fn syntax(expression: &str, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

pub fn parse(expression: &str) -> Result<Expr, ExpressionError> {
    let tokens = lex(expression).map_err(|e| ExpressionError::syntax(expression, e.to_string()))?;
    if tokens.is_empty() {
        return Err(ExpressionError::syntax(expression, "empty expression"));
    }
    let mut parser = Parser {
        source: expression,
        tokens,
        pos: 0,
    };
    let expr = parser.ternary()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::syntax(
            expression,
            format!("unexpected {:?} at {:?}", extra.token, extra.span),
        ));
    }
    Ok(expr)
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Spanned<Token<'src>>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token<'src>) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'src>) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", expected)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        let message = message.into();
        let at = match self.tokens.get(self.pos) {
            Some(s) => format!("{} near {:?}", message, s.token),
            None => format!("{} at end of expression", message),
        };
        ExpressionError::syntax(self.source, at)
    }

    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon)?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
        ops: &[(Token<'static>, BinaryOp)],
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::and, &[(Token::Or, BinaryOp::Or)])
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::equality, &[(Token::And, BinaryOp::And)])
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            Self::comparison,
            &[(Token::EqEq, BinaryOp::Eq), (Token::NotEq, BinaryOp::NotEq)],
        )
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            Self::additive,
            &[
                (Token::LessEq, BinaryOp::LessEq),
                (Token::GreaterEq, BinaryOp::GreaterEq),
                (Token::Less, BinaryOp::Less),
                (Token::Greater, BinaryOp::Greater),
            ],
        )
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            Self::term,
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
        )
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            Self::unary,
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
        )
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name.to_string()),
                    _ => return Err(self.error("expected member name after '.'")),
                }
            } else if self.eat(&Token::BracketOpen) {
                let index = self.ternary()?;
                self.expect(Token::BracketClose)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::ParenOpen) {
                let args = self.arguments(Token::ParenClose)?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self, close: Token<'src>) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            if self.eat(&close) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(token) = self.advance() else {
            return Err(self.error("expected a value"));
        };
        match token {
            Token::Number(raw) => raw
                .parse::<f64>()
                .map(|n| Expr::Literal(number(n)))
                .map_err(|e| self.error(format!("bad number '{}': {}", raw, e))),
            Token::String(raw) => Ok(Expr::Literal(Value::String(unescape(raw)))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Ident(name.to_string())),
            Token::ParenOpen => {
                let inner = self.ternary()?;
                self.expect(Token::ParenClose)?;
                Ok(inner)
            }
            Token::BracketOpen => Ok(Expr::List(self.arguments(Token::BracketClose)?)),
            other => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {:?}", other)))
            }
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Integral values become JSON integers so they render without a fraction.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Paths visible to the `this()`, `parent()` and `up(n)` helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePaths {
    pub this: String,
    /// Nearest ancestor first.
    pub ancestors: Vec<String>,
}

/// Everything an expression may reference.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    vars: &'a BTreeMap<String, String>,
    config: Option<&'a dyn ConfigSource>,
    role: Option<&'a RolePaths>,
    depth: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(vars: &'a BTreeMap<String, String>) -> Self {
        Self {
            vars,
            config: None,
            role: None,
            depth: 0,
        }
    }

    pub fn with_config(mut self, config: Option<&'a dyn ConfigSource>) -> Self {
        self.config = config;
        self
    }

    pub fn with_role(mut self, role: Option<&'a RolePaths>) -> Self {
        self.role = role;
        self
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        self.vars
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => self
                .vars
                .get(name)
                .map(|v| Value::String(v.clone()))
                .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Member(target, field) => match self.evaluate(target)? {
                Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(ExpressionError::Type(format!(
                    "cannot access '{}' on {}",
                    field,
                    type_name(&other)
                ))),
            },
            Expr::Index(target, index) => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_value(target, index)
            }
            Expr::Call(callee, args) => {
                let name = callee_name(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&name, args)
            }
            Expr::Unary(op, operand) => {
                let value = self.evaluate(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Number(n)) => Ok(number(-n.as_f64().unwrap_or(0.0))),
                    (UnaryOp::Not, other) => Err(ExpressionError::Type(format!(
                        "'!' needs a bool, got {}",
                        type_name(&other)
                    ))),
                    (UnaryOp::Neg, other) => Err(ExpressionError::Type(format!(
                        "'-' needs a number, got {}",
                        type_name(&other)
                    ))),
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                if !expect_bool(self.evaluate(left)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(self.evaluate(right)?, "&&")?))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if expect_bool(self.evaluate(left)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(self.evaluate(right)?, "||")?))
            }
            Expr::Binary(op, left, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(*op, left, right)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if expect_bool(self.evaluate(condition)?, "?:")? {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
        match name {
            "Atoi" => {
                let [v] = arity::<1>(name, args)?;
                let raw = render_value(&v);
                Ok(Value::from(raw.trim().parse::<i64>().unwrap_or_else(|e| {
                    warn!(input = %raw, error = %e, "Atoi: not an integer, using 0");
                    0
                })))
            }
            "Itoa" => {
                let [v] = arity::<1>(name, args)?;
                match v {
                    Value::Number(n) => Ok(Value::String(n.to_string())),
                    other => Err(ExpressionError::Type(format!(
                        "Itoa needs a number, got {}",
                        type_name(&other)
                    ))),
                }
            }
            "TrimQuotes" => {
                let [v] = arity::<1>(name, args)?;
                Ok(Value::String(render_value(&v).trim_matches('"').to_string()))
            }
            "TrimSpace" => {
                let [v] = arity::<1>(name, args)?;
                Ok(Value::String(render_value(&v).trim().to_string()))
            }
            "ToUpper" => {
                let [v] = arity::<1>(name, args)?;
                Ok(Value::String(render_value(&v).to_uppercase()))
            }
            "ToLower" => {
                let [v] = arity::<1>(name, args)?;
                Ok(Value::String(render_value(&v).to_lowercase()))
            }
            "ToJson" => {
                let [v] = arity::<1>(name, args)?;
                serde_json::to_string(&v)
                    .map(Value::String)
                    .map_err(|e| ExpressionError::ToJson(e.to_string()))
            }
            "FromJson" => {
                let [v] = arity::<1>(name, args)?;
                let raw = render_value(&v);
                let parsed = serde_json::from_str::<Value>(&raw)
                    .map_err(|e| ExpressionError::FromJson(format!("{} in '{}'", e, raw)))?;
                debug!(input = %raw, "FromJson");
                Ok(parsed)
            }
            "NewID" => {
                arity::<0>(name, args)?;
                Ok(Value::String(uuid::Uuid::new_v4().to_string()))
            }
            "Split" => {
                let [s, sep] = arity::<2>(name, args)?;
                let (s, sep) = (render_value(&s), render_value(&sep));
                if s.is_empty() {
                    return Ok(Value::Array(Vec::new()));
                }
                Ok(Value::Array(
                    s.split(sep.as_str())
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ))
            }
            "Join" => {
                let [list, sep] = arity::<2>(name, args)?;
                match list {
                    Value::Array(items) => Ok(Value::String(
                        items
                            .iter()
                            .map(render_value)
                            .collect::<Vec<_>>()
                            .join(&render_value(&sep)),
                    )),
                    other => Err(ExpressionError::Type(format!(
                        "Join needs a list, got {}",
                        type_name(&other)
                    ))),
                }
            }
            "PrefixedOverride" => {
                let [varname, prefix] = arity::<2>(name, args)?;
                let (varname, prefix) = (render_value(&varname), render_value(&prefix));
                Ok(Value::String(self.prefixed_override(&varname, &prefix)))
            }
            "GetConfig" => {
                let [path] = arity::<1>(name, args)?;
                Ok(Value::String(self.get_config(&render_value(&path))))
            }
            "DetectorForHost" => {
                let [host] = arity::<1>(name, args)?;
                let result = match self.config {
                    Some(source) => source.detector_for_host(&render_value(&host)),
                    None => Err(no_config_source()),
                };
                Ok(Value::String(result.unwrap_or_else(|e| e.to_payload())))
            }
            "GetRuntimeConfig" => {
                let [component, key] = arity::<2>(name, args)?;
                let result = match self.config {
                    Some(source) => {
                        source.get_runtime_config(&render_value(&component), &render_value(&key))
                    }
                    None => Err(no_config_source()),
                };
                Ok(Value::String(result.unwrap_or_else(|e| e.to_payload())))
            }
            "this" | "parent" | "up" => self.role_path(name, args),
            _ => Err(ExpressionError::UnknownFunction(name.to_string())),
        }
    }

    fn prefixed_override(&self, varname: &str, prefix: &str) -> String {
        let usable = |key: &str| {
            self.vars
                .get(key)
                .filter(|v| v.as_str() != "none" && !v.trim().is_empty())
                .cloned()
        };
        usable(&format!("{}_{}", prefix, varname))
            .or_else(|| usable(varname))
            .unwrap_or_default()
    }

    /// Fetch a configuration payload and resolve any templates it carries
    /// against the same variables.
    fn get_config(&self, path: &str) -> String {
        let Some(source) = self.config else {
            return no_config_source().to_payload();
        };
        let payload = match source.get_config(path) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to get component configuration");
                return e.to_payload();
            }
        };
        if self.depth >= MAX_CONFIG_NESTING {
            return ConfigSourceError::InvalidQuery(format!("{} nests too deeply", path)).to_payload();
        }
        let nested = EvalContext {
            depth: self.depth + 1,
            ..*self
        };
        nested
            .render(&payload)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }

    fn role_path(&self, name: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
        let Some(role) = self.role else {
            return Err(ExpressionError::UnknownFunction(name.to_string()));
        };
        let levels = match name {
            "this" => {
                arity::<0>(name, args)?;
                0
            }
            "parent" => {
                arity::<0>(name, args)?;
                1
            }
            _ => {
                let [n] = arity::<1>(name, args)?;
                n.as_f64()
                    .or_else(|| render_value(&n).trim().parse::<f64>().ok())
                    .ok_or_else(|| ExpressionError::Type("up needs a number".to_string()))?
                    as i64
            }
        };
        if levels <= 0 {
            return Ok(Value::String(role.this.clone()));
        }
        match role.ancestors.get((levels - 1) as usize) {
            Some(path) => Ok(Value::String(path.clone())),
            None => {
                warn!(role = %role.this, levels, "role has no such ancestor");
                Ok(Value::String(String::new()))
            }
        }
    }

    /// Replace every `{{ expression }}` in `template` with its rendered value.
    pub fn render(&self, template: &str) -> Result<String, ExpressionError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = find_close(after).ok_or_else(|| ExpressionError::Unterminated(template.to_string()))?;
            let expr = parse(after[..end].trim())?;
            out.push_str(&render_value(&self.evaluate(&expr)?));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn callee_name(callee: &Expr) -> Result<String, ExpressionError> {
    match callee {
        Expr::Ident(name) => Ok(name.clone()),
        Expr::Member(ns, name) => match ns.as_ref() {
            Expr::Ident(ns) if FUNCTION_NAMESPACES.contains(&ns.as_str()) => Ok(name.clone()),
            Expr::Ident(ns) => Err(ExpressionError::UnknownFunction(format!("{}.{}", ns, name))),
            _ => Err(ExpressionError::Type(format!("'{}' is not callable", name))),
        },
        _ => Err(ExpressionError::Type("expression is not callable".to_string())),
    }
}

fn no_config_source() -> ConfigSourceError {
    ConfigSourceError::Unavailable("no configuration source".to_string())
}

fn arity<const N: usize>(function: &str, args: Vec<Value>) -> Result<[Value; N], ExpressionError> {
    let found = args.len();
    args.try_into().map_err(|_| ExpressionError::Arity {
        function: function.to_string(),
        expected: N,
        found,
    })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn expect_bool(v: Value, op: &str) -> Result<bool, ExpressionError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(ExpressionError::Type(format!(
            "'{}' needs bools, got {}",
            op,
            type_name(&other)
        ))),
    }
}

fn index_value(target: Value, index: Value) -> Result<Value, ExpressionError> {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_f64().unwrap_or(-1.0);
            let len = items.len() as f64;
            let i = if i < 0.0 { len + i } else { i };
            if i < 0.0 || i >= len {
                return Err(ExpressionError::Type(format!("index {} out of range", n)));
            }
            Ok(items[i as usize].clone())
        }
        (Value::Object(map), Value::String(key)) => Ok(map.get(&key).cloned().unwrap_or(Value::Null)),
        (target, index) => Err(ExpressionError::Type(format!(
            "cannot index {} with {}",
            type_name(&target),
            type_name(&index)
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    use BinaryOp::*;
    match op {
        Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => {
                Ok(number(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)))
            }
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (a @ (Value::String(_) | Value::Null), b) | (a, b @ (Value::String(_) | Value::Null)) => {
                Ok(Value::String(format!("{}{}", render_value(&a), render_value(&b))))
            }
            (a, b) => Err(mismatch(op, &a, &b)),
        },
        Sub | Mul | Div | Rem => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(mismatch(op, &left, &right));
            };
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            if matches!(op, Div | Rem) && b == 0.0 {
                return Err(ExpressionError::Type("division by zero".to_string()));
            }
            Ok(number(match op {
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => a % b,
            }))
        }
        Eq => Ok(Value::Bool(values_equal(&left, &right))),
        NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
        Less | LessEq | Greater | GreaterEq => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .unwrap_or(0.0)
                    .partial_cmp(&b.as_f64().unwrap_or(0.0)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| mismatch(op, &left, &right))?;
            Ok(Value::Bool(match op {
                Less => ordering.is_lt(),
                LessEq => ordering.is_le(),
                Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        And | Or => Err(mismatch(op, &left, &right)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn mismatch(op: BinaryOp, a: &Value, b: &Value) -> ExpressionError {
    ExpressionError::Type(format!(
        "'{}' not defined for {} and {}",
        op.symbol(),
        type_name(a),
        type_name(b)
    ))
}

/// Textual form of a value: strings verbatim, nil empty, lists and maps as
/// JSON.
pub fn render_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
