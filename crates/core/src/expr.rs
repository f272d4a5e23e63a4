// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandboxed expressions
//!
//! A small language for conditions and derived values configured as
//! strings, such as `instances * cpus` or `status >= 500 and not retry`.
//! Expressions are compiled once and evaluated against a JSON object of
//! variables; nothing outside that object is reachable.

use crate::event::values_equal;
use crate::path::{is_ident_char, AttrPath, PathError};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("invalid expression '{source_text}' at {position}: {reason}")]
    Syntax {
        source_text: String,
        position: usize,
        reason: String,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("cannot apply '{op}' to {operand}")]
    Type { op: &'static str, operand: String },
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Integer(i64),
    Str(String),
    Path(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    fn from_symbol(symbol: &str) -> Option<(BinOp, u8)> {
        Some(match symbol {
            "==" => (BinOp::Eq, 3),
            "!=" => (BinOp::Ne, 3),
            "<" => (BinOp::Lt, 4),
            "<=" => (BinOp::Le, 4),
            ">" => (BinOp::Gt, 4),
            ">=" => (BinOp::Ge, 4),
            "+" => (BinOp::Add, 5),
            "-" => (BinOp::Sub, 5),
            "*" => (BinOp::Mul, 6),
            "/" => (BinOp::Div, 6),
            "%" => (BinOp::Rem, 6),
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Or,
    And,
    Binary(BinOp),
}

const OR_POWER: u8 = 1;
const AND_POWER: u8 = 2;
const UNARY_POWER: u8 = 7;

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Var(AttrPath),
    Neg(Box<Node>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
}

/// A compiled expression
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.expression(0)?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against an object of variables
    pub fn eval(&self, variables: &Value) -> Result<Value, ExprError> {
        eval(&self.root, variables)
    }

    /// Evaluate and require a number
    pub fn eval_f64(&self, variables: &Value) -> Result<f64, ExprError> {
        let value = self.eval(variables)?;
        value.as_f64().ok_or_else(|| ExprError::Type {
            op: "number",
            operand: describe(&value),
        })
    }

    /// Evaluate and take the truthiness of the result
    pub fn eval_bool(&self, variables: &Value) -> Result<bool, ExprError> {
        Ok(truthy(&self.eval(variables)?))
    }
}

impl std::str::FromStr for Expr {
    type Err = ExprError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let error = |position: usize, reason: &str| ExprError::Syntax {
        source_text: source.to_string(),
        position,
        reason: reason.to_string(),
    };
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(|n| n.is_ascii_digit())) {
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                pos += 1;
                if pos < chars.len() && (chars[pos] == '+' || chars[pos] == '-') {
                    pos += 1;
                }
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let token = match text.parse::<i64>() {
                Ok(integer) => Token::Integer(integer),
                Err(_) => Token::Number(text.parse::<f64>().map_err(|_| error(start, "malformed number"))?),
            };
            tokens.push((start, token));
            continue;
        }

        if c == '\'' || c == '"' {
            pos += 1;
            let mut text = String::new();
            loop {
                match chars.get(pos) {
                    None => return Err(error(start, "unterminated string")),
                    Some('\\') => {
                        if let Some(escaped) = chars.get(pos + 1) {
                            text.push(*escaped);
                        }
                        pos += 2;
                    }
                    Some(q) if *q == c => {
                        pos += 1;
                        break;
                    }
                    Some(other) => {
                        text.push(*other);
                        pos += 1;
                    }
                }
            }
            tokens.push((start, Token::Str(text)));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while pos < chars.len() {
                if is_ident_char(chars[pos]) {
                    pos += 1;
                } else if chars[pos] == '.' && chars.get(pos + 1).is_some_and(|n| is_ident_char(*n)) {
                    pos += 1;
                } else if chars[pos] == '[' {
                    let mut quote: Option<char> = None;
                    pos += 1;
                    while pos < chars.len() {
                        match (quote, chars[pos]) {
                            (Some(q), ch) if ch == q => quote = None,
                            (Some(_), _) => {}
                            (None, '\'' | '"') => quote = Some(chars[pos]),
                            (None, ']') => break,
                            _ => {}
                        }
                        pos += 1;
                    }
                    if pos >= chars.len() {
                        return Err(error(start, "unterminated '['"));
                    }
                    pos += 1;
                } else {
                    break;
                }
            }
            let word: String = chars[start..pos].iter().collect();
            let token = match word.as_str() {
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "null" | "None" => Token::Null,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Path(word),
            };
            tokens.push((start, token));
            continue;
        }

        let two: String = chars[pos..(pos + 2).min(chars.len())].iter().collect();
        let token = match two.as_str() {
            "&&" => Some(Token::And),
            "||" => Some(Token::Or),
            "==" => Some(Token::Op("==")),
            "!=" => Some(Token::Op("!=")),
            "<=" => Some(Token::Op("<=")),
            ">=" => Some(Token::Op(">=")),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push((start, token));
            pos += 2;
            continue;
        }

        let token = match c {
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '<' => Token::Op("<"),
            '>' => Token::Op(">"),
            '!' => Token::Not,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => return Err(error(start, &format!("unexpected character '{}'", c))),
        };
        tokens.push((start, token));
        pos += 1;
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ExprError {
        let position = self
            .tokens
            .get(self.pos)
            .map_or(self.source.chars().count(), |(offset, _)| *offset);
        ExprError::Syntax {
            source_text: self.source.to_string(),
            position,
            reason: reason.to_string(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn expression(&mut self, min_power: u8) -> Result<Node, ExprError> {
        let mut left = self.prefix()?;

        loop {
            let (power, infix) = match self.peek() {
                Some(Token::Or) => (OR_POWER, Infix::Or),
                Some(Token::And) => (AND_POWER, Infix::And),
                Some(Token::Op(symbol)) => match BinOp::from_symbol(symbol) {
                    Some((op, power)) => (power, Infix::Binary(op)),
                    None => return Err(self.error("unknown operator")),
                },
                _ => break,
            };
            if power <= min_power {
                break;
            }
            self.pos += 1;
            let right = Box::new(self.expression(power)?);
            let left_node = Box::new(left);
            left = match infix {
                Infix::Or => Node::Or(left_node, right),
                Infix::And => Node::And(left_node, right),
                Infix::Binary(op) => Node::Binary(op, left_node, right),
            };
        }

        Ok(left)
    }

    fn prefix(&mut self) -> Result<Node, ExprError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        match token {
            Token::Integer(i) => {
                self.next();
                Ok(Node::Literal(Value::from(i)))
            }
            Token::Number(n) => {
                self.next();
                Ok(Node::Literal(Value::from(n)))
            }
            Token::Str(s) => {
                self.next();
                Ok(Node::Literal(Value::String(s)))
            }
            Token::True => {
                self.next();
                Ok(Node::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.next();
                Ok(Node::Literal(Value::Bool(false)))
            }
            Token::Null => {
                self.next();
                Ok(Node::Literal(Value::Null))
            }
            Token::Path(path) => {
                self.next();
                Ok(Node::Var(AttrPath::parse(&path)?))
            }
            Token::Not => {
                self.next();
                Ok(Node::Not(Box::new(self.expression(UNARY_POWER)?)))
            }
            Token::Op("-") => {
                self.next();
                Ok(Node::Neg(Box::new(self.expression(UNARY_POWER)?)))
            }
            Token::Op("+") => {
                self.next();
                self.expression(UNARY_POWER)
            }
            Token::LParen => {
                self.next();
                let inner = self.expression(0)?;
                if self.next() != Some(Token::RParen) {
                    self.pos -= 1;
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            _ => Err(self.error("expected a value")),
        }
    }
}

fn eval(node: &Node, variables: &Value) -> Result<Value, ExprError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Var(path) => path
            .resolve(variables)
            .cloned()
            .ok_or_else(|| ExprError::UnknownVariable(path.to_string())),
        Node::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, variables)?))),
        Node::Neg(inner) => {
            let value = eval(inner, variables)?;
            if let Some(i) = value.as_i64() {
                if let Some(negated) = i.checked_neg() {
                    return Ok(Value::from(negated));
                }
            }
            match value.as_f64() {
                Some(f) => Ok(float(-f)),
                None => Err(ExprError::Type {
                    op: "-",
                    operand: describe(&value),
                }),
            }
        }
        Node::And(left, right) => {
            Ok(Value::Bool(truthy(&eval(left, variables)?) && truthy(&eval(right, variables)?)))
        }
        Node::Or(left, right) => {
            Ok(Value::Bool(truthy(&eval(left, variables)?) || truthy(&eval(right, variables)?)))
        }
        Node::Binary(op, left, right) => binary(*op, &eval(left, variables)?, &eval(right, variables)?),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let type_error = || ExprError::Type {
        op: op.symbol(),
        operand: format!("{} and {}", describe(left), describe(right)),
    };

    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(left, right))),
        BinOp::Ne => return Ok(Value::Bool(!values_equal(left, right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(type_error()),
                },
            };
            let result = match op {
                BinOp::Lt => ordering == Some(Ordering::Less),
                BinOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                BinOp::Gt => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    if let (BinOp::Add, Value::String(a), Value::String(b)) = (op, left, right) {
        return Ok(Value::String(format!("{}{}", a, b)));
    }

    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        let integer = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Rem if b == 0 => return Err(ExprError::DivisionByZero),
            BinOp::Rem => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = integer {
            return Ok(Value::from(result));
        }
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(type_error());
    };
    match op {
        BinOp::Add => Ok(float(a + b)),
        BinOp::Sub => Ok(float(a - b)),
        BinOp::Mul => Ok(float(a * b)),
        BinOp::Div | BinOp::Rem if b == 0.0 => Err(ExprError::DivisionByZero),
        BinOp::Div => Ok(float(a / b)),
        BinOp::Rem => Ok(float(a % b)),
        _ => Err(type_error()),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}


fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
