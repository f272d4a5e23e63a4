// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attribute predicates: `path op value`

use super::FilterError;
use crate::path::AttrPath;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// Characters that may form an operator
pub(crate) const OPERATOR_CHARS: &[char] = &['=', '!', '<', '>', '~'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Regex search anywhere in the value
    Search,
    /// Regex match over the whole value
    FullMatch,
    /// Element of an array, key of a map or substring of a string
    Contains,
}

impl Op {
    fn parse(op: &str) -> Option<Op> {
        Some(match op {
            "=" | "==" => Op::Eq,
            "!=" => Op::Ne,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            "<=" => Op::Le,
            "~=" => Op::Search,
            "~==" => Op::FullMatch,
            "<~" => Op::Contains,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Value(Value),
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub(crate) struct Predicate {
    path: AttrPath,
    op: Op,
    operand: Operand,
}

impl Predicate {
    /// Parse `path op value`. `expression` is only used in error messages.
    pub(crate) fn parse(source: &str, expression: &str) -> Result<Self, FilterError> {
        let syntax = |reason: String| FilterError::Syntax {
            expression: expression.to_string(),
            reason,
        };

        let start = find_operator(source)
            .ok_or_else(|| syntax(format!("attribute '{}' has no operator", source.trim())))?;
        let end = source[start..]
            .find(|c: char| !OPERATOR_CHARS.contains(&c))
            .map_or(source.len(), |offset| start + offset);
        let op_text = &source[start..end];
        let op = Op::parse(op_text).ok_or_else(|| syntax(format!("unknown operator '{}'", op_text)))?;

        let path = AttrPath::parse(&source[..start])?;
        let raw = source[end..].trim();
        if raw.is_empty() {
            return Err(syntax(format!("attribute '{}' has no value", path)));
        }

        let operand = match op {
            Op::Search | Op::FullMatch => {
                let pattern = unquote(raw).unwrap_or(raw);
                let anchored;
                let compiled = if op == Op::FullMatch {
                    anchored = format!("^(?:{})$", pattern);
                    anchored.as_str()
                } else {
                    pattern
                };
                let regex = Regex::new(compiled).map_err(|source| FilterError::Regex {
                    pattern: pattern.to_string(),
                    source,
                })?;
                Operand::Pattern(regex)
            }
            _ => Operand::Value(parse_literal(raw)),
        };

        Ok(Self { path, op, operand })
    }

    /// Evaluate against an event's attribute view. Unresolvable paths never match.
    pub(crate) fn matches(&self, attributes: &Value) -> bool {
        let Some(actual) = self.path.resolve(attributes) else {
            return false;
        };
        match (&self.operand, self.op) {
            (Operand::Pattern(regex), _) => regex.is_match(&text(actual)),
            (Operand::Value(expected), Op::Eq) => loosely_equal(actual, expected),
            (Operand::Value(expected), Op::Ne) => !loosely_equal(actual, expected),
            (Operand::Value(expected), Op::Gt) => compare(actual, expected) == Some(Ordering::Greater),
            (Operand::Value(expected), Op::Ge) => matches!(
                compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (Operand::Value(expected), Op::Lt) => compare(actual, expected) == Some(Ordering::Less),
            (Operand::Value(expected), Op::Le) => {
                matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            (Operand::Value(expected), Op::Contains) => contains(actual, expected),
            (Operand::Value(_), Op::Search | Op::FullMatch) => false,
        }
    }
}

/// Byte offset of the first operator character outside quotes and brackets
fn find_operator(source: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (offset, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 && OPERATOR_CHARS.contains(&c) => return Some(offset),
            _ => {}
        }
    }
    None
}

fn unquote(raw: &str) -> Option<&str> {
    let first = raw.chars().next()?;
    if (first == '\'' || first == '"') && raw.len() >= 2 && raw.ends_with(first) {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

/// Quoted text is a string; otherwise booleans, null and numbers are
/// recognised and anything else is a bare string.
fn parse_literal(raw: &str) -> Value {
    if let Some(text) = unquote(raw) {
        return Value::String(text.to_string());
    }
    match raw {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        "null" | "None" => return Value::Null,
        _ => {}
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::from(integer);
    }
    if let Ok(float) = raw.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(raw.to_string())
}

/// String form used when types differ and for regex matching
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (number(actual), number(expected)) {
        return a == b;
    }
    if std::mem::discriminant(actual) == std::mem::discriminant(expected) {
        return actual == expected;
    }
    text(actual) == text(expected)
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (number(actual), number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => Some(text(actual).cmp(&text(expected))),
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::Object(map) => map.contains_key(&text(expected)),
        Value::String(s) => s.contains(&text(expected)),
        _ => false,
    }
}

#[cfg(test)]
#[path = "predicate_tests.rs"]
mod tests;
