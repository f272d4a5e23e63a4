// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression parsing
//!
//! ```text
//! Expression := Clause (" " Clause)*
//! Clause     := Name ("[" Attrib ("," Attrib)* "]")? (":" Flag)*
//! Flag       := first | last | single | notrace | nth(n[,group]) | after(duration)
//! ```

use super::predicate::{Predicate, OPERATOR_CHARS};
use super::FilterError;
use crate::event::Event;
use crate::path::is_ident_char;
use std::time::Duration;

/// How a matching event reaches the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Every,
    First,
    Last,
    Single,
    After(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Nth {
    pub(crate) n: u64,
    /// Counter shared by every clause naming the same group
    pub(crate) counter: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Clause {
    /// Source text, also the key of the `single` latch
    pub(crate) text: String,
    /// `None` matches any event
    pub(crate) event: Option<String>,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) mode: Mode,
    pub(crate) nth: Option<Nth>,
    pub(crate) notrace: bool,
}

impl Clause {
    /// Name and attribute match; trace scope is checked by the session
    pub(crate) fn matches(&self, event: &Event) -> bool {
        if let Some(name) = &self.event {
            if !event.is_a(name) {
                return false;
            }
        }
        if self.predicates.is_empty() {
            return true;
        }
        let attributes = event.attributes();
        self.predicates.iter().all(|p| p.matches(attributes))
    }
}

pub(crate) fn parse_expression(expression: &str) -> Result<Vec<Clause>, FilterError> {
    let parts = split_top_level(expression, char::is_whitespace, true, expression)?;
    if parts.is_empty() {
        return Err(syntax(expression, "empty expression"));
    }
    parts
        .iter()
        .enumerate()
        .map(|(index, part)| parse_clause(part, index, expression))
        .collect()
}

fn syntax(expression: &str, reason: impl Into<String>) -> FilterError {
    FilterError::Syntax {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn parse_clause(text: &str, index: usize, expression: &str) -> Result<Clause, FilterError> {
    let name_end = text.find(['[', ':']).unwrap_or(text.len());
    let name = &text[..name_end];
    let event = match name {
        "*" => None,
        "" => return Err(syntax(expression, format!("clause '{}' has no event name", text))),
        name if name.chars().all(is_ident_char) => Some(name.to_string()),
        name => return Err(syntax(expression, format!("invalid event name '{}'", name))),
    };

    let mut rest = &text[name_end..];
    let mut predicates = Vec::new();
    if rest.starts_with('[') {
        let close = matching_bracket(rest)
            .ok_or_else(|| syntax(expression, format!("unbalanced brackets in '{}'", text)))?;
        let body = &rest[1..close];
        for attrib in split_top_level(body, |c| c == ',', false, expression)? {
            predicates.push(Predicate::parse(&attrib, expression)?);
        }
        rest = &rest[close + 1..];
    }

    let mut mode = Mode::Every;
    let mut nth = None;
    let mut notrace = false;
    if !rest.is_empty() {
        let Some(flags) = rest.strip_prefix(':') else {
            return Err(syntax(expression, format!("unexpected '{}' after attributes", rest)));
        };
        for flag in split_top_level(flags, |c| c == ':', true, expression)? {
            match parse_flag(&flag)? {
                Flag::Mode(m) => {
                    if mode != Mode::Every {
                        return Err(FilterError::InvalidFlag {
                            flag,
                            reason: "conflicts with another delivery flag".to_string(),
                        });
                    }
                    mode = m;
                }
                Flag::Nth(n, group) => {
                    if nth.is_some() {
                        return Err(FilterError::InvalidFlag {
                            flag,
                            reason: "nth given twice".to_string(),
                        });
                    }
                    nth = Some(Nth {
                        n,
                        counter: group.unwrap_or_else(|| format!("#{}", index)),
                    });
                }
                Flag::NoTrace => notrace = true,
            }
        }
    }

    Ok(Clause {
        text: text.to_string(),
        event,
        predicates,
        mode,
        nth,
        notrace,
    })
}

enum Flag {
    Mode(Mode),
    Nth(u64, Option<String>),
    NoTrace,
}

fn parse_flag(flag: &str) -> Result<Flag, FilterError> {
    let invalid = |reason: &str| FilterError::InvalidFlag {
        flag: flag.to_string(),
        reason: reason.to_string(),
    };

    let (name, args) = match flag.find('(') {
        Some(open) => {
            let args = flag[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| invalid("missing ')'"))?;
            (&flag[..open], Some(args))
        }
        None => (flag, None),
    };

    match (name.trim().to_ascii_lowercase().as_str(), args) {
        ("first", None) => Ok(Flag::Mode(Mode::First)),
        ("last", None) => Ok(Flag::Mode(Mode::Last)),
        ("single", None) => Ok(Flag::Mode(Mode::Single)),
        ("notrace", None) => Ok(Flag::NoTrace),
        ("nth", Some(args)) => {
            let mut args = args.split(',').map(str::trim);
            let n = args
                .next()
                .and_then(|n| n.parse::<u64>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("expected a positive count"))?;
            let group = match args.next() {
                None => None,
                Some(group) if !group.is_empty() && group.chars().all(is_ident_char) => {
                    Some(group.to_string())
                }
                Some(_) => return Err(invalid("invalid group name")),
            };
            if args.next().is_some() {
                return Err(invalid("too many arguments"));
            }
            Ok(Flag::Nth(n, group))
        }
        ("after", Some(args)) => parse_duration(args.trim())
            .map(|d| Flag::Mode(Mode::After(d)))
            .ok_or_else(|| invalid("expected a duration such as 500ms or 2s")),
        ("first" | "last" | "single" | "notrace", Some(_)) => Err(invalid("takes no arguments")),
        ("nth" | "after", None) => Err(invalid("missing arguments")),
        _ => Err(FilterError::UnknownFlag(flag.to_string())),
    }
}

/// Humantime notation, or a bare number of seconds
fn parse_duration(text: &str) -> Option<Duration> {
    if let Ok(seconds) = text.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds));
    }
    humantime::parse_duration(text).ok()
}

/// Byte offset of the `]` closing the `[` at offset 0
fn matching_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut previous = None;
    for (offset, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if opens_quote(previous) => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
        if !c.is_whitespace() {
            previous = Some(c);
        }
    }
    None
}

/// A quote only opens a literal at the start of a value or key, so an
/// apostrophe inside a bare value is plain text.
fn opens_quote(previous: Option<char>) -> bool {
    match previous {
        None => true,
        Some(c) => matches!(c, '[' | ',' | '(') || OPERATOR_CHARS.contains(&c),
    }
}

/// Split on `is_separator` outside quotes, brackets and parentheses.
/// Empty pieces are dropped. Parentheses are only tracked outside
/// attribute brackets, and not at all when `parens` is false.
fn split_top_level(
    text: &str,
    is_separator: impl Fn(char) -> bool,
    parens: bool,
    expression: &str,
) -> Result<Vec<String>, FilterError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut brackets = 0i32;
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut previous = None;

    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if opens_quote(previous) => quote = Some(c),
            (None, '[') => brackets += 1,
            (None, ']') => brackets -= 1,
            (None, '(') if parens && brackets == 0 => depth += 1,
            (None, ')') if parens && brackets == 0 => depth -= 1,
            (None, c) if brackets == 0 && depth == 0 && is_separator(c) => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
                previous = None;
                continue;
            }
            _ => {}
        }
        if brackets < 0 || depth < 0 {
            return Err(syntax(expression, "unbalanced brackets or parentheses"));
        }
        if !c.is_whitespace() {
            previous = Some(c);
        }
        current.push(c);
    }

    if quote.is_some() {
        return Err(syntax(expression, "unterminated quote"));
    }
    if brackets != 0 || depth != 0 {
        return Err(syntax(expression, "unbalanced brackets or parentheses"));
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    Ok(parts)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
