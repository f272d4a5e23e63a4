// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attribute paths
//!
//! `a`, `a.b`, `a[0]`, `a['key with spaces']`, `a["x"].y[2]` resolved
//! against a JSON value. A path that does not resolve yields `None`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid attribute path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A compiled attribute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath {
    source: String,
    segments: Vec<Segment>,
}

impl AttrPath {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        let error = |reason: &str| PathError {
            path: source.to_string(),
            reason: reason.to_string(),
        };
        let chars: Vec<char> = source.trim().chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        let head = take_ident(&chars, &mut pos);
        if head.is_empty() {
            return Err(error("expected an attribute name"));
        }
        segments.push(Segment::Key(head));

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    let name = take_ident(&chars, &mut pos);
                    if name.is_empty() {
                        return Err(error("expected a name after '.'"));
                    }
                    segments.push(Segment::Key(name));
                }
                '[' => {
                    pos += 1;
                    let segment = match chars.get(pos) {
                        Some(&quote) if quote == '\'' || quote == '"' => {
                            pos += 1;
                            let start = pos;
                            while pos < chars.len() && chars[pos] != quote {
                                pos += 1;
                            }
                            if pos >= chars.len() {
                                return Err(error("unterminated quoted key"));
                            }
                            let key: String = chars[start..pos].iter().collect();
                            pos += 1;
                            Segment::Key(key)
                        }
                        _ => {
                            let start = pos;
                            while pos < chars.len() && chars[pos] != ']' {
                                pos += 1;
                            }
                            let raw: String = chars[start..pos].iter().collect();
                            let raw = raw.trim();
                            if raw.is_empty() {
                                return Err(error("empty brackets"));
                            }
                            match raw.parse::<usize>() {
                                Ok(index) => Segment::Index(index),
                                Err(_) => Segment::Key(raw.to_string()),
                            }
                        }
                    };
                    if chars.get(pos) != Some(&']') {
                        return Err(error("expected ']'"));
                    }
                    pos += 1;
                    segments.push(segment);
                }
                c => return Err(error(&format!("unexpected character '{}'", c))),
            }
        }

        Ok(Self {
            source: source.trim().to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Walk the path; `None` if any step is missing
    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |value, segment| match segment {
            Segment::Key(key) => value.get(key.as_str()),
            Segment::Index(index) => match value {
                Value::Array(items) => items.get(*index),
                Value::Object(map) => map.get(&index.to_string()),
                _ => None,
            },
        })
    }
}

impl std::fmt::Display for AttrPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Identifier characters: letters, digits, underscore
pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}
