// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event filter selectors
//!
//! ```text
//! HTTPResponseEvent[status>=500,url~=/v2/apps]:first
//! DeploymentCompletedEvent:after(2s) *:nth(10,tick):notrace
//! ```
//!
//! An expression is compiled once into clauses. Each [`FilterSession`]
//! then matches a live stream of events against them, scoped to a set
//! of trace ids.

mod parse;
mod predicate;
mod session;

pub use session::{FilterCallback, FilterSession, LatchRegistry};

use crate::event::Event;
use crate::path::PathError;
use crate::trace::TraceSet;
use parse::Clause;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter expression '{expression}': {reason}")]
    Syntax { expression: String, reason: String },
    #[error("unknown filter flag '{0}'")]
    UnknownFlag(String),
    #[error("invalid filter flag '{flag}': {reason}")]
    InvalidFlag { flag: String, reason: String },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("invalid regular expression '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled selector expression
#[derive(Clone)]
pub struct EventFilter {
    expression: String,
    clauses: Arc<Vec<Clause>>,
    latches: LatchRegistry,
}

impl EventFilter {
    /// Compile an expression with a private latch registry
    pub fn new(expression: &str) -> Result<Self, FilterError> {
        Self::with_latches(expression, LatchRegistry::new())
    }

    /// Compile an expression whose `single` clauses latch in `latches`
    pub fn with_latches(expression: &str, latches: LatchRegistry) -> Result<Self, FilterError> {
        let clauses = parse::parse_expression(expression)?;
        Ok(Self {
            expression: expression.trim().to_string(),
            clauses: Arc::new(clauses),
            latches,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn latches(&self) -> &LatchRegistry {
        &self.latches
    }

    /// Start matching. `scope` limits matches to events sharing a trace id
    /// with it; `None` or an empty set matches every trace.
    pub fn start<F>(&self, scope: Option<TraceSet>, callback: F) -> FilterSession
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        FilterSession::start(
            &self.expression,
            Arc::clone(&self.clauses),
            self.latches.clone(),
            scope,
            Arc::new(callback),
        )
    }

    /// Whether any clause's name and attributes match, ignoring flags and scope
    pub fn matches(&self, event: &Event) -> bool {
        self.clauses.iter().any(|clause| clause.matches(event))
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventFilter").field(&self.expression).finish()
    }
}

impl std::fmt::Display for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

impl std::str::FromStr for EventFilter {
    type Err = FilterError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Self::new(expression)
    }
}
