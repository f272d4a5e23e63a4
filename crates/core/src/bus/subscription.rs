// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriptions: callback, priority and optional type filter

use crate::error::HandlerResult;
use crate::event::Event;
use std::sync::Arc;

/// Priority used when none is given. Lower values dispatch first.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Callback invoked for each matching event
pub type Callback = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Subscriber handle for unsubscribing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscription to events on the bus
///
/// Type filters are matched supertype-aware: `"ObserverEvent"` also
/// selects `ObserverValueEvent`s. Extra call arguments are captured by the
/// callback closure.
#[derive(Clone)]
pub struct Subscription {
    pub(crate) priority: i32,
    pub(crate) types: Option<Vec<String>>,
    pub(crate) callback: Callback,
    pub(crate) description: String,
}

impl Subscription {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            priority: DEFAULT_PRIORITY,
            types: None,
            callback: Arc::new(callback),
            description: String::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only deliver events whose type (or a supertype) is listed
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Free-form label used in log lines
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check if the type filter admits the event
    pub fn matches(&self, event: &Event) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.iter().any(|t| event.is_a(t)),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("priority", &self.priority)
            .field("types", &self.types)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
