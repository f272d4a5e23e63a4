// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event model
//!
//! Every message on the bus is an [`Event`]: a type tag with a supertype
//! chain, a creation timestamp and a non-empty set of trace ids. The first
//! trace id is allocated fresh for each event; any ids supplied at
//! construction are added to it so the event stays correlated with its
//! cause.

use crate::trace::{TraceId, TraceSet};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// A full parameter vector (or a diff of one), keyed by parameter name
pub type ParameterMap = BTreeMap<String, Value>;

/// Value-level equality: numbers compare by value, so `1` equals `1.0`
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
        }
        _ => left == right,
    }
}

/// Same keys, with [`values_equal`] values
pub fn parameters_equal(left: &ParameterMap, right: &ParameterMap) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(name, value)| right.get(name).is_some_and(|other| values_equal(value, other)))
}

/// Name every event type inherits from
pub const BASE_EVENT: &str = "Event";

/// Payload of an event. The variant decides the type tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Configuration is loaded and policies may begin
    Start,
    /// Dispatched instead of `Start` for every run after the first
    Restart,
    /// All policies are done and the system is being torn down
    Teardown,
    /// A critical failure or user request asks everything to wind down
    Interrupt,
    /// A policy stayed in a non-terminal state for too long
    Stalled,
    /// A policy asks the session to run the tasks registered at `task`
    RunTask { task: String },
    /// The tasks for a `RunTask` completed
    RunTaskCompleted { task: String, error: Option<String> },
    /// Periodic clock tick
    Tick { count: u64, delta: f64 },
    /// A batch of parameter changes
    ParameterUpdate {
        parameters: ParameterMap,
        old_parameters: ParameterMap,
        changes: ParameterMap,
    },
    /// A flag describing the run that just ended
    FlagUpdate { name: String, value: Value },
    /// A metric changed
    MetricUpdate { name: String, value: f64 },
    /// An observer noticed a metric change
    Observer { metric: String },
    /// An observer sampled a new metric value
    ObserverValue { metric: String, value: Value },
    /// A log line captured by an observer
    LogLine {
        line: String,
        source: String,
        kind: Option<String>,
    },
    /// Collaborator-defined event
    Custom {
        name: String,
        parents: Vec<String>,
        data: Map<String, Value>,
    },
}

impl Payload {
    /// A collaborator-defined event. Non-object data lands under `value`.
    pub fn custom(name: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Payload::Custom {
            name: name.into(),
            parents: Vec::new(),
            data,
        }
    }

    /// Declare a supertype name for a custom event. No-op for built-ins.
    pub fn subtype_of(mut self, parent: impl Into<String>) -> Self {
        if let Payload::Custom { parents, .. } = &mut self {
            parents.push(parent.into());
        }
        self
    }

    /// A log line with ANSI escape sequences stripped
    pub fn log_line(line: &str, source: impl Into<String>, kind: Option<String>) -> Self {
        Payload::LogLine {
            line: strip_ansi(line),
            source: source.into(),
            kind,
        }
    }

    /// The runtime type name of the event
    pub fn name(&self) -> &str {
        match self {
            Payload::Start => "StartEvent",
            Payload::Restart => "RestartEvent",
            Payload::Teardown => "TeardownEvent",
            Payload::Interrupt => "InterruptEvent",
            Payload::Stalled => "StalledEvent",
            Payload::RunTask { .. } => "RunTaskEvent",
            Payload::RunTaskCompleted { .. } => "RunTaskCompletedEvent",
            Payload::Tick { .. } => "TickEvent",
            Payload::ParameterUpdate { .. } => "ParameterUpdateEvent",
            Payload::FlagUpdate { .. } => "FlagUpdateEvent",
            Payload::MetricUpdate { .. } => "MetricUpdateEvent",
            Payload::Observer { .. } => "ObserverEvent",
            Payload::ObserverValue { .. } => "ObserverValueEvent",
            Payload::LogLine { .. } => "LogLineEvent",
            Payload::Custom { name, .. } => name.as_str(),
        }
    }

    /// Type name followed by every supertype name, most specific first
    pub fn lineage(&self) -> Vec<&str> {
        let mut names = vec![self.name()];
        match self {
            Payload::ObserverValue { .. } => names.push("ObserverEvent"),
            Payload::Custom { parents, .. } => names.extend(parents.iter().map(String::as_str)),
            _ => {}
        }
        if names.last() != Some(&BASE_EVENT) {
            names.push(BASE_EVENT);
        }
        names
    }
}

#[derive(Debug)]
struct EventInner {
    id: TraceId,
    timestamp: DateTime<Utc>,
    traceids: TraceSet,
    payload: Payload,
    attributes: OnceLock<Value>,
}

/// An immutable, cheaply cloneable bus message
#[derive(Debug, Clone)]
pub struct Event(Arc<EventInner>);

impl Event {
    /// An event that starts its own trace
    pub fn new(payload: Payload) -> Self {
        Self::traced(payload, TraceSet::new())
    }

    /// An event that also belongs to the given trace(s)
    pub fn traced(payload: Payload, parents: impl Into<TraceSet>) -> Self {
        Self::traced_at(payload, parents, Utc::now())
    }

    /// Like [`Event::traced`] with an explicit timestamp
    pub fn traced_at(payload: Payload, parents: impl Into<TraceSet>, timestamp: DateTime<Utc>) -> Self {
        let id = TraceId::allocate();
        let mut traceids = parents.into();
        traceids.insert(id);
        Event(Arc::new(EventInner {
            id,
            timestamp,
            traceids,
            payload,
            attributes: OnceLock::new(),
        }))
    }

    /// The trace id allocated for this event alone
    pub fn id(&self) -> TraceId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        self.0.payload.name()
    }

    /// Supertype-aware name match
    pub fn is_a(&self, name: &str) -> bool {
        self.0.payload.lineage().contains(&name)
    }

    pub fn payload(&self) -> &Payload {
        &self.0.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0.timestamp
    }

    pub fn traceids(&self) -> &TraceSet {
        &self.0.traceids
    }

    pub fn has_trace(&self, id: &TraceId) -> bool {
        self.0.traceids.contains(id)
    }

    /// True if any of `ids` belongs to this event
    pub fn has_traces(&self, ids: &TraceSet) -> bool {
        self.0.traceids.intersects(ids)
    }

    /// Flat attribute view used by filters and serialization
    pub fn attributes(&self) -> &Value {
        self.0.attributes.get_or_init(|| self.build_attributes())
    }

    fn build_attributes(&self) -> Value {
        let mut map = match &self.0.payload {
            Payload::Custom { data, .. } => data.clone(),
            other => match serde_json::to_value(other) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
        };
        map.insert("event".to_string(), Value::String(self.name().to_string()));
        map.insert(
            "ts".to_string(),
            serde_json::json!(self.0.timestamp.timestamp_millis() as f64 / 1000.0),
        );
        map.insert(
            "traceids".to_string(),
            Value::Array(self.0.traceids.iter().map(|id| serde_json::json!(id.as_u64())).collect()),
        );
        Value::Object(map)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Event {}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[trace={}]", self.name(), self.0.traceids)?;
        if let Payload::LogLine { line, .. } = &self.0.payload {
            write!(f, "<{}>", line)?;
        }
        Ok(())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attributes().serialize(serializer)
    }
}

/// Remove `ESC ... m` colour sequences
fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for skipped in chars.by_ref() {
                if skipped == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
