// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter batching
//!
//! Policies request parameter changes while handling an event; the policy
//! runner flushes once the handling pass is over, so every change made in
//! one pass lands in a single `ParameterUpdateEvent`. That event is the
//! root of a new trace.

use crate::bus::EventBus;
use crate::config::GeneralConfig;
use crate::event::{values_equal, Event, ParameterMap, Payload};
use crate::trace::TraceId;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

struct BatchState {
    parameters: ParameterMap,
    updates: Vec<(String, Value)>,
    flags: Vec<(String, Value)>,
    next_trace: TraceId,
    previous_trace: Option<TraceId>,
}

/// Coalesces parameter and flag changes into one update per flush
#[derive(Clone)]
pub struct ParameterBatch {
    bus: EventBus,
    state: Arc<Mutex<BatchState>>,
}

impl ParameterBatch {
    pub fn new(bus: EventBus, defaults: ParameterMap) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(BatchState {
                parameters: defaults,
                updates: Vec::new(),
                flags: Vec::new(),
                next_trace: TraceId::allocate(),
                previous_trace: None,
            })),
        }
    }

    /// A batch seeded with the declared parameter defaults
    pub fn from_config(bus: EventBus, config: &GeneralConfig) -> Self {
        Self::new(bus, config.defaults())
    }

    /// Queue a change; returns the trace id the next flush will carry
    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<Value>) -> TraceId {
        let mut state = self.lock();
        state.updates.push((name.into(), value.into()));
        state.next_trace
    }

    pub fn set_parameters<I, K, V>(&self, parameters: I) -> TraceId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut state = self.lock();
        state
            .updates
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        state.next_trace
    }

    /// Queue a flag about the run that is ending
    ///
    /// Flags are published ahead of the next parameter update and carry the
    /// trace id of the previous one.
    pub fn set_flag(&self, name: impl Into<String>, value: impl Into<Value>) -> TraceId {
        let mut state = self.lock();
        state.flags.push((name.into(), value.into()));
        state.next_trace
    }

    /// Publish pending flags and, if anything changed, one parameter update
    ///
    /// Returns the trace id of the published update.
    pub fn flush(&self) -> Option<TraceId> {
        let mut state = self.lock();

        for (name, value) in std::mem::take(&mut state.flags) {
            tracing::debug!(flag = %name, %value, "publishing flag update");
            self.bus.publish(Event::traced(
                Payload::FlagUpdate { name, value },
                state.previous_trace,
            ));
        }

        let updates = std::mem::take(&mut state.updates);
        if updates.is_empty() {
            return None;
        }
        let old_parameters = state.parameters.clone();
        let mut parameters = old_parameters.clone();
        parameters.extend(updates);
        let changes: ParameterMap = parameters
            .iter()
            .filter(|(name, value)| {
                !old_parameters
                    .get(*name)
                    .is_some_and(|old| values_equal(old, value))
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if changes.is_empty() {
            return None;
        }

        let trace = state.next_trace;
        tracing::info!(%trace, changes = ?changes, "parameters updated");
        self.bus.publish(Event::traced(
            Payload::ParameterUpdate {
                parameters: parameters.clone(),
                old_parameters,
                changes,
            },
            trace,
        ));

        state.parameters = parameters;
        state.previous_trace = Some(trace);
        state.next_trace = TraceId::allocate();
        Some(trace)
    }

    /// The current parameter vector
    pub fn parameters(&self) -> ParameterMap {
        self.lock().parameters.clone()
    }

    pub fn next_trace(&self) -> TraceId {
        self.lock().next_trace
    }

    pub fn previous_trace(&self) -> Option<TraceId> {
        self.lock().previous_trace
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ParameterBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ParameterBatch")
            .field("parameters", &state.parameters)
            .field("pending", &state.updates.len())
            .field("next_trace", &state.next_trace)
            .finish()
    }
}

#[cfg(test)]
#[path = "parameters_tests.rs"]
mod tests;
