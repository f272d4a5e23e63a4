// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filter sessions and the `single` latch registry

use super::parse::{Clause, Mode};
use crate::error::panic_message;
use crate::event::Event;
use crate::trace::TraceSet;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

/// Callback invoked with each event a session selects
pub type FilterCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Remembers the first event matched by each `single` clause
///
/// Shared by every filter built with it. A session started after a clause
/// has latched replays the latched event immediately.
#[derive(Clone, Default)]
pub struct LatchRegistry {
    latched: Arc<Mutex<HashMap<String, Event>>>,
}

impl LatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` under `key` unless something is already latched there
    pub(crate) fn latch(&self, key: &str, event: &Event) -> bool {
        let mut latched = self.lock();
        if latched.contains_key(key) {
            return false;
        }
        latched.insert(key.to_string(), event.clone());
        true
    }

    pub fn get(&self, key: &str) -> Option<Event> {
        self.lock().get(key).cloned()
    }

    /// Forget every latched event
    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Event>> {
        self.latched.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for LatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let latched = self.lock();
        let mut keys: Vec<&String> = latched.keys().collect();
        keys.sort();
        f.debug_struct("LatchRegistry").field("latched", &keys).finish()
    }
}

#[derive(Default)]
struct SessionState {
    closed: bool,
    counters: HashMap<String, u64>,
    first_seen: Vec<bool>,
    last_seen: Vec<Option<Event>>,
    /// Debounced event per clause and the instant it becomes due
    pending: Vec<Option<(Event, Instant)>>,
    timer_running: bool,
}

struct SessionInner {
    expression: String,
    clauses: Arc<Vec<Clause>>,
    latches: LatchRegistry,
    scope: Option<TraceSet>,
    callback: FilterCallback,
    state: Mutex<SessionState>,
    wakeup: Condvar,
}

/// One live match over an event stream
///
/// Feed it with [`handle`](Self::handle), typically from a bus
/// subscription, and call [`finalize`](Self::finalize) when the tracked
/// operation is over. Dropping a session discards anything still pending.
pub struct FilterSession {
    inner: Arc<SessionInner>,
}

impl FilterSession {
    pub(crate) fn start(
        expression: &str,
        clauses: Arc<Vec<Clause>>,
        latches: LatchRegistry,
        scope: Option<TraceSet>,
        callback: FilterCallback,
    ) -> Self {
        let count = clauses.len();
        let inner = Arc::new(SessionInner {
            expression: expression.to_string(),
            clauses,
            latches,
            scope: scope.filter(|s| !s.is_empty()),
            callback,
            state: Mutex::new(SessionState {
                first_seen: vec![false; count],
                last_seen: vec![None; count],
                pending: vec![None; count],
                ..SessionState::default()
            }),
            wakeup: Condvar::new(),
        });

        for clause in inner.clauses.iter().filter(|c| c.mode == Mode::Single) {
            if let Some(event) = inner.latches.get(&clause.text) {
                tracing::debug!(clause = %clause.text, event = %event, "replaying latched event");
                inner.deliver(&event);
            }
        }

        Self { inner }
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn scope(&self) -> Option<&TraceSet> {
        self.inner.scope.as_ref()
    }

    /// Test one event against the clauses. The first matching clause
    /// decides what happens to it.
    pub fn handle(&self, event: &Event) {
        let inner = &self.inner;
        let fire = {
            let mut state = inner.lock();
            if state.closed {
                return;
            }
            let Some((index, clause)) = inner
                .clauses
                .iter()
                .enumerate()
                .find(|(_, clause)| clause.matches(event) && (clause.notrace || inner.in_scope(event)))
            else {
                return;
            };
            inner.select(&mut state, index, clause, event)
        };
        if let Some(event) = fire {
            inner.deliver(&event);
        }
    }

    /// Deliver pending `last` and `after` events and stop matching.
    /// Calling it again does nothing.
    pub fn finalize(&self) {
        let flushed: Vec<Event> = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let last = std::mem::take(&mut state.last_seen);
            let pending = std::mem::take(&mut state.pending);
            last.into_iter()
                .zip(pending)
                .flat_map(|(last, pending)| last.into_iter().chain(pending.map(|(event, _)| event)))
                .collect()
        };
        self.inner.wakeup.notify_all();
        for event in &flushed {
            self.inner.deliver(event);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Drop for FilterSession {
    fn drop(&mut self) {
        self.inner.lock().closed = true;
        self.inner.wakeup.notify_all();
    }
}

impl std::fmt::Debug for FilterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSession")
            .field("expression", &self.inner.expression)
            .field("scope", &self.inner.scope)
            .finish()
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_scope(&self, event: &Event) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => event.has_traces(scope),
        }
    }

    /// Apply the clause's flags; returns the event to deliver now, if any
    fn select(
        self: &Arc<Self>,
        state: &mut SessionState,
        index: usize,
        clause: &Clause,
        event: &Event,
    ) -> Option<Event> {
        if let Some(nth) = &clause.nth {
            let count = state.counters.entry(nth.counter.clone()).or_insert(0);
            *count += 1;
            if *count != nth.n {
                return None;
            }
        }

        match clause.mode {
            Mode::Every => Some(event.clone()),
            Mode::First => {
                if state.first_seen[index] {
                    None
                } else {
                    state.first_seen[index] = true;
                    Some(event.clone())
                }
            }
            Mode::Last => {
                state.last_seen[index] = Some(event.clone());
                None
            }
            Mode::Single => self
                .latches
                .latch(&clause.text, event)
                .then(|| event.clone()),
            Mode::After(delay) => {
                state.pending[index] = Some((event.clone(), Instant::now() + delay));
                if !state.timer_running {
                    state.timer_running = self.spawn_timer();
                }
                self.wakeup.notify_all();
                None
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>) -> bool {
        let inner = Arc::clone(self);
        match thread::Builder::new()
            .name("filter-after".to_string())
            .spawn(move || inner.debounce_loop())
        {
            Ok(_) => true,
            Err(error) => {
                tracing::error!(%error, "unable to start debounce timer; pending events fire on finalize");
                false
            }
        }
    }

    /// Fire debounced events once their quiet period has elapsed
    fn debounce_loop(&self) {
        let mut state = self.lock();
        loop {
            if state.closed {
                return;
            }

            let now = Instant::now();
            let mut due = Vec::new();
            let mut next: Option<Instant> = None;
            for slot in state.pending.iter_mut() {
                let deadline = match slot {
                    Some((_, deadline)) => *deadline,
                    None => continue,
                };
                if deadline <= now {
                    if let Some((event, _)) = slot.take() {
                        due.push(event);
                    }
                } else {
                    next = Some(next.map_or(deadline, |n| n.min(deadline)));
                }
            }

            if !due.is_empty() {
                drop(state);
                for event in &due {
                    self.deliver(event);
                }
                state = self.lock();
                continue;
            }

            state = match next {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(now);
                    match self.wakeup.wait_timeout(state, timeout) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self.wakeup.wait(state).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }

    fn deliver(&self, event: &Event) {
        let callback = &self.callback;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
            tracing::error!(
                filter = %self.expression,
                event = %event,
                panic = %panic_message(payload.as_ref()),
                "filter callback panicked"
            );
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
