// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state machine and its state-enter pump

use super::state::{Ctx, StateDef};
use crate::clock::{Clock, SystemClock};
use crate::error::{panic_message, HandlerError, HandlerResult};
use crate::event::Event;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Initial state every machine must declare
pub const START: &str = "Start";
/// Terminal state every policy machine must declare
pub const END: &str = "End";

#[derive(Debug, Error)]
pub enum FsmError {
    #[error("state machine '{fsm}' must declare a '{state}' state")]
    MissingState { fsm: String, state: &'static str },
    #[error("state '{0}' is declared twice")]
    DuplicateState(String),
    #[error("state '{0}' was not found in the state machine")]
    UnknownState(String),
    #[error("timed out after {timeout:?} waiting for state '{state}'")]
    Timeout { state: String, timeout: Duration },
    #[error("failed to spawn policy thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Core<C> {
    states: HashMap<String, StateDef<C>>,
    context: C,
    queue: VecDeque<String>,
}

struct Status {
    current: String,
    last_transition: Instant,
}

/// Collects states before building a machine
pub struct FsmBuilder<C, K: Clock = SystemClock> {
    name: String,
    context: C,
    states: Vec<StateDef<C>>,
    clock: K,
}

impl<C: Send + 'static> FsmBuilder<C, SystemClock> {
    pub fn new(name: impl Into<String>, context: C) -> Self {
        Self {
            name: name.into(),
            context,
            states: Vec::new(),
            clock: SystemClock,
        }
    }
}

impl<C: Send + 'static, K: Clock> FsmBuilder<C, K> {
    /// Declare a state, configuring its hooks in `build`
    ///
    /// ```ignore
    /// FsmBuilder::new("deploy", Deploy::default())
    ///     .state(START, |s| s.on_enter(|cx| Ok(cx.goto("Waiting")?)))
    ///     .state("Waiting", |s| s.on("ReadyEvent", |cx, _| Ok(cx.goto(END)?)))
    ///     .state(END, |s| s)
    /// ```
    pub fn state(self, name: impl Into<String>, build: impl FnOnce(StateDef<C>) -> StateDef<C>) -> Self {
        self.add_state(build(StateDef::new(name)))
    }

    /// Declare a state built elsewhere
    pub fn add_state(mut self, state: StateDef<C>) -> Self {
        self.states.push(state);
        self
    }

    pub fn clock<K2: Clock>(self, clock: K2) -> FsmBuilder<C, K2> {
        FsmBuilder {
            name: self.name,
            context: self.context,
            states: self.states,
            clock,
        }
    }

    pub fn build(self) -> Result<Fsm<C, K>, FsmError> {
        let mut states = HashMap::with_capacity(self.states.len());
        for state in self.states {
            if states.contains_key(&state.name) {
                return Err(FsmError::DuplicateState(state.name));
            }
            states.insert(state.name.clone(), state);
        }
        if !states.contains_key(START) {
            return Err(FsmError::MissingState {
                fsm: self.name,
                state: START,
            });
        }

        let now = self.clock.now();
        Ok(Fsm {
            name: self.name,
            core: Mutex::new(Core {
                states,
                context: self.context,
                queue: VecDeque::new(),
            }),
            status: Mutex::new(Status {
                current: START.to_string(),
                last_transition: now,
            }),
            changed: Condvar::new(),
            clock: self.clock,
        })
    }

    /// Build a policy machine: `End` is required, and every state without
    /// its own `InterruptEvent` handler sinks to `End` on interrupt.
    pub fn build_policy(mut self) -> Result<Fsm<C, K>, FsmError> {
        if !self.states.iter().any(|s| s.name == END) {
            return Err(FsmError::MissingState {
                fsm: self.name,
                state: END,
            });
        }
        self.states = self
            .states
            .into_iter()
            .map(|state| {
                if state.handles("InterruptEvent") {
                    state
                } else {
                    state.on("InterruptEvent", |cx, _| Ok(cx.goto(END)?))
                }
            })
            .collect();
        self.build()
    }
}

/// A finite state machine over a shared context `C`
///
/// Handlers run with the machine locked. A `goto` issued from inside a
/// handler is queued and entered after the handler returns, so enter
/// hooks never recurse.
pub struct Fsm<C, K: Clock = SystemClock> {
    name: String,
    core: Mutex<Core<C>>,
    status: Mutex<Status>,
    changed: Condvar,
    clock: K,
}

impl<C: Send + 'static, K: Clock> Fsm<C, K> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter `Start`, then any states queued along the way
    pub fn start(&self) {
        tracing::debug!(fsm = %self.name, "starting state machine");
        let mut core = self.lock_core();
        core.queue.push_back(START.to_string());
        self.pump(&mut core);
    }

    /// Switch to `state`. Switching to the current state is a no-op.
    pub fn goto(&self, state: &str) -> Result<(), FsmError> {
        let mut core = self.lock_core();
        if !core.states.contains_key(state) {
            return Err(FsmError::UnknownState(state.to_string()));
        }
        if self.lock_status().current == state {
            return Ok(());
        }
        tracing::debug!(fsm = %self.name, state, "switching state");
        core.queue.push_back(state.to_string());
        self.pump(&mut core);
        Ok(())
    }

    /// Route an event to the current state's handler
    ///
    /// Handler failures are logged and passed to the state's error hook;
    /// they never reach the caller.
    pub fn handle_event(&self, event: &Event) {
        let mut core = self.lock_core();
        let current = self.state();
        {
            let Core {
                states,
                context,
                queue,
            } = &mut *core;
            let states = &*states;
            let Some(state) = states.get(&current) else {
                return;
            };
            let Some(handler) = state.handler_for(event) else {
                return;
            };

            tracing::debug!(fsm = %self.name, state = %current, event = %event.name(), "handling event");
            let mut cx = Ctx {
                context,
                current: &current,
                states,
                queue,
            };
            if let Err(error) = guarded(|| handler(&mut cx, event)) {
                tracing::error!(
                    fsm = %self.name,
                    state = %current,
                    event = %event.name(),
                    %error,
                    "exception while handling FSM event"
                );
                report(state, &mut cx, &error);
            }
        }
        self.pump(&mut core);
    }

    /// Block until the machine is in `state`
    pub fn wait(&self, state: &str, timeout: Option<Duration>) -> Result<(), FsmError> {
        let status = self.lock_status();
        match timeout {
            None => {
                let _status = self
                    .changed
                    .wait_while(status, |s| s.current != state)
                    .unwrap_or_else(|e| e.into_inner());
                Ok(())
            }
            Some(timeout) => {
                let (status, _) = self
                    .changed
                    .wait_timeout_while(status, timeout, |s| s.current != state)
                    .unwrap_or_else(|e| e.into_inner());
                if status.current == state {
                    Ok(())
                } else {
                    Err(FsmError::Timeout {
                        state: state.to_string(),
                        timeout,
                    })
                }
            }
        }
    }

    pub fn state(&self) -> String {
        self.lock_status().current.clone()
    }

    /// Postpone stall detection as if a transition just happened
    pub fn keepalive(&self) {
        self.lock_status().last_transition = self.clock.now();
    }

    pub fn last_transition(&self) -> Instant {
        self.lock_status().last_transition
    }

    /// Time since the last transition or keepalive
    pub fn idle_for(&self) -> Duration {
        self.clock
            .now()
            .saturating_duration_since(self.last_transition())
    }

    /// Read or modify the shared context from outside a handler
    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.lock_core().context)
    }

    fn pump(&self, core: &mut Core<C>) {
        while let Some(name) = core.queue.pop_front() {
            let Core {
                states,
                context,
                queue,
            } = &mut *core;
            let states = &*states;
            let Some(state) = states.get(&name) else {
                continue;
            };

            {
                let mut status = self.lock_status();
                status.current = name.clone();
                status.last_transition = self.clock.now();
            }
            tracing::debug!(fsm = %self.name, state = %name, "entering state");

            if let Some(enter) = &state.on_enter {
                let mut cx = Ctx {
                    context,
                    current: &name,
                    states,
                    queue,
                };
                if let Err(error) = guarded(|| enter(&mut cx)) {
                    tracing::error!(fsm = %self.name, state = %name, %error, "exception while entering state");
                    report(state, &mut cx, &error);
                }
            }

            self.changed.notify_all();
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, Core<C>> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C, K: Clock> std::fmt::Debug for Fsm<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Run a handler, turning a panic into an error
fn guarded(f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload.as_ref()).into()),
    }
}

fn report<C>(state: &StateDef<C>, cx: &mut Ctx<'_, C>, error: &HandlerError) {
    if let Some(on_error) = &state.on_error {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_error(cx, error))) {
            tracing::error!(
                state = %state.name,
                panic = %panic_message(payload.as_ref()),
                "error hook panicked"
            );
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
