// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State definitions and the handler context

use super::FsmError;
use crate::error::{HandlerError, HandlerResult};
use crate::event::Event;
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};

pub(crate) type EnterFn<C> = Box<dyn Fn(&mut Ctx<'_, C>) -> HandlerResult + Send>;
pub(crate) type EventFn<C> = Box<dyn Fn(&mut Ctx<'_, C>, &Event) -> HandlerResult + Send>;
pub(crate) type ErrorFn<C> = Box<dyn Fn(&mut Ctx<'_, C>, &HandlerError) + Send>;

/// One named state: an enter hook, a dispatch table keyed by event type
/// name, a default event handler and an error hook.
pub struct StateDef<C> {
    pub(crate) name: String,
    pub(crate) on_enter: Option<EnterFn<C>>,
    pub(crate) handlers: HashMap<String, EventFn<C>>,
    pub(crate) on_event: Option<EventFn<C>>,
    pub(crate) on_error: Option<ErrorFn<C>>,
}

impl<C> StateDef<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_enter: None,
            handlers: HashMap::new(),
            on_event: None,
            on_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_enter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Ctx<'_, C>) -> HandlerResult + Send + 'static,
    {
        self.on_enter = Some(Box::new(f));
        self
    }

    /// Handle events whose type (or any supertype) is `event`
    pub fn on<F>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Ctx<'_, C>, &Event) -> HandlerResult + Send + 'static,
    {
        self.handlers.insert(event.into(), Box::new(f));
        self
    }

    /// Handle any event without a dedicated entry
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Ctx<'_, C>, &Event) -> HandlerResult + Send + 'static,
    {
        self.on_event = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Ctx<'_, C>, &HandlerError) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub(crate) fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Most specific handler for the event, falling back to `on_event`
    pub(crate) fn handler_for(&self, event: &Event) -> Option<&EventFn<C>> {
        event
            .payload()
            .lineage()
            .into_iter()
            .find_map(|name| self.handlers.get(name))
            .or(self.on_event.as_ref())
    }
}

impl<C> std::fmt::Debug for StateDef<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<&String> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("StateDef")
            .field("name", &self.name)
            .field("events", &events)
            .finish_non_exhaustive()
    }
}

/// What a handler sees: the shared context plus the ability to change state
///
/// Dereferences to the context, so `cx.counter += 1` writes straight to
/// the one value every state of the machine shares.
pub struct Ctx<'a, C> {
    pub(crate) context: &'a mut C,
    pub(crate) current: &'a str,
    pub(crate) states: &'a HashMap<String, StateDef<C>>,
    pub(crate) queue: &'a mut VecDeque<String>,
}

impl<C> Ctx<'_, C> {
    /// Name of the state whose handler is running
    pub fn state(&self) -> &str {
        self.current
    }

    /// Queue a transition. Entering the current state again is a no-op.
    pub fn goto(&mut self, state: &str) -> Result<(), FsmError> {
        if state == self.current {
            return Ok(());
        }
        if !self.states.contains_key(state) {
            return Err(FsmError::UnknownState(state.to_string()));
        }
        self.queue.push_back(state.to_string());
        Ok(())
    }

    pub fn context(&mut self) -> &mut C {
        self.context
    }
}

impl<C> Deref for Ctx<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.context
    }
}

impl<C> DerefMut for Ctx<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.context
    }
}
