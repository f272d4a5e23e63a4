// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy runner
//!
//! A policy is a state machine fed from the bus on its own thread. Events
//! are handled one at a time, and the parameter batch is flushed after
//! each one so every handling pass yields at most one parameter update.

use super::machine::{Fsm, FsmBuilder, FsmError, END};
use crate::bus::{EventBus, SubscriberId, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::event::Event;
use crate::parameters::ParameterBatch;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Start(oneshot::Sender<()>),
    Event(Event),
    Shutdown,
}

/// What the session needs from a running policy
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Enter `Start` and block until the enter pump settles
    fn start(&self);

    fn state(&self) -> String;

    /// Time since the last transition or keepalive
    fn idle_for(&self) -> Duration;

    /// Deliver an event straight to the policy, bypassing the bus
    fn handle_event(&self, event: Event);

    fn shutdown(&self);

    fn is_finished(&self) -> bool {
        self.state() == END
    }
}

/// A policy state machine running on a dedicated thread
pub struct PolicyFsm<C, K: Clock = SystemClock> {
    fsm: Arc<Fsm<C, K>>,
    bus: EventBus,
    sender: mpsc::UnboundedSender<Command>,
    subscription: SubscriberId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Send + 'static, K: Clock> PolicyFsm<C, K> {
    /// Build the machine, subscribe it to the bus and spawn its thread
    pub fn spawn(builder: FsmBuilder<C, K>, bus: &EventBus, batch: ParameterBatch) -> Result<Self, FsmError> {
        let fsm = Arc::new(builder.build_policy()?);
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let thread = {
            let fsm = Arc::clone(&fsm);
            thread::Builder::new()
                .name(format!("policy-{}", fsm.name()))
                .spawn(move || {
                    while let Some(command) = receiver.blocking_recv() {
                        match command {
                            Command::Start(ack) => {
                                fsm.start();
                                batch.flush();
                                let _ = ack.send(());
                            }
                            Command::Event(event) => {
                                fsm.handle_event(&event);
                                batch.flush();
                            }
                            Command::Shutdown => break,
                        }
                    }
                    tracing::debug!(policy = %fsm.name(), "policy thread exited");
                })?
        };

        let forward = sender.clone();
        let subscription = bus.subscribe(
            Subscription::new(move |event| {
                forward
                    .send(Command::Event(event.clone()))
                    .map_err(|_| "policy is no longer running".into())
            })
            .description(format!("policy {}", fsm.name())),
        );

        Ok(Self {
            fsm,
            bus: bus.clone(),
            sender,
            subscription,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn fsm(&self) -> &Fsm<C, K> {
        &self.fsm
    }

    pub fn wait(&self, state: &str, timeout: Option<Duration>) -> Result<(), FsmError> {
        self.fsm.wait(state, timeout)
    }

    pub fn keepalive(&self) {
        self.fsm.keepalive();
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.fsm.with_context(f)
    }
}

impl<C: Send + 'static, K: Clock> Policy for PolicyFsm<C, K> {
    fn name(&self) -> &str {
        self.fsm.name()
    }

    fn start(&self) {
        let (ack, started) = oneshot::channel();
        if self.sender.send(Command::Start(ack)).is_err() {
            tracing::error!(policy = %self.name(), "cannot start a policy that was shut down");
            return;
        }
        let _ = started.blocking_recv();
    }

    fn state(&self) -> String {
        self.fsm.state()
    }

    fn idle_for(&self) -> Duration {
        self.fsm.idle_for()
    }

    fn handle_event(&self, event: Event) {
        if self.sender.send(Command::Event(event)).is_err() {
            tracing::warn!(policy = %self.name(), "dropping event for stopped policy");
        }
    }

    /// Unsubscribe from the bus and join the policy thread
    fn shutdown(&self) {
        let Some(handle) = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return;
        };
        self.bus.unsubscribe(&self.subscription);
        let _ = self.sender.send(Command::Shutdown);
        if handle.join().is_err() {
            tracing::error!(policy = %self.name(), "policy thread panicked");
        }
    }
}

impl<C, K: Clock> Drop for PolicyFsm<C, K> {
    fn drop(&mut self) {
        let handle = self.thread.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            self.bus.unsubscribe(&self.subscription);
            let _ = self.sender.send(Command::Shutdown);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
