// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-pool event bus
//!
//! One shared FIFO queue is drained by a fixed pool of worker threads.
//! Each worker delivers an event to every matching subscriber in ascending
//! priority order. Ordering across different events is not guaranteed once
//! more than one worker is configured.

use super::subscription::{SubscriberId, Subscription};
use crate::config::BusConfig;
use crate::error::panic_message;
use crate::event::{Event, Payload};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus is not running")]
    NotRunning,
    #[error("event bus is already running")]
    AlreadyRunning,
    #[error("failed to spawn bus thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("dispatch acknowledgement was dropped")]
    Dropped,
}

enum Envelope {
    Dispatch {
        event: Event,
        done: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

struct Registered {
    id: SubscriberId,
    subscription: Subscription,
}

#[derive(Default)]
struct Threads {
    workers: Vec<JoinHandle<()>>,
    clock: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

struct Inner {
    config: BusConfig,
    subscribers: RwLock<Vec<Arc<Registered>>>,
    next_id: AtomicU64,
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    pending: Mutex<usize>,
    drained: Condvar,
    threads: Mutex<Threads>,
}

/// The event bus delivers in-process messages to subscribers
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                config,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                sender,
                receiver: Mutex::new(receiver),
                pending: Mutex::new(0),
                drained: Condvar::new(),
                threads: Mutex::new(Threads::default()),
            }),
        }
    }

    /// Register a subscriber. The list is re-sorted by priority; equal
    /// priorities keep registration order.
    pub fn subscribe(&self, subscription: Subscription) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        subs.push(Arc::new(Registered { id, subscription }));
        subs.sort_by_key(|r| r.subscription.priority);
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|r| r.id != *id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Enqueue an event for dispatch
    pub fn publish(&self, event: Event) {
        self.inner.enqueue(event, None);
    }

    /// Enqueue an event and block until every subscriber has seen it
    ///
    /// Calling this from inside a subscriber can deadlock when every
    /// worker is busy waiting the same way.
    pub fn publish_sync(&self, event: Event) -> Result<(), BusError> {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        let (done, wait) = oneshot::channel();
        self.inner.enqueue(event, Some(done));
        wait.blocking_recv().map_err(|_| BusError::Dropped)
    }

    pub fn is_running(&self) -> bool {
        !self
            .inner
            .threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .workers
            .is_empty()
    }

    /// Spawn the worker pool and the clock thread
    pub fn start(&self) -> Result<(), BusError> {
        let mut threads = self
            .inner
            .threads
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !threads.workers.is_empty() {
            return Err(BusError::AlreadyRunning);
        }
        tracing::debug!(workers = self.inner.config.workers, "starting event bus");

        for index in 0..self.inner.config.workers.max(1) {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("eventbus-{}", index))
                .spawn(move || inner.worker_loop())?;
            threads.workers.push(handle);
        }

        if let Some(period) = self.inner.config.tick_period() {
            let (cancel, cancelled) = oneshot::channel();
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name("eventbus-clock".to_string())
                .spawn(move || inner.clock_loop(period, cancelled))?;
            threads.clock = Some((cancel, handle));
        }

        Ok(())
    }

    /// Stop the clock, drain the queue, then shut every worker down
    pub fn stop(&self) {
        let mut threads = {
            let mut guard = self
                .inner
                .threads
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        if threads.workers.is_empty() {
            return;
        }

        tracing::debug!("cancelling clock");
        if let Some((cancel, handle)) = threads.clock.take() {
            let _ = cancel.send(());
            if handle.join().is_err() {
                tracing::error!("clock thread panicked");
            }
        }

        tracing::debug!("waiting for queue to drain");
        self.inner.wait_drained();

        tracing::debug!(workers = threads.workers.len(), "shutting down workers");
        for _ in &threads.workers {
            let _ = self.inner.sender.send(Envelope::Shutdown);
        }
        for handle in threads.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("event bus worker panicked");
            }
        }
    }

    /// Block until the queue is drained, without stopping the workers
    ///
    /// Returns immediately when the bus is not running.
    pub fn flush(&self) {
        if self.is_running() {
            self.inner.wait_drained();
        }
    }
}

impl Inner {
    fn enqueue(&self, event: Event, done: Option<oneshot::Sender<()>>) {
        tracing::debug!(event = %event, "publishing");
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if self.sender.send(Envelope::Dispatch { event, done }).is_err() {
            self.task_done();
        }
    }

    fn task_done(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self
            .drained
            .wait_while(pending, |pending| *pending > 0)
            .unwrap_or_else(|e| e.into_inner());
    }

    fn worker_loop(&self) {
        loop {
            let envelope = {
                let mut receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
                receiver.blocking_recv()
            };
            match envelope {
                None | Some(Envelope::Shutdown) => break,
                Some(Envelope::Dispatch { event, done }) => {
                    self.dispatch(&event);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    self.task_done();
                }
            }
        }
    }

    fn dispatch(&self, event: &Event) {
        let subscribers: Vec<Arc<Registered>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for registered in subscribers
            .iter()
            .filter(|r| r.subscription.matches(event))
        {
            let subscription = &registered.subscription;
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.callback)(event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::error!(
                    event = %event.name(),
                    subscriber = %registered.id,
                    description = %subscription.description,
                    %error,
                    "exception while dispatching event"
                ),
                Err(payload) => tracing::error!(
                    event = %event.name(),
                    subscriber = %registered.id,
                    description = %subscription.description,
                    panic = %panic_message(payload.as_ref()),
                    "subscriber panicked while dispatching event"
                ),
            }

            let elapsed = started.elapsed();
            if elapsed > self.config.slow_handler {
                tracing::warn!(
                    event = %event.name(),
                    subscriber = %registered.id,
                    description = %subscription.description,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow event handler"
                );
            }
        }
    }

    fn clock_loop(&self, period: Duration, cancelled: oneshot::Receiver<()>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(error) => {
                tracing::error!(%error, "unable to start clock runtime");
                return;
            }
        };

        runtime.block_on(async move {
            let mut cancelled = cancelled;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut count = 0u64;
            let mut last = Instant::now();

            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = interval.tick() => {
                        count += 1;
                        let now = Instant::now();
                        let delta = now.duration_since(last).as_secs_f64();
                        last = now;
                        self.enqueue(Event::new(Payload::Tick { count, delta }), None);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
