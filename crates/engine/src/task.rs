// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tasks run at named points of a session
//!
//! The session publishes `RunTaskEvent("setup")`, `"pretest"`,
//! `"posttest"` and `"teardown"`; policies may publish their own. Every
//! task registered at that name then runs on a short-lived thread so the
//! bus worker that delivered the event is never blocked.

use pd_core::{panic_message, Event, EventBus, HandlerResult, Payload, SubscriberId, Subscription};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

/// Work bound to a `RunTaskEvent` name
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// The `RunTaskEvent` task name that triggers this task
    fn at(&self) -> &str;

    fn run(&self) -> HandlerResult;
}

/// A [`Task`] backed by a closure
pub struct TaskFn<F> {
    name: String,
    at: String,
    f: F,
}

impl<F> TaskFn<F>
where
    F: Fn() -> HandlerResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, at: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            at: at.into(),
            f,
        }
    }
}

impl<F> Task for TaskFn<F>
where
    F: Fn() -> HandlerResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn at(&self) -> &str {
        &self.at
    }

    fn run(&self) -> HandlerResult {
        (self.f)()
    }
}

/// Runs registered tasks in response to `RunTaskEvent`s
#[derive(Clone, Default)]
pub(crate) struct TaskRunner {
    tasks: Arc<RwLock<Vec<Arc<dyn Task>>>>,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskRunner {
    pub(crate) fn register(&self, task: Arc<dyn Task>) {
        tracing::debug!(task = %task.name(), at = %task.at(), "registered task");
        self.tasks.write().unwrap_or_else(|e| e.into_inner()).push(task);
    }

    pub(crate) fn attach(&self, bus: &EventBus) -> SubscriberId {
        let runner = self.clone();
        let publisher = bus.clone();
        bus.subscribe(
            Subscription::new(move |event| {
                runner.spawn(&publisher, event);
                Ok(())
            })
            .types(["RunTaskEvent"])
            .description("session tasks"),
        )
    }

    fn spawn(&self, bus: &EventBus, event: &Event) {
        let Payload::RunTask { task: at } = event.payload() else {
            return;
        };
        let runner = self.clone();
        let bus = bus.clone();
        let trigger = event.clone();
        let task_at = at.clone();
        let spawned = thread::Builder::new()
            .name(format!("task-{}", at))
            .spawn(move || runner.complete(&bus, &trigger, &task_at));
        match spawned {
            Ok(handle) => self.running.lock().unwrap_or_else(|e| e.into_inner()).push(handle),
            Err(error) => tracing::error!(at = %at, %error, "unable to spawn task thread"),
        }
    }

    fn complete(&self, bus: &EventBus, trigger: &Event, at: &str) {
        let error = self.run_at(at).err();
        bus.publish(Event::traced(
            Payload::RunTaskCompleted {
                task: at.to_string(),
                error,
            },
            trigger.traceids(),
        ));
    }

    /// Run every task registered at `at`, in registration order
    ///
    /// The first failing task ends the pass.
    pub(crate) fn run_at(&self, at: &str) -> Result<(), String> {
        let tasks: Vec<Arc<dyn Task>> = self
            .tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|task| task.at() == at)
            .cloned()
            .collect();

        for task in tasks {
            tracing::debug!(task = %task.name(), at = %at, "running task");
            let result = match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
            };
            if let Err(error) = result {
                tracing::error!(task = %task.name(), at = %at, %error, "task raised an error");
                return Err(format!("{}: {}", task.name(), error));
            }
        }
        Ok(())
    }

    /// Wait for every task thread started so far
    pub(crate) fn join(&self) {
        let handles = std::mem::take(&mut *self.running.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("task thread panicked");
            }
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
