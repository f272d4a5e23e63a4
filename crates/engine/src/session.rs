// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test session run loop

use crate::error::SessionError;
use crate::task::{Task, TaskRunner};
use pd_core::{
    Clock, Event, EventBus, EventFilter, FilterError, FsmBuilder, GeneralConfig, LatchRegistry,
    MetricSummarizer, ParameterBatch, Payload, Policy, PolicyFsm, SubscriberId, Summarizer,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// How often the run loop checks whether the policies are done
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wires the bus, policies, parameter batch, summarizer and tasks together
/// and drives them through the configured number of runs
///
/// A session runs once. Share it behind an `Arc` to interrupt it from
/// another thread while [`run`](Self::run) blocks.
pub struct Session {
    config: GeneralConfig,
    bus: EventBus,
    parameters: ParameterBatch,
    summarizer: Summarizer,
    latches: LatchRegistry,
    policies: RwLock<Vec<Arc<dyn Policy>>>,
    tasks: TaskRunner,
    task_subscription: SubscriberId,
    poll_interval: Duration,
    started: AtomicBool,
    interrupted: AtomicBool,
}

impl Session {
    pub fn new(config: GeneralConfig, summarizers: Vec<Box<dyn MetricSummarizer>>) -> Result<Self, SessionError> {
        config.validate()?;
        let bus = EventBus::new(config.bus.clone());
        let parameters = ParameterBatch::from_config(bus.clone(), &config);
        let summarizer = Summarizer::from_config(&config, summarizers)?;
        summarizer.attach(&bus);
        let tasks = TaskRunner::default();
        let task_subscription = tasks.attach(&bus);

        Ok(Self {
            config,
            bus,
            parameters,
            summarizer,
            latches: LatchRegistry::new(),
            policies: RwLock::new(Vec::new()),
            tasks,
            task_subscription,
            poll_interval: POLL_INTERVAL,
            started: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        })
    }

    /// Build a session from a TOML configuration file
    pub fn load(path: &Path, summarizers: Vec<Box<dyn MetricSummarizer>>) -> Result<Self, SessionError> {
        Self::new(GeneralConfig::load(path)?, summarizers)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &GeneralConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn parameters(&self) -> &ParameterBatch {
        &self.parameters
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    /// Latches shared by every filter built through [`filter`](Self::filter)
    pub fn latches(&self) -> &LatchRegistry {
        &self.latches
    }

    /// Compile a filter whose `single` clauses latch for the whole session
    pub fn filter(&self, expression: &str) -> Result<EventFilter, FilterError> {
        EventFilter::with_latches(expression, self.latches.clone())
    }

    /// Spawn a policy machine fed from the session bus
    pub fn add_policy<C: Send + 'static, K: Clock>(&self, builder: FsmBuilder<C, K>) -> Result<(), SessionError> {
        let policy = PolicyFsm::spawn(builder, &self.bus, self.parameters.clone())?;
        self.register_policy(Arc::new(policy));
        Ok(())
    }

    /// Register an already running policy
    pub fn register_policy(&self, policy: Arc<dyn Policy>) {
        tracing::debug!(policy = %policy.name(), "registered policy");
        self.policies.write().unwrap_or_else(|e| e.into_inner()).push(policy);
    }

    pub fn add_task(&self, task: impl Task + 'static) {
        self.tasks.register(Arc::new(task));
    }

    /// Name and current state of every policy
    pub fn policy_states(&self) -> Vec<(String, String)> {
        self.policies()
            .iter()
            .map(|policy| (policy.name().to_string(), policy.state()))
            .collect()
    }

    /// Ask every policy to wind down and end the run loop
    pub fn interrupt(&self) {
        tracing::error!("interrupting tests");
        self.interrupted.store(true, Ordering::SeqCst);
        self.bus.publish(Event::new(Payload::Interrupt));
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run the tests to completion
    ///
    /// Blocks until every run is over (or the session is interrupted) and
    /// the teardown tasks have finished.
    pub fn run(&self) -> Result<(), SessionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning);
        }
        let policies = self.policies();
        let mut remaining = self.config.runs;

        self.bus.start()?;
        self.run_tasks("setup");

        tracing::info!(runs = remaining, "starting tests");
        for policy in &policies {
            tracing::info!(policy = %policy.name(), "using test policy");
            policy.start();
        }
        tracing::debug!("all policies are ready");
        self.bus.publish(Event::new(Payload::Start));

        while !self.is_interrupted() && remaining > 0 {
            self.run_tasks("pretest");
            self.wait_for_policies(&policies);
            tracing::info!("all tests completed");
            self.run_tasks("posttest");

            remaining -= 1;
            if !self.is_interrupted() && remaining > 0 {
                tracing::info!(remaining, "restarting tests");
                for policy in &policies {
                    policy.start();
                }
                self.bus.publish(Event::new(Payload::Restart));
            }
        }

        self.bus.publish(Event::new(Payload::Teardown));
        self.run_tasks("teardown");

        self.bus.flush();
        for policy in &policies {
            policy.shutdown();
        }
        self.tasks.join();
        self.bus.flush();
        self.bus.stop();
        Ok(())
    }

    fn run_tasks(&self, at: &str) {
        self.bus.publish(Event::new(Payload::RunTask { task: at.to_string() }));
    }

    /// Poll until every policy reaches `End`, nudging stalled ones
    fn wait_for_policies(&self, policies: &[Arc<dyn Policy>]) {
        while !self.is_interrupted() {
            let mut active = false;
            for policy in policies.iter().filter(|policy| !policy.is_finished()) {
                active = true;
                let idle = policy.idle_for();
                if idle > self.config.stale_timeout {
                    tracing::warn!(
                        policy = %policy.name(),
                        state = %policy.state(),
                        idle_ms = idle.as_millis() as u64,
                        "policy stalled"
                    );
                    policy.handle_event(Event::new(Payload::Stalled));
                }
            }
            if !active {
                return;
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn policies(&self) -> Vec<Arc<dyn Policy>> {
        self.policies.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.task_subscription);
        for policy in self.policies() {
            policy.shutdown();
        }
        if self.bus.is_running() {
            self.bus.stop();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("runs", &self.config.runs)
            .field("policies", &self.policy_states())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
