//! Shared helpers for specs

pub use pd_core::{
    BusConfig, Event, EventBus, EventFilter, FsmBuilder, GeneralConfig, ParameterBatch, ParameterMap,
    Payload, Policy, PolicyFsm, Subscription, Summarizer, TraceId, TraceSet, END,
};
pub use serde_json::{json, Value};
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

/// A bus with one worker and no clock, so dispatch order is global FIFO
pub fn fifo_bus() -> EventBus {
    EventBus::new(BusConfig {
        workers: 1,
        clock_frequency: 0.0,
        ..BusConfig::default()
    })
}

/// Collects labelled observations from callbacks on any thread
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Subscribe a callback that records every event it sees
pub fn record(bus: &EventBus, types: &[&str]) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = Subscription::new(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    let subscription = if types.is_empty() {
        subscription
    } else {
        subscription.types(types.iter().copied())
    };
    bus.subscribe(subscription);
    events
}

/// Poll `condition` until it holds or a generous deadline passes
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn foo(data: Value) -> Event {
    Event::new(Payload::custom("FooEvent", data))
}
