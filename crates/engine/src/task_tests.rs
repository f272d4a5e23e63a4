// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pd_core::BusConfig;
use std::sync::mpsc;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn logging_task(log: &Log, name: &str, at: &str) -> TaskFn<impl Fn() -> HandlerResult + Send + Sync> {
    let log = Arc::clone(log);
    let entry = name.to_string();
    TaskFn::new(name, at, move || {
        log.lock().unwrap().push(entry.clone());
        Ok(())
    })
}

#[test]
fn runs_tasks_registered_at_the_name_in_order() {
    let log = Log::default();
    let runner = TaskRunner::default();
    runner.register(Arc::new(logging_task(&log, "deploy", "setup")));
    runner.register(Arc::new(logging_task(&log, "warm", "pretest")));
    runner.register(Arc::new(logging_task(&log, "seed", "setup")));

    assert_eq!(runner.run_at("setup"), Ok(()));
    assert_eq!(*log.lock().unwrap(), vec!["deploy", "seed"]);
    assert_eq!(runner.run_at("nothing"), Ok(()));
}

#[test]
fn first_failure_ends_the_pass() {
    let log = Log::default();
    let runner = TaskRunner::default();
    runner.register(Arc::new(TaskFn::new("broken", "setup", || Err("no cluster".into()))));
    runner.register(Arc::new(logging_task(&log, "after", "setup")));

    assert_eq!(runner.run_at("setup"), Err("broken: no cluster".to_string()));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn panicking_tasks_are_reported() {
    let runner = TaskRunner::default();
    runner.register(Arc::new(TaskFn::new("bad", "teardown", || panic!("boom"))));

    let error = runner.run_at("teardown").unwrap_err();
    assert!(error.contains("boom"), "{}", error);
}

#[test]
fn run_task_events_publish_completion_on_the_same_trace() {
    let bus = EventBus::new(BusConfig {
        workers: 2,
        clock_frequency: 0.0,
        ..BusConfig::default()
    });
    let runner = TaskRunner::default();
    runner.register(Arc::new(TaskFn::new("fail", "posttest", || Err("oops".into()))));
    let subscription = runner.attach(&bus);

    let (sender, completed) = mpsc::channel();
    let sender = Mutex::new(sender);
    bus.subscribe(
        Subscription::new(move |event| {
            let _ = sender.lock().unwrap().send(event.clone());
            Ok(())
        })
        .types(["RunTaskCompletedEvent"]),
    );

    bus.start().unwrap();
    let trigger = Event::new(Payload::RunTask {
        task: "posttest".to_string(),
    });
    bus.publish(trigger.clone());

    let event = completed.recv_timeout(Duration::from_secs(5)).unwrap();
    runner.join();
    bus.unsubscribe(&subscription);
    bus.stop();

    assert!(event.has_trace(&trigger.id()));
    assert_eq!(
        event.payload(),
        &Payload::RunTaskCompleted {
            task: "posttest".to_string(),
            error: Some("fail: oops".to_string()),
        }
    );
}
