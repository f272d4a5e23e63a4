//! Session run loop specs
//!
//! Verify a configured session drives policies, tasks and the summarizer
//! through every run.

use crate::prelude::*;
use pd_engine::{Session, TaskFn};

const CONFIG: &str = r#"
runs = 2
stale_timeout = "10m"

[bus]
workers = 2
clock_frequency = 0.0

[[parameter]]
name = "instances"
default = 1

[[metric]]
name = "deploy_time"
"#;

#[test]
fn sweeps_parameters_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("driver.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let session = Session::load(&path, Vec::new())
        .unwrap()
        .with_poll_interval(Duration::from_millis(5));

    // Each run scales up by one step and waits for the start of the run
    let batch = session.parameters().clone();
    session
        .add_policy(
            FsmBuilder::new("sweep", (batch, 1i64))
                .state("Start", |s| s.on_enter(|cx| {
                    cx.1 += 1;
                    let instances = cx.1;
                    cx.0.set_parameter("instances", instances);
                    Ok(cx.goto("Waiting")?)
                }))
                .state("Waiting", |s| {
                    s.on("StartEvent", |cx, _| Ok(cx.goto(END)?))
                    .on("RestartEvent", |cx, _| Ok(cx.goto(END)?))
                })
                .state(END, |s| s),
        )
        .unwrap();

    let log = Log::default();
    for at in ["setup", "teardown"] {
        let log = log.clone();
        session.add_task(TaskFn::new(at, at, move || {
            log.push(at);
            Ok(())
        }));
    }

    session.run().unwrap();

    let axes = session.summarizer().raw();
    let instances: Vec<&Value> = axes.iter().map(|axis| &axis.parameters["instances"]).collect();
    assert_eq!(instances, vec![&json!(2), &json!(3)]);
    assert!(axes.iter().all(|axis| axis.values["deploy_time"].is_empty()));
    let mut ran = log.entries();
    ran.sort();
    assert_eq!(ran, vec!["setup", "teardown"]);
    assert!(!session.bus().is_running());
}

#[test]
fn undeclared_summarizers_fail_before_running() {
    let config = GeneralConfig::from_toml_str(
        r#"
        [[metric]]
        name = "latency"
        summarize = "p99"
        "#,
    )
    .unwrap();
    assert!(matches!(
        Session::new(config, Vec::new()),
        Err(pd_engine::SessionError::Summarizer(_))
    ));
}
