//! Policy state machine specs
//!
//! Verify enter-hook ordering, bus-driven transitions and waiting.

use crate::prelude::*;

#[test]
fn nested_gotos_enter_each_state_once_in_order() {
    let log = Log::default();
    let fsm = FsmBuilder::new("chain", log.clone())
        .state("Start", |s| s.on_enter(|cx| {
            cx.push("Start");
            Ok(cx.goto("Other")?)
        }))
        .state("Other", |s| s.on_enter(|cx| {
            cx.push("Other");
            Ok(cx.goto(END)?)
        }))
        .state(END, |s| s.on_enter(|cx| {
            cx.push(END);
            Ok(())
        }))
        .build()
        .unwrap();

    fsm.start();

    assert_eq!(log.entries(), vec!["Start", "Other", "End"]);
    assert_eq!(fsm.state(), END);
}

#[test]
fn policies_follow_bus_events_until_end() {
    let bus = fifo_bus();
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::new());
    let policy = PolicyFsm::spawn(
        FsmBuilder::new("counter", 0u32)
            .state("Start", |s| s.on_enter(|cx| Ok(cx.goto("Counting")?)))
            .state("Counting", |s| s.on("FooEvent", |cx, _| {
                **cx += 1;
                if **cx == 3 {
                    cx.goto(END)?;
                }
                Ok(())
            }))
            .state(END, |s| s),
        &bus,
        batch,
    )
    .unwrap();

    bus.start().unwrap();
    policy.start();
    for n in 0..3 {
        bus.publish(foo(json!({ "n": n })));
    }

    policy.wait(END, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(policy.with_context(|count| *count), 3);
    policy.shutdown();
    bus.stop();
}

#[test]
fn missing_end_state_is_rejected_for_policies() {
    let bus = fifo_bus();
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::new());
    let result = PolicyFsm::spawn(
        FsmBuilder::new("incomplete", ()).state("Start", |s| s),
        &bus,
        batch,
    );
    assert!(result.is_err());
}

#[test]
fn interrupt_sends_policies_to_end() {
    let bus = fifo_bus();
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::new());
    let policy = PolicyFsm::spawn(
        FsmBuilder::new("idle", ())
            .state("Start", |s| s.on_enter(|cx| Ok(cx.goto("Waiting")?)))
            .state("Waiting", |s| s)
            .state(END, |s| s),
        &bus,
        batch,
    )
    .unwrap();

    bus.start().unwrap();
    policy.start();
    bus.publish(Event::new(Payload::Interrupt));

    policy.wait(END, Some(Duration::from_secs(5))).unwrap();
    policy.shutdown();
    bus.stop();
}
