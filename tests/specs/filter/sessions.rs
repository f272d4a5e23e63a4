//! Event filter specs
//!
//! Verify selector matching, delivery flags and trace scoping.

use crate::prelude::*;

fn collect(filter: &EventFilter, scope: Option<TraceSet>) -> (pd_core::FilterSession, Arc<Mutex<Vec<Event>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let session = filter.start(scope, move |event| sink.lock().unwrap().push(event.clone()));
    (session, seen)
}

#[test]
fn regex_predicate_within_trace_scope() {
    let t1 = TraceId::allocate();
    let filter: EventFilter = "FooEvent[a~=u?lo+]".parse().unwrap();
    let (session, seen) = collect(&filter, Some(TraceSet::from(t1)));

    session.handle(&Event::traced(Payload::custom("FooEvent", json!({"a": "Helllll"})), t1));
    assert_eq!(seen.lock().unwrap().len(), 0);

    session.handle(&Event::traced(Payload::custom("FooEvent", json!({"a": "Heloooo"})), t1));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn first_and_last_pick_the_boundary_matches() {
    let one = foo(json!({"n": 1}));
    let two = foo(json!({"n": 2}));

    let (first, first_seen) = collect(&EventFilter::new("FooEvent:first").unwrap(), None);
    let (last, last_seen) = collect(&EventFilter::new("FooEvent:last").unwrap(), None);
    for event in [&one, &two] {
        first.handle(event);
        last.handle(event);
    }
    assert_eq!(*first_seen.lock().unwrap(), vec![one.clone()]);
    assert!(last_seen.lock().unwrap().is_empty());

    first.finalize();
    last.finalize();
    assert_eq!(*first_seen.lock().unwrap(), vec![one]);
    assert_eq!(*last_seen.lock().unwrap(), vec![two]);
}

#[test]
fn attribute_predicates_compare_values() {
    let filter = EventFilter::new("HTTPResponseEvent[status>=500,headers.server!=nginx]").unwrap();
    let (session, seen) = collect(&filter, None);
    let response = |status: i64, server: &str| {
        Event::new(Payload::custom(
            "HTTPResponseEvent",
            json!({"status": status, "headers": {"server": server}}),
        ))
    };

    session.handle(&response(200, "envoy"));
    session.handle(&response(503, "nginx"));
    session.handle(&response(502, "envoy"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].attributes()["status"], json!(502));
}

#[test]
fn after_debounces_until_activity_settles() {
    let filter = EventFilter::new("FooEvent:after(40ms)").unwrap();
    let (session, seen) = collect(&filter, None);
    let burst: Vec<Event> = (0..3).map(|n| foo(json!({ "n": n }))).collect();

    for event in &burst {
        session.handle(event);
    }
    assert!(wait_until(|| seen.lock().unwrap().len() == 1));
    assert_eq!(*seen.lock().unwrap(), vec![burst[2].clone()]);
}

#[test]
fn malformed_expressions_fail_at_construction() {
    for expression in ["FooEvent[a=1", "FooEvent:sometimes", "FooEvent:nth(x)", "FooEvent:after(soon)", "FooEvent[a]"] {
        assert!(EventFilter::new(expression).is_err(), "{} should not compile", expression);
    }
}

#[test]
fn sessions_can_wait_for_a_trace_before_it_exists() {
    let bus = fifo_bus();
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::new());
    let filter = EventFilter::new("DeploymentCompletedEvent:first").unwrap();

    let trace = batch.set_parameter("instances", 5);
    let (session, seen) = collect(&filter, Some(TraceSet::from(trace)));
    let session = Arc::new(session);
    let feed = Arc::clone(&session);
    bus.subscribe(Subscription::new(move |event| {
        feed.handle(event);
        Ok(())
    }));
    // A channel answering every parameter update with a deployment event
    let channel = bus.clone();
    bus.subscribe(
        Subscription::new(move |event| {
            channel.publish(Event::traced(
                Payload::custom("DeploymentCompletedEvent", json!({})),
                event.traceids(),
            ));
            Ok(())
        })
        .types(["ParameterUpdateEvent"]),
    );
    // An unrelated deployment outside the trace
    bus.start().unwrap();
    bus.publish(Event::new(Payload::custom("DeploymentCompletedEvent", json!({}))));
    batch.flush();

    assert!(wait_until(|| seen.lock().unwrap().len() == 1));
    bus.stop();
    assert!(seen.lock().unwrap()[0].has_trace(&trace));
}
