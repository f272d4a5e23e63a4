//! Event bus dispatch specs
//!
//! Verify priority ordering and fault isolation between subscribers.

use crate::prelude::*;

fn labelled(log: &Log, label: &'static str) -> Subscription {
    let log = log.clone();
    Subscription::new(move |_| {
        log.push(label);
        Ok(())
    })
}

#[test]
fn subscribers_are_called_in_ascending_priority() {
    let bus = fifo_bus();
    let log = Log::default();
    bus.subscribe(labelled(&log, "C").priority(1));
    bus.subscribe(labelled(&log, "B").priority(5));
    bus.subscribe(labelled(&log, "A").priority(10));

    bus.start().unwrap();
    bus.publish_sync(foo(json!({}))).unwrap();
    bus.stop();

    assert_eq!(log.entries(), vec!["C", "B", "A"]);
}

#[test]
fn registration_order_does_not_affect_priority_order() {
    let orders: [[i32; 4]; 3] = [[3, -1, 7, 0], [7, 3, 0, -1], [0, 7, -1, 3]];
    for order in orders {
        let bus = EventBus::new(BusConfig {
            workers: 4,
            clock_frequency: 0.0,
            ..BusConfig::default()
        });
        let log = Log::default();
        for priority in order {
            let log = log.clone();
            bus.subscribe(
                Subscription::new(move |_| {
                    log.push(priority.to_string());
                    Ok(())
                })
                .priority(priority),
            );
        }

        bus.start().unwrap();
        bus.publish(foo(json!({})));
        bus.stop();

        assert_eq!(log.entries(), vec!["-1", "0", "3", "7"]);
    }
}

#[test]
fn failing_subscribers_do_not_starve_others() {
    let bus = fifo_bus();
    let log = Log::default();
    bus.subscribe(Subscription::new(|_| Err("collector unreachable".into())).priority(1));
    bus.subscribe(Subscription::new(|_| panic!("observer bug")).priority(2));
    bus.subscribe(labelled(&log, "reporter").priority(3));

    bus.start().unwrap();
    for n in 0..3 {
        bus.publish(foo(json!({ "n": n })));
    }
    bus.stop();

    assert_eq!(log.len(), 3);
}

#[test]
fn type_filters_match_supertypes() {
    let bus = fifo_bus();
    let observed = record(&bus, &["ObserverEvent"]);

    bus.start().unwrap();
    bus.publish(Event::new(Payload::ObserverValue {
        metric: "cpu".to_string(),
        value: json!(0.5),
    }));
    bus.publish(Event::new(Payload::Observer {
        metric: "cpu".to_string(),
    }));
    bus.publish(foo(json!({})));
    bus.stop();

    let names: Vec<String> = observed.lock().unwrap().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["ObserverValueEvent", "ObserverEvent"]);
}

#[test]
fn events_carry_their_parent_traces() {
    let parent = TraceId::allocate();
    let other = TraceId::allocate();
    let event = Event::traced(Payload::custom("HTTPResponseEvent", json!({"status": 200})), parent);

    assert!(event.has_trace(&parent));
    assert!(event.has_traces(&TraceSet::from([other, parent])));
    assert!(!event.has_traces(&TraceSet::from(other)));
    assert!(event.is_a("Event"));
}
