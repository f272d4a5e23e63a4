//! Parameter batch specs
//!
//! Verify coalescing and trace rotation of parameter updates.

use crate::prelude::*;

fn updates(events: &Arc<Mutex<Vec<Event>>>) -> Vec<Event> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| event.is_a("ParameterUpdateEvent"))
        .cloned()
        .collect()
}

#[test]
fn one_update_per_flush_with_the_promised_trace() {
    let bus = fifo_bus();
    let events = record(&bus, &[]);
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::from([("foo".to_string(), json!(1))]));

    bus.start().unwrap();
    let promised = batch.set_parameter("foo", 2);
    batch.set_parameters([("bar", json!(3)), ("foo", json!(4))]);
    assert_eq!(batch.flush(), Some(promised));
    bus.stop();

    let updates = updates(&events);
    assert_eq!(updates.len(), 1);
    assert!(updates[0].has_trace(&promised));
    match updates[0].payload() {
        Payload::ParameterUpdate {
            parameters,
            old_parameters,
            changes,
        } => {
            similar_asserts::assert_eq!(
                parameters,
                &ParameterMap::from([("foo".to_string(), json!(4)), ("bar".to_string(), json!(3))])
            );
            assert_eq!(old_parameters, &ParameterMap::from([("foo".to_string(), json!(1))]));
            assert_eq!(changes, parameters);
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn unchanged_values_publish_nothing() {
    let bus = fifo_bus();
    let events = record(&bus, &[]);
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::from([("foo".to_string(), json!(1))]));

    bus.start().unwrap();
    let pending = batch.set_parameter("foo", 1);
    assert_eq!(batch.flush(), None);
    assert_eq!(batch.flush(), None);
    bus.stop();

    assert!(events.lock().unwrap().is_empty());
    assert_eq!(batch.next_trace(), pending);
}

#[test]
fn flags_describe_the_run_that_just_ended() {
    let bus = fifo_bus();
    let events = record(&bus, &[]);
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::new());

    bus.start().unwrap();
    let first = batch.set_parameter("instances", 1);
    batch.flush();
    batch.set_flag("failed", true);
    let second = batch.set_parameter("instances", 2);
    batch.flush();
    bus.stop();

    let events = events.lock().unwrap();
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["ParameterUpdateEvent", "FlagUpdateEvent", "ParameterUpdateEvent"]);
    assert!(events[1].has_trace(&first));
    assert!(!events[1].has_trace(&second));
    assert!(events[2].has_trace(&second));
}
