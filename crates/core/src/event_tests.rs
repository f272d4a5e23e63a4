// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn every_event_carries_a_fresh_trace_id() {
    let a = Event::new(Payload::Start);
    let b = Event::new(Payload::Start);

    assert_eq!(a.traceids().len(), 1);
    assert!(a.has_trace(&a.id()));
    assert!(!a.has_trace(&b.id()));
    assert_ne!(a, b);
}

#[test]
fn parent_traces_are_kept_next_to_the_fresh_one() {
    let parent = TraceId::allocate();
    let event = Event::traced(Payload::Stalled, parent);

    assert!(event.has_trace(&parent));
    assert!(event.has_trace(&event.id()));
    assert_eq!(event.traceids().len(), 2);
}

#[test]
fn parents_accept_lists_and_sets() {
    let a = TraceId::allocate();
    let b = TraceId::allocate();

    let from_vec = Event::traced(Payload::Start, vec![a, b]);
    let from_array = Event::traced(Payload::Start, [a, b]);
    let from_set = Event::traced(Payload::Start, from_vec.traceids());

    assert!(from_vec.has_trace(&a) && from_vec.has_trace(&b));
    assert!(from_array.has_trace(&a) && from_array.has_trace(&b));
    assert!(from_set.has_trace(&from_vec.id()));
}

#[test]
fn has_traces_is_true_iff_sets_intersect() {
    let t = TraceId::allocate();
    let other = TraceId::allocate();
    let event = Event::traced(Payload::Start, t);

    assert!(event.has_traces(&TraceSet::from([other, t])));
    assert!(!event.has_traces(&TraceSet::from(other)));
    assert!(!event.has_traces(&TraceSet::new()));
}

#[test]
fn observer_value_is_an_observer_event() {
    let event = Event::new(Payload::ObserverValue {
        metric: "cpu".to_string(),
        value: json!(0.5),
    });

    assert_eq!(event.name(), "ObserverValueEvent");
    assert!(event.is_a("ObserverValueEvent"));
    assert!(event.is_a("ObserverEvent"));
    assert!(event.is_a("Event"));
    assert!(!event.is_a("TickEvent"));
}

#[test]
fn custom_events_declare_their_supertypes() {
    let event = Event::new(Payload::custom("HTTPResponseEndEvent", json!({})).subtype_of("HTTPEvent"));

    assert!(event.is_a("HTTPResponseEndEvent"));
    assert!(event.is_a("HTTPEvent"));
    assert!(event.is_a("Event"));
    assert!(!event.is_a("HTTPRequestEvent"));
}

#[test]
fn attributes_flatten_the_payload() {
    let event = Event::new(Payload::Tick { count: 3, delta: 1.5 });
    let attrs = event.attributes();

    assert_eq!(attrs["count"], json!(3));
    assert_eq!(attrs["delta"], json!(1.5));
    assert_eq!(attrs["event"], json!("TickEvent"));
    assert!(attrs["traceids"].is_array());
    assert!(attrs["ts"].is_number());
}

#[test]
fn custom_attributes_are_the_data_map() {
    let event = Event::new(Payload::custom("FooEvent", json!({"a": "He", "b": {"c": 1}})));
    let attrs = event.attributes();

    assert_eq!(attrs["a"], json!("He"));
    assert_eq!(attrs["b"]["c"], json!(1));
    assert_eq!(attrs["event"], json!("FooEvent"));
}

#[test]
fn log_lines_drop_ansi_sequences() {
    let event = Event::new(Payload::log_line("\x1b[31mred\x1b[0m text", "stdout", None));

    match event.payload() {
        Payload::LogLine { line, .. } => assert_eq!(line, "red text"),
        other => panic!("unexpected payload {:?}", other),
    }
    assert!(event.to_string().ends_with("<red text>"));
}

#[test]
fn display_lists_traces() {
    let parent = TraceId::allocate();
    let event = Event::traced(Payload::Teardown, parent);

    assert_eq!(
        event.to_string(),
        format!("TeardownEvent[trace={},{}]", parent, event.id())
    );
}

#[test]
fn serializes_as_attribute_map() {
    let event = Event::new(Payload::FlagUpdate {
        name: "failed".to_string(),
        value: json!(true),
    });
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["name"], json!("failed"));
    assert_eq!(value["value"], json!(true));
    assert_eq!(value["event"], json!("FlagUpdateEvent"));
}

#[test]
fn numbers_compare_by_value() {
    assert!(values_equal(&json!(1), &json!(1.0)));
    assert!(values_equal(&json!(0.0), &json!(0)));
    assert!(values_equal(&json!([1, {"a": 2.0}]), &json!([1.0, {"a": 2}])));
    assert!(!values_equal(&json!(1), &json!("1")));
    assert!(!values_equal(&json!([1]), &json!([1, 2])));
    assert!(!values_equal(&json!({"a": 1}), &json!({"b": 1})));
}

#[test]
fn parameter_vectors_compare_by_value() {
    let ints = ParameterMap::from([("x".to_string(), json!(0)), ("n".to_string(), json!(3))]);
    let floats = ParameterMap::from([("x".to_string(), json!(0.0)), ("n".to_string(), json!(3.0))]);
    assert!(parameters_equal(&ints, &floats));

    let fewer = ParameterMap::from([("x".to_string(), json!(0))]);
    assert!(!parameters_equal(&ints, &fewer));
}
