//! Summarizer specs
//!
//! Verify metric samples are grouped by the parameter vector that caused
//! them.

use crate::prelude::*;
use pd_core::{MetricSpec, Sample, SummarizerBuilder, SummarizerFn};

fn metrics() -> Vec<MetricSpec> {
    vec![MetricSpec {
        name: "m".to_string(),
        summarize: vec!["max".to_string()],
        desc: None,
        units: None,
    }]
}

fn summarizer() -> Summarizer {
    SummarizerBuilder::new(metrics())
        .summarizer(SummarizerFn::new("max", |samples: &[Sample], _: &ParameterMap| {
            json!(samples.iter().map(|s| s.value).fold(0.0, f64::max))
        }))
        .build()
        .unwrap()
}

fn update(parameters: &ParameterMap, trace: TraceId) -> Event {
    Event::traced(
        Payload::ParameterUpdate {
            parameters: parameters.clone(),
            old_parameters: ParameterMap::new(),
            changes: parameters.clone(),
        },
        trace,
    )
}

#[test]
fn repeated_parameter_vectors_accumulate_on_one_axis() {
    let summarizer = summarizer();
    let parameters = ParameterMap::from([("instances".to_string(), json!(10))]);
    let (id1, id2) = (TraceId::allocate(), TraceId::allocate());

    summarizer.handle_parameter_update(&update(&parameters, id1));
    summarizer.handle_parameter_update(&update(&parameters, id2));
    summarizer.track_metric("m", 3.0, id1).unwrap();
    summarizer.track_metric("m", 5.0, id2).unwrap();

    let raw = summarizer.raw();
    assert_eq!(raw.len(), 1);
    let values: Vec<f64> = raw[0].values["m"].iter().map(|s| s.value).collect();
    assert_eq!(values, vec![3.0, 5.0]);
    assert_eq!(summarizer.sum()[0].values["m"]["max"], json!(5.0));
}

#[test]
fn trackers_attribute_samples_through_filter_sessions() {
    let bus = fifo_bus();
    let summarizer = summarizer();
    summarizer.attach(&bus);
    let batch = ParameterBatch::new(bus.clone(), ParameterMap::from([("instances".to_string(), json!(1))]));

    // A tracker measuring the latency reported by responses of each run
    let filter = EventFilter::new("HTTPResponseEvent[status=200]").unwrap();
    let tracker = summarizer.clone();
    let session = Arc::new(filter.start(None, move |event| {
        let latency = event.attributes()["latency"].as_f64().unwrap_or_default();
        tracker.track_metric("m", latency, event.traceids()).unwrap();
    }));
    let feed = Arc::clone(&session);
    bus.subscribe(
        Subscription::new(move |event| {
            feed.handle(event);
            Ok(())
        })
        .priority(10),
    );

    bus.start().unwrap();
    for (instances, latency) in [(2, 0.25), (4, 0.5)] {
        let trace = batch.set_parameter("instances", instances);
        batch.flush();
        bus.publish(Event::traced(
            Payload::custom("HTTPResponseEvent", json!({"status": 200, "latency": latency})),
            trace,
        ));
    }
    bus.publish(Event::new(Payload::custom(
        "HTTPResponseEvent",
        json!({"status": 200, "latency": 9.0}),
    )));
    bus.stop();
    session.finalize();

    let sum = summarizer.sum();
    assert_eq!(sum.len(), 2);
    assert_eq!(sum[0].parameters["instances"], json!(2));
    assert_eq!(sum[0].values["m"]["max"], json!(0.25));
    assert_eq!(sum[1].parameters["instances"], json!(4));
    assert_eq!(sum[1].values["m"]["max"], json!(0.5));
}
