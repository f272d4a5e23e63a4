// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::SummarizerError;
use crate::event::{parameters_equal, ParameterMap};
use crate::trace::TraceSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One metric value and when it was tracked
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub value: f64,
}

/// All samples collected for one exact parameter vector
///
/// Restarting a test with a parameter vector seen before adds trace ids
/// to the existing axis instead of creating a new one.
#[derive(Debug)]
pub struct Axis {
    parameters: ParameterMap,
    traceids: Mutex<TraceSet>,
    flags: Mutex<BTreeMap<String, Value>>,
    series: BTreeMap<String, Mutex<Vec<Sample>>>,
}

impl Axis {
    pub(crate) fn new(parameters: ParameterMap, traceids: TraceSet, metrics: &[String]) -> Self {
        Self {
            parameters,
            traceids: Mutex::new(traceids),
            flags: Mutex::new(BTreeMap::new()),
            series: metrics
                .iter()
                .map(|name| (name.clone(), Mutex::new(Vec::new())))
                .collect(),
        }
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Same parameter vector, comparing numbers by value
    pub fn matches(&self, parameters: &ParameterMap) -> bool {
        parameters_equal(&self.parameters, parameters)
    }

    pub fn traceids(&self) -> TraceSet {
        lock(&self.traceids).clone()
    }

    pub(crate) fn add_traces(&self, traceids: &TraceSet) {
        lock(&self.traceids).extend(traceids);
    }

    pub fn flags(&self) -> BTreeMap<String, Value> {
        lock(&self.flags).clone()
    }

    pub(crate) fn set_flag(&self, name: &str, value: Value) {
        lock(&self.flags).insert(name.to_string(), value);
    }

    /// Append a sample to the metric's timeseries
    pub(crate) fn push(&self, metric: &str, sample: Sample) -> Result<(), SummarizerError> {
        let series = self
            .series
            .get(metric)
            .ok_or_else(|| SummarizerError::UnknownMetric(metric.to_string()))?;
        lock(series).push(sample);
        Ok(())
    }

    /// A snapshot of one metric's timeseries
    pub fn samples(&self, metric: &str) -> Option<Vec<Sample>> {
        self.series.get(metric).map(|series| lock(series).clone())
    }

    /// Snapshots of every timeseries, keyed by metric
    pub fn timeseries(&self) -> BTreeMap<String, Vec<Sample>> {
        self.series
            .iter()
            .map(|(name, series)| (name.clone(), lock(series).clone()))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
