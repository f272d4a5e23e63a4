// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric summarizer
//!
//! Every `ParameterUpdateEvent` opens (or extends) an axis for its exact
//! parameter vector and indexes the event's trace ids to it. Trackers
//! then report metric values with the trace ids of whatever they
//! observed, and the sample lands on the axis that caused it.

mod axis;
mod indicator;

pub use axis::{Axis, Sample};
pub use indicator::{Indicator, NormalizedIndicator, Reduction};

use crate::bus::{EventBus, SubscriberId, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::{GeneralConfig, MetricSpec};
use crate::event::{Event, ParameterMap, Payload};
use crate::expr::ExprError;
use crate::trace::{TraceId, TraceSet};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("metric '{0}' is not declared")]
    UnknownMetric(String),
    #[error("metric '{metric}' uses unknown summarizer '{summarizer}'")]
    UnknownSummarizer { metric: String, summarizer: String },
    #[error("indicator '{name}' has unknown class '{class}'")]
    UnknownIndicator { name: String, class: String },
    #[error("invalid indicator '{name}': {reason}")]
    InvalidIndicator { name: String, reason: String },
    #[error("invalid normalization for indicator '{indicator}': {source}")]
    Expr {
        indicator: String,
        #[source]
        source: ExprError,
    },
}

/// Reduces one timeseries to a value
///
/// Most summarizers return a number; value-with-error summarizers return
/// a `[value, error]` pair.
pub trait MetricSummarizer: Send + Sync {
    fn name(&self) -> &str;

    fn summarize(&self, samples: &[Sample], parameters: &ParameterMap) -> Value;
}

/// A [`MetricSummarizer`] backed by a closure
pub struct SummarizerFn<F> {
    name: String,
    f: F,
}

impl<F> SummarizerFn<F>
where
    F: Fn(&[Sample], &ParameterMap) -> Value + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> MetricSummarizer for SummarizerFn<F>
where
    F: Fn(&[Sample], &ParameterMap) -> Value + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn summarize(&self, samples: &[Sample], parameters: &ParameterMap) -> Value {
        (self.f)(samples, parameters)
    }
}

/// Raw timeseries of one axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawAxis {
    pub parameters: ParameterMap,
    pub flags: BTreeMap<String, Value>,
    pub values: BTreeMap<String, Vec<Sample>>,
}

/// Summarized values of one axis, keyed by metric then summarizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizedAxis {
    pub parameters: ParameterMap,
    pub flags: BTreeMap<String, Value>,
    pub values: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Collects metric samples per parameter vector
pub struct SummarizerBuilder<K: Clock = SystemClock> {
    metrics: Vec<MetricSpec>,
    summarizers: HashMap<String, Arc<dyn MetricSummarizer>>,
    indicators: Vec<Arc<dyn Indicator>>,
    clock: K,
}

impl SummarizerBuilder<SystemClock> {
    pub fn new(metrics: Vec<MetricSpec>) -> Self {
        Self {
            metrics,
            summarizers: HashMap::new(),
            indicators: Vec::new(),
            clock: SystemClock,
        }
    }
}

impl<K: Clock> SummarizerBuilder<K> {
    /// Register a summarizer metrics may name in `summarize`
    pub fn summarizer(mut self, summarizer: impl MetricSummarizer + 'static) -> Self {
        self.summarizers
            .insert(summarizer.name().to_string(), Arc::new(summarizer));
        self
    }

    pub fn indicator(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicators.push(Arc::new(indicator));
        self
    }

    pub fn clock<K2: Clock>(self, clock: K2) -> SummarizerBuilder<K2> {
        SummarizerBuilder {
            metrics: self.metrics,
            summarizers: self.summarizers,
            indicators: self.indicators,
            clock,
        }
    }

    /// Check every metric's summarizers are registered
    pub fn build(self) -> Result<Summarizer<K>, SummarizerError> {
        for metric in &self.metrics {
            for name in &metric.summarize {
                if !self.summarizers.contains_key(name) {
                    return Err(SummarizerError::UnknownSummarizer {
                        metric: metric.name.clone(),
                        summarizer: name.clone(),
                    });
                }
            }
        }

        Ok(Summarizer {
            inner: Arc::new(Inner {
                metric_names: self.metrics.iter().map(|m| m.name.clone()).collect(),
                metrics: self.metrics,
                summarizers: self.summarizers,
                indicators: self.indicators,
                clock: self.clock,
                axes: RwLock::new(Vec::new()),
                lookup: RwLock::new(HashMap::new()),
            }),
        })
    }
}

struct Inner<K> {
    metrics: Vec<MetricSpec>,
    metric_names: Vec<String>,
    summarizers: HashMap<String, Arc<dyn MetricSummarizer>>,
    indicators: Vec<Arc<dyn Indicator>>,
    clock: K,
    axes: RwLock<Vec<Arc<Axis>>>,
    lookup: RwLock<HashMap<TraceId, Arc<Axis>>>,
}

/// Groups metric samples into axes
///
/// Cheap to clone; clones share the same axes.
pub struct Summarizer<K: Clock = SystemClock> {
    inner: Arc<Inner<K>>,
}

impl<K: Clock> Clone for Summarizer<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Summarizer<SystemClock> {
    /// Build from the declared metrics and indicators
    ///
    /// Every summarizer a metric names must be among `summarizers`, and
    /// every indicator must read a summarizer its metric applies.
    pub fn from_config(
        config: &GeneralConfig,
        summarizers: Vec<Box<dyn MetricSummarizer>>,
    ) -> Result<Self, SummarizerError> {
        let mut builder = SummarizerBuilder::new(config.metrics.clone());
        for summarizer in summarizers {
            builder
                .summarizers
                .insert(summarizer.name().to_string(), Arc::from(summarizer));
        }
        for spec in &config.indicators {
            let indicator = NormalizedIndicator::from_spec(spec)?;
            let applied = config
                .metrics
                .iter()
                .find(|m| m.name == indicator.metric())
                .ok_or_else(|| SummarizerError::UnknownMetric(indicator.metric().to_string()))?;
            if !applied.summarize.iter().any(|s| s == indicator.summarizer()) {
                return Err(SummarizerError::InvalidIndicator {
                    name: spec.name.clone(),
                    reason: format!(
                        "metric '{}' is not summarized with '{}'",
                        indicator.metric(),
                        indicator.summarizer()
                    ),
                });
            }
            builder = builder.indicator(indicator);
        }
        builder.build()
    }
}

impl<K: Clock> Summarizer<K> {
    /// Subscribe to parameter and flag updates
    pub fn attach(&self, bus: &EventBus) -> Vec<SubscriberId> {
        let parameters = self.clone();
        let flags = self.clone();
        vec![
            bus.subscribe(
                Subscription::new(move |event| {
                    parameters.handle_parameter_update(event);
                    Ok(())
                })
                .types(["ParameterUpdateEvent"])
                .description("summarizer parameters"),
            ),
            bus.subscribe(
                Subscription::new(move |event| {
                    flags.handle_flag_update(event);
                    Ok(())
                })
                .types(["FlagUpdateEvent"])
                .description("summarizer flags"),
            ),
        ]
    }

    /// Route a parameter update to its axis, creating it on first sight
    pub fn handle_parameter_update(&self, event: &Event) {
        let Payload::ParameterUpdate { parameters, .. } = event.payload() else {
            return;
        };
        let traceids = event.traceids();
        if traceids.is_empty() {
            tracing::error!(event = %event, "parameter update without trace ids; ignoring");
            return;
        }

        let axis = {
            let mut axes = write(&self.inner.axes);
            match axes.iter().find(|axis| axis.matches(parameters)) {
                Some(axis) => {
                    axis.add_traces(traceids);
                    Arc::clone(axis)
                }
                None => {
                    tracing::debug!(parameters = ?parameters, "new summarizer axis");
                    let axis = Arc::new(Axis::new(
                        parameters.clone(),
                        traceids.clone(),
                        &self.inner.metric_names,
                    ));
                    axes.push(Arc::clone(&axis));
                    axis
                }
            }
        };

        let mut lookup = write(&self.inner.lookup);
        for id in traceids.iter() {
            lookup.insert(*id, Arc::clone(&axis));
        }
    }

    /// Record a flag on the axis owning the event's trace
    pub fn handle_flag_update(&self, event: &Event) {
        let Payload::FlagUpdate { name, value } = event.payload() else {
            return;
        };
        match self.resolve(event.traceids()) {
            Some(axis) => axis.set_flag(name, value.clone()),
            None => tracing::error!(flag = %name, event = %event, "flag update for unknown trace; ignoring"),
        }
    }

    /// Record a metric value against the axis of the first known trace id
    ///
    /// Samples whose trace ids resolve to no axis are logged and dropped.
    /// Tracking an undeclared metric is an error.
    pub fn track_metric(
        &self,
        name: &str,
        value: f64,
        traceids: impl Into<TraceSet>,
    ) -> Result<(), SummarizerError> {
        let traceids = traceids.into();
        if !self.inner.metric_names.iter().any(|m| m == name) {
            return Err(SummarizerError::UnknownMetric(name.to_string()));
        }

        tracing::info!(metric = %name, value, traceids = ?traceids, "tracking metric");
        let Some(axis) = self.resolve(&traceids) else {
            tracing::error!(metric = %name, value, traceids = ?traceids, "metric does not belong to a known trace; dropping");
            return Ok(());
        };
        axis.push(
            name,
            Sample {
                ts: self.inner.clock.wall(),
                value,
            },
        )
    }

    fn resolve(&self, traceids: &TraceSet) -> Option<Arc<Axis>> {
        let lookup = read(&self.inner.lookup);
        traceids.iter().find_map(|id| lookup.get(id).cloned())
    }

    /// The axes in creation order
    pub fn axes(&self) -> Vec<Arc<Axis>> {
        read(&self.inner.axes).clone()
    }

    pub fn raw(&self) -> Vec<RawAxis> {
        self.axes()
            .iter()
            .map(|axis| RawAxis {
                parameters: axis.parameters().clone(),
                flags: axis.flags(),
                values: axis.timeseries(),
            })
            .collect()
    }

    /// Apply each metric's summarizers to every axis
    pub fn sum(&self) -> Vec<SummarizedAxis> {
        self.axes()
            .iter()
            .map(|axis| {
                let values = self
                    .inner
                    .metrics
                    .iter()
                    .map(|metric| {
                        let samples = axis.samples(&metric.name).unwrap_or_default();
                        let summarized = metric
                            .summarize
                            .iter()
                            .filter_map(|name| self.inner.summarizers.get(name))
                            .map(|s| (s.name().to_string(), s.summarize(&samples, axis.parameters())))
                            .collect();
                        (metric.name.clone(), summarized)
                    })
                    .collect();
                SummarizedAxis {
                    parameters: axis.parameters().clone(),
                    flags: axis.flags(),
                    values,
                }
            })
            .collect()
    }

    /// Every indicator calculated over the summarized axes
    pub fn indicators(&self) -> BTreeMap<String, f64> {
        let axes = self.sum();
        self.inner
            .indicators
            .iter()
            .map(|indicator| (indicator.name().to_string(), indicator.calculate(&axes)))
            .collect()
    }
}

impl<K: Clock> std::fmt::Debug for Summarizer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("metrics", &self.inner.metric_names)
            .field("axes", &read(&self.inner.axes).len())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
