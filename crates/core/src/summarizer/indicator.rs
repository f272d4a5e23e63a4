// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Indicators reduce every axis to a single number

use super::{SummarizedAxis, SummarizerError};
use crate::config::IndicatorSpec;
use crate::expr::{Expr, ExprError};
use serde_json::Value;

/// A scalar computed across all axes
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    fn calculate(&self, axes: &[SummarizedAxis]) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Min,
    Max,
}

impl Reduction {
    fn from_class(class: &str) -> Option<Self> {
        match class {
            "NormalizedMeanMetricIndicator" => Some(Reduction::Mean),
            "NormalizedMinMetricIndicator" => Some(Reduction::Min),
            "NormalizedMaxMetricIndicator" => Some(Reduction::Max),
            _ => None,
        }
    }

    fn reduce(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Reduction::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reduction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reduction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Mean, minimum or maximum of one summarized metric, normalized per axis
///
/// Each axis contributes `sum[metric][summarizer] / normalize_to`, where
/// `normalize_to` is evaluated over the axis parameters. An axis whose
/// value cannot be computed contributes 0.
#[derive(Debug, Clone)]
pub struct NormalizedIndicator {
    name: String,
    metric: String,
    summarizer: String,
    normalize_to: Option<Expr>,
    reduction: Reduction,
}

impl NormalizedIndicator {
    pub fn new(
        name: impl Into<String>,
        metric: &str,
        normalize_to: Option<&str>,
        reduction: Reduction,
    ) -> Result<Self, SummarizerError> {
        let name = name.into();
        let (metric, summarizer) = metric.split_once('.').ok_or_else(|| SummarizerError::InvalidIndicator {
            name: name.clone(),
            reason: format!("metric '{}' is not of the form metric.summarizer", metric),
        })?;
        let normalize_to = normalize_to
            .map(Expr::parse)
            .transpose()
            .map_err(|source| SummarizerError::Expr {
                indicator: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            metric: metric.to_string(),
            summarizer: summarizer.to_string(),
            normalize_to,
            reduction,
        })
    }

    /// Build from configuration, picking the reduction from the class name
    pub fn from_spec(spec: &IndicatorSpec) -> Result<Self, SummarizerError> {
        let reduction = Reduction::from_class(&spec.class).ok_or_else(|| SummarizerError::UnknownIndicator {
            name: spec.name.clone(),
            class: spec.class.clone(),
        })?;
        Self::new(&spec.name, &spec.metric, spec.normalize_to.as_deref(), reduction)
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn summarizer(&self) -> &str {
        &self.summarizer
    }

    fn axis_value(&self, axis: &SummarizedAxis) -> Result<f64, String> {
        let summarized = axis
            .values
            .get(&self.metric)
            .and_then(|values| values.get(&self.summarizer))
            .ok_or_else(|| format!("no '{}.{}' value on axis", self.metric, self.summarizer))?;
        // Value-with-error pairs contribute their value
        let value = match summarized {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        let value = value
            .as_f64()
            .ok_or_else(|| format!("'{}.{}' is not a number: {}", self.metric, self.summarizer, value))?;

        let Some(expr) = &self.normalize_to else {
            return Ok(value);
        };
        let variables = Value::Object(axis.parameters.clone().into_iter().collect());
        let norm = expr.eval_f64(&variables).map_err(|e: ExprError| e.to_string())?;
        if norm == 0.0 {
            return Err(format!("'{}' evaluated to zero", expr));
        }
        Ok(value / norm)
    }
}

impl Indicator for NormalizedIndicator {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(&self, axes: &[SummarizedAxis]) -> f64 {
        let values: Vec<f64> = axes
            .iter()
            .map(|axis| {
                self.axis_value(axis).unwrap_or_else(|error| {
                    tracing::error!(indicator = %self.name, %error, "error evaluating normalization expression");
                    0.0
                })
            })
            .collect();
        self.reduction.reduce(&values)
    }
}

#[cfg(test)]
#[path = "indicator_tests.rs"]
mod tests;
