// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pd-core: Core library of the performance test driver
//!
//! This crate provides:
//! - Traced events and a worker-pool event bus with priority dispatch
//! - Policy state machines and the thread that feeds them from the bus
//! - Event filter selectors for waiting on downstream events
//! - Parameter batching and the summarizer that groups metrics by it
//! - Configuration and a small expression language

pub mod clock;
pub mod error;
pub mod trace;

pub mod config;
pub mod event;
pub mod expr;
pub mod path;

// Runtime (order matters for dependencies)
pub mod bus;
pub mod filter;
pub mod fsm;
pub mod parameters;
pub mod summarizer;

#[cfg(test)]
mod test_support;

// Re-exports
pub use bus::{BusError, EventBus, SubscriberId, Subscription};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{BusConfig, ConfigError, GeneralConfig, IndicatorSpec, MetricSpec, ParameterSpec};
pub use error::{panic_message, HandlerError, HandlerResult};
pub use event::{parameters_equal, values_equal, Event, ParameterMap, Payload};
pub use expr::{Expr, ExprError};
pub use filter::{EventFilter, FilterError, FilterSession, LatchRegistry};
pub use fsm::{Ctx, Fsm, FsmBuilder, FsmError, Policy, PolicyFsm, StateDef, END, START};
pub use parameters::ParameterBatch;
pub use summarizer::{
    Axis, Indicator, MetricSummarizer, NormalizedIndicator, Sample, Summarizer, SummarizerBuilder,
    SummarizerError, SummarizerFn,
};
pub use trace::{TraceId, TraceSet};
