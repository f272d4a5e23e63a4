//! Behavioral specifications for the performance test driver.
//!
//! These tests are black-box: they only use the public API of `pd-core`
//! and `pd-engine`, wiring components together the way a test session
//! does.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// bus/
#[path = "specs/bus/dispatch.rs"]
mod bus_dispatch;

// fsm/
#[path = "specs/fsm/lifecycle.rs"]
mod fsm_lifecycle;

// filter/
#[path = "specs/filter/sessions.rs"]
mod filter_sessions;

// parameters/
#[path = "specs/parameters/batch.rs"]
mod parameters_batch;

// summarizer/
#[path = "specs/summarizer/axes.rs"]
mod summarizer_axes;

// session/
#[path = "specs/session/run.rs"]
mod session_run;
