// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Performance test driver session engine

mod error;
mod session;
mod task;

pub use error::SessionError;
pub use session::{Session, POLL_INTERVAL};
pub use task::{Task, TaskFn};
