// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finite state machines
//!
//! This module provides:
//! - `StateDef` - A named state with an enter hook and an event dispatch table
//! - `Fsm` - The machine: shared context, queued transitions, `wait`
//! - `PolicyFsm` - A policy machine driven from the bus on its own thread

mod machine;
mod policy;
mod state;

pub use machine::{Fsm, FsmBuilder, FsmError, END, START};
pub use policy::{Policy, PolicyFsm};
pub use state::{Ctx, StateDef};
