// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the test session

use pd_core::{BusError, ConfigError, FsmError, SummarizerError};
use thiserror::Error;

/// Errors that can occur while building or running a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("policy error: {0}")]
    Policy(#[from] FsmError),
    #[error("summarizer error: {0}")]
    Summarizer(#[from] SummarizerError),
    #[error("session is already running")]
    AlreadyRunning,
}
