// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error plumbing shared by every handler seam (bus subscribers, FSM
//! handlers, tasks).

/// Any failure a handler may report. The caller logs it and moves on.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by handlers
pub type HandlerResult = Result<(), HandlerError>;

/// Render a caught panic payload for logging
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
