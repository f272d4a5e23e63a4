// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish/subscribe bus
//!
//! This module provides:
//! - `EventBus` - Priority-ordered dispatch on a worker pool, plus a clock tick
//! - `Subscription` - Callback, priority and supertype-aware type filter

mod dispatch;
mod subscription;

pub use dispatch::{BusError, EventBus};
pub use subscription::{Callback, SubscriberId, Subscription, DEFAULT_PRIORITY};
