// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trace identifiers
//!
//! A trace id correlates every event that belongs to one causal chain
//! (one test iteration, one downstream action). Ids are process-unique and
//! monotonically increasing, which keeps them cheap to hash and compare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_TRACE_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque token identifying one causal chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(u64);

impl TraceId {
    /// Allocate a fresh, never-before-seen trace id
    pub fn allocate() -> Self {
        TraceId(LAST_TRACE_ID.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered set of trace ids
///
/// Constructors accept a single id, a list, an array or another set, so
/// callers can thread whatever they hold into a new event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceSet(BTreeSet<TraceId>);

impl TraceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TraceId) -> bool {
        self.0.insert(id)
    }

    pub fn extend(&mut self, other: &TraceSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, id: &TraceId) -> bool {
        self.0.contains(id)
    }

    /// True if the two sets share at least one id
    pub fn intersects(&self, other: &TraceSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|id| large.0.contains(id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceId> {
        self.0.iter()
    }
}

impl std::fmt::Display for TraceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", ids.join(","))
    }
}

impl From<TraceId> for TraceSet {
    fn from(id: TraceId) -> Self {
        TraceSet(BTreeSet::from([id]))
    }
}

impl From<Option<TraceId>> for TraceSet {
    fn from(id: Option<TraceId>) -> Self {
        TraceSet(id.into_iter().collect())
    }
}

impl From<Vec<TraceId>> for TraceSet {
    fn from(ids: Vec<TraceId>) -> Self {
        TraceSet(ids.into_iter().collect())
    }
}

impl From<&[TraceId]> for TraceSet {
    fn from(ids: &[TraceId]) -> Self {
        TraceSet(ids.iter().copied().collect())
    }
}

impl<const N: usize> From<[TraceId; N]> for TraceSet {
    fn from(ids: [TraceId; N]) -> Self {
        TraceSet(ids.into_iter().collect())
    }
}

impl From<&TraceSet> for TraceSet {
    fn from(set: &TraceSet) -> Self {
        set.clone()
    }
}

impl FromIterator<TraceId> for TraceSet {
    fn from_iter<I: IntoIterator<Item = TraceId>>(iter: I) -> Self {
        TraceSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TraceSet {
    type Item = &'a TraceId;
    type IntoIter = std::collections::btree_set::Iter<'a, TraceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
